//! Typed payloads for the JSON-carrying commands and replies.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::PROTOCOL_VERSION;

/// `HELLO` payload.
///
/// Field order matches what the server documents: password hash, worker
/// identity, then protocol version. Absent fields are omitted entirely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct HelloRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pwdhash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    wid: Option<&'a str>,
    #[serde(skip_serializing_if = "has_no_labels")]
    labels: &'a [String],
    v: u8,
}

impl<'a> HelloRequest<'a> {
    pub(crate) fn new(identity: Option<&'a WorkerIdentity>) -> Self {
        let labels: &'a [String] = match identity {
            Some(identity) => identity.labels(),
            None => &[],
        };
        Self {
            pwdhash: None,
            wid: identity.map(WorkerIdentity::wid),
            labels,
            v: PROTOCOL_VERSION,
        }
    }

    pub(crate) fn with_password_hash(mut self, pwdhash: String) -> Self {
        self.pwdhash = Some(pwdhash);
        self
    }
}

fn has_no_labels(labels: &&[String]) -> bool {
    labels.is_empty()
}

/// Identity a worker-bound client presents in `HELLO` and `BEAT`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerIdentity {
    wid: String,
    labels: Vec<String>,
}

impl WorkerIdentity {
    /// Creates an identity with no labels.
    #[must_use]
    pub fn new(wid: impl Into<String>) -> Self {
        Self {
            wid: wid.into(),
            labels: Vec::new(),
        }
    }

    /// Attaches labels advertised during the handshake.
    #[must_use]
    pub fn with_labels(mut self, labels: Vec<String>) -> Self {
        self.labels = labels;
        self
    }

    /// Worker id.
    #[must_use]
    pub const fn wid(&self) -> &str {
        self.wid.as_str()
    }

    /// Worker labels.
    #[must_use]
    pub fn labels(&self) -> &[String] {
        &self.labels
    }
}

/// `ACK` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct AckRequest<'a> {
    pub(crate) jid: &'a str,
}

/// `FAIL` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct FailRequest<'a> {
    pub(crate) jid: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) errtype: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) message: Option<&'a str>,
}

/// Description of a handler failure carried by `FAIL`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureReport {
    errtype: String,
    message: String,
}

impl FailureReport {
    /// Creates a report from an error category and a human-readable message.
    #[must_use]
    pub fn new(errtype: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            errtype: errtype.into(),
            message: message.into(),
        }
    }

    /// Error category, for example `HandlerError`.
    #[must_use]
    pub const fn errtype(&self) -> &str {
        self.errtype.as_str()
    }

    /// Failure description.
    #[must_use]
    pub const fn message(&self) -> &str {
        self.message.as_str()
    }
}

/// `BEAT` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct BeatRequest<'a> {
    pub(crate) wid: &'a str,
    pub(crate) rss_kb: u64,
    pub(crate) current_state: &'a str,
}

/// Structured heartbeat reply instructing the worker to change state.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BeatReply {
    state: String,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl BeatReply {
    /// State the server wants the worker to adopt, e.g. `quiet`.
    #[must_use]
    pub const fn state(&self) -> &str {
        self.state.as_str()
    }

    /// Additional server-defined fields.
    #[must_use]
    pub const fn extra(&self) -> &Map<String, Value> {
        &self.extra
    }
}

/// Result of a heartbeat exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BeatOutcome {
    /// The server answered `+OK`.
    Acknowledged,
    /// The server answered with a state instruction.
    StateChange(BeatReply),
    /// Any other reply.
    Rejected,
}

impl BeatOutcome {
    /// Whether the heartbeat counts as delivered.
    #[must_use]
    pub const fn is_delivered(&self) -> bool {
        !matches!(self, Self::Rejected)
    }
}
