//! Job records exchanged with the server.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ident::generate_jid;

/// A unit of work.
///
/// `jid`, `jobtype` and `args` are the fields the client interprets; every
/// other field the server sends (retry policy, timestamps, custom metadata)
/// is kept in an opaque map and written back unchanged.
///
/// # Example
///
/// ```
/// use faktory_client::Job;
/// use serde_json::json;
///
/// let job = Job::new("cooljob", vec![json!(1), json!(2)]).with_queue("critical");
/// assert_eq!(job.jobtype(), "cooljob");
/// assert_eq!(job.args(), &[json!(1), json!(2)]);
/// assert_eq!(job.queue(), Some("critical"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    jid: String,
    jobtype: String,
    #[serde(default)]
    args: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    queue: Option<String>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl Job {
    /// Creates a job with a freshly generated `jid`.
    #[must_use]
    pub fn new(jobtype: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            jid: generate_jid(),
            jobtype: jobtype.into(),
            args,
            queue: None,
            extra: Map::new(),
        }
    }

    /// Replaces the generated `jid`.
    #[must_use]
    pub fn with_jid(mut self, jid: impl Into<String>) -> Self {
        self.jid = jid.into();
        self
    }

    /// Targets a specific queue; the server uses `default` otherwise.
    #[must_use]
    pub fn with_queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = Some(queue.into());
        self
    }

    /// Adds an additional top-level field, such as `retry` or `custom`.
    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Job identifier.
    #[must_use]
    pub const fn jid(&self) -> &str {
        self.jid.as_str()
    }

    /// Type tag selecting the handler.
    #[must_use]
    pub const fn jobtype(&self) -> &str {
        self.jobtype.as_str()
    }

    /// Positional arguments.
    #[must_use]
    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// Target queue, when set.
    #[must_use]
    pub fn queue(&self) -> Option<&str> {
        self.queue.as_deref()
    }

    /// Fields not interpreted by the client.
    #[must_use]
    pub const fn extra(&self) -> &Map<String, Value> {
        &self.extra
    }
}
