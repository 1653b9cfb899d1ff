//! Line framing and reply grammar of the work protocol.
//!
//! Every command is an ASCII line `NAME payload\r\n`. Replies are either a
//! status line (`+OK`, `+HI {...}`, `-ERR ...`) or a length-prefixed block: a
//! `$<n>` line followed by a line carrying exactly `n` bytes of JSON.

mod messages;

use serde::Serialize;

pub use messages::{BeatOutcome, BeatReply, FailureReport, WorkerIdentity};
pub(crate) use messages::{AckRequest, BeatRequest, FailRequest, HelloRequest};

use crate::auth::Challenge;
use crate::error::{HandshakeError, ProtocolError};

/// Protocol revision announced in `HELLO`.
pub const PROTOCOL_VERSION: u8 = 2;

pub(crate) const OK_REPLY: &str = "+OK\r\n";
pub(crate) const PLAIN_GREETING: &str = "+HI {\"v\":2}\r\n";

const LINE_TERMINATOR: &str = "\r\n";
const INVALID_PASSWORD_MARKER: &str = "Invalid password";
const SALT_FIELD: &str = "\"s\":";
const ITERATIONS_FIELD: &str = "\"i\":";

/// Commands understood by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Command {
    Hello,
    Push,
    Fetch,
    Ack,
    Fail,
    Beat,
    End,
}

impl Command {
    pub(crate) const fn name(self) -> &'static str {
        match self {
            Self::Hello => "HELLO",
            Self::Push => "PUSH",
            Self::Fetch => "FETCH",
            Self::Ack => "ACK",
            Self::Fail => "FAIL",
            Self::Beat => "BEAT",
            Self::End => "END",
        }
    }
}

/// Frames a command with a raw text payload.
pub(crate) fn frame(command: Command, payload: &str) -> Vec<u8> {
    let name = command.name();
    let mut line = String::with_capacity(name.len() + payload.len() + 3);
    line.push_str(name);
    if !payload.is_empty() {
        line.push(' ');
        line.push_str(payload);
    }
    line.push_str(LINE_TERMINATOR);
    line.into_bytes()
}

/// Frames a command whose payload is the JSON encoding of `payload`.
pub(crate) fn frame_json<T>(command: Command, payload: &T) -> Result<Vec<u8>, ProtocolError>
where
    T: Serialize + ?Sized,
{
    let encoded = serde_json::to_string(payload).map_err(|source| ProtocolError::Encode {
        command: command.name(),
        source,
    })?;
    Ok(frame(command, &encoded))
}

/// Server greeting, read immediately after the transport connects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Greeting {
    /// No authentication required.
    Plain,
    /// The server demands a password hash.
    Challenge(Challenge),
}

pub(crate) fn parse_greeting(line: &str) -> Result<Greeting, HandshakeError> {
    if line.contains(SALT_FIELD) && line.contains(ITERATIONS_FIELD) {
        let payload = line
            .find('{')
            .and_then(|start| line.get(start..))
            .map(str::trim_end)
            .ok_or_else(|| HandshakeError::MalformedChallenge {
                message: String::from("greeting carries no JSON payload"),
            })?;
        let challenge: Challenge =
            serde_json::from_str(payload).map_err(|error| HandshakeError::MalformedChallenge {
                message: error.to_string(),
            })?;
        return Ok(Greeting::Challenge(challenge));
    }
    if line == PLAIN_GREETING {
        return Ok(Greeting::Plain);
    }
    Err(HandshakeError::UnexpectedGreeting {
        greeting: strip_terminator(line).to_owned(),
    })
}

pub(crate) fn is_ok(line: &str) -> bool {
    line == OK_REPLY
}

pub(crate) fn is_invalid_password(line: &str) -> bool {
    line.contains(INVALID_PASSWORD_MARKER)
}

/// Byte count announced by a `$<n>` block header.
///
/// Returns `None` for anything that announces no payload: `$0`, `$-1`, a
/// non-numeric count, or a line that is not a block header at all.
pub(crate) fn block_length(line: &str) -> Option<usize> {
    let header = line.strip_prefix('$')?;
    strip_terminator(header)
        .trim()
        .parse::<i64>()
        .ok()
        .filter(|count| *count > 0)
        .and_then(|count| usize::try_from(count).ok())
}

/// Strips the terminator from a block payload line and checks its length.
pub(crate) fn block_payload(line: &str, expected: usize) -> Result<&str, ProtocolError> {
    let payload = strip_terminator(line);
    if payload.len() == expected {
        Ok(payload)
    } else {
        Err(ProtocolError::LengthMismatch {
            expected,
            actual: payload.len(),
        })
    }
}

pub(crate) fn strip_terminator(line: &str) -> &str {
    line.strip_suffix(LINE_TERMINATOR)
        .or_else(|| line.strip_suffix('\n'))
        .unwrap_or(line)
}
