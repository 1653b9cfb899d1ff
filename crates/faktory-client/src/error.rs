//! Error taxonomy for the protocol client and worker.
//!
//! Transport, handshake and protocol failures are fatal to the current
//! connection and surface to the caller. Handler failures are application
//! errors: the worker contains them per job and reports them with `FAIL`.
//! I/O errors are wrapped in `Arc` to satisfy the `result_large_err` Clippy
//! lint and keep the enums cloneable by reference.

use std::io;
use std::sync::Arc;

use thiserror::Error;

/// Error returned by a job handler.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failures of the byte-stream connection to the server.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The server host name did not resolve to an address.
    #[error("failed to resolve server address {endpoint}: {source}")]
    Resolve {
        /// Endpoint that was being resolved.
        endpoint: String,
        /// Underlying resolver error.
        #[source]
        source: Arc<io::Error>,
    },
    /// The TCP connection could not be established.
    #[error("failed to connect to server at {endpoint}: {source}")]
    Connect {
        /// Endpoint that refused or timed out.
        endpoint: String,
        /// Underlying socket error.
        #[source]
        source: Arc<io::Error>,
    },
    /// Writing a command failed.
    #[error("failed to send command to server: {0}")]
    Write(#[source] Arc<io::Error>),
    /// Reading a reply failed.
    #[error("failed to read reply from server: {0}")]
    Read(#[source] Arc<io::Error>),
    /// The server closed the stream before a full line arrived.
    #[error("server closed the connection")]
    Closed,
    /// An operation was attempted before `connect`.
    #[error("transport is not connected")]
    NotConnected,
}

impl TransportError {
    pub(crate) fn write(source: io::Error) -> Self {
        Self::Write(Arc::new(source))
    }

    pub(crate) fn read(source: io::Error) -> Self {
        Self::Read(Arc::new(source))
    }
}

/// Failures while establishing a session.
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// The server issued a password challenge but no password is configured.
    #[error("server requires a password but none was configured")]
    PasswordRequired,
    /// The server rejected the password hash.
    #[error("server rejected the configured password")]
    InvalidPassword,
    /// The greeting matched neither the plain nor the challenge form.
    #[error("unexpected server greeting: {greeting}")]
    UnexpectedGreeting {
        /// Greeting line as received, without the line terminator.
        greeting: String,
    },
    /// The challenge payload could not be interpreted.
    #[error("malformed authentication challenge: {message}")]
    MalformedChallenge {
        /// Description of the defect.
        message: String,
    },
    /// The server answered `HELLO` with something other than `+OK`.
    #[error("server rejected the handshake: {reply}")]
    Rejected {
        /// Reply line as received, without the line terminator.
        reply: String,
    },
}

/// Replies or payloads that do not fit the wire grammar.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A request payload could not be serialised.
    #[error("failed to encode {command} payload: {source}")]
    Encode {
        /// Command whose payload failed to encode.
        command: &'static str,
        /// Underlying serialisation error.
        #[source]
        source: serde_json::Error,
    },
    /// A fetched job could not be deserialised.
    #[error("failed to decode job payload: {source}")]
    DecodeJob {
        /// Underlying deserialisation error.
        #[source]
        source: serde_json::Error,
    },
    /// A length-prefixed block carried a different number of bytes.
    #[error("reply announced {expected} bytes but carried {actual}")]
    LengthMismatch {
        /// Byte count announced by the `$` line.
        expected: usize,
        /// Byte count of the payload line.
        actual: usize,
    },
    /// A heartbeat was requested by a client not bound to a worker.
    #[error("heartbeat requires a worker identity")]
    MissingWorkerId,
}

/// Any fatal failure raised by [`crate::ProtocolClient`] or [`crate::Worker`].
#[derive(Debug, Error)]
pub enum ClientError {
    /// The connection failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The session could not be established.
    #[error("handshake failed: {0}")]
    Handshake(#[from] HandshakeError),
    /// The server's reply did not match the protocol.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}
