//! Session management and command exchange with the job server.
//!
//! [`ProtocolClient`] owns exactly one [`Transport`]. It performs the
//! handshake lazily on first use and then runs one strictly sequential
//! request/response exchange per command; a new command is never written
//! before the previous reply has been consumed in full.

use faktory_config::{Config, DEFAULT_QUEUE};
use tracing::{debug, trace};

use crate::error::{ClientError, HandshakeError, ProtocolError};
use crate::job::Job;
use crate::memory::resident_set_kib;
use crate::protocol::{
    self, AckRequest, BeatOutcome, BeatReply, BeatRequest, Command, FailRequest, FailureReport,
    Greeting, HelloRequest, WorkerIdentity,
};
use crate::transport::{TcpTransport, Transport};

const CLIENT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::client");

/// Lifecycle of the client's single connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No session; the next operation connects.
    #[default]
    Disconnected,
    /// Transport open, handshake in progress.
    Connecting,
    /// Handshake complete; commands may be exchanged.
    Connected,
}

/// Client for the job server's work protocol.
///
/// Every command lazily connects when the client is
/// [`ConnectionState::Disconnected`]. Negative replies to `PUSH`, `ACK` and
/// `FAIL` are reported as `Ok(false)`; only transport, handshake and protocol
/// failures are errors.
pub struct ProtocolClient<T: Transport = TcpTransport> {
    transport: T,
    password: Option<String>,
    worker: Option<WorkerIdentity>,
    state: ConnectionState,
}

impl ProtocolClient<TcpTransport> {
    /// Builds a TCP client from resolved configuration.
    ///
    /// The client is producer-only; [`crate::Worker`] binds its own identity.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let transport = TcpTransport::new(config.server().clone()).with_timeout(config.timeout());
        let client = Self::new(transport);
        match config.password() {
            Some(password) => client.with_password(password),
            None => client,
        }
    }
}

impl<T: Transport> ProtocolClient<T> {
    /// Wraps an unconnected transport.
    #[must_use]
    pub const fn new(transport: T) -> Self {
        Self {
            transport,
            password: None,
            worker: None,
            state: ConnectionState::Disconnected,
        }
    }

    /// Sets the password used to answer an authentication challenge.
    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Binds the client to a worker identity.
    ///
    /// The identity is announced in `HELLO` and carried by every `BEAT`. It is
    /// fixed for the life of the client.
    #[must_use]
    pub fn with_worker(mut self, identity: WorkerIdentity) -> Self {
        self.worker = Some(identity);
        self
    }

    /// Worker identity this client is bound to, if any.
    #[must_use]
    pub const fn worker(&self) -> Option<&WorkerIdentity> {
        self.worker.as_ref()
    }

    /// Current connection state.
    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    /// Whether the handshake has completed.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Opens the transport and performs the handshake.
    ///
    /// Does nothing unless the client is disconnected. On failure the
    /// transport is closed and the client stays disconnected.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Transport`] when the server is unreachable,
    /// [`ClientError::Handshake`] when the greeting or `HELLO` exchange fails,
    /// and [`ClientError::Protocol`] when the `HELLO` payload cannot be encoded.
    pub fn connect(&mut self) -> Result<(), ClientError> {
        if self.state != ConnectionState::Disconnected {
            return Ok(());
        }
        self.state = ConnectionState::Connecting;
        match self.handshake() {
            Ok(()) => {
                self.state = ConnectionState::Connected;
                debug!(
                    target: CLIENT_TARGET,
                    wid = self.worker.as_ref().map(WorkerIdentity::wid),
                    "session established"
                );
                Ok(())
            }
            Err(error) => {
                self.transport.close();
                self.state = ConnectionState::Disconnected;
                debug!(target: CLIENT_TARGET, error = %error, "handshake failed");
                Err(error)
            }
        }
    }

    fn handshake(&mut self) -> Result<(), ClientError> {
        self.transport.connect()?;
        let greeting_line = self.transport.read_line()?;
        trace!(target: CLIENT_TARGET, greeting = protocol::strip_terminator(&greeting_line), "received greeting");

        let mut hello = HelloRequest::new(self.worker.as_ref());
        let challenged = match protocol::parse_greeting(&greeting_line)? {
            Greeting::Plain => false,
            Greeting::Challenge(challenge) => {
                let password = self
                    .password
                    .as_deref()
                    .ok_or(HandshakeError::PasswordRequired)?;
                hello = hello.with_password_hash(challenge.respond(password)?);
                true
            }
        };

        // The payload may carry a password hash and is never logged.
        let framed = protocol::frame_json(Command::Hello, &hello)?;
        self.transport.write(&framed)?;
        let reply = self.transport.read_line()?;
        if protocol::is_ok(&reply) {
            return Ok(());
        }
        if challenged && protocol::is_invalid_password(&reply) {
            return Err(HandshakeError::InvalidPassword.into());
        }
        Err(HandshakeError::Rejected {
            reply: protocol::strip_terminator(&reply).to_owned(),
        }
        .into())
    }

    /// Closes the transport and returns to [`ConnectionState::Disconnected`].
    pub fn close(&mut self) {
        self.transport.close();
        self.state = ConnectionState::Disconnected;
        debug!(target: CLIENT_TARGET, "connection closed");
    }

    /// Enqueues a job.
    ///
    /// # Errors
    ///
    /// Returns a [`ClientError`] on connection or encoding failures. A negative
    /// reply is `Ok(false)`.
    pub fn push(&mut self, job: &Job) -> Result<bool, ClientError> {
        let framed = protocol::frame_json(Command::Push, job)?;
        let reply = self.exchange(Command::Push, &framed)?;
        Ok(protocol::is_ok(&reply))
    }

    /// Reserves the next job from `queues`, checked in order.
    ///
    /// An empty slice fetches from the `default` queue. Returns `Ok(None)`
    /// when no job is available.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::LengthMismatch`] or [`ProtocolError::DecodeJob`]
    /// when the job payload is malformed, and a [`ClientError`] on connection
    /// failures.
    pub fn fetch(&mut self, queues: &[String]) -> Result<Option<Job>, ClientError> {
        let names = if queues.is_empty() {
            String::from(DEFAULT_QUEUE)
        } else {
            queues.join(" ")
        };
        let framed = protocol::frame(Command::Fetch, &names);
        let header = self.exchange(Command::Fetch, &framed)?;
        let Some(length) = protocol::block_length(&header) else {
            return Ok(None);
        };
        let line = self.read_reply()?;
        let payload = protocol::block_payload(&line, length)?;
        let job: Job =
            serde_json::from_str(payload).map_err(|source| ProtocolError::DecodeJob { source })?;
        debug!(
            target: CLIENT_TARGET,
            jid = job.jid(),
            jobtype = job.jobtype(),
            "fetched job"
        );
        Ok(Some(job))
    }

    /// Reports successful completion of a job.
    ///
    /// # Errors
    ///
    /// Returns a [`ClientError`] on connection failures.
    pub fn ack(&mut self, jid: &str) -> Result<bool, ClientError> {
        let framed = protocol::frame_json(Command::Ack, &AckRequest { jid })?;
        let reply = self.exchange(Command::Ack, &framed)?;
        Ok(protocol::is_ok(&reply))
    }

    /// Reports failure of a job without further detail.
    ///
    /// # Errors
    ///
    /// Returns a [`ClientError`] on connection failures.
    pub fn fail(&mut self, jid: &str) -> Result<bool, ClientError> {
        self.send_fail(&FailRequest {
            jid,
            errtype: None,
            message: None,
        })
    }

    /// Reports failure of a job together with its cause.
    ///
    /// # Errors
    ///
    /// Returns a [`ClientError`] on connection failures.
    pub fn fail_with(&mut self, jid: &str, report: &FailureReport) -> Result<bool, ClientError> {
        self.send_fail(&FailRequest {
            jid,
            errtype: Some(report.errtype()).filter(|errtype| !errtype.is_empty()),
            message: Some(report.message()).filter(|message| !message.is_empty()),
        })
    }

    fn send_fail(&mut self, request: &FailRequest<'_>) -> Result<bool, ClientError> {
        let framed = protocol::frame_json(Command::Fail, request)?;
        let reply = self.exchange(Command::Fail, &framed)?;
        Ok(protocol::is_ok(&reply))
    }

    /// Sends a heartbeat carrying the worker's current liveness state.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MissingWorkerId`] when the client is not bound
    /// to a worker, [`ProtocolError::LengthMismatch`] when a block reply is
    /// truncated, and a [`ClientError`] on connection failures.
    pub fn heartbeat(&mut self, current_state: &str) -> Result<BeatOutcome, ClientError> {
        let framed = {
            let identity = self
                .worker
                .as_ref()
                .ok_or(ProtocolError::MissingWorkerId)?;
            protocol::frame_json(
                Command::Beat,
                &BeatRequest {
                    wid: identity.wid(),
                    rss_kb: resident_set_kib(),
                    current_state,
                },
            )?
        };
        let reply = self.exchange(Command::Beat, &framed)?;
        if protocol::is_ok(&reply) {
            return Ok(BeatOutcome::Acknowledged);
        }
        let Some(length) = protocol::block_length(&reply) else {
            return Ok(BeatOutcome::Rejected);
        };
        let line = self.read_reply()?;
        let payload = protocol::block_payload(&line, length)?;
        Ok(serde_json::from_str::<BeatReply>(payload)
            .map_or(BeatOutcome::Rejected, BeatOutcome::StateChange))
    }

    /// Announces an orderly shutdown. No reply is read.
    ///
    /// # Errors
    ///
    /// Returns a [`ClientError`] when the command cannot be written.
    pub fn end(&mut self) -> Result<(), ClientError> {
        self.send(Command::End, &protocol::frame(Command::End, ""))
    }

    fn send(&mut self, command: Command, framed: &[u8]) -> Result<(), ClientError> {
        self.connect()?;
        trace!(target: CLIENT_TARGET, command = command.name(), bytes = framed.len(), "sending command");
        self.transport.write(framed)?;
        Ok(())
    }

    fn read_reply(&mut self) -> Result<String, ClientError> {
        let reply = self.transport.read_line()?;
        trace!(target: CLIENT_TARGET, reply = protocol::strip_terminator(&reply), "received reply");
        Ok(reply)
    }

    fn exchange(&mut self, command: Command, framed: &[u8]) -> Result<String, ClientError> {
        self.send(command, framed)?;
        self.read_reply()
    }
}
