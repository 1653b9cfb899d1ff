//! Client for the Faktory work protocol.
//!
//! The crate provides the two roles of a Faktory client over a single
//! connection:
//!
//! - producers use [`ProtocolClient::push`] to enqueue [`Job`]s;
//! - workers wrap a client in a [`Worker`], register a [`JobHandler`] per
//!   jobtype, and call [`Worker::run`] to fetch, execute and acknowledge jobs
//!   while heartbeating the server.
//!
//! The protocol client is generic over a [`Transport`] so the state machine
//! can be exercised without a network; [`TcpTransport`] is the production
//! implementation.
//!
//! ```no_run
//! use faktory_client::{HandlerError, Job, ProtocolClient, Worker};
//! use faktory_config::Config;
//!
//! # fn main() -> Result<(), faktory_client::ClientError> {
//! let config = Config::default();
//! let mut producer = ProtocolClient::from_config(&config);
//! producer.push(&Job::new("cooljob", vec![serde_json::json!(1)]))?;
//!
//! let mut worker = Worker::from_config(&config);
//! worker.register("cooljob", |job: &Job| -> Result<(), HandlerError> {
//!     println!("{:?}", job.args());
//!     Ok(())
//! });
//! worker.run()
//! # }
//! ```

mod auth;
mod client;
mod error;
mod ident;
mod job;
mod memory;
mod protocol;
mod transport;
mod worker;

#[cfg(test)]
mod tests;

pub use auth::{Challenge, password_hash};
pub use client::{ConnectionState, ProtocolClient};
pub use error::{ClientError, HandlerError, HandshakeError, ProtocolError, TransportError};
pub use ident::{generate_jid, generate_wid};
pub use job::Job;
pub use memory::resident_set_kib;
pub use protocol::{
    BeatOutcome, BeatReply, FailureReport, PROTOCOL_VERSION, WorkerIdentity,
};
pub use transport::{TcpTransport, Transport};
pub use worker::{
    Clock, HandlerRegistry, IDLE_PAUSE, JobHandler, Liveness, ShutdownHandle, SystemClock, Worker,
};
