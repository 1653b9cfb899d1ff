//! Heartbeat-driven fetch/execute/acknowledge loop.
//!
//! A [`Worker`] owns a [`ProtocolClient`] bound to its worker identity and a
//! [`HandlerRegistry`]. [`Worker::run`] repeats four steps until the server
//! (or the host, through a [`ShutdownHandle`]) asks it to terminate:
//!
//! 1. send `BEAT` once more than the heartbeat interval has passed since the
//!    run started or the last acknowledged heartbeat, and adopt any state the
//!    server returns;
//! 2. while running, `FETCH` one job, dispatch it to its handler, and report
//!    the outcome with exactly one `ACK` or `FAIL`;
//! 3. pause briefly while running, or until the next heartbeat is due while
//!    quiet;
//! 4. stop once the liveness state is [`Liveness::Terminate`].
//!
//! On exit the worker sends `END` and closes the connection. Handler errors
//! and panics are contained per job; transport, handshake and protocol errors
//! end the run and are returned after the connection is closed.

mod clock;
mod liveness;
mod registry;
mod shutdown;

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};

use faktory_config::{Config, default_heartbeat_interval, default_queues};
use tracing::{debug, info, warn};

pub use clock::{Clock, SystemClock};
pub use liveness::Liveness;
pub use registry::{HandlerRegistry, JobHandler};
pub use shutdown::ShutdownHandle;

use crate::client::ProtocolClient;
use crate::error::ClientError;
use crate::ident::generate_wid;
use crate::job::Job;
use crate::protocol::{BeatOutcome, FailureReport, WorkerIdentity};
use crate::transport::{TcpTransport, Transport};

const WORKER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::worker");

/// Pause between cycles while fetching.
pub const IDLE_PAUSE: Duration = Duration::from_micros(250);

/// Longest single sleep while quiet, so local stop requests stay responsive.
const QUIET_POLL_LIMIT: Duration = Duration::from_secs(1);

const HANDLER_ERROR: &str = "HandlerError";
const HANDLER_PANIC: &str = "HandlerPanic";
const UNKNOWN_JOBTYPE: &str = "UnknownJobType";

/// Job-processing worker.
pub struct Worker<T: Transport = TcpTransport, C: Clock = SystemClock> {
    client: ProtocolClient<T>,
    wid: String,
    registry: HandlerRegistry,
    queues: Vec<String>,
    heartbeat_interval: Duration,
    clock: C,
    liveness: Liveness,
    last_heartbeat: Instant,
    shutdown: ShutdownHandle,
}

impl Worker<TcpTransport, SystemClock> {
    /// Builds a TCP worker from resolved configuration.
    ///
    /// The worker id comes from the configuration or is generated.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let wid = config
            .worker_id()
            .map_or_else(generate_wid, str::to_owned);
        let identity = WorkerIdentity::new(wid).with_labels(config.labels().to_vec());
        let client = ProtocolClient::from_config(config).with_worker(identity);
        let mut worker = Self::new(client).with_heartbeat_interval(config.heartbeat_interval());
        worker.set_queues(config.queues());
        worker
    }
}

impl<T: Transport> Worker<T, SystemClock> {
    /// Wraps an unconnected client.
    ///
    /// A client without a worker identity is bound to a freshly generated
    /// one; an existing identity is kept.
    #[must_use]
    pub fn new(client: ProtocolClient<T>) -> Self {
        let identity = client
            .worker()
            .cloned()
            .unwrap_or_else(|| WorkerIdentity::new(generate_wid()));
        let wid = identity.wid().to_owned();
        let client = client.with_worker(identity);
        Self {
            client,
            wid,
            registry: HandlerRegistry::new(),
            queues: default_queues(),
            heartbeat_interval: default_heartbeat_interval(),
            clock: SystemClock,
            liveness: Liveness::Running,
            last_heartbeat: Instant::now(),
            shutdown: ShutdownHandle::default(),
        }
    }
}

impl<T: Transport, C: Clock> Worker<T, C> {
    /// Replaces the time source.
    #[must_use]
    pub fn with_clock<N: Clock>(self, clock: N) -> Worker<T, N> {
        Worker {
            client: self.client,
            wid: self.wid,
            registry: self.registry,
            queues: self.queues,
            heartbeat_interval: self.heartbeat_interval,
            clock,
            liveness: self.liveness,
            last_heartbeat: self.last_heartbeat,
            shutdown: self.shutdown,
        }
    }

    /// Overrides the interval between heartbeats.
    #[must_use]
    pub const fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Registers `handler` for `jobtype`; the last registration wins.
    pub fn register<H>(&mut self, jobtype: impl Into<String>, handler: H)
    where
        H: JobHandler + 'static,
    {
        self.registry.register(jobtype, handler);
    }

    /// Replaces the queues fetched from, in priority order.
    pub fn set_queues(&mut self, queues: Vec<String>) {
        self.queues = queues;
    }

    /// Worker id announced to the server.
    #[must_use]
    pub const fn wid(&self) -> &str {
        self.wid.as_str()
    }

    /// Queues fetched from.
    #[must_use]
    pub fn queues(&self) -> &[String] {
        &self.queues
    }

    /// Current liveness state.
    #[must_use]
    pub const fn liveness(&self) -> &Liveness {
        &self.liveness
    }

    /// Registered handlers.
    #[must_use]
    pub const fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Handle the host can use to stop the worker cooperatively.
    #[must_use]
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Runs the loop until the worker is told to terminate.
    ///
    /// # Errors
    ///
    /// Returns the first transport, handshake or protocol error. The
    /// connection is closed before the error is returned. Handler failures
    /// are reported to the server and never surface here.
    pub fn run(&mut self) -> Result<(), ClientError> {
        info!(
            target: WORKER_TARGET,
            wid = %self.wid,
            queues = ?self.queues,
            jobtypes = self.registry.len(),
            "worker starting"
        );
        match self.run_loop() {
            Ok(()) => {
                // A worker stopped before its first exchange has no session to end.
                let ended = if self.client.is_connected() {
                    self.client.end()
                } else {
                    Ok(())
                };
                self.client.close();
                info!(target: WORKER_TARGET, wid = %self.wid, "worker stopped");
                ended
            }
            Err(error) => {
                self.client.close();
                warn!(
                    target: WORKER_TARGET,
                    wid = %self.wid,
                    error = %error,
                    "worker aborted"
                );
                Err(error)
            }
        }
    }

    fn run_loop(&mut self) -> Result<(), ClientError> {
        self.last_heartbeat = self.clock.now();
        while !self.liveness.is_terminated() {
            if self.shutdown.is_requested() {
                info!(target: WORKER_TARGET, wid = %self.wid, "local shutdown requested");
                self.liveness = Liveness::Terminate;
                break;
            }
            self.heartbeat_if_due()?;
            if self.liveness.is_running() {
                self.fetch_and_dispatch()?;
                self.clock.sleep(IDLE_PAUSE);
            } else if !self.liveness.is_terminated() {
                self.clock.sleep(self.quiet_pause());
            }
        }
        Ok(())
    }

    fn since_heartbeat(&self) -> Duration {
        self.clock.now().saturating_duration_since(self.last_heartbeat)
    }

    fn heartbeat_due(&self) -> bool {
        self.since_heartbeat() > self.heartbeat_interval
    }

    fn quiet_pause(&self) -> Duration {
        self.heartbeat_interval
            .saturating_sub(self.since_heartbeat())
            .clamp(IDLE_PAUSE, QUIET_POLL_LIMIT)
    }

    fn heartbeat_if_due(&mut self) -> Result<(), ClientError> {
        if !self.heartbeat_due() {
            return Ok(());
        }
        match self.client.heartbeat(self.liveness.as_wire())? {
            BeatOutcome::Acknowledged => {
                self.last_heartbeat = self.clock.now();
            }
            BeatOutcome::StateChange(reply) => {
                self.last_heartbeat = self.clock.now();
                let next = Liveness::from_wire(reply.state());
                if next != self.liveness {
                    info!(
                        target: WORKER_TARGET,
                        wid = %self.wid,
                        from = %self.liveness,
                        to = %next,
                        "liveness changed by server"
                    );
                    self.liveness = next;
                }
            }
            BeatOutcome::Rejected => {
                debug!(target: WORKER_TARGET, wid = %self.wid, "heartbeat not acknowledged");
            }
        }
        Ok(())
    }

    fn fetch_and_dispatch(&mut self) -> Result<(), ClientError> {
        let Some(job) = self.client.fetch(&self.queues)? else {
            return Ok(());
        };
        let acknowledged = match self.execute(&job) {
            Ok(()) => self.client.ack(job.jid())?,
            Err(report) => self.client.fail_with(job.jid(), &report)?,
        };
        if !acknowledged {
            warn!(
                target: WORKER_TARGET,
                jid = job.jid(),
                "server did not acknowledge the job report"
            );
        }
        Ok(())
    }

    fn execute(&self, job: &Job) -> Result<(), FailureReport> {
        let Some(handler) = self.registry.get(job.jobtype()) else {
            warn!(
                target: WORKER_TARGET,
                jid = job.jid(),
                jobtype = job.jobtype(),
                "no handler registered"
            );
            return Err(FailureReport::new(
                UNKNOWN_JOBTYPE,
                format!("no handler registered for jobtype {}", job.jobtype()),
            ));
        };

        let started = self.clock.now();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler.handle(job)));
        let elapsed = self.clock.now().saturating_duration_since(started);
        if elapsed > self.heartbeat_interval {
            warn!(
                target: WORKER_TARGET,
                jid = job.jid(),
                jobtype = job.jobtype(),
                elapsed_ms = elapsed.as_millis(),
                "handler outlasted the heartbeat interval"
            );
        }

        match outcome {
            Ok(Ok(())) => {
                debug!(target: WORKER_TARGET, jid = job.jid(), jobtype = job.jobtype(), "job succeeded");
                Ok(())
            }
            Ok(Err(error)) => {
                warn!(
                    target: WORKER_TARGET,
                    jid = job.jid(),
                    jobtype = job.jobtype(),
                    error = %error,
                    "job failed"
                );
                Err(FailureReport::new(HANDLER_ERROR, error.to_string()))
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                warn!(
                    target: WORKER_TARGET,
                    jid = job.jid(),
                    jobtype = job.jobtype(),
                    panic = %message,
                    "job handler panicked"
                );
                Err(FailureReport::new(HANDLER_PANIC, message))
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| (*message).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| String::from("handler panicked"))
}
