//! Jobtype to handler dispatch table.

use std::collections::HashMap;

use crate::error::HandlerError;
use crate::job::Job;

/// Executes jobs of one jobtype.
///
/// Closures of the form `Fn(&Job) -> Result<(), HandlerError>` implement the
/// trait directly.
pub trait JobHandler: Send {
    /// Runs the job. An error, or a panic, causes the job to be failed.
    ///
    /// # Errors
    ///
    /// Returns whatever application error prevented the job from completing.
    fn handle(&self, job: &Job) -> Result<(), HandlerError>;
}

impl<F> JobHandler for F
where
    F: Fn(&Job) -> Result<(), HandlerError> + Send,
{
    fn handle(&self, job: &Job) -> Result<(), HandlerError> {
        self(job)
    }
}

/// Handlers keyed by jobtype.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Box<dyn JobHandler>>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `jobtype`, replacing any earlier registration.
    pub fn register<H>(&mut self, jobtype: impl Into<String>, handler: H)
    where
        H: JobHandler + 'static,
    {
        self.handlers.insert(jobtype.into(), Box::new(handler));
    }

    /// Handler for `jobtype`, if registered.
    #[must_use]
    pub fn get(&self, jobtype: &str) -> Option<&dyn JobHandler> {
        self.handlers.get(jobtype).map(|handler| &**handler)
    }

    /// Registered jobtypes, in no particular order.
    pub fn jobtypes(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    /// Number of registered jobtypes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether no handler is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
