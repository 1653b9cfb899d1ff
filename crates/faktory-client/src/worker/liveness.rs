//! Server-directed liveness of a worker.

use std::fmt;

const TERMINATE: &str = "terminate";

/// Whether the worker fetches, quiesces, or stops.
///
/// Transitions are driven by heartbeat replies. `Terminate` is absorbing.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Liveness {
    /// Fetching and executing jobs. Wire value `""`.
    #[default]
    Running,
    /// Heartbeating without fetching. Carries the server's wording, usually
    /// `quiet`.
    Quiet(String),
    /// Leaving the run loop. Wire value `terminate`.
    Terminate,
}

impl Liveness {
    /// Interprets the `state` of a heartbeat reply.
    #[must_use]
    pub fn from_wire(state: &str) -> Self {
        match state {
            "" => Self::Running,
            TERMINATE => Self::Terminate,
            other => Self::Quiet(other.to_owned()),
        }
    }

    /// Value reported as `current_state` in `BEAT`.
    #[must_use]
    pub const fn as_wire(&self) -> &str {
        match self {
            Self::Running => "",
            Self::Quiet(state) => state.as_str(),
            Self::Terminate => TERMINATE,
        }
    }

    /// Whether new jobs may be fetched.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    /// Whether the run loop must stop.
    #[must_use]
    pub const fn is_terminated(&self) -> bool {
        matches!(self, Self::Terminate)
    }
}

impl fmt::Display for Liveness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => f.write_str("running"),
            Self::Quiet(state) => f.write_str(state),
            Self::Terminate => f.write_str(TERMINATE),
        }
    }
}
