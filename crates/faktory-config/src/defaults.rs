use std::time::Duration;

use crate::server::ServerEndpoint;

/// Port the Faktory server listens on for worker connections.
pub const DEFAULT_PORT: u16 = 7419;

/// Host used when no server URL is configured.
pub const DEFAULT_HOST: &str = "localhost";

/// Queue fetched from when no queues are configured.
pub const DEFAULT_QUEUE: &str = "default";

/// Seconds between worker heartbeats.
pub const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 15;

/// Seconds allowed for connecting to, reading from, or writing to the server.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default log filter expression used by the binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default log filter expression used by the binaries.
#[must_use]
pub const fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
#[must_use]
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format for the binaries.
#[must_use]
pub const fn default_log_format() -> crate::logging::LogFormat {
    crate::logging::LogFormat::Json
}

/// Computes the default server endpoint, `tcp://localhost:7419`.
#[must_use]
pub fn default_server_endpoint() -> ServerEndpoint {
    ServerEndpoint::tcp(DEFAULT_HOST, DEFAULT_PORT)
}

/// Queue list used when none is configured.
#[must_use]
pub fn default_queues() -> Vec<String> {
    vec![DEFAULT_QUEUE.to_owned()]
}

/// Interval between worker heartbeats.
#[must_use]
pub const fn default_heartbeat_interval() -> Duration {
    Duration::from_secs(DEFAULT_HEARTBEAT_INTERVAL_SECS)
}

/// Transport timeout applied to connect, read and write calls.
#[must_use]
pub const fn default_timeout() -> Duration {
    Duration::from_secs(DEFAULT_TIMEOUT_SECS)
}
