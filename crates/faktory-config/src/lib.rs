//! Shared configuration for Faktory producers and workers.
//!
//! Configuration is layered by `ortho_config`: built-in defaults, then an
//! optional TOML file (`--config-path` or `FAKTORY_CONFIG_PATH`), then
//! `FAKTORY_*` environment variables, and finally command-line flags. The
//! resulting [`Config`] describes where the server lives, how the worker
//! identifies itself, and how the binaries emit logs.

use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

mod defaults;
mod logging;
mod server;

pub use defaults::{
    DEFAULT_HEARTBEAT_INTERVAL_SECS, DEFAULT_HOST, DEFAULT_LOG_FILTER, DEFAULT_PORT,
    DEFAULT_QUEUE, DEFAULT_TIMEOUT_SECS, default_heartbeat_interval, default_log_filter,
    default_log_filter_string, default_log_format, default_queues, default_server_endpoint,
    default_timeout,
};
pub use logging::{LogFormat, LogFormatParseError};
pub use server::{ServerEndpoint, ServerUrlError};

/// Resolved client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "FAKTORY")]
pub struct Config {
    /// Server location, for example `tcp://:secret@localhost:7419`.
    #[ortho_config(default = default_server_endpoint())]
    pub server_url: ServerEndpoint,
    /// Password answering the server's authentication challenge.
    ///
    /// Takes precedence over a password embedded in [`Config::server_url`].
    pub password: Option<String>,
    /// Stable worker identifier; generated per worker when absent.
    pub worker_id: Option<String>,
    /// Queues fetched from, in priority order.
    #[ortho_config(default = default_queues())]
    pub queues: Vec<String>,
    /// Labels advertised by workers during the handshake.
    #[ortho_config(default = Vec::new())]
    pub labels: Vec<String>,
    /// Seconds between worker heartbeats.
    #[ortho_config(default = DEFAULT_HEARTBEAT_INTERVAL_SECS)]
    pub heartbeat_interval_secs: u64,
    /// Seconds allowed for connecting, reading and writing.
    #[ortho_config(default = DEFAULT_TIMEOUT_SECS)]
    pub timeout_secs: u64,
    /// Log filter expression understood by `tracing-subscriber`.
    #[ortho_config(default = default_log_filter_string())]
    pub log_filter: String,
    /// Output format for structured logs.
    #[ortho_config(default = default_log_format())]
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: default_server_endpoint(),
            password: None,
            worker_id: None,
            queues: default_queues(),
            labels: Vec::new(),
            heartbeat_interval_secs: DEFAULT_HEARTBEAT_INTERVAL_SECS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
        }
    }
}

impl Config {
    /// Server endpoint to connect to.
    #[must_use]
    pub const fn server(&self) -> &ServerEndpoint {
        &self.server_url
    }

    /// Effective password: the explicit setting, else the URL's password.
    #[must_use]
    pub fn password(&self) -> Option<&str> {
        self.password
            .as_deref()
            .filter(|password| !password.is_empty())
            .or_else(|| self.server_url.password())
    }

    /// Configured worker identifier, if any.
    #[must_use]
    pub fn worker_id(&self) -> Option<&str> {
        self.worker_id
            .as_deref()
            .map(str::trim)
            .filter(|wid| !wid.is_empty())
    }

    /// Queues to fetch from; falls back to `default` when the list is empty.
    #[must_use]
    pub fn queues(&self) -> Vec<String> {
        let queues: Vec<String> = self
            .queues
            .iter()
            .map(|queue| queue.trim())
            .filter(|queue| !queue.is_empty())
            .map(str::to_owned)
            .collect();
        if queues.is_empty() {
            default_queues()
        } else {
            queues
        }
    }

    /// Worker labels.
    #[must_use]
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Interval between heartbeats.
    #[must_use]
    pub const fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    /// Timeout for transport operations.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Log filter expression.
    #[must_use]
    pub const fn log_filter(&self) -> &str {
        self.log_filter.as_str()
    }

    /// Log output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }
}
