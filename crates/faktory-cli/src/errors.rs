//! Error type for the CLI runtime.

use std::io;
use std::sync::Arc;

use faktory_client::ClientError;
use thiserror::Error;

use crate::telemetry::TelemetryError;

#[derive(Debug, Error)]
pub(crate) enum AppError {
    #[error("failed to load configuration: {0}")]
    LoadConfiguration(Arc<ortho_config::OrthoError>),
    #[error("{0}")]
    CliUsage(clap::Error),
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
    #[error("failed to install signal handler: {0}")]
    InstallSignalHandler(io::Error),
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("server did not accept job {jid}")]
    PushRejected { jid: String },
    #[error("failed to write output: {0}")]
    WriteOutput(io::Error),
}

impl AppError {
    /// Whether the error is clap asking to print help or version text.
    pub(crate) fn is_informational(&self) -> bool {
        matches!(
            self,
            Self::CliUsage(error)
                if matches!(
                    error.kind(),
                    clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion
                )
        )
    }
}
