//! Execution of the parsed commands.

use std::io::Write;
use std::process::ExitCode;

use faktory_client::{HandlerError, Job, ProtocolClient, Worker};
use faktory_config::Config;
use signal_hook::consts::signal::{SIGINT, SIGTERM};
use tracing::info;

use crate::cli::{CliCommand, PushArgs, WorkArgs};
use crate::errors::AppError;

const CLI_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::commands");

pub(crate) fn execute<W: Write>(
    command: CliCommand,
    config: &Config,
    stdout: &mut W,
) -> Result<ExitCode, AppError> {
    match command {
        CliCommand::Push(args) => push(args, config, stdout),
        CliCommand::Work(args) => work(args, config),
    }
}

/// Pushes one job and prints its jid once the server accepts it.
fn push<W: Write>(args: PushArgs, config: &Config, stdout: &mut W) -> Result<ExitCode, AppError> {
    let job = args.into_job();
    let mut client = ProtocolClient::from_config(config);
    let accepted = client
        .push(&job)
        .and_then(|accepted| client.end().map(|()| accepted));
    client.close();

    if !accepted? {
        return Err(AppError::PushRejected {
            jid: job.jid().to_owned(),
        });
    }
    info!(
        target: CLI_TARGET,
        jid = job.jid(),
        jobtype = job.jobtype(),
        "job pushed"
    );
    writeln!(stdout, "{}", job.jid()).map_err(AppError::WriteOutput)?;
    Ok(ExitCode::SUCCESS)
}

/// Runs a worker that logs and acknowledges every job of the given types.
///
/// SIGINT and SIGTERM request a cooperative stop: the current job finishes,
/// then the worker ends its session.
fn work(args: WorkArgs, config: &Config) -> Result<ExitCode, AppError> {
    let mut worker = Worker::from_config(config);
    for jobtype in args.jobtypes {
        worker.register(jobtype, log_job);
    }

    let shutdown = worker.shutdown_handle();
    for signal in [SIGINT, SIGTERM] {
        signal_hook::flag::register(signal, shutdown.flag())
            .map_err(AppError::InstallSignalHandler)?;
    }

    worker.run()?;
    Ok(ExitCode::SUCCESS)
}

#[expect(
    clippy::unnecessary_wraps,
    reason = "handlers share the fallible JobHandler signature"
)]
fn log_job(job: &Job) -> Result<(), HandlerError> {
    info!(
        target: CLI_TARGET,
        jid = job.jid(),
        jobtype = job.jobtype(),
        args = ?job.args(),
        "job processed"
    );
    Ok(())
}
