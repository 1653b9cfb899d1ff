//! Runtime for the `faktory` command.
//!
//! The binary pushes single jobs to a Faktory server or runs a worker that
//! logs and acknowledges jobs of the requested types. Configuration flags
//! precede the command and are resolved through `faktory_config`:
//!
//! ```text
//! faktory [--server-url URL] [--password PW] ... push <JOBTYPE> [ARGS...]
//! faktory [--queues Q ...] [--labels L ...] ... work --handle <JOBTYPE>...
//! ```
//!
//! [`run`] can be driven with arbitrary IO handles so tests can capture the
//! output.

use std::ffi::OsString;
use std::io::Write;
use std::process::ExitCode;

use clap::Parser;

mod cli;
mod commands;
mod config;
mod errors;
mod telemetry;


use cli::Cli;
use config::{ConfigLoader, OrthoConfigLoader, command_arguments, split_config_arguments};
use errors::AppError;

/// Runs the CLI using the provided arguments and IO handles.
#[must_use]
pub fn run<I, W, E>(args: I, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
{
    run_with_loader(args, stdout, stderr, &OrthoConfigLoader)
}

/// Runs the CLI with a substitute configuration loader.
pub(crate) fn run_with_loader<I, W, E, L>(
    args: I,
    stdout: &mut W,
    stderr: &mut E,
    loader: &L,
) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
    L: ConfigLoader,
{
    let args: Vec<OsString> = args.into_iter().collect();
    let split = split_config_arguments(&args);

    let result = Cli::try_parse_from(command_arguments(&args, &split))
        .map_err(AppError::CliUsage)
        .and_then(|cli| {
            loader
                .load(&split.config_arguments)
                .map(|config| (cli, config))
        })
        .and_then(|(cli, config)| {
            telemetry::initialise(&config)?;
            commands::execute(cli.command, &config, stdout)
        });

    match result {
        Ok(exit_code) => exit_code,
        Err(error) if error.is_informational() => {
            drop(write!(stdout, "{error}"));
            ExitCode::SUCCESS
        }
        Err(error) => {
            drop(writeln!(stderr, "{error}"));
            ExitCode::FAILURE
        }
    }
}
