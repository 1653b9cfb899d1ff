//! Entry point for the `faktory` command.
//!
//! Delegates to [`faktory_cli::run`], which loads configuration, parses the
//! command line, and either pushes a job or runs a worker.

use std::io::{self, StderrLock, StdoutLock};
use std::process::ExitCode;

fn main() -> ExitCode {
    let mut stdout: StdoutLock<'_> = io::stdout().lock();
    let mut stderr: StderrLock<'_> = io::stderr().lock();
    faktory_cli::run(std::env::args_os(), &mut stdout, &mut stderr)
}
