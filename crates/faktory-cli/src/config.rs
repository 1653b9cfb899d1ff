//! Configuration loading for the CLI.
//!
//! Flags understood by `ortho_config` must precede the command. They are
//! split off here so the loader only sees configuration flags while clap
//! parses the command that follows.

use std::ffi::{OsStr, OsString};

use faktory_config::Config;
use ortho_config::OrthoConfig;

use crate::errors::AppError;

/// CLI flags recognised by the configuration loader.
///
/// Keep in sync with the fields of [`Config`].
pub(crate) const CONFIG_CLI_FLAGS: &[&str] = &[
    "--config-path",
    "--server-url",
    "--password",
    "--worker-id",
    "--queues",
    "--labels",
    "--heartbeat-interval-secs",
    "--timeout-secs",
    "--log-filter",
    "--log-format",
];

pub(crate) trait ConfigLoader {
    /// Loads configuration from the leading configuration flags.
    fn load(&self, args: &[OsString]) -> Result<Config, AppError>;
}

/// Loader backed by the layered `ortho_config` sources.
pub(crate) struct OrthoConfigLoader;

impl ConfigLoader for OrthoConfigLoader {
    fn load(&self, args: &[OsString]) -> Result<Config, AppError> {
        Config::load_from_iter(args.iter().cloned()).map_err(AppError::LoadConfiguration)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlagAction {
    Include { needs_value: bool },
    Skip,
}

fn classify(argument: &OsStr) -> FlagAction {
    let text = argument.to_string_lossy();
    if !text.starts_with("--") {
        return FlagAction::Skip;
    }
    let (flag, has_inline_value) = text
        .split_once('=')
        .map_or((&*text, false), |(flag, _)| (flag, true));
    if CONFIG_CLI_FLAGS.contains(&flag) {
        FlagAction::Include {
            needs_value: !has_inline_value,
        }
    } else {
        FlagAction::Skip
    }
}

/// Arguments destined for the configuration loader, and where the command
/// begins.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct ConfigArgumentSplit {
    pub(crate) config_arguments: Vec<OsString>,
    pub(crate) command_start: usize,
}

/// Splits the leading configuration flags (and their values) from `args`.
///
/// The program name is kept as the first configuration argument.
pub(crate) fn split_config_arguments(args: &[OsString]) -> ConfigArgumentSplit {
    let mut remaining = args.iter();
    let mut config_arguments: Vec<OsString> = remaining.next().into_iter().cloned().collect();
    let mut command_start = config_arguments.len();

    while let Some(argument) = remaining.next() {
        let FlagAction::Include { needs_value } = classify(argument) else {
            break;
        };
        config_arguments.push(argument.clone());
        command_start += 1;
        if needs_value && let Some(value) = remaining.next() {
            config_arguments.push(value.clone());
            command_start += 1;
        }
    }

    ConfigArgumentSplit {
        config_arguments,
        command_start,
    }
}

/// Program name followed by everything after the configuration flags.
pub(crate) fn command_arguments(args: &[OsString], split: &ConfigArgumentSplit) -> Vec<OsString> {
    args.first()
        .into_iter()
        .chain(args.iter().skip(split.command_start))
        .cloned()
        .collect()
}
