//! Command-line grammar.

use clap::{Args, Parser, Subcommand};
use faktory_client::Job;
use serde_json::Value;

#[derive(Parser, Debug)]
#[command(
    name = "faktory",
    version,
    about = "Push jobs to a Faktory server or process them as a worker",
    disable_help_subcommand = true
)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: CliCommand,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub(crate) enum CliCommand {
    /// Enqueue one job and print its jid.
    Push(PushArgs),
    /// Fetch and acknowledge jobs until the server or a signal stops the worker.
    Work(WorkArgs),
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub(crate) struct PushArgs {
    /// Jobtype naming the handler that runs the job.
    #[arg(value_name = "JOBTYPE")]
    pub(crate) jobtype: String,
    /// Job arguments; each is parsed as JSON, or sent as a string otherwise.
    #[arg(value_name = "ARG", allow_negative_numbers = true)]
    pub(crate) args: Vec<String>,
    /// Queue to push to instead of the server default.
    #[arg(long, value_name = "QUEUE")]
    pub(crate) queue: Option<String>,
    /// Explicit job id; a random one is generated otherwise.
    #[arg(long, value_name = "JID")]
    pub(crate) jid: Option<String>,
}

impl PushArgs {
    pub(crate) fn into_job(self) -> Job {
        let args = self.args.into_iter().map(parse_argument).collect();
        let mut job = Job::new(self.jobtype, args);
        if let Some(jid) = self.jid {
            job = job.with_jid(jid);
        }
        if let Some(queue) = self.queue {
            job = job.with_queue(queue);
        }
        job
    }
}

fn parse_argument(raw: String) -> Value {
    serde_json::from_str(&raw).unwrap_or_else(|_| Value::String(raw))
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub(crate) struct WorkArgs {
    /// Jobtype to accept; repeat for several. Jobs are logged and acknowledged.
    #[arg(long = "handle", value_name = "JOBTYPE", required = true)]
    pub(crate) jobtypes: Vec<String>,
}
