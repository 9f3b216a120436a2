//! CLI command definitions for the `reforge` binary.
//!
//! Uses clap derive macros for argument parsing. Commands are flat verbs
//! acting on workflows (e.g., `reforge create`, `reforge resume <id> approve`).

pub mod workflow;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

use reforge_types::workflow::ReviewAction;

/// Iteratively refactor code with an LLM, with a human in the loop.
#[derive(Parser)]
#[command(name = "reforge", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Export spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true)]
    pub otel: bool,

    /// Keep checkpoints in memory only; workflows vanish when the process exits.
    #[arg(long, global = true)]
    pub ephemeral: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start a refactoring workflow and drive it to the review point.
    Create {
        /// What the refactoring should achieve.
        goal: String,

        /// Files to refactor, relative to the current directory.
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Retry budget for the generate/validate/reflect cycle.
        #[arg(long)]
        max_iterations: Option<u32>,

        /// Only persist the workflow; drive it later with `reforge drive`.
        #[arg(long)]
        no_drive: bool,
    },

    /// Show the status of a workflow.
    Status {
        /// Workflow ID.
        id: String,

        /// Print the current proposed diff.
        #[arg(long)]
        diff: bool,
    },

    /// List workflows, newest first.
    #[command(alias = "ls")]
    List {
        /// Filter by status (e.g. awaiting_review, completed).
        #[arg(long)]
        status: Option<String>,
    },

    /// Approve or reject a workflow that is awaiting review.
    Resume {
        /// Workflow ID.
        id: String,

        /// Review decision.
        action: ReviewArg,

        /// Feedback for the next generation (reject only).
        #[arg(long)]
        feedback: Option<String>,
    },

    /// Queue feedback on a workflow awaiting review.
    Feedback {
        /// Workflow ID.
        id: String,

        /// Feedback text.
        text: String,
    },

    /// Cancel a workflow.
    Cancel {
        /// Workflow ID.
        id: String,
    },

    /// Show the checkpoint history of a workflow.
    History {
        /// Workflow ID.
        id: String,
    },

    /// Drive a workflow from its latest checkpoint.
    Drive {
        /// Workflow ID.
        id: String,
    },

    /// Re-drive every workflow interrupted mid-cycle.
    Recover,

    /// Start the REST API server.
    Serve {
        /// Port to listen on.
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to.
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Skip re-driving interrupted workflows at startup.
        #[arg(long)]
        no_recover: bool,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ReviewArg {
    Approve,
    Reject,
}

impl From<ReviewArg> for ReviewAction {
    fn from(arg: ReviewArg) -> Self {
        match arg {
            ReviewArg::Approve => ReviewAction::Approve,
            ReviewArg::Reject => ReviewAction::Reject,
        }
    }
}
