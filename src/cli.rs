//! Command-line interface built on clap.
//!
//! Defines the [`Cli`] struct with subcommands [`Command`] (submit, run,
//! resume, status, demo) and global flags (--owner, --role, --verbose).

use clap::{Parser, Subcommand, ValueEnum};

use crate::job::Role;

/// coursegen — course generation orchestration engine.
#[derive(Debug, Parser)]
#[command(name = "coursegen", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Identity used for quota accounting.
    #[arg(long, global = true, default_value = "local")]
    pub owner: String,

    /// Quota tier of the submitting identity.
    #[arg(long, global = true, value_enum, default_value_t = RoleArg::Free)]
    pub role: RoleArg,

    /// Print per-task detail after a run.
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

/// Role argument accepted by the CLI, mapped to [`Role`] internally.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum RoleArg {
    /// Tight quotas, two concurrent jobs.
    Free,
    /// Higher ceilings across every window.
    Premium,
}

impl From<RoleArg> for Role {
    fn from(arg: RoleArg) -> Self {
        match arg {
            RoleArg::Free => Role::Free,
            RoleArg::Premium => Role::Premium,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Submit a new course generation job.
    Submit {
        /// Course topic or title.
        title: Option<String>,

        /// Path to a TOML file holding the full job configuration.
        #[arg(long)]
        file: Option<String>,

        /// Intended audience, free text.
        #[arg(long)]
        audience: Option<String>,

        /// Depth: introductory, intermediate or advanced.
        #[arg(long)]
        depth: Option<String>,

        /// Target course length in weeks.
        #[arg(long)]
        duration_weeks: Option<u32>,

        /// Number of modules to generate.
        #[arg(long)]
        modules: Option<usize>,

        /// Lessons per module.
        #[arg(long)]
        lessons: Option<usize>,

        /// Generate one assessment per module.
        #[arg(long, default_value_t = false)]
        assessments: bool,

        /// Drive the job to completion immediately after submitting.
        #[arg(long, default_value_t = false)]
        run: bool,
    },

    /// Drive a submitted job to a terminal state.
    Run {
        /// Identifier returned by submit.
        job_id: String,
    },

    /// Pick up every incomplete job from the store and finish it.
    Resume,

    /// Show the persisted state of a job and its tasks.
    Status {
        /// Identifier returned by submit.
        job_id: String,
    },

    /// Run a small built-in demonstration without an API key.
    Demo,
}
