// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "grove",
    about = "A hierarchical multi-agent orchestrator on Redis and Bedrock",
    version,
    long_about = None,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Explicit config file (merged over the discovered layers)
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Log to stderr at debug level (or set GROVE_LOG)
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the task runtime for an existing task id.
    ///
    /// This is the entry point the launcher spawns — one process per task.
    /// It drains the task's queue, iterates turns against the model, and
    /// exits when the queue stays empty.
    Run {
        /// The task id to run.
        task_id: String,

        /// Override the iteration budget recorded in the task record.
        #[arg(long)]
        max_iterations: Option<u32>,
    },

    /// Create a new root task, queue the given message, and start it.
    Launch {
        /// Initial user message for the task.
        message: Vec<String>,

        /// Model short name or fully-qualified Bedrock identifier.
        #[arg(long, short = 'm')]
        model: Option<String>,

        /// Iteration budget for the new task.
        #[arg(long)]
        max_iterations: Option<u32>,

        /// Create the task without the spawn_task tool.
        #[arg(long)]
        no_recursion: bool,
    },

    /// Queue a user message onto an existing task, starting it if stopped.
    Send {
        task_id: String,
        message: Vec<String>,
    },

    /// List known tasks with their live status.
    Status,

    /// Print the model catalog (short name → Bedrock identifier).
    Models,

    /// Print the effective configuration and exit.
    ShowConfig,
}
