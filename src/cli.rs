//! Command-line interface definition

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Task orchestration daemon for local and remote LLM backends
#[derive(Debug, Parser)]
#[command(name = "swarmd", version, about)]
pub struct Cli {
    /// Path to a configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the orchestrator until interrupted
    Serve {
        /// Agent instances to spawn at startup
        #[arg(long, default_value_t = 1)]
        instances: usize,

        /// Worker tasks to run (defaults to the instance count)
        #[arg(long)]
        workers: Option<usize>,
    },
}
