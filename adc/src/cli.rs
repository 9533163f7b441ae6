//! CLI command definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// ADC - Agent Design Contract workflow engine
#[derive(Parser)]
#[command(name = "adc", about = "Drive LLM agents through contract-based refinement loops", version)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the workflow for a task
    Run {
        /// Natural-language task description
        task: String,

        /// Workspace directory (default: current directory)
        #[arg(short, long)]
        workspace: Option<PathBuf>,

        /// Maximum outer (refinement) iterations
        #[arg(long)]
        max_outer: Option<u32>,

        /// Maximum inner (implementation) iterations
        #[arg(long)]
        max_inner: Option<u32>,

        /// Model tier preset (strong, mixed)
        #[arg(long)]
        tier_preset: Option<String>,
    },

    /// Verify the workspace library against its contracts
    Verify {
        /// Workspace directory (default: current directory)
        #[arg(short, long)]
        workspace: Option<PathBuf>,

        /// Refuse limited-verification bridges
        #[arg(long)]
        strict: bool,
    },

    /// Print the contract digest for a workspace
    Summarize {
        /// Workspace directory (default: current directory)
        #[arg(short, long)]
        workspace: Option<PathBuf>,
    },
}
