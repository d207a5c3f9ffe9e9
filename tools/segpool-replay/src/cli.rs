//! Command-line interface definitions for segpool-replay.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Replays allocation workloads against segpool pools.
#[derive(Parser)]
#[command(name = "segpool-replay", version, about)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Only print warnings, errors and the final summary.
    #[arg(long, short = 'q', global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Trace every allocation, merge and array growth.
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,
}

/// Available subcommands.
#[derive(Subcommand)]
pub enum Command {
    /// Run a workload script.
    Run(RunArgs),
    /// Print the default growth configuration as TOML.
    Defaults,
}

/// Arguments for the `run` subcommand.
#[derive(Parser)]
pub struct RunArgs {
    /// Path to the workload script.
    pub script: PathBuf,

    /// Growth configuration file; overrides the script's `[config]` table.
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Print a layout snapshot after every step.
    #[arg(long)]
    pub trace_layout: bool,
}
