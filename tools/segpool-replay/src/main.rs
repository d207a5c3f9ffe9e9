//! Workload replayer for segpool.
//!
//! Reads a TOML script of pool declarations and alloc/free/inspect/close
//! steps, runs it against a fresh registry and reports every step whose
//! outcome differs from what the script expects.

mod cli;
mod replay;
mod script;

use anyhow::{Result, bail};
use clap::Parser;
use segpool::PoolConfig;
use tracing_subscriber::filter::LevelFilter;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    init_logging(&cli);

    match cli.command {
        cli::Command::Run(ref args) => cmd_run(args),
        cli::Command::Defaults => cmd_defaults(),
    }
}

/// Installs the fmt subscriber at the level the verbosity flags select.
fn init_logging(cli: &cli::Cli) {
    let level = if cli.quiet {
        LevelFilter::WARN
    } else if cli.verbose {
        LevelFilter::TRACE
    } else {
        LevelFilter::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

// ===========================================================================
// Commands
// ===========================================================================

/// Run a script and fail if any step misbehaved.
fn cmd_run(args: &cli::RunArgs) -> Result<()> {
    let script = script::Script::load(&args.script)?;

    // --config beats the script's [config] table, which beats the defaults.
    let config = match &args.config {
        Some(path) => script::load_config(path)?,
        None => script.config.unwrap_or_default(),
    };

    let mut replayer = replay::Replayer::new(config, args.trace_layout)?;
    let summary = replayer.run(&script, &mut std::io::stdout().lock())?;
    let left_open = replayer.finish();

    println!(
        "\n{} step(s), {} mismatch(es), {} pool(s) left open",
        summary.steps, summary.mismatches, left_open
    );
    if summary.mismatches > 0 {
        bail!("{} step(s) did not match their expected outcome", summary.mismatches);
    }
    Ok(())
}

/// Print the built-in growth configuration.
fn cmd_defaults() -> Result<()> {
    print!("{}", toml::to_string_pretty(&PoolConfig::default())?);
    Ok(())
}
