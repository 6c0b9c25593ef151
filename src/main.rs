use anyhow::{Context, Result};
use clap::Parser;
use std::process::ExitCode;
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use keepsync::{Config, EntryOutcome, RunOptions, SyncEngine, SyncSummary};

#[derive(Parser)]
#[command(name = "keepsync")]
#[command(about = "Sync files to a mounted device, keeping only the newest per source")]
#[command(version)]
struct Cli {
    /// The destination root directory
    #[arg(short, long)]
    destination: Option<String>,

    /// Configuration file path (defaults to XDG config location)
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,

    /// Do the sync for real (default is a dry run)
    #[arg(short = 'p', long)]
    for_real: bool,

    /// Quiet output
    #[arg(short, long)]
    quiet: bool,

    /// Debug output
    #[arg(long)]
    debug: bool,
}

impl From<Cli> for RunOptions {
    fn from(cli: Cli) -> Self {
        RunOptions {
            destination: cli.destination,
            config_path: cli.config,
            perform_changes: cli.for_real,
            quiet: cli.quiet,
            debug: cli.debug,
        }
    }
}

fn main() -> Result<ExitCode> {
    let options = RunOptions::from(Cli::parse());

    init_logging(&options)?;
    debug!("Starting keepsync v{}", env!("CARGO_PKG_VERSION"));

    let summary = cmd_sync(&options)?;

    if !options.quiet {
        print_summary(&summary);
    }

    if summary.failed_entries > 0 {
        Ok(ExitCode::from(2))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

/// Initialize logging based on verbosity switches
fn init_logging(options: &RunOptions) -> Result<()> {
    let level = if options.debug {
        "debug"
    } else if options.quiet {
        "warn"
    } else {
        "info"
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();

    Ok(())
}

/// Load configuration and run every source entry
fn cmd_sync(options: &RunOptions) -> Result<SyncSummary> {
    options.base_destination()?;

    let config_path = options.resolved_config_path()?;
    debug!("Using configuration {}", config_path.display());

    let config = Config::load(&config_path).context("Failed to load configuration")?;
    let engine = SyncEngine::new(&config, options).context("Invalid configuration")?;

    info!(
        "Syncing {} source entries into {}",
        engine.entries().len(),
        options.base_destination()?
    );

    Ok(engine.run())
}

/// Print run summary to stdout
fn print_summary(summary: &SyncSummary) {
    println!();
    if summary.dry_run {
        println!("🔍 Dry run complete (use --for-real to apply)");
    } else {
        println!("🎉 Synchronization complete!");
    }
    println!("   📁 Source entries: {}", summary.total_entries);
    println!("   📥 Files copied: {}", summary.files_copied);
    println!("   🗑️  Files removed: {}", summary.files_removed);
    println!("   ⏭️  Files skipped: {}", summary.files_skipped);
    println!("   ❌ File failures: {}", summary.file_failures);
    println!("   ⏱️  Duration: {:.2}s", summary.duration.as_secs_f64());

    let failed: Vec<_> = summary
        .outcomes
        .iter()
        .filter_map(|outcome| match outcome {
            EntryOutcome::Failed { label, error } => Some((label, error)),
            EntryOutcome::Completed(_) => None,
        })
        .collect();

    if !failed.is_empty() {
        println!("\n🔍 Failed entries:");
        for (label, error) in failed {
            println!("   ❌ {}: {}", label, error);
        }
    }

    for outcome in &summary.outcomes {
        if let EntryOutcome::Completed(report) = outcome {
            for failure in &report.failures {
                println!("   ⚠️  {}: {}", report.label, failure);
            }
        }
    }
}
