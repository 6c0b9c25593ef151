//! Sync Engine - Runs every configured source entry in order
//!
//! Entries are prepared up front so configuration mistakes abort the run before
//! anything is touched. Each entry then runs in isolation: a structural error
//! is recorded against that entry and the engine moves on to the next one.

use std::time::{Duration, Instant};
use tracing::{error, info};

use crate::config::{Config, RunOptions};
use crate::error::{SyncError, SyncResult};
use crate::planner::{EntryReport, EntrySync, ExecuteOptions};

/// Result of one entry
#[derive(Debug)]
pub enum EntryOutcome {
    /// The entry ran; individual file failures are inside the report
    Completed(EntryReport),
    /// The entry was abandoned before any file was processed
    Failed { label: String, error: SyncError },
}

impl EntryOutcome {
    pub fn label(&self) -> &str {
        match self {
            EntryOutcome::Completed(report) => &report.label,
            EntryOutcome::Failed { label, .. } => label,
        }
    }
}

/// Results from a complete sync run
#[derive(Debug)]
pub struct SyncSummary {
    pub total_entries: usize,
    pub failed_entries: usize,
    pub files_copied: usize,
    pub files_removed: usize,
    pub files_skipped: usize,
    pub file_failures: usize,
    pub dry_run: bool,
    pub duration: Duration,
    pub outcomes: Vec<EntryOutcome>,
}

/// Runs source entries one after another
pub struct SyncEngine {
    entries: Vec<EntrySync>,
    options: ExecuteOptions,
}

impl SyncEngine {
    /// Prepare every entry of `config`; any configuration error is returned
    /// before a single entry has run
    pub fn new(config: &Config, options: &RunOptions) -> SyncResult<Self> {
        let base_destination = options.base_destination()?;

        let entries = config
            .sources
            .iter()
            .map(|entry| EntrySync::prepare(entry, base_destination))
            .collect::<SyncResult<Vec<_>>>()?;

        Ok(Self {
            entries,
            options: ExecuteOptions {
                perform_changes: options.perform_changes,
                preserve_timestamps: config.preserve_timestamps,
            },
        })
    }

    pub fn entries(&self) -> &[EntrySync] {
        &self.entries
    }

    /// Run all entries in configuration order
    pub fn run(&self) -> SyncSummary {
        let start_time = Instant::now();

        if !self.options.perform_changes {
            info!("Dry run: no files will be copied or removed");
        }

        let outcomes = self
            .entries
            .iter()
            .map(|entry| {
                info!("- Looking at {}", entry.label());

                match entry.run(self.options) {
                    Ok(report) => EntryOutcome::Completed(report),
                    Err(err) => {
                        error!("Skipping '{}': {}", entry.label(), err);
                        EntryOutcome::Failed {
                            label: entry.label().to_string(),
                            error: err,
                        }
                    }
                }
            })
            .collect();

        let summary = self.compile_summary(outcomes, start_time.elapsed());

        info!(
            "Sync completed in {:.2}s: {} copied, {} removed, {} skipped, {} file failures, {} failed entries",
            summary.duration.as_secs_f64(),
            summary.files_copied,
            summary.files_removed,
            summary.files_skipped,
            summary.file_failures,
            summary.failed_entries
        );

        summary
    }

    /// Compile sync summary from outcomes
    fn compile_summary(&self, outcomes: Vec<EntryOutcome>, duration: Duration) -> SyncSummary {
        let mut summary = SyncSummary {
            total_entries: outcomes.len(),
            failed_entries: 0,
            files_copied: 0,
            files_removed: 0,
            files_skipped: 0,
            file_failures: 0,
            dry_run: !self.options.perform_changes,
            duration,
            outcomes: Vec::new(),
        };

        for outcome in &outcomes {
            match outcome {
                EntryOutcome::Completed(report) => {
                    summary.files_copied += report.copied.len();
                    summary.files_removed += report.removed.len();
                    summary.files_skipped += report.skipped.len();
                    summary.file_failures += report.failures.len();
                }
                EntryOutcome::Failed { .. } => summary.failed_entries += 1,
            }
        }

        summary.outcomes = outcomes;
        summary
    }
}
