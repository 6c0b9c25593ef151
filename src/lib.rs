//! keepsync - Retention-aware file synchronization
//!
//! keepsync copies files from labeled source directories into destination
//! directories on a mounted device, optionally keeping only the newest N files
//! of each source and removing the older copies it finds there.
//!
//! ## Core Features
//!
//! - **Retention**: keep the newest N files per source, ordered by creation
//!   time, name, or a key extracted from the file name
//! - **Safe cleanup**: only destination files that trace back to the source are
//!   ever removed; files placed there by hand are left alone
//! - **Dry run by default**: nothing is changed unless asked for explicitly
//! - **Configuration Management**: YAML-based configuration with XDG compliance
//!
//! ## Modules
//!
//! - [`config`]: Configuration management and parsing
//! - [`planner`]: Per-entry planning and execution
//! - [`sync`]: Run orchestration and summaries

pub mod config;
pub mod error;
pub mod paths;
pub mod planner;
pub mod retention;
pub mod scanner;
pub mod sync;

pub use config::{Config, RunOptions, SourceEntry};
pub use error::{ErrorCategory, SyncError};
pub use planner::{EntryReport, EntrySync, ExecuteOptions, SkipReason, SyncPlan};
pub use scanner::{FileRecord, SortPolicy};
pub use sync::{EntryOutcome, SyncEngine, SyncSummary};
