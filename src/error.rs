//! Error taxonomy for synchronization runs
//!
//! Errors fall into three categories which decide how far they propagate:
//! configuration errors abort the whole run, structural errors abort a single
//! source entry, and file operation errors are reported and skipped.

use std::path::PathBuf;
use thiserror::Error;

/// How far an error is allowed to propagate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Aborts the run before any entry is processed
    Configuration,
    /// Aborts the current source entry only
    StructuralEntry,
    /// Reported, processing of the entry continues
    FileOperation,
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("configuration file not found: {}", .0.display())]
    ConfigNotFound(PathBuf),

    #[error("failed to parse configuration file {}: {message}", .path.display())]
    ConfigParse { path: PathBuf, message: String },

    #[error("destination must be defined")]
    MissingDestination,

    #[error("invalid destination template '{template}': {reason}")]
    InvalidTemplate { template: String, reason: String },

    #[error("invalid {field} pattern '{pattern}': {source}")]
    InvalidPattern {
        field: &'static str,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("sort type 'regex' requires a pattern (entry '{0}')")]
    MissingSortPattern(String),

    #[error("path not found: {}", .0.display())]
    PathNotFound(PathBuf),

    #[error("cannot read directory {}: {source}", .path.display())]
    SourceUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("base directory {} of destination does not exist (is the device mounted?)", .0.display())]
    MissingBaseDirectory(PathBuf),

    #[error("failed to create directory {}: {source}", .path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to copy {} to {}: {source}", .from.display(), .to.display())]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to remove {}: {source}", .path.display())]
    Delete {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SyncError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            SyncError::ConfigNotFound(_)
            | SyncError::ConfigParse { .. }
            | SyncError::MissingDestination
            | SyncError::InvalidTemplate { .. }
            | SyncError::InvalidPattern { .. }
            | SyncError::MissingSortPattern(_) => ErrorCategory::Configuration,
            SyncError::PathNotFound(_)
            | SyncError::SourceUnreadable { .. }
            | SyncError::MissingBaseDirectory(_) => ErrorCategory::StructuralEntry,
            SyncError::CreateDir { .. } | SyncError::Copy { .. } | SyncError::Delete { .. } => {
                ErrorCategory::FileOperation
            }
        }
    }
}

pub type SyncResult<T> = std::result::Result<T, SyncError>;
