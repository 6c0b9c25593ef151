use anyhow::{Context, Result};
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{SyncError, SyncResult};

/// Main configuration document for keepsync
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    /// Source entries, processed in document order
    #[serde(default)]
    pub sources: Vec<SourceEntry>,

    /// Carry source modification times over to copied files
    #[serde(default = "default_true")]
    pub preserve_timestamps: bool,
}

/// One configured directory to sync from, where to, and how much to keep
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct SourceEntry {
    /// Display label
    #[serde(default)]
    pub label: String,

    /// Source directory
    pub source: String,

    /// Destination template, e.g. "#{destination}/Podcasts"
    pub destination: String,

    /// Retain only this many files (newest first under the sort policy)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep: Option<usize>,

    /// Ordering policy, defaults to creation time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<SortConfig>,

    /// Regex matched against the relative path of files that must not be copied
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude: Option<String>,

    /// Extension include/exclude filter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<ExtensionFilter>,
}

/// Sort section of a source entry
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct SortConfig {
    #[serde(rename = "type")]
    pub kind: SortKind,

    /// Key extraction pattern, required for `regex`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SortKind {
    Lexical,
    Ctime,
    #[serde(alias = "pattern")]
    Regex,
}

/// Extension filter. Patterns are regexes matched case-insensitively against the
/// whole extension, without the dot. When both are set a file must match
/// `include` and must not match `exclude`.
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq, Eq)]
pub struct ExtensionFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude: Option<String>,
}

/// Process-level options supplied by the command line
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Base destination substituted into each entry's destination template
    pub destination: Option<String>,

    /// Configuration document location
    pub config_path: Option<PathBuf>,

    /// Perform filesystem changes; when false every action is only reported
    pub perform_changes: bool,

    /// Only report warnings and errors
    pub quiet: bool,

    /// Report per-file detail
    pub debug: bool,
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            preserve_timestamps: default_true(),
        }
    }
}

impl RunOptions {
    /// The base destination, which every run requires
    pub fn base_destination(&self) -> SyncResult<&str> {
        match self.destination.as_deref().map(str::trim) {
            Some(dest) if !dest.is_empty() => Ok(dest),
            _ => Err(SyncError::MissingDestination),
        }
    }

    /// Configured config path, or the XDG default
    pub fn resolved_config_path(&self) -> Result<PathBuf> {
        match &self.config_path {
            Some(path) => {
                let expanded = shellexpand::full(&path.to_string_lossy())
                    .context("Failed to expand config path")?
                    .into_owned();
                Ok(PathBuf::from(expanded))
            }
            None => Config::default_config_path(),
        }
    }
}

impl Config {
    /// Load configuration from a specific file
    pub fn load(path: &Path) -> SyncResult<Self> {
        if !path.is_file() {
            return Err(SyncError::ConfigNotFound(path.to_path_buf()));
        }

        let content = std::fs::read_to_string(path).map_err(|e| SyncError::ConfigParse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        Self::from_yaml(&content, path)
    }

    /// Parse a configuration document; `origin` is only used in error messages
    pub fn from_yaml(content: &str, origin: &Path) -> SyncResult<Self> {
        let mut config: Config =
            serde_yaml::from_str(content).map_err(|e| SyncError::ConfigParse {
                path: origin.to_path_buf(),
                message: e.to_string(),
            })?;

        config
            .expand_paths()
            .map_err(|e| SyncError::ConfigParse {
                path: origin.to_path_buf(),
                message: format!("{:#}", e),
            })?;

        Ok(config)
    }

    /// Get the default configuration file path (XDG compliant)
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = config_dir().context("Failed to get user config directory")?;

        Ok(config_dir.join("keepsync").join("config.yml"))
    }

    /// Expand `~` and environment variables in source paths
    pub fn expand_paths(&mut self) -> Result<()> {
        for entry in &mut self.sources {
            entry.source = shellexpand::full(&entry.source)
                .with_context(|| format!("Failed to expand source path of '{}'", entry.label))?
                .into_owned();
        }

        Ok(())
    }
}

impl SourceEntry {
    /// Label for reporting, falling back to the source path
    pub fn display_name(&self) -> &str {
        if self.label.is_empty() {
            &self.source
        } else {
            &self.label
        }
    }
}
