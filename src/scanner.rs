//! Recursive file enumeration and ordering
//!
//! Lists every regular file below a root directory and orders the listing
//! under a [`SortPolicy`]. Individual unreadable entries are skipped with a
//! warning; only an absent or unreadable root is an error.

use chrono::{DateTime, Utc};
use regex::Regex;
use std::cmp::Ordering;
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::{SortConfig, SortKind};
use crate::error::{SyncError, SyncResult};

/// A file found during enumeration, with metadata sampled at that moment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// Path relative to the enumerated root
    pub relative: PathBuf,
    pub size: u64,
    pub created: SystemTime,
}

impl FileRecord {
    pub fn created_at(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from(self.created)
    }

    fn file_name(&self) -> String {
        self.relative
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Ordering applied to an enumeration
#[derive(Debug, Clone, Default)]
pub enum SortPolicy {
    /// Ascending by relative path
    Lexical,
    /// Newest creation time first, ties kept in traversal order
    #[default]
    Ctime,
    /// Descending by a key extracted from the file name; files without a key last
    Pattern(Regex),
}

impl SortPolicy {
    /// Build the policy for an entry's `sort` section (creation time when unset)
    pub fn from_config(sort: Option<&SortConfig>, label: &str) -> SyncResult<Self> {
        let Some(sort) = sort else {
            return Ok(SortPolicy::default());
        };

        match sort.kind {
            SortKind::Lexical => Ok(SortPolicy::Lexical),
            SortKind::Ctime => Ok(SortPolicy::Ctime),
            SortKind::Regex => {
                let pattern = sort
                    .pattern
                    .as_deref()
                    .filter(|p| !p.is_empty())
                    .ok_or_else(|| SyncError::MissingSortPattern(label.to_string()))?;
                let regex = Regex::new(pattern).map_err(|source| SyncError::InvalidPattern {
                    field: "sort",
                    pattern: pattern.to_string(),
                    source,
                })?;
                Ok(SortPolicy::Pattern(regex))
            }
        }
    }

    /// Whether enumeration under this policy yields oldest first, so callers
    /// wanting the newest entries must reverse it
    pub fn is_ascending(&self) -> bool {
        matches!(self, SortPolicy::Lexical)
    }

    /// Sort records in place; the sort is stable
    pub fn sort(&self, records: &mut [FileRecord]) {
        match self {
            SortPolicy::Lexical => records.sort_by(|a, b| a.relative.cmp(&b.relative)),
            SortPolicy::Ctime => records.sort_by(|a, b| b.created.cmp(&a.created)),
            SortPolicy::Pattern(regex) => {
                records.sort_by_cached_key(|record| SortKey(extract_key(regex, &record.file_name())))
            }
        }
    }
}

/// Key captured from a file name: group 1 when the pattern has groups, else
/// the whole match
pub fn extract_key(regex: &Regex, file_name: &str) -> Option<String> {
    let caps = regex.captures(file_name)?;
    caps.get(1)
        .or_else(|| caps.get(0))
        .map(|m| m.as_str().to_string())
}

/// Orders present keys descending, absent keys after all present ones
#[derive(Debug, PartialEq, Eq)]
struct SortKey(Option<String>);

impl Ord for SortKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (&self.0, &other.0) {
            (Some(a), Some(b)) => compare_keys(a, b).reverse(),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    }
}

impl PartialOrd for SortKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Total order over keys: all-digit keys rank below every other key and
/// compare numerically among themselves; other keys compare lexically
fn compare_keys(a: &str, b: &str) -> Ordering {
    let numeric = |s: &str| !s.is_empty() && s.bytes().all(|c| c.is_ascii_digit());
    match (numeric(a), numeric(b)) {
        (true, true) => {
            let (ta, tb) = (a.trim_start_matches('0'), b.trim_start_matches('0'));
            ta.len()
                .cmp(&tb.len())
                .then_with(|| ta.cmp(tb))
                .then_with(|| a.cmp(b))
        }
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.cmp(b),
    }
}

/// Creation time where the platform records one, the inode change time
/// otherwise (falling back to modification time off unix)
pub fn creation_time(metadata: &Metadata) -> SystemTime {
    if let Ok(created) = metadata.created() {
        return created;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        let secs = metadata.ctime();
        let nanos = metadata.ctime_nsec().clamp(0, 999_999_999) as u32;
        if secs >= 0 {
            UNIX_EPOCH + Duration::new(secs as u64, nanos)
        } else {
            UNIX_EPOCH - Duration::new(secs.unsigned_abs(), 0)
        }
    }

    #[cfg(not(unix))]
    {
        metadata.modified().unwrap_or(UNIX_EPOCH)
    }
}

/// List regular files below `root` without ordering them; traversal order is
/// by file name at each level
pub fn list_files(root: &Path) -> SyncResult<Vec<FileRecord>> {
    if !root.exists() {
        return Err(SyncError::PathNotFound(root.to_path_buf()));
    }
    std::fs::read_dir(root).map_err(|source| SyncError::SourceUnreadable {
        path: root.to_path_buf(),
        source,
    })?;

    let mut records = Vec::new();

    for entry in WalkDir::new(root)
        .min_depth(1)
        .follow_links(true)
        .sort_by_file_name()
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry under {}: {}", root.display(), e);
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!("Skipping {}: {}", entry.path().display(), e);
                continue;
            }
        };

        let relative = match entry.path().strip_prefix(root) {
            Ok(relative) => relative.to_path_buf(),
            Err(_) => continue,
        };

        records.push(FileRecord {
            relative,
            size: metadata.len(),
            created: creation_time(&metadata),
        });
    }

    debug!("Found {} files under {}", records.len(), root.display());

    Ok(records)
}

/// List regular files below `root` ordered under `policy`
pub fn enumerate(root: &Path, policy: &SortPolicy) -> SyncResult<Vec<FileRecord>> {
    let mut records = list_files(root)?;
    policy.sort(&mut records);
    Ok(records)
}
