//! Per-entry planning and execution
//!
//! An [`EntrySync`] is one configured source entry with its destination
//! resolved and its patterns compiled. Planning takes a snapshot of both the
//! source and destination trees and classifies every file before anything is
//! touched; execution then applies the plan, reporting and skipping individual
//! file failures.

use filetime::FileTime;
use regex::{Regex, RegexBuilder};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use crate::config::SourceEntry;
use crate::error::{SyncError, SyncResult};
use crate::paths;
use crate::retention::select_retained;
use crate::scanner::{self, FileRecord, SortPolicy};

/// Source and destination of an entry, both absolute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSyncTarget {
    pub source: PathBuf,
    pub destination: PathBuf,
}

/// Why a retained file is not copied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Destination already holds a file of the same size
    AlreadySynced,
    /// Relative path matches the entry's `exclude` pattern
    Excluded,
    /// Extension rejected by the entry's `extensions` filter
    ExtensionFiltered,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::AlreadySynced => write!(f, "already synced"),
            SkipReason::Excluded => write!(f, "excluded"),
            SkipReason::ExtensionFiltered => write!(f, "extension filtered"),
        }
    }
}

/// Classification of one entry's files, computed before any change is made
#[derive(Debug, Clone)]
pub struct SyncPlan {
    pub target: ResolvedSyncTarget,
    /// Retained source files, newest first
    pub retained: Vec<FileRecord>,
    /// Files to copy, relative to the source
    pub copy_set: Vec<FileRecord>,
    /// Retained files not copied, with the reason
    pub skipped: Vec<(FileRecord, SkipReason)>,
    /// Stale surplus to remove, relative to the destination
    pub delete_set: Vec<FileRecord>,
}

/// Switches that apply to every entry of a run
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecuteOptions {
    /// When false, actions are reported but the filesystem is left alone
    pub perform_changes: bool,
    pub preserve_timestamps: bool,
}

/// What happened to one entry
#[derive(Debug)]
pub struct EntryReport {
    pub label: String,
    pub target: ResolvedSyncTarget,
    pub dry_run: bool,
    /// Copied files (planned copies in dry-run mode), relative paths
    pub copied: Vec<PathBuf>,
    /// Removed files (planned removals in dry-run mode), relative paths
    pub removed: Vec<PathBuf>,
    pub skipped: Vec<(PathBuf, SkipReason)>,
    /// Individual file operations that failed
    pub failures: Vec<SyncError>,
}

/// Compiled `exclude` and `extensions` filters of an entry
#[derive(Debug, Clone, Default)]
struct FileFilters {
    exclude: Option<Regex>,
    include_extensions: Option<Regex>,
    exclude_extensions: Option<Regex>,
}

impl FileFilters {
    fn from_entry(entry: &SourceEntry) -> SyncResult<Self> {
        let exclude = entry
            .exclude
            .as_deref()
            .map(|pattern| compile("exclude", pattern, false))
            .transpose()?;

        let (include_extensions, exclude_extensions) = match &entry.extensions {
            Some(filter) => (
                filter
                    .include
                    .as_deref()
                    .map(|pattern| compile("extensions.include", &anchored(pattern), true))
                    .transpose()?,
                filter
                    .exclude
                    .as_deref()
                    .map(|pattern| compile("extensions.exclude", &anchored(pattern), true))
                    .transpose()?,
            ),
            None => (None, None),
        };

        Ok(Self {
            exclude,
            include_extensions,
            exclude_extensions,
        })
    }

    fn check(&self, relative: &Path) -> Option<SkipReason> {
        if let Some(exclude) = &self.exclude {
            if exclude.is_match(&relative.to_string_lossy()) {
                return Some(SkipReason::Excluded);
            }
        }

        let extension = relative
            .extension()
            .map(|ext| ext.to_string_lossy().into_owned())
            .unwrap_or_default();

        if let Some(include) = &self.include_extensions {
            if !include.is_match(&extension) {
                return Some(SkipReason::ExtensionFiltered);
            }
        }
        if let Some(exclude) = &self.exclude_extensions {
            if exclude.is_match(&extension) {
                return Some(SkipReason::ExtensionFiltered);
            }
        }

        None
    }
}

fn anchored(pattern: &str) -> String {
    format!("^(?:{})$", pattern.trim_start_matches('.'))
}

fn compile(field: &'static str, pattern: &str, case_insensitive: bool) -> SyncResult<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(case_insensitive)
        .build()
        .map_err(|source| SyncError::InvalidPattern {
            field,
            pattern: pattern.to_string(),
            source,
        })
}

/// One source entry, ready to plan and run
#[derive(Debug, Clone)]
pub struct EntrySync {
    label: String,
    target: ResolvedSyncTarget,
    keep: Option<usize>,
    policy: SortPolicy,
    filters: FileFilters,
}

impl EntrySync {
    /// Resolve the destination template and compile the entry's patterns
    pub fn prepare(entry: &SourceEntry, base_destination: &str) -> SyncResult<Self> {
        let label = entry.display_name().to_string();
        let destination = paths::resolve_destination(&entry.destination, base_destination)?;
        let source_root = PathBuf::from(paths::trim_separators(&entry.source));
        let source =
            paths::absolute(&source_root).map_err(|source| SyncError::SourceUnreadable {
                path: source_root.clone(),
                source,
            })?;

        Ok(Self {
            policy: SortPolicy::from_config(entry.sort.as_ref(), &label)?,
            filters: FileFilters::from_entry(entry)?,
            keep: entry.keep,
            target: ResolvedSyncTarget {
                source,
                destination,
            },
            label,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn target(&self) -> &ResolvedSyncTarget {
        &self.target
    }

    /// Snapshot source and destination and classify every file
    pub fn plan(&self) -> SyncResult<SyncPlan> {
        let destination = &self.target.destination;

        if let Some(base) = destination.parent() {
            if !base.is_dir() {
                return Err(SyncError::MissingBaseDirectory(base.to_path_buf()));
            }
        }

        let mut all_files = scanner::enumerate(&self.target.source, &self.policy)?;
        if self.policy.is_ascending() {
            all_files.reverse();
        }

        let retained = select_retained(&all_files, self.keep).to_vec();

        let existing: HashMap<PathBuf, FileRecord> = if destination.exists() {
            scanner::list_files(destination)?
                .into_iter()
                .map(|record| (record.relative.clone(), record))
                .collect()
        } else {
            HashMap::new()
        };

        let mut copy_set = Vec::new();
        let mut skipped = Vec::new();

        for record in &retained {
            let reason = self.filters.check(&record.relative).or_else(|| {
                existing
                    .get(&record.relative)
                    .filter(|present| present.size == record.size)
                    .map(|_| SkipReason::AlreadySynced)
            });

            match reason {
                Some(reason) => skipped.push((record.clone(), reason)),
                None => copy_set.push(record.clone()),
            }
        }

        let delete_set = if self.keep.is_some() {
            let retained_paths: HashSet<&Path> =
                retained.iter().map(|r| r.relative.as_path()).collect();
            let source_paths: HashSet<&Path> =
                all_files.iter().map(|r| r.relative.as_path()).collect();

            let mut stale: Vec<FileRecord> = existing
                .values()
                .filter(|r| {
                    let relative = r.relative.as_path();
                    !retained_paths.contains(relative) && source_paths.contains(relative)
                })
                .cloned()
                .collect();
            stale.sort_by(|a, b| a.relative.cmp(&b.relative));
            stale
        } else {
            Vec::new()
        };

        debug!(
            "Planned '{}': {} source files, {} retained, {} to copy, {} skipped, {} to remove",
            self.label,
            all_files.len(),
            retained.len(),
            copy_set.len(),
            skipped.len(),
            delete_set.len()
        );

        Ok(SyncPlan {
            target: self.target.clone(),
            retained,
            copy_set,
            skipped,
            delete_set,
        })
    }

    /// Apply a plan. File failures are collected in the report, never returned
    pub fn execute(&self, plan: &SyncPlan, options: ExecuteOptions) -> EntryReport {
        let dry_run = !options.perform_changes;
        let prefix = if dry_run { "[dry-run] " } else { "" };
        let destination = &plan.target.destination;

        let mut report = EntryReport {
            label: self.label.clone(),
            target: plan.target.clone(),
            dry_run,
            copied: Vec::new(),
            removed: Vec::new(),
            skipped: plan
                .skipped
                .iter()
                .map(|(record, reason)| (record.relative.clone(), *reason))
                .collect(),
            failures: Vec::new(),
        };

        for (record, reason) in &plan.skipped {
            debug!("Skipping '{}': {}", record.relative.display(), reason);
        }

        if !dry_run && !destination.is_dir() {
            if let Err(source) = fs::create_dir_all(destination) {
                let err = SyncError::CreateDir {
                    path: destination.clone(),
                    source,
                };
                error!("{}", err);
                report.failures.push(err);
            }
        }

        for record in &plan.copy_set {
            let from = plan.target.source.join(&record.relative);
            let to = destination.join(&record.relative);

            info!(
                "{}+ Syncing '{}' to '{}'",
                prefix,
                record.relative.display(),
                destination.display()
            );

            if dry_run {
                report.copied.push(record.relative.clone());
                continue;
            }

            match copy_file(&from, &to, options.preserve_timestamps) {
                Ok(bytes) => {
                    debug!(
                        "Copied {} bytes (created {}) to {}",
                        bytes,
                        record.created_at().format("%Y-%m-%d %H:%M:%S"),
                        to.display()
                    );
                    report.copied.push(record.relative.clone());
                }
                Err(err) => {
                    error!("{}", err);
                    report.failures.push(err);
                }
            }
        }

        for record in &plan.delete_set {
            let path = destination.join(&record.relative);

            info!("{}! Removing '{}'", prefix, path.display());

            if dry_run {
                report.removed.push(record.relative.clone());
                continue;
            }

            match fs::remove_file(&path) {
                Ok(()) => report.removed.push(record.relative.clone()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    debug!("{} already gone", path.display());
                    report.removed.push(record.relative.clone());
                }
                Err(source) => {
                    let err = SyncError::Delete { path, source };
                    error!("{}", err);
                    report.failures.push(err);
                }
            }
        }

        report
    }

    /// Plan then execute
    pub fn run(&self, options: ExecuteOptions) -> SyncResult<EntryReport> {
        let plan = self.plan()?;
        Ok(self.execute(&plan, options))
    }
}

/// Copy one file, creating missing parent directories
fn copy_file(from: &Path, to: &Path, preserve_timestamps: bool) -> SyncResult<u64> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent).map_err(|source| SyncError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let copy_error = |source| SyncError::Copy {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source,
    };

    let bytes = fs::copy(from, to).map_err(copy_error)?;

    if preserve_timestamps {
        let preserved = fs::metadata(from).and_then(|metadata| {
            let mtime = FileTime::from_last_modification_time(&metadata);
            filetime::set_file_mtime(to, mtime)
        });
        if let Err(e) = preserved {
            warn!("Failed to preserve timestamp of {}: {}", to.display(), e);
        }
    }

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ExtensionFilter, SortConfig, SortKind};
    use std::time::Duration;
    use tempfile::TempDir;

    struct Fixture {
        _temp_dir: TempDir,
        source: PathBuf,
        base: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let temp_dir = TempDir::new().expect("Failed to create temp dir");
            let source = temp_dir.path().join("source/show");
            let base = temp_dir.path().join("device");
            fs::create_dir_all(&source).unwrap();
            fs::create_dir_all(&base).unwrap();
            Self {
                _temp_dir: temp_dir,
                source,
                base,
            }
        }

        fn write_source(&self, names: &[&str]) {
            for name in names {
                write_file(&self.source.join(name), name.len() + 10);
                std::thread::sleep(Duration::from_millis(15));
            }
        }

        fn destination(&self) -> PathBuf {
            self.base.join("show")
        }

        fn entry(&self, keep: Option<usize>) -> SourceEntry {
            SourceEntry {
                label: "Show".to_string(),
                source: self.source.to_string_lossy().into_owned(),
                destination: "#{destination}/show".to_string(),
                keep,
                ..Default::default()
            }
        }

        fn prepare(&self, entry: &SourceEntry) -> EntrySync {
            EntrySync::prepare(entry, &self.base.to_string_lossy()).unwrap()
        }
    }

    fn write_file(path: &Path, len: usize) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "0".repeat(len)).unwrap();
    }

    fn relatives(records: &[FileRecord]) -> Vec<String> {
        records
            .iter()
            .map(|r| r.relative.to_string_lossy().into_owned())
            .collect()
    }

    const REAL: ExecuteOptions = ExecuteOptions {
        perform_changes: true,
        preserve_timestamps: true,
    };

    #[test]
    fn test_plan_retains_newest_and_marks_stale_surplus() {
        let fixture = Fixture::new();
        fixture.write_source(&["a.mp3", "b.mp3", "c.mp3", "d.mp3", "e.mp3"]);
        write_file(&fixture.destination().join("a.mp3"), 1);
        write_file(&fixture.destination().join("manual.mp3"), 1);

        let sync = fixture.prepare(&fixture.entry(Some(2)));
        let plan = sync.plan().unwrap();

        assert_eq!(relatives(&plan.retained), vec!["e.mp3", "d.mp3"]);
        assert_eq!(relatives(&plan.copy_set), vec!["e.mp3", "d.mp3"]);
        assert_eq!(relatives(&plan.delete_set), vec!["a.mp3"]);
    }

    #[test]
    fn test_plan_without_keep_never_deletes() {
        let fixture = Fixture::new();
        fixture.write_source(&["a.mp3", "b.mp3"]);
        write_file(&fixture.destination().join("a.mp3"), 1);

        let plan = fixture.prepare(&fixture.entry(None)).plan().unwrap();

        assert_eq!(plan.copy_set.len(), 2);
        assert!(plan.delete_set.is_empty());
    }

    #[test]
    fn test_equal_size_counts_as_synced() {
        let fixture = Fixture::new();
        fixture.write_source(&["a.mp3"]);
        write_file(&fixture.destination().join("a.mp3"), "a.mp3".len() + 10);

        let plan = fixture.prepare(&fixture.entry(None)).plan().unwrap();

        assert!(plan.copy_set.is_empty());
        assert_eq!(plan.skipped.len(), 1);
        assert_eq!(plan.skipped[0].1, SkipReason::AlreadySynced);
    }

    #[test]
    fn test_size_mismatch_is_recopied() {
        let fixture = Fixture::new();
        fixture.write_source(&["a.mp3"]);
        write_file(&fixture.destination().join("a.mp3"), 1);

        let sync = fixture.prepare(&fixture.entry(None));
        let report = sync.run(REAL).unwrap();

        assert_eq!(report.copied, vec![PathBuf::from("a.mp3")]);
        let copied = fs::metadata(fixture.destination().join("a.mp3")).unwrap();
        assert_eq!(copied.len(), ("a.mp3".len() + 10) as u64);
    }

    #[test]
    fn test_retained_but_skipped_files_are_not_deleted() {
        let fixture = Fixture::new();
        fixture.write_source(&["a.mp3", "b.mp3", "c.mp3"]);
        write_file(&fixture.destination().join("c.mp3"), "c.mp3".len() + 10);

        let plan = fixture.prepare(&fixture.entry(Some(2))).plan().unwrap();

        assert_eq!(relatives(&plan.copy_set), vec!["b.mp3"]);
        assert!(plan.delete_set.is_empty());
    }

    #[test]
    fn test_exclude_and_extension_filters() {
        let fixture = Fixture::new();
        fixture.write_source(&["a.mp3", "b.part", "cover.JPG", "notes.txt", "drafts/x.mp3"]);

        let mut entry = fixture.entry(None);
        entry.exclude = Some("(^|/)drafts/".to_string());
        entry.extensions = Some(ExtensionFilter {
            include: Some("mp3|jpg".to_string()),
            exclude: None,
        });

        let plan = fixture.prepare(&entry).plan().unwrap();

        let mut copied = relatives(&plan.copy_set);
        copied.sort();
        assert_eq!(copied, vec!["a.mp3", "cover.JPG"]);

        let reasons: HashMap<String, SkipReason> = plan
            .skipped
            .iter()
            .map(|(r, reason)| (r.relative.to_string_lossy().into_owned(), *reason))
            .collect();
        assert_eq!(reasons["drafts/x.mp3"], SkipReason::Excluded);
        assert_eq!(reasons["b.part"], SkipReason::ExtensionFiltered);
        assert_eq!(reasons["notes.txt"], SkipReason::ExtensionFiltered);
    }

    #[test]
    fn test_extension_exclude_filter() {
        let fixture = Fixture::new();
        fixture.write_source(&["a.mp3", "b.part"]);

        let mut entry = fixture.entry(None);
        entry.extensions = Some(ExtensionFilter {
            include: None,
            exclude: Some(".part".to_string()),
        });

        let plan = fixture.prepare(&entry).plan().unwrap();
        assert_eq!(relatives(&plan.copy_set), vec!["a.mp3"]);
    }

    #[test]
    fn test_lexical_keep_takes_last_names() {
        let fixture = Fixture::new();
        fixture.write_source(&["c.mp3", "a.mp3", "b.mp3"]);

        let mut entry = fixture.entry(Some(2));
        entry.sort = Some(SortConfig {
            kind: SortKind::Lexical,
            pattern: None,
        });

        let plan = fixture.prepare(&entry).plan().unwrap();
        assert_eq!(relatives(&plan.retained), vec!["c.mp3", "b.mp3"]);
    }

    #[test]
    fn test_missing_base_directory() {
        let fixture = Fixture::new();
        fixture.write_source(&["a.mp3"]);

        let mut entry = fixture.entry(None);
        entry.destination = "#{destination}/unmounted/show".to_string();

        let sync = fixture.prepare(&entry);
        let err = sync.plan().unwrap_err();
        assert!(matches!(err, SyncError::MissingBaseDirectory(_)));
        assert!(!fixture.base.join("unmounted").exists());
    }

    #[test]
    fn test_missing_source_root() {
        let fixture = Fixture::new();
        let mut entry = fixture.entry(None);
        entry.source = fixture.base.join("nope").to_string_lossy().into_owned();

        let err = fixture.prepare(&entry).plan().unwrap_err();
        assert!(matches!(err, SyncError::PathNotFound(_)));
    }

    #[test]
    fn test_dry_run_leaves_filesystem_untouched() {
        let fixture = Fixture::new();
        fixture.write_source(&["a.mp3", "b.mp3", "c.mp3"]);
        write_file(&fixture.destination().join("a.mp3"), 1);

        let sync = fixture.prepare(&fixture.entry(Some(1)));
        let report = sync.run(ExecuteOptions::default()).unwrap();

        assert!(report.dry_run);
        assert_eq!(report.copied, vec![PathBuf::from("c.mp3")]);
        assert_eq!(report.removed, vec![PathBuf::from("a.mp3")]);
        assert!(fixture.destination().join("a.mp3").exists());
        assert!(!fixture.destination().join("c.mp3").exists());
    }

    #[test]
    fn test_dry_run_does_not_create_destination() {
        let fixture = Fixture::new();
        fixture.write_source(&["a.mp3"]);

        let sync = fixture.prepare(&fixture.entry(None));
        let report = sync.run(ExecuteOptions::default()).unwrap();

        assert_eq!(report.copied.len(), 1);
        assert!(!fixture.destination().exists());
    }

    #[test]
    fn test_copy_preserves_nested_paths_and_mtime() {
        let fixture = Fixture::new();
        fixture.write_source(&["a.mp3", "and/some/other/g.mp3"]);
        let old = FileTime::from_unix_time(1_600_000_000, 0);
        filetime::set_file_mtime(fixture.source.join("a.mp3"), old).unwrap();

        let sync = fixture.prepare(&fixture.entry(None));
        let report = sync.run(REAL).unwrap();

        assert!(report.failures.is_empty());
        assert!(fixture.destination().join("and/some/other/g.mp3").is_file());
        let metadata = fs::metadata(fixture.destination().join("a.mp3")).unwrap();
        assert_eq!(FileTime::from_last_modification_time(&metadata), old);
    }

    #[cfg(unix)]
    #[test]
    fn test_copy_failure_does_not_abort_entry() {
        use std::os::unix::fs::PermissionsExt;

        let fixture = Fixture::new();
        fixture.write_source(&["a.mp3", "b.mp3"]);
        let unreadable = fixture.source.join("a.mp3");
        fs::set_permissions(&unreadable, fs::Permissions::from_mode(0o000)).unwrap();

        // Permission bits do not bind a privileged user
        if fs::read(&unreadable).is_ok() {
            return;
        }

        let sync = fixture.prepare(&fixture.entry(None));
        let report = sync.run(REAL).unwrap();

        assert_eq!(report.failures.len(), 1);
        assert!(matches!(report.failures[0], SyncError::Copy { .. }));
        assert_eq!(report.copied, vec![PathBuf::from("b.mp3")]);
        assert!(fixture.destination().join("b.mp3").is_file());
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_source_subdirectory_does_not_abort_entry() {
        use std::os::unix::fs::PermissionsExt;

        let fixture = Fixture::new();
        fixture.write_source(&["a.mp3", "b.mp3", "locked/c.mp3"]);
        let locked = fixture.source.join("locked");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        // Permission bits do not bind a privileged user
        if fs::read_dir(&locked).is_ok() {
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let sync = fixture.prepare(&fixture.entry(None));
        let result = sync.run(REAL);
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        let report = result.expect("unreadable subdirectory must not abort the entry");
        let mut copied = report.copied.clone();
        copied.sort();
        assert_eq!(copied, vec![PathBuf::from("a.mp3"), PathBuf::from("b.mp3")]);
        assert!(report.failures.is_empty());
        assert!(fixture.destination().join("a.mp3").is_file());
        assert!(fixture.destination().join("b.mp3").is_file());
        assert!(!fixture.destination().join("locked").exists());
    }

    #[test]
    fn test_prepare_rejects_bad_patterns() {
        let fixture = Fixture::new();
        let mut entry = fixture.entry(None);
        entry.exclude = Some("(".to_string());

        let err = EntrySync::prepare(&entry, &fixture.base.to_string_lossy()).unwrap_err();
        assert!(matches!(err, SyncError::InvalidPattern { field: "exclude", .. }));
    }
}
