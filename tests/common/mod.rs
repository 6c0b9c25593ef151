//! Common test utilities and helpers for keepsync tests
#![allow(dead_code)]

use assert_fs::fixture::ChildPath;
use assert_fs::prelude::*;
use assert_fs::TempDir;
use std::path::{Path, PathBuf};
use std::time::Duration;
use walkdir::WalkDir;

/// Source files used by most scenarios, in creation order
pub const SOURCE_FILES: &[&str] = &[
    "a.mp3",
    "and/some/other/directory/g.mp3",
    "b.mp3",
    "c.mp3",
    "d.mp3",
    "e.mp3",
    "f.mp3",
    "g.mp3",
];

/// Files placed on the device by hand
pub const MANUAL_FILES: &[&str] = &["x.mp3", "y.mp3", "z.mp3"];

/// A source tree and a mounted-device stand-in
pub struct TestEnvironment {
    pub temp_dir: TempDir,
    /// Source directory of the entry under test
    pub source: PathBuf,
    /// Base destination passed on the command line
    pub base: PathBuf,
}

impl TestEnvironment {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let source = temp_dir.child("source/show");
        let base = temp_dir.child("destination");
        source.create_dir_all().expect("Failed to create source dir");
        base.create_dir_all().expect("Failed to create destination dir");

        Self {
            source: source.path().to_path_buf(),
            base: base.path().to_path_buf(),
            temp_dir,
        }
    }

    /// Entry destination for the default `#{destination}/show` template
    pub fn destination(&self) -> PathBuf {
        self.base.join("show")
    }

    pub fn destination_child(&self, relative: &str) -> ChildPath {
        ChildPath::new(self.destination().join(relative))
    }

    pub fn create_source_files(&self, names: &[&str]) {
        create_files(&self.source, names);
    }

    pub fn create_destination_files(&self, names: &[&str]) {
        create_files(&self.destination(), names);
    }

    pub fn create_config(&self, content: &str) -> PathBuf {
        let config = self.temp_dir.child("keepsync.yml");
        config.write_str(content).expect("Failed to write test config");
        config.path().to_path_buf()
    }

    /// Single-entry configuration for the source under test
    pub fn create_show_config(&self, keep: Option<usize>) -> PathBuf {
        let keep_line = keep.map(|k| format!("    keep: {}\n", k)).unwrap_or_default();
        let content = format!(
            "sources:\n  - label: Test\n    source: '{}'\n    destination: \"#{{destination_base}}/show\"\n{}",
            self.source.display(),
            keep_line
        );
        self.create_config(&content)
    }
}

/// Create non-empty files one after another so creation times are distinct
pub fn create_files(root: &Path, names: &[&str]) {
    for (index, name) in names.iter().enumerate() {
        let path = root.join(name);
        std::fs::create_dir_all(path.parent().expect("file has a parent"))
            .expect("Failed to create parent dir");
        std::fs::write(&path, "0".repeat(500 + index * 7)).expect("Failed to write file");
        std::thread::sleep(Duration::from_millis(20));
    }
}

/// Relative paths of all regular files below `root`, sorted
pub fn relative_files(root: &Path) -> Vec<String> {
    if !root.exists() {
        return Vec::new();
    }

    let mut files: Vec<String> = WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| {
            entry
                .path()
                .strip_prefix(root)
                .expect("entry below root")
                .to_string_lossy()
                .into_owned()
        })
        .collect();
    files.sort();
    files
}

/// Sorted, owned copy of a list of names
pub fn sorted(names: &[&str]) -> Vec<String> {
    let mut names: Vec<String> = names.iter().map(|n| n.to_string()).collect();
    names.sort();
    names
}

/// Assertion helper for output validation
pub fn assert_contains_all(text: &str, expected: &[&str]) {
    for item in expected {
        assert!(
            text.contains(item),
            "Expected text to contain '{}', but it didn't. Text: {}",
            item,
            text
        );
    }
}
