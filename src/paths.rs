//! Destination path resolution
//!
//! A destination template references the base destination given on the command
//! line through a single placeholder, written `#{destination}`, `${destination}`
//! or `{destination}` (`destination_base` is accepted as the name too). Nothing
//! else inside braces is evaluated.

use path_clean::PathClean;
use regex::{NoExpand, Regex};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use crate::error::{SyncError, SyncResult};

const BASE_PLACEHOLDERS: &[&str] = &["destination", "destination_base"];

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[#$]?\{([^{}]*)\}").expect("placeholder pattern is valid")
});

/// Remove trailing path separators, keeping a lone root separator
pub fn trim_separators(path: &str) -> &str {
    let trimmed = path.trim_end_matches(['/', '\\']);
    if trimmed.is_empty() && !path.is_empty() {
        &path[..1]
    } else {
        trimmed
    }
}

/// Substitute `base` into `template` and return a clean absolute path
pub fn resolve_destination(template: &str, base: &str) -> SyncResult<PathBuf> {
    let invalid = |reason: String| SyncError::InvalidTemplate {
        template: template.to_string(),
        reason,
    };

    let mut occurrences = 0;
    for caps in PLACEHOLDER.captures_iter(template) {
        let name = caps[1].trim();
        if !BASE_PLACEHOLDERS.contains(&name) {
            return Err(invalid(format!("unknown placeholder '{}'", name)));
        }
        occurrences += 1;
    }

    match occurrences {
        0 => return Err(invalid("missing base destination placeholder".to_string())),
        1 => {}
        n => {
            return Err(invalid(format!(
                "base destination placeholder used {} times",
                n
            )))
        }
    }

    let remainder = PLACEHOLDER.replace_all(template, "");
    if remainder.contains(['{', '}']) {
        return Err(invalid("unbalanced brace".to_string()));
    }

    let substituted = PLACEHOLDER.replace(template, NoExpand(trim_separators(base)));

    absolute(Path::new(substituted.as_ref()))
        .map_err(|e| invalid(format!("cannot resolve relative path: {}", e)))
}

/// Anchor a relative path at the working directory and normalise it
pub fn absolute(path: &Path) -> std::io::Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };

    Ok(absolute.clean())
}
