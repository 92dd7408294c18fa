//! Path and timestamp helpers.
//!
//! Build nodes are keyed by absolute, lexically normalized paths so that `doc.tex`,
//!     `./doc.tex` and `/work/doc.tex` name the same node.
//! Paths are shown to the user relative to the working directory when possible.
use std::path::{Component, Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Returns the absolute form of a path with `.` and `..` components resolved lexically.
pub fn absolute(path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(path),
            Err(_) => path.to_path_buf(),
        }
    };
    normalize(&joined)
}

/// Resolves `.` and `..` components without touching the filesystem.
pub fn normalize(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !result.pop() {
                    result.push("..");
                }
            }
            other => result.push(other.as_os_str()),
        }
    }
    result
}

/// Returns the path relative to the working directory if it lies below it.
pub fn relative(path: &Path) -> PathBuf {
    if let Ok(cwd) = std::env::current_dir() {
        if let Ok(stripped) = path.strip_prefix(&cwd) {
            return stripped.to_path_buf();
        }
    }
    path.to_path_buf()
}

/// Short form of a path for messages.
pub fn display(path: &Path) -> String {
    relative(path).display().to_string()
}

pub fn mtime(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Modification time in whole seconds since the epoch.
pub fn mtime_secs(path: &Path) -> Option<i64> {
    mtime(path).map(to_secs)
}

pub fn now_secs() -> i64 {
    to_secs(SystemTime::now())
}

fn to_secs(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs() as i64,
        Err(e) => -(e.duration().as_secs() as i64),
    }
}

/// Whether `a` was modified strictly after `b`. A missing `a` is never newer; a missing `b` is always older.
pub fn is_newer(a: &Path, b: &Path) -> bool {
    match (mtime(a), mtime(b)) {
        (Some(a), Some(b)) => a > b,
        (Some(_), None) => true,
        (None, _) => false,
    }
}

/// Removes a file if it exists, logging the removal.
///
/// Returns whether a file was removed.
pub fn remove(path: &Path) -> bool {
    if !path.exists() {
        return false;
    }
    match std::fs::remove_file(path) {
        Ok(()) => {
            tracing::info!("removing {}", crate::files::display(path));
            true
        }
        Err(err) => {
            tracing::warn!("could not remove {}: {}", crate::files::display(path), err);
            false
        }
    }
}

/// Returns the path with its extension replaced, keeping any directory part.
///
/// Unlike [Path::with_extension] this treats everything after the last dot of the file name as the extension,
///     and the new extension includes its dot, so `with_suffix("a.b.tex", ".pdf")` is `a.b.pdf`.
pub fn with_suffix(path: &str, suffix: &str) -> String {
    let (base, _) = strip_suffix(path);
    format!("{base}{suffix}")
}

/// Splits a path into its base and its extension, including the dot.
/// The extension is empty if the file name has no dot.
pub fn strip_suffix(path: &str) -> (&str, &str) {
    let name_start = path.rfind('/').map(|i| i + 1).unwrap_or(0);
    match path[name_start..].rfind('.') {
        Some(0) | None => (path, ""),
        Some(i) => path.split_at(name_start + i),
    }
}
