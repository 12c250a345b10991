//! Path confinement.
//!
//! Every filesystem operation passes its input through [`PathGuard::check`]
//! before touching disk. The check is purely lexical: separators are
//! unified, `.` and `..` are resolved, and the result must start with the
//! confinement root string. No symlinks are resolved.

use std::path::PathBuf;

use super::error::{FileError, FileResult};

/// Lexically normalize a path.
///
/// Backslashes become `/`, repeated separators collapse, `.` segments are
/// dropped and `..` pops the previous segment. An absolute path never rises
/// above `/`; a relative path keeps leading `..` segments.
pub fn normalize(path: &str) -> String {
    let unified = path.replace('\\', "/");
    let absolute = unified.starts_with('/');

    let mut parts: Vec<&str> = Vec::new();
    for segment in unified.split('/') {
        match segment {
            "" | "." => {}
            ".." => match parts.last() {
                Some(&"..") | None if !absolute => parts.push(".."),
                Some(&"..") => {}
                Some(_) => {
                    parts.pop();
                }
                None => {}
            },
            other => parts.push(other),
        }
    }

    let joined = parts.join("/");
    match (absolute, joined.is_empty()) {
        (true, _) => format!("/{joined}"),
        (false, true) => ".".to_string(),
        (false, false) => joined,
    }
}

/// Final component of a normalized path, or `None` for `/` and `.`.
pub fn base_name(path: &str) -> Option<String> {
    let normalized = normalize(path);
    match normalized.rsplit('/').next() {
        Some("") | Some(".") | Some("..") | None => None,
        Some(name) => Some(name.to_string()),
    }
}

/// Validates paths against an optional confinement root.
#[derive(Debug, Clone, Default)]
pub struct PathGuard {
    root: Option<String>,
}

impl PathGuard {
    /// Create a guard. `None` or an empty root disables confinement.
    pub fn new(root: Option<&str>) -> Self {
        let root = root.filter(|r| !r.is_empty()).map(normalize);
        Self { root }
    }

    /// The normalized confinement root, if any.
    pub fn root(&self) -> Option<&str> {
        self.root.as_deref()
    }

    /// Whether `path` may be touched.
    ///
    /// Empty input is never safe. Without a root every other path is.
    pub fn is_safe(&self, path: &str) -> bool {
        if path.is_empty() {
            return false;
        }
        match &self.root {
            None => true,
            Some(root) => normalize(path).starts_with(root.as_str()),
        }
    }

    /// Validate and return the normalized path.
    pub fn check(&self, path: &str) -> FileResult<PathBuf> {
        if !self.is_safe(path) {
            return Err(FileError::NotSafe);
        }
        Ok(PathBuf::from(normalize(path)))
    }
}
