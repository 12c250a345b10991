//! Copy, move, rename, delete and directory creation.
//!
//! This module provides the mutating filesystem operations. Every operation
//! re-validates its inputs with [`PathGuard`] before touching disk. The
//! functions are synchronous and are expected to run on the blocking pool.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

use super::error::{FileError, FileResult};
use super::guard::{base_name, PathGuard};

/// Result of [`TransferEngine::create_directory`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateDirOutcome {
    Created,
    AlreadyExisted,
}

/// Failure of one item inside a batch operation.
#[derive(Debug, Error)]
#[error("{source}: {path}")]
pub struct BatchError {
    /// The input path the failure refers to.
    pub path: String,
    #[source]
    pub source: FileError,
}

impl BatchError {
    fn new(path: &str, source: FileError) -> Self {
        Self {
            path: path.to_string(),
            source,
        }
    }
}

/// Mutating filesystem operations behind a [`PathGuard`].
#[derive(Debug, Clone)]
pub struct TransferEngine {
    guard: PathGuard,
}

impl TransferEngine {
    pub fn new(guard: PathGuard) -> Self {
        Self { guard }
    }

    /// Create `path` and any missing parents.
    ///
    /// Idempotent: an existing path reports [`CreateDirOutcome::AlreadyExisted`].
    pub fn create_directory(&self, path: &str) -> FileResult<CreateDirOutcome> {
        let dir = self.guard.check(path)?;

        if dir.exists() {
            return Ok(CreateDirOutcome::AlreadyExisted);
        }

        fs::create_dir_all(&dir).map_err(|e| FileError::io(&dir, e))?;
        info!(path = %dir.display(), "Created directory");
        Ok(CreateDirOutcome::Created)
    }

    /// Rename `from` to `to`.
    ///
    /// Falls back to copy plus delete when the two paths live on different
    /// filesystems.
    pub fn rename(&self, from: &str, to: &str) -> FileResult<()> {
        if from.is_empty() || to.is_empty() {
            return Err(FileError::InvalidRequest(
                "fromPath or toPath is required".to_string(),
            ));
        }
        if from == to {
            return Err(FileError::InvalidRequest(
                "Paths cannot be the same".to_string(),
            ));
        }

        let source = self.guard.check(from)?;
        let destination = self.guard.check(to)?;

        if !exists(&source) {
            return Err(FileError::source_not_found());
        }
        if exists(&destination) {
            return Err(FileError::Conflict);
        }

        move_path(&source, &destination)?;
        info!(
            from = %source.display(),
            to = %destination.display(),
            "Renamed path"
        );
        Ok(())
    }

    /// Copy (or move) each source into `to_dir`, keeping its base name.
    ///
    /// Items are processed in order. The first failure stops the batch and
    /// is returned; items already completed stay in place.
    pub fn copy_or_move(
        &self,
        from_paths: &[String],
        to_dir: &str,
        is_move: bool,
    ) -> Result<(), BatchError> {
        for from in from_paths {
            self.copy_one(from, to_dir, is_move)
                .map_err(|e| BatchError::new(from, e))?;
        }
        Ok(())
    }

    fn copy_one(&self, from: &str, to_dir: &str, is_move: bool) -> FileResult<()> {
        let source = self.guard.check(from)?;
        let target_dir = self.guard.check(to_dir)?;

        if !exists(&source) {
            return Err(FileError::source_not_found());
        }

        let name = base_name(from).ok_or_else(|| {
            FileError::InvalidRequest(format!("Cannot copy a root path: {from}"))
        })?;
        let destination = target_dir.join(name);
        if exists(&destination) {
            return Err(FileError::Conflict);
        }
        if destination.starts_with(&source) {
            return Err(FileError::InvalidRequest(
                "Cannot copy a directory into itself".to_string(),
            ));
        }

        if is_move {
            move_path(&source, &destination)?;
        } else {
            copy_recursive(&source, &destination)?;
        }

        debug!(
            from = %source.display(),
            to = %destination.display(),
            is_move,
            "Transferred path"
        );
        Ok(())
    }

    /// Delete every path recursively.
    ///
    /// All paths are validated (safe and existing) before anything is
    /// removed, so a bad entry anywhere in the list leaves the disk untouched.
    pub fn delete(&self, paths: &[String]) -> Result<(), BatchError> {
        let mut targets = Vec::with_capacity(paths.len());
        for path in paths {
            let target = self
                .guard
                .check(path)
                .map_err(|e| BatchError::new(path, e))?;
            if !exists(&target) {
                return Err(BatchError::new(path, FileError::path_not_found()));
            }
            targets.push((path, target));
        }

        for (path, target) in targets {
            remove_recursive(&target).map_err(|e| BatchError::new(path, e))?;
            info!(path = %target.display(), "Deleted path");
        }
        Ok(())
    }
}

/// Whether anything (including a dangling symlink) exists at `path`.
fn exists(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

/// Rename, or copy then delete across filesystems.
fn move_path(source: &Path, destination: &Path) -> FileResult<()> {
    match fs::rename(source, destination) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::CrossesDevices => {
            debug!(
                from = %source.display(),
                to = %destination.display(),
                "Rename crosses filesystems, copying instead"
            );
            copy_recursive(source, destination)?;
            remove_recursive(source)
        }
        Err(e) => Err(FileError::io(source, e)),
    }
}

/// Copy a file or directory tree. Empty directories are reproduced.
pub(crate) fn copy_recursive(source: &Path, destination: &Path) -> FileResult<()> {
    let metadata = fs::metadata(source).map_err(|e| FileError::io(source, e))?;

    if !metadata.is_dir() {
        fs::copy(source, destination).map_err(|e| FileError::io(source, e))?;
        return Ok(());
    }

    // Children are listed before the destination exists.
    let children = fs::read_dir(source)
        .and_then(|entries| entries.collect::<Result<Vec<_>, _>>())
        .map_err(|e| FileError::io(source, e))?;

    fs::create_dir_all(destination).map_err(|e| FileError::io(destination, e))?;
    for child in children {
        let child_destination: PathBuf = destination.join(child.file_name());
        copy_recursive(&child.path(), &child_destination)?;
    }
    Ok(())
}

/// Remove a file, symlink or directory tree.
fn remove_recursive(path: &Path) -> FileResult<()> {
    let metadata = fs::symlink_metadata(path).map_err(|e| FileError::io(path, e))?;
    let result = if metadata.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    result.map_err(|e| {
        warn!(path = %path.display(), error = %e, "Failed to remove path");
        FileError::io(path, e)
    })
}
