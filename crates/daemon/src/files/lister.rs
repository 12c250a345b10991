//! Directory enumeration.

use std::io::ErrorKind;
use std::path::PathBuf;

use futures_util::stream::{self, StreamExt};
use protocol::messages::Entry;
use tracing::debug;

use super::error::{FileError, FileResult};
use super::guard::PathGuard;
use super::probe::probe;

/// Maximum number of concurrent stat calls per listing.
pub const MAX_CONCURRENT_PROBES: usize = 64;

/// Lists one directory level with per-entry error tolerance.
#[derive(Debug, Clone)]
pub struct DirectoryLister {
    guard: PathGuard,
}

impl DirectoryLister {
    pub fn new(guard: PathGuard) -> Self {
        Self { guard }
    }

    /// List the immediate children of `path`.
    ///
    /// Children are probed concurrently but returned in directory-read
    /// order. A child that cannot be stat'ed appears with its `error` set
    /// rather than failing the listing.
    pub async fn list(&self, path: &str) -> FileResult<Vec<Entry>> {
        let dir = self.guard.check(path)?;

        let metadata = tokio::fs::metadata(&dir).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => FileError::path_not_found(),
            _ => FileError::io(&dir, e),
        })?;
        if !metadata.is_dir() {
            return Err(FileError::NotADirectory);
        }

        let names = read_names(&dir).await?;
        debug!(path = %dir.display(), count = names.len(), "Listing directory");

        let entries = stream::iter(names)
            .map(|name| {
                let entry_path = dir.join(&name);
                async move { probe(&entry_path, &name).await }
            })
            .buffered(MAX_CONCURRENT_PROBES)
            .collect()
            .await;

        Ok(entries)
    }
}

async fn read_names(dir: &PathBuf) -> FileResult<Vec<String>> {
    let mut read_dir = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| FileError::io(dir, e))?;

    let mut names = Vec::new();
    while let Some(child) = read_dir
        .next_entry()
        .await
        .map_err(|e| FileError::io(dir, e))?
    {
        names.push(child.file_name().to_string_lossy().into_owned());
    }
    Ok(names)
}
