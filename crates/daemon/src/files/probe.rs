//! Single-entry metadata probing.

use std::fs::Metadata;
use std::os::unix::fs::MetadataExt;
use std::path::Path;
use std::time::SystemTime;

use protocol::messages::{extension_of, Entry};
use tracing::debug;

/// Stat `entry_path` (following symlinks) into an [`Entry`] named `name`.
///
/// Never fails: a stat error yields [`Entry::unreadable`] carrying the
/// error text.
pub async fn probe(entry_path: &Path, name: &str) -> Entry {
    match tokio::fs::metadata(entry_path).await {
        Ok(metadata) => entry_from_metadata(name, &metadata),
        Err(e) => {
            debug!(path = %entry_path.display(), error = %e, "Failed to stat entry");
            Entry::unreadable(name, e.to_string())
        }
    }
}

/// Build an entry from already-fetched metadata.
pub fn entry_from_metadata(name: &str, metadata: &Metadata) -> Entry {
    let is_directory = metadata.is_dir();
    let modified = metadata.modified().ok().map(millis_since_epoch);

    Entry {
        name: name.to_string(),
        extension: if is_directory {
            String::new()
        } else {
            extension_of(name)
        },
        is_directory,
        hidden: name.starts_with('.'),
        last_modified: change_time_millis(metadata),
        birth_time: metadata
            .created()
            .ok()
            .map(millis_since_epoch)
            .or(modified)
            .unwrap_or(0),
        size: if is_directory {
            None
        } else {
            Some(metadata.len())
        },
        error: None,
    }
}

fn change_time_millis(metadata: &Metadata) -> u64 {
    let secs = metadata.ctime().max(0) as u64;
    let nanos = metadata.ctime_nsec().max(0) as u64;
    secs * 1000 + nanos / 1_000_000
}

fn millis_since_epoch(time: SystemTime) -> u64 {
    time.duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_probe_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("report.pdf");
        fs::write(&path, b"12345").unwrap();

        let entry = probe(&path, "report.pdf").await;

        assert!(entry.is_readable());
        assert!(!entry.is_directory);
        assert!(!entry.hidden);
        assert_eq!(entry.extension, ".pdf");
        assert_eq!(entry.size, Some(5));
        assert!(entry.last_modified > 0);
        assert!(entry.birth_time > 0);
    }

    #[tokio::test]
    async fn test_probe_directory() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(".config.d");
        fs::create_dir(&path).unwrap();

        let entry = probe(&path, ".config.d").await;

        assert!(entry.is_directory);
        assert!(entry.hidden);
        assert_eq!(entry.extension, "");
        assert_eq!(entry.size, None);
    }

    #[tokio::test]
    async fn test_probe_missing() {
        let temp_dir = TempDir::new().unwrap();
        let entry = probe(&temp_dir.path().join("gone.txt"), "gone.txt").await;

        assert!(!entry.is_readable());
        assert_eq!(entry.size, Some(0));
        assert_eq!(entry.last_modified, 0);
        assert_eq!(entry.birth_time, 0);
        assert!(!entry.is_directory);
    }

    #[tokio::test]
    async fn test_probe_follows_symlink() {
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("target");
        fs::create_dir(&target).unwrap();
        let link = temp_dir.path().join("link");
        std::os::unix::fs::symlink(&target, &link).unwrap();

        let entry = probe(&link, "link").await;
        assert!(entry.is_directory);
    }
}
