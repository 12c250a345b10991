//! Browsable roots.

use std::fs;
use std::path::Path;

use nix::sys::statvfs::statvfs;
use protocol::messages::Drive;
use tracing::debug;

use super::guard::PathGuard;

const MOUNTS_FILE: &str = "/proc/mounts";

/// List the drives a client may start browsing from.
///
/// With a confinement root the root is the only drive. Otherwise the home
/// directory comes first, followed by every absolute mount point.
pub fn list_drives(guard: &PathGuard) -> Vec<Drive> {
    if let Some(root) = guard.root() {
        return vec![with_capacity(Drive::new(root, root))];
    }

    let mut drives = Vec::new();
    if let Some(home) = dirs::home_dir() {
        let home = home.to_string_lossy().into_owned();
        drives.push(with_capacity(Drive::new("Home", home)));
    }

    let mounts = fs::read_to_string(MOUNTS_FILE)
        .map(|contents| parse_mounts(&contents))
        .unwrap_or_default();
    let mounts = if mounts.is_empty() {
        vec!["/".to_string()]
    } else {
        mounts
    };

    drives.extend(
        mounts
            .into_iter()
            .map(|mount| with_capacity(Drive::new(mount.clone(), mount))),
    );
    drives
}

/// Absolute mount points from a `/proc/mounts` style listing, in order.
pub fn parse_mounts(contents: &str) -> Vec<String> {
    contents
        .lines()
        .filter_map(|line| line.split_whitespace().nth(1))
        .filter(|mount| mount.starts_with('/'))
        .map(unescape_mount)
        .collect()
}

/// `/proc/mounts` encodes spaces and friends as octal escapes.
fn unescape_mount(raw: &str) -> String {
    raw.replace("\\040", " ")
        .replace("\\011", "\t")
        .replace("\\012", "\n")
        .replace("\\134", "\\")
}

fn with_capacity(mut drive: Drive) -> Drive {
    match statvfs(Path::new(&drive.path)) {
        Ok(stat) => {
            let fragment = stat.fragment_size() as u64;
            drive.free = Some(stat.blocks_available() as u64 * fragment);
            drive.total = Some(stat.blocks() as u64 * fragment);
        }
        Err(e) => {
            debug!(path = %drive.path, error = %e, "statvfs failed");
        }
    }
    drive
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_mounts() {
        let contents = "\
sysfs /sys sysfs rw,nosuid 0 0
proc /proc proc rw 0 0
/dev/sda1 / ext4 rw,relatime 0 0
/dev/sdb1 /mnt/My\\040Disk ext4 rw 0 0
none none tmpfs rw 0 0
";
        assert_eq!(
            parse_mounts(contents),
            vec!["/sys", "/proc", "/", "/mnt/My Disk"]
        );
    }

    #[test]
    fn test_confined_root_is_single_drive() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().to_string_lossy().into_owned();

        let drives = list_drives(&PathGuard::new(Some(&root)));

        assert_eq!(drives.len(), 1);
        assert_eq!(drives[0].label, root);
        assert_eq!(drives[0].path, root);
        assert!(drives[0].total.is_some());
    }

    #[test]
    fn test_unconfined_has_mounts() {
        let drives = list_drives(&PathGuard::new(None));
        assert!(!drives.is_empty());
        assert!(drives.iter().any(|d| d.path.starts_with('/')));
    }
}
