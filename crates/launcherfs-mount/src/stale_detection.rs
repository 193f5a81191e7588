//! Liveness classification of the deterministic mount point.
//!
//! A leftover directory from a crashed run and a live mount look the same to
//! a plain existence check. This module tells them apart:
//!
//! 1. Not in the system mount table: the path is either absent or a leftover
//!    directory, both safe to reuse.
//! 2. In the mount table with our markers and answering readdir within the
//!    timeout: another instance is serving it.
//! 3. In the mount table with our markers but unresponsive: stale, safe to
//!    force unmount.
//! 4. In the mount table without our markers: foreign, never touched.

use std::io;
use std::path::Path;
use std::time::Duration;

use crate::mount_markers::{find_mount_at, get_system_mounts, is_our_mount, SystemMount};
use crate::mount_utils::is_directory_readable;

/// Classification of a mount point before mounting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountPointStatus {
    /// Nothing exists at the path.
    Absent,
    /// A plain directory, not mounted (e.g., left behind by a crashed run).
    Leftover,
    /// Our filesystem is mounted and responding.
    Live,
    /// Our filesystem is mounted but not responding.
    Stale,
    /// Something else is mounted there.
    Foreign {
        /// fsname reported by the mount table
        fsname: String,
    },
    /// The path exists but is not a directory.
    NotADirectory,
    /// The path could not be inspected.
    Unknown {
        /// Error message explaining the failure
        error: String,
    },
}

impl MountPointStatus {
    /// Whether an unmount should be attempted before the path is reused.
    ///
    /// An uninspectable path is most likely a broken mount, so it counts.
    pub fn needs_unmount(&self) -> bool {
        matches!(self, MountPointStatus::Stale | MountPointStatus::Unknown { .. })
    }
}

/// Classify `mountpoint` against an already-read mount table.
///
/// Only touches the filesystem through timeout-guarded probes when the path
/// is a mount point, so a ghost mount cannot block the caller.
pub fn check_mountpoint(
    mountpoint: &Path,
    system_mounts: &[SystemMount],
    timeout: Duration,
) -> MountPointStatus {
    if let Some(mount) = find_mount_at(mountpoint, system_mounts) {
        if !is_our_mount(&mount) {
            return MountPointStatus::Foreign {
                fsname: mount.fsname,
            };
        }
        if is_directory_readable(mountpoint, timeout) {
            return MountPointStatus::Live;
        }
        return MountPointStatus::Stale;
    }

    match std::fs::symlink_metadata(mountpoint) {
        Ok(meta) if meta.is_dir() => MountPointStatus::Leftover,
        Ok(_) => MountPointStatus::NotADirectory,
        Err(e) if e.kind() == io::ErrorKind::NotFound => MountPointStatus::Absent,
        // ENOTCONN is what a dead FUSE daemon leaves behind on Linux
        Err(e) if e.raw_os_error() == Some(libc::ENOTCONN) => MountPointStatus::Stale,
        Err(e) => MountPointStatus::Unknown {
            error: e.to_string(),
        },
    }
}

/// Classify `mountpoint` using the live system mount table.
pub fn check_mountpoint_status(mountpoint: &Path, timeout: Duration) -> MountPointStatus {
    match get_system_mounts() {
        Ok(mounts) => check_mountpoint(mountpoint, &mounts, timeout),
        Err(e) => {
            tracing::warn!(error = %e, "Could not read system mount table");
            check_mountpoint(mountpoint, &[], timeout)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mount_markers::FSNAME;
    use crate::mount_utils::DEFAULT_ACCESS_TIMEOUT;

    fn system_mount(path: &Path, fsname: &str) -> SystemMount {
        SystemMount {
            mountpoint: path.to_path_buf(),
            fstype: "fuse".to_string(),
            fsname: fsname.to_string(),
        }
    }

    #[test]
    fn test_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mnt");
        assert_eq!(
            check_mountpoint(&path, &[], DEFAULT_ACCESS_TIMEOUT),
            MountPointStatus::Absent
        );
    }

    #[test]
    fn test_leftover_directory_is_not_live() {
        let dir = tempfile::tempdir().unwrap();
        let status = check_mountpoint(dir.path(), &[], DEFAULT_ACCESS_TIMEOUT);
        assert_eq!(status, MountPointStatus::Leftover);
        assert!(!status.needs_unmount());
    }

    #[test]
    fn test_not_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("file");
        std::fs::write(&file, b"").unwrap();
        assert_eq!(
            check_mountpoint(&file, &[], DEFAULT_ACCESS_TIMEOUT),
            MountPointStatus::NotADirectory
        );
    }

    #[test]
    fn test_live_when_ours_and_readable() {
        let dir = tempfile::tempdir().unwrap();
        let mounts = vec![system_mount(dir.path(), FSNAME)];
        assert_eq!(
            check_mountpoint(dir.path(), &mounts, DEFAULT_ACCESS_TIMEOUT),
            MountPointStatus::Live
        );
    }

    #[test]
    fn test_stale_when_ours_and_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gone");
        let mounts = vec![system_mount(&path, FSNAME)];
        let status = check_mountpoint(&path, &mounts, DEFAULT_ACCESS_TIMEOUT);
        assert_eq!(status, MountPointStatus::Stale);
        assert!(status.needs_unmount());
    }

    #[test]
    fn test_foreign_mount() {
        let dir = tempfile::tempdir().unwrap();
        let mounts = vec![system_mount(dir.path(), "user@host:/share")];
        assert_eq!(
            check_mountpoint(dir.path(), &mounts, DEFAULT_ACCESS_TIMEOUT),
            MountPointStatus::Foreign {
                fsname: "user@host:/share".to_string()
            }
        );
    }
}
