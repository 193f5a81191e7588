//! Error handling and mapping for the FUSE filesystem.
//!
//! Registry, resolver and dispatcher operations return [`LauncherFsError`]
//! values for every expected outcome (unknown id, duplicate registration,
//! malformed path). The FUSE adapter converts them to POSIX error codes with
//! [`LauncherFsError::to_errno`] before replying to the kernel.

use crate::registry::EntryId;
use launcherfs_mount::io_error_to_errno;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors produced by the launcherfs core.
#[derive(Debug, Error)]
pub enum LauncherFsError {
    /// Another instance already serves the mount point.
    #[error("Another instance is already mounted at {}", .0.display())]
    AlreadyRunning(PathBuf),

    /// The mount point is occupied by a filesystem that is not ours.
    #[error("Mount point {} is occupied by foreign mount {fsname}", path.display())]
    MountpointOccupied {
        /// Mount point path.
        path: PathBuf,
        /// fsname of the foreign mount.
        fsname: String,
    },

    /// A file to be registered could not be opened for reading.
    #[error("Could not open file {}: {source}", path.display())]
    CouldNotOpen {
        /// Path that failed to open.
        path: PathBuf,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },

    /// No such registered entry, non-canonical name, or the backing file vanished.
    #[error("No such registered file")]
    NotFound,

    /// Malformed virtual path.
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// The canonical path is already registered under this id.
    #[error("File already registered as {0}")]
    AlreadyRegistered(EntryId),

    /// Two ids share one canonical path. Internal-consistency fault.
    #[error("Registry corrupted: ids {first} and {second} share one path")]
    DuplicateRegisteredEntry {
        /// First id found for the path.
        first: EntryId,
        /// Second id found for the path.
        second: EntryId,
    },

    /// Access mode not allowed for this file.
    #[error("Permission denied")]
    PermissionDenied,

    /// Operation not allowed on this file.
    #[error("Operation not permitted")]
    OperationNotPermitted,

    /// File operation attempted on a directory.
    #[error("Is a directory")]
    IsDirectory,

    /// Unknown file handle.
    #[error("Invalid file handle: {0}")]
    InvalidHandle(u64),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl LauncherFsError {
    /// Converts this error to a libc error code for FUSE.
    pub fn to_errno(&self) -> i32 {
        match self {
            LauncherFsError::AlreadyRunning(_) | LauncherFsError::MountpointOccupied { .. } => {
                libc::EBUSY
            }
            LauncherFsError::CouldNotOpen { source, .. } => io_error_to_errno(source),
            LauncherFsError::NotFound => libc::ENOENT,
            LauncherFsError::InvalidPath(_) => libc::EINVAL,
            LauncherFsError::AlreadyRegistered(_) => libc::EEXIST,
            LauncherFsError::DuplicateRegisteredEntry { .. } => libc::EIO,
            LauncherFsError::PermissionDenied => libc::EACCES,
            LauncherFsError::OperationNotPermitted => libc::EPERM,
            LauncherFsError::IsDirectory => libc::EISDIR,
            LauncherFsError::InvalidHandle(_) => libc::EBADF,
            LauncherFsError::Io(e) => io_error_to_errno(e),
        }
    }
}

/// Result type for launcherfs operations.
pub type FsResult<T> = Result<T, LauncherFsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_error_mapping() {
        assert_eq!(LauncherFsError::NotFound.to_errno(), libc::ENOENT);
        assert_eq!(
            LauncherFsError::InvalidPath("a/b".to_string()).to_errno(),
            libc::EINVAL
        );
        assert_eq!(
            LauncherFsError::AlreadyRegistered(EntryId(3)).to_errno(),
            libc::EEXIST
        );
        assert_eq!(
            LauncherFsError::DuplicateRegisteredEntry {
                first: EntryId(1),
                second: EntryId(2)
            }
            .to_errno(),
            libc::EIO
        );
        assert_eq!(LauncherFsError::PermissionDenied.to_errno(), libc::EACCES);
        assert_eq!(LauncherFsError::OperationNotPermitted.to_errno(), libc::EPERM);
        assert_eq!(LauncherFsError::IsDirectory.to_errno(), libc::EISDIR);
        assert_eq!(LauncherFsError::InvalidHandle(9).to_errno(), libc::EBADF);
        assert_eq!(
            LauncherFsError::AlreadyRunning(PathBuf::from("/run/user/0/x")).to_errno(),
            libc::EBUSY
        );
    }

    #[test]
    fn test_could_not_open_keeps_os_error() {
        let e = LauncherFsError::CouldNotOpen {
            path: PathBuf::from("/tmp/x.AppImage"),
            source: io::Error::from_raw_os_error(libc::EACCES),
        };
        assert_eq!(e.to_errno(), libc::EACCES);
        assert!(e.to_string().contains("/tmp/x.AppImage"));
    }

    #[test]
    fn test_io_passthrough() {
        let e: LauncherFsError = io::Error::from_raw_os_error(libc::ENOSPC).into();
        assert_eq!(e.to_errno(), libc::ENOSPC);

        let e: LauncherFsError = io::Error::other("custom").into();
        assert_eq!(e.to_errno(), libc::EIO);
    }

    #[test]
    fn test_display_includes_id() {
        let e = LauncherFsError::AlreadyRegistered(EntryId(7));
        assert!(e.to_string().contains("0007"));
    }
}
