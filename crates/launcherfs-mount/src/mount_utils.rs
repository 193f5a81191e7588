//! Mount point accessibility probes.
//!
//! When a FUSE daemon dies without unmounting, any operation on its mount
//! point blocks until the kernel gives up. Probes here run on a helper thread
//! and report failure after a timeout instead of hanging the caller.

use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;

/// Default timeout for filesystem accessibility checks
pub const DEFAULT_ACCESS_TIMEOUT: Duration = Duration::from_millis(500);

/// Check if a directory can be listed within a timeout.
///
/// A live FUSE mount has to answer a readdir request for this to succeed;
/// a bare stat may be served from the kernel's attribute cache.
pub fn is_directory_readable(path: &Path, timeout: Duration) -> bool {
    let path = path.to_path_buf();
    let (tx, rx) = mpsc::channel();

    std::thread::spawn(move || {
        let result = std::fs::read_dir(&path)
            .map(|mut entries| {
                let _ = entries.next();
                true
            })
            .unwrap_or(false);
        let _ = tx.send(result);
    });

    rx.recv_timeout(timeout).unwrap_or(false)
}

/// Normalize a mount path for comparison without touching the filesystem.
///
/// Strips trailing separators and, on macOS, maps `/tmp` and `/var` to their
/// `/private` targets the way the mount table reports them.
pub fn normalize_mount_path(path: &Path) -> PathBuf {
    let normalized: PathBuf = path.components().collect();

    #[cfg(target_os = "macos")]
    {
        for prefix in ["/tmp", "/var"] {
            if let Ok(rest) = normalized.strip_prefix(prefix) {
                return Path::new("/private").join(prefix.trim_start_matches('/')).join(rest);
            }
        }
    }

    normalized
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accessible_existing_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(is_directory_readable(dir.path(), DEFAULT_ACCESS_TIMEOUT));
    }

    #[test]
    fn test_missing_path_not_accessible() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing");
        assert!(!is_directory_readable(&missing, DEFAULT_ACCESS_TIMEOUT));
    }

    #[test]
    fn test_file_is_not_a_readable_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("file");
        std::fs::write(&file, b"x").unwrap();
        assert!(!is_directory_readable(&file, DEFAULT_ACCESS_TIMEOUT));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_normalize_strips_trailing_slash() {
        assert_eq!(
            normalize_mount_path(Path::new("/run/user/1000/appimagelauncherfs/")),
            PathBuf::from("/run/user/1000/appimagelauncherfs")
        );
    }
}
