//! Unmount helpers for tearing down a mount left by a crashed instance.
//!
//! Each strategy is an ordered list of external commands; the first one that
//! exits successfully wins. Callers must check the mount is ours (see
//! [`is_our_mount`](crate::is_our_mount)) first: these helpers unmount
//! whatever is at the path.
//!
//! | Platform | lazy | force |
//! |----------|------|-------|
//! | Linux | `fusermount3 -uz`, `fusermount -uz`, `umount -l` | lazy, then `umount -f` |
//! | macOS | `diskutil unmount force`, `umount -f` | same |

use anyhow::{bail, Result};
use std::path::Path;
use std::process::Command;
use tracing::debug;

/// One unmount attempt: program plus the arguments preceding the path.
type Attempt = (&'static str, &'static [&'static str]);

#[cfg(target_os = "linux")]
const LAZY_ATTEMPTS: &[Attempt] = &[
    ("fusermount3", &["-uz"]),
    ("fusermount", &["-uz"]),
    ("umount", &["-l"]),
];

#[cfg(target_os = "linux")]
const FORCE_ATTEMPTS: &[Attempt] = &[
    ("fusermount3", &["-uz"]),
    ("fusermount", &["-uz"]),
    ("umount", &["-l"]),
    ("umount", &["-f"]),
];

// macOS has no lazy unmount
#[cfg(target_os = "macos")]
const LAZY_ATTEMPTS: &[Attempt] = &[("diskutil", &["unmount", "force"]), ("umount", &["-f"])];

#[cfg(target_os = "macos")]
const FORCE_ATTEMPTS: &[Attempt] = LAZY_ATTEMPTS;

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
const LAZY_ATTEMPTS: &[Attempt] = &[];

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
const FORCE_ATTEMPTS: &[Attempt] = &[];

/// Unmounts `mountpoint`, escalating to a forced unmount.
///
/// # Errors
///
/// Returns an error if every attempt fails.
pub fn force_unmount(mountpoint: &Path) -> Result<()> {
    run_attempts(FORCE_ATTEMPTS, mountpoint)
}

/// Detaches `mountpoint` from the namespace.
///
/// Open file handles keep working until closed. On macOS this is a forced
/// unmount.
pub fn lazy_unmount(mountpoint: &Path) -> Result<()> {
    run_attempts(LAZY_ATTEMPTS, mountpoint)
}

fn run_attempts(attempts: &[Attempt], mountpoint: &Path) -> Result<()> {
    let mut last_failure = String::from("unmount not supported on this platform");

    for (program, args) in attempts {
        match Command::new(program).args(*args).arg(mountpoint).output() {
            Ok(output) if output.status.success() => {
                debug!(program, ?args, mountpoint = %mountpoint.display(), "Unmounted");
                return Ok(());
            }
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
                debug!(program, ?args, mountpoint = %mountpoint.display(), %stderr, "Unmount attempt failed");
                last_failure = format!("{program}: {stderr}");
            }
            Err(e) => {
                debug!(program, error = %e, "Unmount helper unavailable");
                last_failure = format!("{program}: {e}");
            }
        }
    }

    bail!("Failed to unmount {}: {last_failure}", mountpoint.display())
}
