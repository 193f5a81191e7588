//! Mount marker identification for detecting launcherfs mounts.
//!
//! A mount point that is listed in the system mount table is only treated as
//! ours when its fsname carries our marker. Foreign mounts are never touched.
//!
//! # Mount Markers
//!
//! - FSName: `appimagelauncherfs`
//! - Subtype: `launcherfs` (Linux shows this as `fuse.launcherfs`)
//!
//! # Platform Differences
//!
//! - **macOS**: Parse `mount` command output
//! - **Linux**: Parse `/proc/mounts`

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// FSName every launcherfs mount is created with.
pub const FSNAME: &str = "appimagelauncherfs";

/// Subtype every launcherfs mount is created with.
pub const SUBTYPE: &str = "launcherfs";

/// Information about a system mount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemMount {
    /// The mount point path (e.g., `/run/user/1000/appimagelauncherfs`)
    pub mountpoint: PathBuf,
    /// The filesystem type (e.g., `fuse.launcherfs`, `macfuse`)
    pub fstype: String,
    /// The filesystem name / device (e.g., `appimagelauncherfs`)
    pub fsname: String,
}

/// Check if a mount belongs to launcherfs based on its markers.
pub fn is_our_mount(mount: &SystemMount) -> bool {
    mount.fsname.eq_ignore_ascii_case(FSNAME)
        || mount
            .fstype
            .to_lowercase()
            .ends_with(&format!(".{SUBTYPE}"))
}

/// Get all system mounts.
pub fn get_system_mounts() -> Result<Vec<SystemMount>> {
    #[cfg(target_os = "macos")]
    {
        get_system_mounts_macos()
    }

    #[cfg(target_os = "linux")]
    {
        get_system_mounts_linux()
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    {
        Ok(Vec::new())
    }
}

/// Find the system mount whose mount point is `path`, if any.
///
/// Trailing slashes are ignored on both sides.
pub fn find_mount_at(path: &Path, mounts: &[SystemMount]) -> Option<SystemMount> {
    let wanted = crate::mount_utils::normalize_mount_path(path);
    mounts
        .iter()
        .find(|m| crate::mount_utils::normalize_mount_path(&m.mountpoint) == wanted)
        .cloned()
}

#[cfg(target_os = "macos")]
fn get_system_mounts_macos() -> Result<Vec<SystemMount>> {
    let output = std::process::Command::new("mount")
        .stdin(std::process::Stdio::null())
        .output()
        .context("Failed to run mount command")?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(stdout.lines().filter_map(parse_macos_mount_line).collect())
}

#[cfg(target_os = "macos")]
fn parse_macos_mount_line(line: &str) -> Option<SystemMount> {
    // Format: "{fsname} on {mountpoint} ({fstype}, {options...})"
    let on_idx = line.find(" on ")?;
    let fsname = line[..on_idx].to_string();
    let rest = &line[on_idx + 4..];
    let paren_idx = rest.find(" (")?;
    let mountpoint = PathBuf::from(&rest[..paren_idx]);

    let opts_start = rest.find('(')? + 1;
    let opts_end = rest.find(')')?;
    let fstype = rest[opts_start..opts_end].split(',').next()?.trim().to_string();

    Some(SystemMount {
        mountpoint,
        fstype,
        fsname,
    })
}

/// Parse Linux /proc/mounts.
///
/// Format: `{device} {mountpoint} {fstype} {options} {dump} {pass}`
/// Example: `appimagelauncherfs /run/user/1000/appimagelauncherfs fuse.launcherfs rw,nosuid 0 0`
#[cfg(target_os = "linux")]
fn get_system_mounts_linux() -> Result<Vec<SystemMount>> {
    let contents =
        std::fs::read_to_string("/proc/mounts").context("Failed to read /proc/mounts")?;
    Ok(contents.lines().filter_map(parse_linux_mount_line).collect())
}

#[cfg(any(target_os = "linux", test))]
fn parse_linux_mount_line(line: &str) -> Option<SystemMount> {
    let mut parts = line.split_whitespace();
    let fsname = parts.next()?.to_string();
    let mountpoint = PathBuf::from(unescape_mount_path(parts.next()?));
    let fstype = parts.next()?.to_string();

    Some(SystemMount {
        mountpoint,
        fstype,
        fsname,
    })
}

/// Unescape the octal escapes `/proc/mounts` uses for whitespace and
/// backslashes (`\040` = space, `\011` = tab, `\012` = newline, `\134` = `\`).
#[cfg(any(target_os = "linux", test))]
fn unescape_mount_path(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut result = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'\\'
            && i + 4 <= bytes.len()
            && bytes[i + 1..i + 4].iter().all(|b| (b'0'..=b'7').contains(b))
            && let Ok(code) = u8::from_str_radix(&s[i + 1..i + 4], 8)
        {
            result.push(code);
            i += 4;
            continue;
        }
        result.push(bytes[i]);
        i += 1;
    }

    String::from_utf8_lossy(&result).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mount(mountpoint: &str, fstype: &str, fsname: &str) -> SystemMount {
        SystemMount {
            mountpoint: PathBuf::from(mountpoint),
            fstype: fstype.to_string(),
            fsname: fsname.to_string(),
        }
    }

    #[test]
    fn test_is_our_mount_by_fsname() {
        assert!(is_our_mount(&mount(
            "/run/user/1000/appimagelauncherfs",
            "fuse",
            "appimagelauncherfs"
        )));
    }

    #[test]
    fn test_is_our_mount_by_subtype() {
        assert!(is_our_mount(&mount("/mnt/x", "fuse.launcherfs", "whatever")));
    }

    #[test]
    fn test_is_our_mount_foreign() {
        assert!(!is_our_mount(&mount(
            "/mnt/sshfs",
            "fuse.sshfs",
            "user@host:/path"
        )));
    }

    #[test]
    fn test_parse_linux_mount_line() {
        let line = "appimagelauncherfs /run/user/1000/appimagelauncherfs fuse.launcherfs rw,nosuid,nodev 0 0";
        let parsed = parse_linux_mount_line(line).unwrap();
        assert_eq!(parsed.fsname, "appimagelauncherfs");
        assert_eq!(
            parsed.mountpoint,
            PathBuf::from("/run/user/1000/appimagelauncherfs")
        );
        assert_eq!(parsed.fstype, "fuse.launcherfs");
    }

    #[test]
    fn test_parse_linux_mount_line_too_short() {
        assert!(parse_linux_mount_line("only two").is_none());
    }

    #[test]
    fn test_unescape_mount_path() {
        assert_eq!(unescape_mount_path(r"/mnt/my\040dir"), "/mnt/my dir");
        assert_eq!(unescape_mount_path(r"/mnt/back\134slash"), "/mnt/back\\slash");
        assert_eq!(unescape_mount_path(r"/mnt/plain"), "/mnt/plain");
        assert_eq!(unescape_mount_path(r"/mnt/trailing\04"), r"/mnt/trailing\04");
    }

    #[test]
    fn test_find_mount_at_ignores_trailing_slash() {
        let mounts = vec![
            mount("/proc", "proc", "proc"),
            mount("/run/user/1000/appimagelauncherfs", "fuse.launcherfs", FSNAME),
        ];
        let found = find_mount_at(Path::new("/run/user/1000/appimagelauncherfs/"), &mounts);
        assert_eq!(found.map(|m| m.fsname), Some(FSNAME.to_string()));
        assert!(find_mount_at(Path::new("/mnt/none"), &mounts).is_none());
    }
}
