//! Mount point utilities for the AppImageLauncher FUSE filesystem.
//!
//! # Components
//!
//! - [`check_mountpoint_status`] - Tell a live mount apart from a stale one
//!   or a leftover directory at the deterministic mount path
//! - [`force_unmount`] / [`lazy_unmount`] - Tear down stale mounts
//! - [`is_our_mount`] - Mount table markers, so foreign mounts are never touched
//! - [`HandleTable`] - Thread-safe per-open session storage keyed by `fh`
//! - [`io_error_to_errno`] - Error classification for FUSE replies

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error_category;
mod force_unmount;
mod handle_table;
mod mount_markers;
mod mount_utils;
pub mod stale_detection;

pub use error_category::io_error_to_errno;
pub use force_unmount::{force_unmount, lazy_unmount};
pub use handle_table::HandleTable;
pub use mount_markers::{find_mount_at, get_system_mounts, is_our_mount, SystemMount, FSNAME, SUBTYPE};
pub use mount_utils::{
    is_directory_readable, normalize_mount_path, DEFAULT_ACCESS_TIMEOUT,
};
pub use stale_detection::{check_mountpoint, check_mountpoint_status, MountPointStatus};
