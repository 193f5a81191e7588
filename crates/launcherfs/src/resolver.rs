//! Virtual path grammar.
//!
//! The filesystem is flat: every path is `/` followed by a single name.
//! Registered files are named by their zero-padded id plus a fixed suffix
//! (`/0007.AppImage`). Only the exact canonical spelling resolves; other
//! spellings of the same number (`/7.AppImage`, `/00007.AppImage`,
//! `/0007.appimage`) are reported as missing.

use crate::error::{FsResult, LauncherFsError};
use crate::registry::EntryId;

/// Suffix of every registered file name.
pub const ENTRY_SUFFIX: &str = ".AppImage";

/// Name of the listing control file.
pub const LISTING_FILE: &str = "map";

/// Name of the registration control file.
pub const REGISTRATION_FILE: &str = "register";

/// Path of the listing control file.
pub const LISTING_PATH: &str = "/map";

/// Path of the registration control file.
pub const REGISTRATION_PATH: &str = "/register";

/// The kind of node a virtual path names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathClass {
    Root,
    Listing,
    Registration,
    /// Anything else; may name a registered file.
    Candidate,
}

/// Synthetic file name for `id`, e.g. `0007.AppImage`.
pub fn filename_for_id(id: EntryId) -> String {
    format!("{id}{ENTRY_SUFFIX}")
}

/// Synthetic path for `id`, e.g. `/0007.AppImage`.
pub fn path_for_id(id: EntryId) -> String {
    format!("/{}", filename_for_id(id))
}

/// Classifies `path` without consulting the registry.
pub fn classify(path: &str) -> PathClass {
    match path {
        "/" => PathClass::Root,
        LISTING_PATH => PathClass::Listing,
        REGISTRATION_PATH => PathClass::Registration,
        _ => PathClass::Candidate,
    }
}

/// Checks that `path` has exactly one separator, in first position.
pub fn validate(path: &str) -> FsResult<()> {
    if path.matches('/').count() != 1 {
        return Err(LauncherFsError::InvalidPath(format!(
            "{path}: path must contain exactly one /"
        )));
    }
    if !path.starts_with('/') {
        return Err(LauncherFsError::InvalidPath(format!(
            "{path}: path does not start with /"
        )));
    }
    Ok(())
}

/// Resolves a registered file path to its id.
///
/// A numeral that fails to parse is [`LauncherFsError::NotFound`], the same
/// as an unknown id, so callers cannot probe the naming scheme.
pub fn resolve(path: &str) -> FsResult<EntryId> {
    let stem = path.split('.').next().unwrap_or_default();

    let Some(digits) = stem.strip_prefix('/') else {
        return Err(LauncherFsError::InvalidPath(format!(
            "{path}: path does not start with /"
        )));
    };

    // u32::from_str accepts a leading '+'; the round trip below rejects it
    let id = digits
        .parse::<u32>()
        .map(EntryId)
        .map_err(|_| LauncherFsError::NotFound)?;

    if path != path_for_id(id) {
        return Err(LauncherFsError::NotFound);
    }
    Ok(id)
}
