//! Deterministic inode numbering.
//!
//! The namespace is flat and every name is derived from a fixed control file
//! name or an [`EntryId`], so inodes can be computed instead of tracked: no
//! table, no lookup counts, nothing to forget.
//!
//! | Node | Inode |
//! |------|-------|
//! | `/` | 1 |
//! | `/map` | 2 |
//! | `/register` | 3 |
//! | `/<id>.AppImage` | `id + 16` |

use crate::registry::EntryId;
use crate::resolver::{self, PathClass, LISTING_PATH, REGISTRATION_PATH};

/// Root directory inode (fixed by FUSE).
pub const ROOT_INODE: u64 = 1;

/// Listing file inode.
pub const LISTING_INODE: u64 = 2;

/// Registration file inode.
pub const REGISTRATION_INODE: u64 = 3;

/// First inode used for registered files. 4..16 are reserved.
pub const ENTRY_INODE_BASE: u64 = 16;

pub fn inode_for_id(id: EntryId) -> u64 {
    ENTRY_INODE_BASE + u64::from(id.0)
}

/// Maps an inode back to the virtual path it was derived from.
pub fn path_for_inode(ino: u64) -> Option<String> {
    match ino {
        ROOT_INODE => Some("/".to_string()),
        LISTING_INODE => Some(LISTING_PATH.to_string()),
        REGISTRATION_INODE => Some(REGISTRATION_PATH.to_string()),
        ino if ino >= ENTRY_INODE_BASE => u32::try_from(ino - ENTRY_INODE_BASE)
            .ok()
            .map(|id| resolver::path_for_id(EntryId(id))),
        _ => None,
    }
}

/// Maps a virtual path to its inode, if the path is well-formed.
///
/// Registered file paths map to an inode whether or not the id is currently
/// registered; callers check the registry.
pub fn inode_for_path(path: &str) -> Option<u64> {
    match resolver::classify(path) {
        PathClass::Root => Some(ROOT_INODE),
        PathClass::Listing => Some(LISTING_INODE),
        PathClass::Registration => Some(REGISTRATION_INODE),
        PathClass::Candidate => resolver::resolve(path).ok().map(inode_for_id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_inodes() {
        assert_eq!(path_for_inode(ROOT_INODE).as_deref(), Some("/"));
        assert_eq!(path_for_inode(LISTING_INODE).as_deref(), Some("/map"));
        assert_eq!(path_for_inode(REGISTRATION_INODE).as_deref(), Some("/register"));
        assert_eq!(inode_for_path("/"), Some(ROOT_INODE));
        assert_eq!(inode_for_path("/map"), Some(LISTING_INODE));
        assert_eq!(inode_for_path("/register"), Some(REGISTRATION_INODE));
    }

    #[test]
    fn test_entry_inodes_round_trip() {
        for id in [0, 1, 42, 9999, 10000] {
            let ino = inode_for_id(EntryId(id));
            let path = path_for_inode(ino).unwrap();
            assert_eq!(inode_for_path(&path), Some(ino));
        }
        assert_eq!(path_for_inode(16).as_deref(), Some("/0000.AppImage"));
    }

    #[test]
    fn test_reserved_and_invalid() {
        assert_eq!(path_for_inode(0), None);
        assert_eq!(path_for_inode(4), None);
        assert_eq!(path_for_inode(15), None);
        assert_eq!(path_for_inode(u64::MAX), None);
        assert_eq!(inode_for_path("/7.AppImage"), None);
        assert_eq!(inode_for_path("/nope"), None);
    }
}
