//! Per-open session state.
//!
//! Every successful `open` creates a [`Session`] stored in a
//! [`SessionTable`] under a fresh handle id, which the kernel passes back on
//! every read, write and release. A session is reachable only through its own
//! id, so two concurrent opens of the registration file never share a buffer.

use crate::registry::EntryId;
use launcherfs_mount::HandleTable;
use std::ffi::OsStr;
use std::fs::File;
use std::os::unix::ffi::OsStrExt;
use std::path::PathBuf;
use std::sync::Arc;

/// State attached to one open file handle.
#[derive(Debug)]
pub enum Session {
    /// Read-only handle on the listing file. Content is rendered per read.
    Listing,

    /// Handle on the registration file accumulating written paths.
    Registration(RegistrationBuffer),

    /// Handle on a registered file.
    ///
    /// Shares the read-only descriptor opened at registration; holding the
    /// `Arc` keeps it valid even if the entry is evicted while open.
    Entry {
        /// Id the handle was opened for.
        id: EntryId,
        /// Descriptor used for positional reads.
        file: Arc<File>,
    },
}

impl Session {
    pub fn as_registration_mut(&mut self) -> Option<&mut RegistrationBuffer> {
        match self {
            Session::Registration(buffer) => Some(buffer),
            _ => None,
        }
    }

    pub fn entry_file(&self) -> Option<&Arc<File>> {
        match self {
            Session::Entry { file, .. } => Some(file),
            _ => None,
        }
    }
}

/// Bytes written to one open handle of the registration file.
#[derive(Debug, Default)]
pub struct RegistrationBuffer {
    data: Vec<u8>,
}

impl RegistrationBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a written chunk verbatim. Write offsets are ignored.
    pub fn append(&mut self, chunk: &[u8]) {
        self.data.extend_from_slice(chunk);
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Paths to register, one per line.
    ///
    /// Line endings (`\n`, `\r\n`) are stripped and blank lines skipped.
    /// Bytes are kept as-is, so non-UTF-8 paths survive.
    pub fn requested_paths(&self) -> Vec<PathBuf> {
        self.data
            .split(|b| *b == b'\n')
            .map(|line| line.strip_suffix(b"\r").unwrap_or(line))
            .filter(|line| !line.is_empty())
            .map(|line| PathBuf::from(OsStr::from_bytes(line)))
            .collect()
    }
}

/// Open sessions keyed by FUSE file handle.
pub type SessionTable = HandleTable<Session>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_path_with_newline() {
        let mut buffer = RegistrationBuffer::new();
        buffer.append(b"/tmp/x.AppImage\n");
        assert_eq!(
            buffer.requested_paths(),
            vec![PathBuf::from("/tmp/x.AppImage")]
        );
    }

    #[test]
    fn test_chunks_are_concatenated() {
        let mut buffer = RegistrationBuffer::new();
        buffer.append(b"/tmp/");
        buffer.append(b"x.App");
        buffer.append(b"Image\r\n");
        assert_eq!(buffer.len(), 17);
        assert_eq!(
            buffer.requested_paths(),
            vec![PathBuf::from("/tmp/x.AppImage")]
        );
    }

    #[test]
    fn test_multiple_lines() {
        let mut buffer = RegistrationBuffer::new();
        buffer.append(b"/tmp/a.AppImage\n\n/tmp/b.AppImage\r\n");
        assert_eq!(
            buffer.requested_paths(),
            vec![
                PathBuf::from("/tmp/a.AppImage"),
                PathBuf::from("/tmp/b.AppImage")
            ]
        );
    }

    #[test]
    fn test_no_trailing_newline() {
        let mut buffer = RegistrationBuffer::new();
        buffer.append(b"/tmp/a.AppImage");
        assert_eq!(
            buffer.requested_paths(),
            vec![PathBuf::from("/tmp/a.AppImage")]
        );
    }

    #[test]
    fn test_empty_buffer() {
        let buffer = RegistrationBuffer::new();
        assert!(buffer.is_empty());
        assert!(buffer.requested_paths().is_empty());

        let mut buffer = RegistrationBuffer::new();
        buffer.append(b"\r\n\n");
        assert!(buffer.requested_paths().is_empty());
    }

    #[test]
    fn test_sessions_are_isolated() {
        let table = SessionTable::new();
        let a = table.insert(Session::Registration(RegistrationBuffer::new()));
        let b = table.insert(Session::Registration(RegistrationBuffer::new()));

        table
            .get_mut(a)
            .unwrap()
            .as_registration_mut()
            .unwrap()
            .append(b"/tmp/a\n");

        let b_session = table.remove(b).unwrap();
        match b_session {
            Session::Registration(buffer) => assert!(buffer.is_empty()),
            other => panic!("unexpected session {other:?}"),
        }
        assert!(table.contains(a));
    }

    #[test]
    fn test_listing_session_has_no_buffer() {
        let mut session = Session::Listing;
        assert!(session.as_registration_mut().is_none());
        assert!(session.entry_file().is_none());
    }
}
