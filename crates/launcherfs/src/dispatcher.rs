//! Path-based request handlers for the virtual namespace.
//!
//! Every path falls into one of four classes: the root directory, the
//! listing file (`/map`), the registration file (`/register`), or a
//! candidate registered file resolved through [`resolver::resolve`]. The
//! [`Dispatcher`] answers list/stat/open/read/write/truncate/release for each
//! class. It knows nothing about inodes or FUSE replies; the adapter in
//! [`crate::filesystem`] translates between the kernel protocol and these
//! handlers.
//!
//! # Behaviors
//!
//! | Path | read | write | release |
//! |------|------|-------|---------|
//! | `/map` | registry listing, rendered per call | - | - |
//! | `/register` | static help text | appended to the handle's buffer | registers buffered paths |
//! | `/<id>.AppImage` | backing file with marker bytes zeroed | - | - |

use crate::error::{FsResult, LauncherFsError};
use crate::handles::{RegistrationBuffer, Session, SessionTable};
use crate::inode::{inode_for_id, LISTING_INODE, REGISTRATION_INODE, ROOT_INODE};
use crate::lifecycle::MountContext;
use crate::registry::{EntryId, Registry};
use crate::resolver::{self, PathClass, LISTING_FILE, REGISTRATION_FILE};
use fuser::{FileAttr, FileType};
use std::fs::{File, Metadata};
use std::io;
use std::ops::Range;
use std::os::unix::fs::{FileExt, MetadataExt};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, error, info, trace};

/// Content served when reading the registration file.
pub const REGISTER_MESSAGE: &str =
    "Write paths to AppImages into this virtual file, one per line, to register them\n";

/// Byte range of the AppImage magic (`AI` + type byte) in the ELF header padding.
///
/// Zeroed on read so tools scanning the mount do not recognize the virtual
/// copies as AppImages and register them again.
pub const MAGIC_BYTES: Range<u64> = 8..11;

/// Largest window served by one read of a synthetic file.
pub const MAX_TRANSFER: usize = 0x7fff_ffff;

/// Block size reported for synthetic files.
const BLOCK_SIZE: u32 = 4096;

/// Root directory permissions (r-xr-x---).
const ROOT_PERM: u16 = 0o550;

/// Listing file permissions (r--r--r--).
const LISTING_PERM: u16 = 0o444;

/// Registration file permissions (rw-rw----).
const REGISTRATION_PERM: u16 = 0o660;

/// Registered file permissions (r-xr-xr-x).
const ENTRY_PERM: u16 = 0o555;

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub ino: u64,
    pub kind: FileType,
    pub name: String,
}

impl DirEntry {
    fn new(ino: u64, kind: FileType, name: impl Into<String>) -> Self {
        Self {
            ino,
            kind,
            name: name.into(),
        }
    }
}

/// Zeroes the part of `buf` that overlaps [`MAGIC_BYTES`].
///
/// `buf` holds file content starting at `offset`. Bytes outside the range
/// are left untouched.
pub fn blank_magic_bytes(buf: &mut [u8], offset: u64) {
    let end = offset.saturating_add(buf.len() as u64);
    let start = MAGIC_BYTES.start.max(offset);
    let stop = MAGIC_BYTES.end.min(end);
    if start >= stop {
        return;
    }
    // both bounds lie within buf, so they fit in usize
    #[allow(clippy::cast_possible_truncation)]
    let (from, to) = ((start - offset) as usize, (stop - offset) as usize);
    buf[from..to].fill(0);
}

/// Returns `content[offset..offset + size]`, clipped to the content length.
fn window(content: &[u8], offset: u64, size: usize) -> &[u8] {
    let Ok(start) = usize::try_from(offset) else {
        return &[];
    };
    if start >= content.len() {
        return &[];
    }
    let end = start.saturating_add(size.min(MAX_TRANSFER)).min(content.len());
    &content[start..end]
}

/// Positional read that retries short reads until `buf` is full or EOF.
fn read_full_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read_at(&mut buf[filled..], offset + filled as u64) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

fn timestamp(secs: i64, nsecs: i64) -> SystemTime {
    let nanos = u32::try_from(nsecs).unwrap_or(0);
    match u64::try_from(secs) {
        Ok(secs) => UNIX_EPOCH + Duration::new(secs, nanos),
        Err(_) => UNIX_EPOCH - Duration::new(secs.unsigned_abs(), 0),
    }
}

/// Request handlers for the virtual namespace.
#[derive(Debug)]
pub struct Dispatcher {
    registry: Arc<Registry>,
    sessions: SessionTable,
    context: MountContext,
}

impl Dispatcher {
    pub fn new(registry: Arc<Registry>, context: MountContext) -> Self {
        Self {
            registry,
            sessions: SessionTable::new(),
            context,
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn context(&self) -> &MountContext {
        &self.context
    }

    /// Number of handles opened and not yet released.
    pub fn open_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Lists a directory. Only the root exists.
    pub fn read_dir(&self, path: &str) -> FsResult<Vec<DirEntry>> {
        if resolver::classify(path) != PathClass::Root {
            return Err(LauncherFsError::NotFound);
        }

        let mut ids = self.registry.ids();
        ids.sort_unstable();

        let mut entries = Vec::with_capacity(ids.len() + 4);
        entries.push(DirEntry::new(ROOT_INODE, FileType::Directory, "."));
        entries.push(DirEntry::new(ROOT_INODE, FileType::Directory, ".."));
        entries.push(DirEntry::new(LISTING_INODE, FileType::RegularFile, LISTING_FILE));
        entries.push(DirEntry::new(
            REGISTRATION_INODE,
            FileType::RegularFile,
            REGISTRATION_FILE,
        ));
        entries.extend(ids.into_iter().map(|id| {
            DirEntry::new(inode_for_id(id), FileType::RegularFile, resolver::filename_for_id(id))
        }));
        Ok(entries)
    }

    /// Stats a path.
    pub fn getattr(&self, path: &str) -> FsResult<FileAttr> {
        resolver::validate(path)?;

        match resolver::classify(path) {
            PathClass::Root => Ok(self.synthetic_attr(ROOT_INODE, FileType::Directory, ROOT_PERM, 0)),
            PathClass::Listing => {
                let size = self.registry.render_listing().len() as u64;
                Ok(self.synthetic_attr(LISTING_INODE, FileType::RegularFile, LISTING_PERM, size))
            }
            PathClass::Registration => Ok(self.synthetic_attr(
                REGISTRATION_INODE,
                FileType::RegularFile,
                REGISTRATION_PERM,
                REGISTER_MESSAGE.len() as u64,
            )),
            PathClass::Candidate => {
                let id = resolver::resolve(path)?;
                let entry = self.registry.lookup_or_evict(id)?;
                // the held handle, not the path: attributes match the bytes served
                let metadata = entry.file().metadata().map_err(|e| {
                    error!(%id, path = %entry.path().display(), error = %e, "stat failed on registered file");
                    LauncherFsError::Io(e)
                })?;
                Ok(Self::entry_attr(id, &metadata))
            }
        }
    }

    /// Opens a path and returns the handle id for later calls.
    pub fn open(&self, path: &str, flags: i32) -> FsResult<u64> {
        let read_only = (flags & libc::O_ACCMODE) == libc::O_RDONLY;

        let session = match resolver::classify(path) {
            PathClass::Root => return Err(LauncherFsError::IsDirectory),
            PathClass::Registration => Session::Registration(RegistrationBuffer::new()),
            PathClass::Listing if read_only => Session::Listing,
            PathClass::Listing => return Err(LauncherFsError::PermissionDenied),
            PathClass::Candidate => {
                let id = resolver::resolve(path)?;
                let entry = self.registry.lookup_or_evict(id)?;
                if !read_only {
                    return Err(LauncherFsError::PermissionDenied);
                }
                Session::Entry {
                    id,
                    file: Arc::clone(entry.file()),
                }
            }
        };

        let fh = self.sessions.insert(session);
        debug!(path, fh, "opened");
        Ok(fh)
    }

    /// Reads up to `size` bytes at `offset`.
    pub fn read(&self, path: &str, fh: u64, offset: u64, size: usize) -> FsResult<Vec<u8>> {
        match resolver::classify(path) {
            PathClass::Root => Err(LauncherFsError::IsDirectory),
            PathClass::Listing => {
                let listing = self.registry.render_listing();
                if offset > listing.len() as u64 {
                    return Err(LauncherFsError::Io(io::Error::from_raw_os_error(libc::EIO)));
                }
                Ok(window(&listing, offset, size).to_vec())
            }
            PathClass::Registration => Ok(window(REGISTER_MESSAGE.as_bytes(), offset, size).to_vec()),
            PathClass::Candidate => {
                let id = resolver::resolve(path)?;
                self.registry.lookup_or_evict(id)?;
                self.read_entry(id, fh, offset, size)
            }
        }
    }

    fn read_entry(&self, id: EntryId, fh: u64, offset: u64, size: usize) -> FsResult<Vec<u8>> {
        let file = self
            .sessions
            .get(fh)
            .and_then(|session| session.entry_file().map(Arc::clone))
            .ok_or(LauncherFsError::InvalidHandle(fh))?;

        let mut buf = vec![0u8; size];
        let n = read_full_at(&file, &mut buf, offset)?;
        buf.truncate(n);
        blank_magic_bytes(&mut buf, offset);

        trace!(%id, fh, offset, requested = size, read = n, "read registered file");
        Ok(buf)
    }

    /// Appends `data` to a registration handle's buffer.
    pub fn write(&self, path: &str, fh: u64, data: &[u8]) -> FsResult<usize> {
        if resolver::classify(path) != PathClass::Registration {
            return Err(LauncherFsError::NotFound);
        }

        let mut session = self
            .sessions
            .get_mut(fh)
            .ok_or(LauncherFsError::InvalidHandle(fh))?;
        let buffer = session
            .as_registration_mut()
            .ok_or(LauncherFsError::InvalidHandle(fh))?;
        buffer.append(data);
        Ok(data.len())
    }

    /// Truncation is accepted (and ignored) only on the registration file.
    pub fn truncate(&self, path: &str) -> FsResult<()> {
        if resolver::classify(path) == PathClass::Registration {
            Ok(())
        } else {
            Err(LauncherFsError::OperationNotPermitted)
        }
    }

    /// Releases a handle.
    ///
    /// Closing a registration handle registers every buffered path. Outcomes
    /// are logged only; there is no caller left to report them to.
    pub fn release(&self, path: &str, fh: u64) {
        let Some(session) = self.sessions.remove(fh) else {
            trace!(path, fh, "release of unknown handle");
            return;
        };

        let buffer = match session {
            Session::Registration(buffer) => buffer,
            Session::Entry { id, .. } => {
                debug!(%id, fh, "released registered file");
                return;
            }
            Session::Listing => {
                debug!(path, fh, "released");
                return;
            }
        };

        for requested in buffer.requested_paths() {
            match self.registry.register(&requested) {
                Ok(id) => debug!(%id, path = %requested.display(), "registered via control file"),
                Err(LauncherFsError::AlreadyRegistered(id)) => {
                    info!(%id, path = %requested.display(), "AppImage already registered");
                }
                Err(e) => {
                    error!(path = %requested.display(), error = %e, "Failed to register AppImage");
                }
            }
        }
    }

    fn synthetic_attr(&self, ino: u64, kind: FileType, perm: u16, size: u64) -> FileAttr {
        let time = self.context.created_at;
        FileAttr {
            ino,
            size,
            blocks: size.div_ceil(u64::from(BLOCK_SIZE)),
            atime: time,
            mtime: time,
            ctime: time,
            crtime: time,
            kind,
            perm,
            nlink: if kind == FileType::Directory { 2 } else { 1 },
            uid: self.context.uid,
            gid: self.context.gid,
            rdev: 0,
            blksize: BLOCK_SIZE,
            flags: 0,
        }
    }

    fn entry_attr(id: EntryId, metadata: &Metadata) -> FileAttr {
        let mtime = timestamp(metadata.mtime(), metadata.mtime_nsec());
        FileAttr {
            ino: inode_for_id(id),
            size: metadata.len(),
            blocks: metadata.blocks(),
            atime: timestamp(metadata.atime(), metadata.atime_nsec()),
            mtime,
            ctime: timestamp(metadata.ctime(), metadata.ctime_nsec()),
            crtime: metadata.created().unwrap_or(mtime),
            kind: FileType::RegularFile,
            perm: ENTRY_PERM,
            nlink: 1,
            uid: metadata.uid(),
            gid: metadata.gid(),
            rdev: 0,
            blksize: u32::try_from(metadata.blksize()).unwrap_or(BLOCK_SIZE),
            flags: 0,
        }
    }
}


/// Property-based tests using proptest.
#[cfg(test)]
mod proptest_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Blanking a window equals blanking the whole file and slicing.
        #[test]
        fn blanking_window_matches_whole_file(
            content in prop::collection::vec(any::<u8>(), 0..64),
            offset in 0usize..64,
            len in 0usize..64,
        ) {
            let mut reference = content.clone();
            blank_magic_bytes(&mut reference, 0);

            let start = offset.min(content.len());
            let end = (start + len).min(content.len());
            let mut window = content[start..end].to_vec();
            blank_magic_bytes(&mut window, start as u64);

            prop_assert_eq!(&window[..], &reference[start..end]);
        }

        /// Bytes outside the marker range are never touched.
        #[test]
        fn blanking_preserves_other_bytes(
            content in prop::collection::vec(1u8..=255, 0..64),
            offset in 0u64..64,
        ) {
            let mut buf = content.clone();
            blank_magic_bytes(&mut buf, offset);
            for (i, (before, after)) in content.iter().zip(&buf).enumerate() {
                let pos = offset + i as u64;
                if MAGIC_BYTES.contains(&pos) {
                    prop_assert_eq!(*after, 0);
                } else {
                    prop_assert_eq!(after, before);
                }
            }
        }
    }
}
