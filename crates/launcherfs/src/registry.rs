//! In-memory registry of AppImages exposed by the filesystem.
//!
//! Entries are keyed by a numeric [`EntryId`] that is handed out once and
//! never reused. Paths are compared by canonical form, so a file can only be
//! registered once no matter how it is spelled. Every entry holds a read-only
//! handle on its file, which keeps the inode alive for open readers even
//! after the path is deleted.
//!
//! All operations run under one mutex. The registry is small and rarely
//! mutated, so a single lock keeps the duplicate-path scan and the insert
//! atomic without any finer bookkeeping. Opening a file happens before the
//! lock is taken.

use crate::error::{FsResult, LauncherFsError};
use crate::resolver::filename_for_id;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Numeric id of a registered file.
///
/// Displays zero-padded to four digits, matching the synthetic file names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(pub u32);

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}", self.0)
    }
}

/// One registered file.
#[derive(Debug, Clone)]
pub struct RegistryEntry {
    id: EntryId,
    path: PathBuf,
    file: Arc<File>,
}

impl RegistryEntry {
    pub fn id(&self) -> EntryId {
        self.id
    }

    /// Canonical path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read-only handle opened at registration time.
    pub fn file(&self) -> &Arc<File> {
        &self.file
    }

    /// Whether the backing path still names a regular file.
    pub fn exists_on_disk(&self) -> bool {
        self.path.is_file()
    }
}

/// Opens `path` for reading without blocking and checks it is a regular file.
///
/// `O_NONBLOCK` keeps a FIFO swapped in after the type check from stalling
/// the open. It has no effect on reads of regular files.
fn open_regular(path: &Path) -> FsResult<File> {
    let not_regular = || LauncherFsError::CouldNotOpen {
        path: path.to_path_buf(),
        source: io::Error::from_raw_os_error(libc::EINVAL),
    };

    let metadata = fs::metadata(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => LauncherFsError::NotFound,
        _ => LauncherFsError::Io(e),
    })?;
    if !metadata.is_file() {
        return Err(not_regular());
    }

    let mut options = OpenOptions::new();
    options.read(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.custom_flags(libc::O_NONBLOCK);
    }
    let file = options
        .open(path)
        .map_err(|source| LauncherFsError::CouldNotOpen {
            path: path.to_path_buf(),
            source,
        })?;

    match file.metadata() {
        Ok(held) if held.is_file() => Ok(file),
        Ok(_) => Err(not_regular()),
        Err(e) => Err(LauncherFsError::Io(e)),
    }
}

#[derive(Debug, Default)]
struct RegistryInner {
    entries: HashMap<EntryId, RegistryEntry>,
    next_id: u32,
}

impl RegistryInner {
    /// Linear scan for an entry with `path`.
    ///
    /// Ids are independent of path identity, so every entry has to be looked at.
    fn find_by_path(&self, path: &Path) -> FsResult<Option<EntryId>> {
        let mut found: Option<EntryId> = None;
        for (id, entry) in &self.entries {
            if entry.path != path {
                continue;
            }
            if let Some(first) = found {
                let (first, second) = (first.min(*id), first.max(*id));
                error!(%first, %second, path = %path.display(), "Two registry entries share one path");
                return Err(LauncherFsError::DuplicateRegisteredEntry { first, second });
            }
            found = Some(*id);
        }
        Ok(found)
    }

    fn evict(&mut self, id: EntryId) {
        if let Some(entry) = self.entries.remove(&id) {
            info!(%id, path = %entry.path.display(), "Evicted registered file missing from disk");
        }
    }

    fn evict_stale(&mut self) {
        let stale: Vec<EntryId> = self
            .entries
            .values()
            .filter(|entry| !entry.exists_on_disk())
            .map(RegistryEntry::id)
            .collect();
        for id in stale {
            self.evict(id);
        }
    }
}

#[cfg(unix)]
fn path_bytes(path: &Path) -> std::borrow::Cow<'_, [u8]> {
    use std::os::unix::ffi::OsStrExt;
    std::borrow::Cow::Borrowed(path.as_os_str().as_bytes())
}

#[cfg(not(unix))]
fn path_bytes(path: &Path) -> std::borrow::Cow<'_, [u8]> {
    std::borrow::Cow::Owned(path.to_string_lossy().into_owned().into_bytes())
}

/// Mapping from [`EntryId`] to [`RegistryEntry`].
#[derive(Debug, Default)]
pub struct Registry {
    inner: Mutex<RegistryInner>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `path` and returns its new id.
    ///
    /// The file is opened before the lock is taken, so a slow open never
    /// stalls other registry users.
    ///
    /// # Errors
    ///
    /// - [`LauncherFsError::NotFound`] if `path` does not exist
    /// - [`LauncherFsError::AlreadyRegistered`] if its canonical path is registered
    /// - [`LauncherFsError::CouldNotOpen`] if it is not a regular file or cannot be opened for reading
    /// - [`LauncherFsError::DuplicateRegisteredEntry`] if the registry is inconsistent
    pub fn register(&self, path: impl AsRef<Path>) -> FsResult<EntryId> {
        let path = path.as_ref();
        let canonical = fs::canonicalize(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => LauncherFsError::NotFound,
            _ => LauncherFsError::Io(e),
        })?;

        if let Some(existing) = self.inner.lock().find_by_path(&canonical)? {
            return Err(LauncherFsError::AlreadyRegistered(existing));
        }

        let file = open_regular(&canonical)?;

        // another registration of the same path may have won while we opened
        let mut inner = self.inner.lock();
        if let Some(existing) = inner.find_by_path(&canonical)? {
            return Err(LauncherFsError::AlreadyRegistered(existing));
        }

        let id = EntryId(inner.next_id);
        inner.next_id = inner
            .next_id
            .checked_add(1)
            .ok_or_else(|| LauncherFsError::Io(io::Error::other("registry id space exhausted")))?;

        info!(%id, path = %canonical.display(), "Registered new AppImage");
        inner.entries.insert(
            id,
            RegistryEntry {
                id,
                path: canonical,
                file: Arc::new(file),
            },
        );
        Ok(id)
    }

    /// Returns the entry for `id`, evicting it if its file is gone from disk.
    pub fn lookup_or_evict(&self, id: EntryId) -> FsResult<RegistryEntry> {
        let mut inner = self.inner.lock();
        let entry = inner.entries.get(&id).ok_or(LauncherFsError::NotFound)?;
        if !entry.exists_on_disk() {
            inner.evict(id);
            return Err(LauncherFsError::NotFound);
        }
        Ok(entry.clone())
    }

    /// Renders one `"<name> -> <path>"` line per registered file.
    ///
    /// Paths are emitted as their raw bytes, so non-UTF-8 names come back
    /// exactly as they were registered. Entries whose files vanished are
    /// evicted first. Line order follows map iteration and is not stable
    /// across calls.
    pub fn render_listing(&self) -> Vec<u8> {
        let mut inner = self.inner.lock();
        inner.evict_stale();

        let mut listing = Vec::new();
        for (id, entry) in &inner.entries {
            listing.extend_from_slice(filename_for_id(*id).as_bytes());
            listing.extend_from_slice(b" -> ");
            listing.extend_from_slice(path_bytes(&entry.path).as_ref());
            listing.push(b'\n');
        }
        listing
    }

    /// Ids of all registered files whose backing file still exists.
    pub fn ids(&self) -> Vec<EntryId> {
        let mut inner = self.inner.lock();
        inner.evict_stale();
        inner.entries.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    /// Registers every regular file directly inside `dir`.
    ///
    /// Failures for individual files are logged and skipped. A missing
    /// directory registers nothing. Returns the number of new registrations.
    pub fn populate_from_dir(&self, dir: &Path) -> FsResult<usize> {
        if !dir.is_dir() {
            debug!(dir = %dir.display(), "Integration directory does not exist, nothing to register");
            return Ok(0);
        }

        let mut registered = 0;
        for dir_entry in fs::read_dir(dir)? {
            let path = match dir_entry {
                Ok(dir_entry) => dir_entry.path(),
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "Failed to read directory entry");
                    continue;
                }
            };
            if !path.is_file() {
                continue;
            }
            match self.register(&path) {
                Ok(_) => registered += 1,
                Err(LauncherFsError::AlreadyRegistered(id)) => {
                    debug!(%id, path = %path.display(), "Already registered");
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to register file");
                }
            }
        }
        Ok(registered)
    }
}
