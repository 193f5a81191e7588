//! FUSE adapter for the launcher filesystem.
//!
//! Translates fuser's inode-based callbacks into the path-based
//! [`Dispatcher`] handlers. Inodes are computed from paths (see
//! [`crate::inode`]), so there is no inode table and `forget` needs no
//! bookkeeping.
//!
//! Handlers that may block on disk (`read`, `release`) run on the
//! [`RequestExecutor`] and reply from the worker thread. Everything else is
//! answered on the session thread.

use crate::dispatcher::Dispatcher;
use crate::error::LauncherFsError;
use crate::executor::RequestExecutor;
use crate::inode::{self, ROOT_INODE};
use fuser::{
    FileType, Filesystem, KernelConfig, ReplyAttr, ReplyData, ReplyDirectory, ReplyEmpty,
    ReplyEntry, ReplyOpen, ReplyStatfs, ReplyWrite, Request, TimeOrNow,
};
use libc::c_int;
use std::ffi::OsStr;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, info, trace};

/// Longest file name reported by `statfs`.
const NAME_MAX: u32 = 255;

/// Block size reported by `statfs`.
const STATFS_BLOCK_SIZE: u32 = 4096;

/// The fuser [`Filesystem`] implementation.
#[derive(Debug)]
pub struct LauncherFs {
    dispatcher: Arc<Dispatcher>,
    executor: RequestExecutor,
    attr_ttl: Duration,
}

impl LauncherFs {
    pub fn new(dispatcher: Arc<Dispatcher>, executor: RequestExecutor, attr_ttl: Duration) -> Self {
        Self {
            dispatcher,
            executor,
            attr_ttl,
        }
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Resolves an inode to its virtual path, or `ENOENT`.
    fn path(ino: u64) -> Result<String, c_int> {
        inode::path_for_inode(ino).ok_or(libc::ENOENT)
    }
}

fn errno(e: &LauncherFsError) -> c_int {
    e.to_errno()
}

impl Filesystem for LauncherFs {
    fn init(&mut self, _req: &Request<'_>, _config: &mut KernelConfig) -> Result<(), c_int> {
        info!(
            mountpoint = %self.dispatcher.context().mountpoint.display(),
            workers = self.executor.worker_count(),
            registered = self.dispatcher.registry().len(),
            "FUSE filesystem initialized"
        );
        Ok(())
    }

    fn destroy(&mut self) {
        // replies still queued on workers must reach the kernel before exit
        self.executor.shutdown();
        info!(
            submitted = self.executor.stats().submitted(),
            completed = self.executor.stats().completed(),
            inline = self.executor.stats().inline(),
            "FUSE filesystem destroyed"
        );
    }

    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let Some(name) = name.to_str() else {
            reply.error(libc::ENOENT);
            return;
        };
        trace!(parent, name, "lookup");

        if parent != ROOT_INODE {
            reply.error(libc::ENOENT);
            return;
        }

        let path = format!("/{name}");
        if inode::inode_for_path(&path).is_none() {
            reply.error(libc::ENOENT);
            return;
        }
        match self.dispatcher.getattr(&path) {
            Ok(attr) => reply.entry(&self.attr_ttl, &attr, 0),
            Err(e) => reply.error(errno(&e)),
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        trace!(inode = ino, "getattr");

        let result = Self::path(ino)
            .and_then(|path| self.dispatcher.getattr(&path).map_err(|e| errno(&e)));
        match result {
            Ok(attr) => reply.attr(&self.attr_ttl, &attr),
            Err(code) => reply.error(code),
        }
    }

    /// Only size changes are meaningful, and only the registration file
    /// accepts them (as a no-op, so `echo path > register` works).
    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        trace!(inode = ino, mode = ?mode, uid = ?uid, gid = ?gid, size = ?size, "setattr");

        let path = match Self::path(ino) {
            Ok(path) => path,
            Err(code) => {
                reply.error(code);
                return;
            }
        };

        let result = if size.is_some() {
            self.dispatcher.truncate(&path)
        } else if mode.is_some() || uid.is_some() || gid.is_some() || atime.is_some() || mtime.is_some() {
            Err(LauncherFsError::OperationNotPermitted)
        } else {
            Ok(())
        };

        match result.and_then(|()| self.dispatcher.getattr(&path)) {
            Ok(attr) => reply.attr(&self.attr_ttl, &attr),
            Err(e) => reply.error(errno(&e)),
        }
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        trace!(inode = ino, flags, "open");

        let result = Self::path(ino)
            .and_then(|path| self.dispatcher.open(&path, flags).map_err(|e| errno(&e)));
        match result {
            Ok(fh) => reply.opened(fh, 0),
            Err(code) => reply.error(code),
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        trace!(inode = ino, fh, offset, size, "read");

        let path = match Self::path(ino) {
            Ok(path) => path,
            Err(code) => {
                reply.error(code);
                return;
            }
        };
        let Ok(offset) = u64::try_from(offset) else {
            reply.error(libc::EINVAL);
            return;
        };

        let dispatcher = Arc::clone(&self.dispatcher);
        self.executor.execute(move || {
            match dispatcher.read(&path, fh, offset, size as usize) {
                Ok(data) => reply.data(&data),
                Err(e) => reply.error(errno(&e)),
            }
        });
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        trace!(inode = ino, fh, offset, len = data.len(), "write");

        let result = Self::path(ino)
            .and_then(|path| self.dispatcher.write(&path, fh, data).map_err(|e| errno(&e)));
        match result {
            Ok(written) => reply.written(u32::try_from(written).unwrap_or(u32::MAX)),
            Err(code) => reply.error(code),
        }
    }

    fn flush(&mut self, _req: &Request<'_>, ino: u64, fh: u64, _lock_owner: u64, reply: ReplyEmpty) {
        trace!(inode = ino, fh, "flush");
        reply.ok();
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        trace!(inode = ino, fh, "release");

        let path = Self::path(ino).unwrap_or_default();
        let dispatcher = Arc::clone(&self.dispatcher);
        self.executor.execute(move || {
            dispatcher.release(&path, fh);
            reply.ok();
        });
    }

    fn opendir(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        trace!(inode = ino, "opendir");

        match ino {
            ROOT_INODE => reply.opened(0, 0),
            ino if inode::path_for_inode(ino).is_some() => reply.error(libc::ENOTDIR),
            _ => reply.error(libc::ENOENT),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        trace!(inode = ino, offset, "readdir");

        let entries = match Self::path(ino)
            .and_then(|path| self.dispatcher.read_dir(&path).map_err(|e| errno(&e)))
        {
            Ok(entries) => entries,
            Err(code) => {
                reply.error(code);
                return;
            }
        };

        let skip = usize::try_from(offset).unwrap_or(0);
        for (index, entry) in entries.iter().enumerate().skip(skip) {
            let next_offset = i64::try_from(index + 1).unwrap_or(i64::MAX);
            if reply.add(entry.ino, next_offset, entry.kind, &entry.name) {
                debug!(inode = ino, index, "readdir buffer full");
                break;
            }
        }
        reply.ok();
    }

    fn releasedir(&mut self, _req: &Request<'_>, ino: u64, _fh: u64, _flags: i32, reply: ReplyEmpty) {
        trace!(inode = ino, "releasedir");
        reply.ok();
    }

    fn access(&mut self, _req: &Request<'_>, ino: u64, mask: i32, reply: ReplyEmpty) {
        trace!(inode = ino, mask, "access");

        // permission bits are enforced by the kernel (DefaultPermissions)
        let result = Self::path(ino)
            .and_then(|path| self.dispatcher.getattr(&path).map_err(|e| errno(&e)));
        match result {
            Ok(attr) if mask & libc::W_OK != 0 && attr.kind == FileType::Directory => {
                reply.error(libc::EACCES);
            }
            Ok(_) => reply.ok(),
            Err(code) => reply.error(code),
        }
    }

    fn statfs(&mut self, _req: &Request<'_>, _ino: u64, reply: ReplyStatfs) {
        // root, map and register plus one node per registered file
        let files = self.dispatcher.registry().len() as u64 + 3;
        reply.statfs(0, 0, 0, files, 0, STATFS_BLOCK_SIZE, NAME_MAX, STATFS_BLOCK_SIZE);
    }
}
