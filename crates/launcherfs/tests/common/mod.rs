//! Test mount harness for FUSE integration tests.
//!
//! Provides `TestMount`, which mounts a fresh launcher filesystem in a
//! temporary directory and unmounts it on drop.

// Not all tests use all TestMount methods
#![allow(dead_code)]

use fuser::{BackgroundSession, MountOption};
use launcherfs::dispatcher::Dispatcher;
use launcherfs::{ExecutorConfig, LauncherFs, MountContext, Registry, RequestExecutor};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// How long to wait for mount to become ready.
const MOUNT_READY_TIMEOUT: Duration = Duration::from_secs(5);

/// How long to wait between readiness checks.
const MOUNT_CHECK_INTERVAL: Duration = Duration::from_millis(100);

/// A mounted launcher filesystem backed by a temporary directory.
pub struct TestMount {
    /// The FUSE session (unmounts on drop).
    _session: BackgroundSession,
    /// Path where the filesystem is mounted.
    pub mount_path: PathBuf,
    /// Registry shared with the mounted filesystem.
    pub registry: Arc<Registry>,
    /// Scratch directory for backing files.
    pub scratch: TempDir,
    _temp_mount: TempDir,
}

impl TestMount {
    /// Mounts an empty filesystem served by a small worker pool.
    pub fn new() -> Result<Self, String> {
        let scratch = TempDir::new().map_err(|e| format!("Failed to create temp dir: {e}"))?;
        let temp_mount = TempDir::new().map_err(|e| format!("Failed to create temp dir: {e}"))?;
        let mount_path = temp_mount.path().join("mnt");
        fs::create_dir(&mount_path).map_err(|e| format!("Failed to create mount point: {e}"))?;

        let registry = Arc::new(Registry::new());
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&registry),
            MountContext::current(mount_path.clone()),
        ));
        let executor = RequestExecutor::new(&ExecutorConfig::default().with_workers(4));
        let fs = LauncherFs::new(dispatcher, executor, Duration::ZERO);

        let options = vec![
            MountOption::FSName("appimagelauncherfs-test".to_string()),
            MountOption::DefaultPermissions,
            MountOption::AutoUnmount,
        ];

        let session = fuser::spawn_mount2(fs, &mount_path, &options)
            .map_err(|e| format!("Failed to mount: {e}"))?;

        wait_for_mount(&mount_path)?;

        Ok(Self {
            _session: session,
            mount_path,
            registry,
            scratch,
            _temp_mount: temp_mount,
        })
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.mount_path.join(relative.trim_start_matches('/'))
    }

    /// Writes an AppImage-like file into the scratch directory.
    pub fn create_backing_file(&self, name: &str, payload: &[u8]) -> PathBuf {
        let path = self.scratch.path().join(name);
        let mut content = b"\x7fELF\x02\x01\x01\x00AI\x02\x00\x00\x00\x00\x00".to_vec();
        content.extend_from_slice(payload);
        fs::write(&path, content).expect("failed to write backing file");
        path
    }

    /// Writes `paths` into the registration file and closes it.
    pub fn register(&self, paths: &[&Path]) -> io::Result<()> {
        let mut file = fs::OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(self.path("register"))?;
        for path in paths {
            writeln!(file, "{}", path.display())?;
        }
        Ok(())
    }

    pub fn list(&self) -> io::Result<Vec<String>> {
        let mut names: Vec<String> = fs::read_dir(&self.mount_path)?
            .filter_map(Result::ok)
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        Ok(names)
    }

    /// Polls until `count` files are registered.
    ///
    /// Release is asynchronous in FUSE, so `close()` returns before the
    /// registration has been processed.
    pub fn wait_for_registrations(&self, count: usize) -> bool {
        let deadline = Instant::now() + MOUNT_READY_TIMEOUT;
        while Instant::now() < deadline {
            if self.registry.len() >= count {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        false
    }
}

fn wait_for_mount(mount_path: &Path) -> Result<(), String> {
    let deadline = Instant::now() + MOUNT_READY_TIMEOUT;
    while Instant::now() < deadline {
        if mount_path.join("map").exists() {
            return Ok(());
        }
        thread::sleep(MOUNT_CHECK_INTERVAL);
    }
    Err(format!("Mount at {} not ready", mount_path.display()))
}

/// Whether FUSE can be used on this system.
pub fn fuse_available() -> bool {
    Path::new("/dev/fuse").exists()
}

/// Skip test if FUSE is not available.
#[macro_export]
macro_rules! skip_if_no_fuse {
    () => {
        if !$crate::common::fuse_available() {
            eprintln!("Skipping test: FUSE not available on this system");
            return;
        }
    };
}

/// Skip test if mounting fails (common in CI environments).
#[macro_export]
macro_rules! require_mount {
    ($mount_result:expr) => {
        match $mount_result {
            Ok(m) => m,
            Err(e) => {
                eprintln!("Skipping test: {}", e);
                return;
            }
        }
    };
}
