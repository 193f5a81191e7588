//! Mount point preparation and the blocking serve loop.
//!
//! One instance serves a deterministic per-user mount point. Before
//! mounting, [`MountLifecycle::run`] classifies whatever is already at that
//! path: a responsive instance of ours is reported as
//! [`LauncherFsError::AlreadyRunning`], a hung or disconnected one is torn
//! down, and a foreign filesystem is left alone.

use crate::config::MountConfig;
use crate::dispatcher::Dispatcher;
use crate::error::{FsResult, LauncherFsError};
use crate::executor::{ExecutorConfig, RequestExecutor};
use crate::filesystem::LauncherFs;
use crate::registry::Registry;
use fuser::MountOption;
use launcherfs_mount::{check_mountpoint_status, force_unmount, lazy_unmount, MountPointStatus, FSNAME, SUBTYPE};
use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, error, info, warn};

/// Directory name under the user's runtime directory.
pub const MOUNT_DIR_NAME: &str = "appimagelauncherfs";

/// Permissions of the mount point directory (rwxr-x---).
pub const MOUNTPOINT_MODE: u32 = 0o750;

/// Directory under `$HOME` scanned for AppImages at startup.
pub const INTEGRATION_DIR_NAME: &str = "Applications";

/// Process exit code when another instance already serves the mount point.
pub const EXIT_ALREADY_RUNNING: i32 = libc::EBUSY;

/// Identity and timestamps shared by every synthetic node.
#[derive(Debug, Clone)]
pub struct MountContext {
    pub mountpoint: PathBuf,
    /// Reported as every time of the root and the control files.
    pub created_at: SystemTime,
    pub uid: u32,
    pub gid: u32,
}

impl MountContext {
    /// Context for the current process at `mountpoint`.
    pub fn current(mountpoint: PathBuf) -> Self {
        Self {
            mountpoint,
            created_at: SystemTime::now(),
            uid: nix::unistd::getuid().as_raw(),
            gid: nix::unistd::getgid().as_raw(),
        }
    }
}

/// `/run/user/<uid>/appimagelauncherfs/`
pub fn default_mountpoint(uid: u32) -> PathBuf {
    PathBuf::from(format!("/run/user/{uid}/{MOUNT_DIR_NAME}/"))
}

/// `$HOME/Applications`, falling back to the passwd entry when `HOME` is unset.
pub fn default_integration_dir() -> Option<PathBuf> {
    let home = std::env::var_os("HOME")
        .filter(|h| !h.is_empty())
        .map(PathBuf::from)
        .or_else(|| {
            nix::unistd::User::from_uid(nix::unistd::getuid())
                .ok()
                .flatten()
                .map(|user| user.dir)
        })?;
    Some(home.join(INTEGRATION_DIR_NAME))
}

/// Owns the configuration and registry of one mount.
#[derive(Debug)]
pub struct MountLifecycle {
    config: MountConfig,
    context: MountContext,
    integration_dir: Option<PathBuf>,
    registry: Arc<Registry>,
}

impl MountLifecycle {
    pub fn new(config: MountConfig) -> Self {
        let uid = nix::unistd::getuid().as_raw();
        let mountpoint = config
            .mountpoint
            .clone()
            .unwrap_or_else(|| default_mountpoint(uid));
        let integration_dir = config
            .integration_dir
            .clone()
            .or_else(default_integration_dir);

        Self {
            context: MountContext::current(mountpoint),
            integration_dir,
            config,
            registry: Arc::new(Registry::new()),
        }
    }

    pub fn mountpoint(&self) -> &Path {
        &self.context.mountpoint
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Prepares the mount point, registers the integration directory and
    /// serves requests until the filesystem is unmounted.
    ///
    /// Returns the process exit code: 0 after a clean unmount, the OS errno
    /// if the serve loop failed.
    ///
    /// # Errors
    ///
    /// - [`LauncherFsError::AlreadyRunning`] if a live instance serves the mount point
    /// - [`LauncherFsError::MountpointOccupied`] if a foreign filesystem is mounted there
    /// - [`LauncherFsError::Io`] if the mount point cannot be prepared
    pub fn run(self) -> FsResult<i32> {
        self.prepare_mountpoint()?;

        if let Some(dir) = &self.integration_dir {
            let count = self.registry.populate_from_dir(dir)?;
            info!(dir = %dir.display(), count, "Registered AppImages from integration directory");
        }

        let executor = RequestExecutor::new(
            &ExecutorConfig::default().with_workers(self.config.effective_workers()),
        );
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&self.registry),
            self.context.clone(),
        ));
        let fs = LauncherFs::new(dispatcher, executor, self.config.attr_ttl);

        let options = mount_options();
        info!(
            mountpoint = %self.context.mountpoint.display(),
            single_threaded = self.config.single_threaded,
            "Mounting filesystem"
        );

        match fuser::mount2(fs, &self.context.mountpoint, &options) {
            Ok(()) => {
                info!(mountpoint = %self.context.mountpoint.display(), "Filesystem unmounted");
                Ok(0)
            }
            Err(e) => {
                error!(mountpoint = %self.context.mountpoint.display(), error = %e, "FUSE session failed");
                Ok(e.raw_os_error().unwrap_or(libc::EIO))
            }
        }
    }

    /// Lazily unmounts the mount point, stopping a running instance.
    pub fn unmount(&self) -> anyhow::Result<()> {
        lazy_unmount(&self.context.mountpoint)
    }

    fn prepare_mountpoint(&self) -> FsResult<()> {
        let mountpoint = &self.context.mountpoint;
        let status = check_mountpoint_status(mountpoint, self.config.probe_timeout);
        debug!(mountpoint = %mountpoint.display(), ?status, "Mount point status");

        match &status {
            MountPointStatus::Live => {
                return Err(LauncherFsError::AlreadyRunning(mountpoint.clone()));
            }
            MountPointStatus::Foreign { fsname } => {
                return Err(LauncherFsError::MountpointOccupied {
                    path: mountpoint.clone(),
                    fsname: fsname.clone(),
                });
            }
            MountPointStatus::NotADirectory => {
                return Err(LauncherFsError::Io(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("{} exists and is not a directory", mountpoint.display()),
                )));
            }
            MountPointStatus::Absent
            | MountPointStatus::Leftover
            | MountPointStatus::Stale
            | MountPointStatus::Unknown { .. } => {}
        }

        if status.needs_unmount() {
            warn!(mountpoint = %mountpoint.display(), ?status, "Cleaning up stale mount");
            if let Err(e) = force_unmount(mountpoint) {
                warn!(mountpoint = %mountpoint.display(), error = %e, "Failed to unmount stale mount");
            }
        }

        recreate_mountpoint(mountpoint)
    }
}

/// Removes a leftover mount point directory and creates a fresh one.
///
/// A non-empty leftover directory is kept as is.
fn recreate_mountpoint(mountpoint: &Path) -> FsResult<()> {
    match fs::remove_dir(mountpoint) {
        Ok(()) => debug!(mountpoint = %mountpoint.display(), "Removed leftover mount point"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(mountpoint = %mountpoint.display(), error = %e, "Failed to remove leftover mount point"),
    }

    fs::create_dir_all(mountpoint)?;
    fs::set_permissions(mountpoint, fs::Permissions::from_mode(MOUNTPOINT_MODE))?;
    Ok(())
}

fn mount_options() -> Vec<MountOption> {
    vec![
        MountOption::FSName(FSNAME.to_string()),
        MountOption::Subtype(SUBTYPE.to_string()),
        MountOption::DefaultPermissions,
        MountOption::RW,
        MountOption::Exec,
    ]
}
