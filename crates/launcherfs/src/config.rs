//! Mount configuration.
//!
//! Defaults match a per-user session daemon: mount under the user's runtime
//! directory, scan `~/Applications`, serve requests on a worker pool.
//! [`MountConfig::from_env`] applies the environment overrides, and the
//! binary layers its command-line flags on top with the builder setters.

use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable enabling diagnostic mode (any value).
pub const DEBUG_ENV: &str = "DEBUG";

/// Environment variable overriding the mount point.
pub const MOUNTPOINT_ENV: &str = "LAUNCHERFS_MOUNTPOINT";

/// Environment variable overriding the integration directory.
pub const INTEGRATION_DIR_ENV: &str = "LAUNCHERFS_INTEGRATION_DIR";

/// Attribute cache lifetime handed to the kernel.
///
/// Short, because the listing size changes with every registration.
pub const DEFAULT_ATTR_TTL: Duration = Duration::from_secs(1);

/// How long a readdir of an existing mount may take before it is
/// considered stale.
pub const DEFAULT_PROBE_TIMEOUT: Duration = launcherfs_mount::DEFAULT_ACCESS_TIMEOUT;

/// Configuration options for the filesystem.
#[derive(Debug, Clone)]
pub struct MountConfig {
    /// Mount point. `None` uses `/run/user/<uid>/appimagelauncherfs/`.
    pub mountpoint: Option<PathBuf>,

    /// Directory scanned for AppImages at startup. `None` uses
    /// `$HOME/Applications`.
    pub integration_dir: Option<PathBuf>,

    /// Serve every request on the FUSE session thread and log verbosely.
    pub single_threaded: bool,

    /// Worker threads used when not single-threaded.
    ///
    /// Default: number of CPUs.
    pub worker_threads: usize,

    /// Time-to-live for attributes and entries returned to the kernel.
    pub attr_ttl: Duration,

    /// Timeout for the liveness probe of an existing mount.
    pub probe_timeout: Duration,
}

impl Default for MountConfig {
    fn default() -> Self {
        Self {
            mountpoint: None,
            integration_dir: None,
            single_threaded: false,
            worker_threads: num_cpus::get(),
            attr_ttl: DEFAULT_ATTR_TTL,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }
}

impl MountConfig {
    /// Default configuration with environment overrides applied.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var_os(key))
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<OsString>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.is_empty()).map(PathBuf::from);

        Self {
            mountpoint: non_empty(MOUNTPOINT_ENV),
            integration_dir: non_empty(INTEGRATION_DIR_ENV),
            single_threaded: lookup(DEBUG_ENV).is_some(),
            ..Self::default()
        }
    }

    /// Sets the mount point.
    #[must_use]
    pub fn mountpoint(mut self, path: impl Into<PathBuf>) -> Self {
        self.mountpoint = Some(path.into());
        self
    }

    /// Sets the integration directory.
    #[must_use]
    pub fn integration_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.integration_dir = Some(path.into());
        self
    }

    /// Enables or disables single-threaded diagnostic mode.
    #[must_use]
    pub fn single_threaded(mut self, enabled: bool) -> Self {
        self.single_threaded = enabled;
        self
    }

    /// Sets the number of worker threads.
    #[must_use]
    pub fn worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = threads;
        self
    }

    /// Sets the attribute TTL.
    #[must_use]
    pub fn attr_ttl(mut self, ttl: Duration) -> Self {
        self.attr_ttl = ttl;
        self
    }

    /// Sets the liveness probe timeout.
    #[must_use]
    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Workers the request executor should start. Zero means inline.
    pub fn effective_workers(&self) -> usize {
        if self.single_threaded {
            0
        } else {
            self.worker_threads
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<OsString> {
        let vars: HashMap<String, OsString> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), OsString::from(v)))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = MountConfig::default();
        assert!(config.mountpoint.is_none());
        assert!(config.integration_dir.is_none());
        assert!(!config.single_threaded);
        assert_eq!(config.attr_ttl, Duration::from_secs(1));
        assert_eq!(config.probe_timeout, Duration::from_millis(500));
        assert!(config.worker_threads >= 1);
    }

    #[test]
    fn test_env_overrides() {
        let config = MountConfig::from_lookup(lookup_from(&[
            ("DEBUG", "1"),
            ("LAUNCHERFS_MOUNTPOINT", "/tmp/mnt"),
            ("LAUNCHERFS_INTEGRATION_DIR", "/tmp/apps"),
        ]));
        assert!(config.single_threaded);
        assert_eq!(config.mountpoint, Some(PathBuf::from("/tmp/mnt")));
        assert_eq!(config.integration_dir, Some(PathBuf::from("/tmp/apps")));
        assert_eq!(config.effective_workers(), 0);
    }

    #[test]
    fn test_debug_with_empty_value_still_enables() {
        let config = MountConfig::from_lookup(lookup_from(&[("DEBUG", "")]));
        assert!(config.single_threaded);
    }

    #[test]
    fn test_empty_paths_are_ignored() {
        let config = MountConfig::from_lookup(lookup_from(&[("LAUNCHERFS_MOUNTPOINT", "")]));
        assert!(config.mountpoint.is_none());
        assert!(!config.single_threaded);
    }

    #[test]
    fn test_builder_pattern() {
        let config = MountConfig::default()
            .mountpoint("/mnt/x")
            .integration_dir("/apps")
            .worker_threads(3)
            .attr_ttl(Duration::from_secs(5))
            .probe_timeout(Duration::from_millis(50));
        assert_eq!(config.mountpoint, Some(PathBuf::from("/mnt/x")));
        assert_eq!(config.integration_dir, Some(PathBuf::from("/apps")));
        assert_eq!(config.effective_workers(), 3);
        assert_eq!(config.attr_ttl, Duration::from_secs(5));
        assert_eq!(config.probe_timeout, Duration::from_millis(50));

        let config = config.single_threaded(true);
        assert_eq!(config.effective_workers(), 0);
    }
}
