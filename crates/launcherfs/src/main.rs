//! launcherfs - Serve registered AppImages under stable names over FUSE.
//!
//! Usage: launcherfs [--mountpoint <dir>] [--integration-dir <dir>] [--debug]
//!
//! Setting `DEBUG` in the environment has the same effect as `--debug`:
//! requests are served on a single thread and logging is verbose.

use anyhow::{Context, Result};
use clap::Parser;
use launcherfs::{LauncherFsError, MountConfig, MountLifecycle, EXIT_ALREADY_RUNNING};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "launcherfs")]
#[command(about = "Expose registered AppImages under stable names via FUSE")]
#[command(version)]
struct Cli {
    /// Mount point (default: /run/user/<uid>/appimagelauncherfs/)
    #[arg(long, env = "LAUNCHERFS_MOUNTPOINT")]
    mountpoint: Option<PathBuf>,

    /// Directory scanned for AppImages at startup (default: ~/Applications)
    #[arg(long, env = "LAUNCHERFS_INTEGRATION_DIR")]
    integration_dir: Option<PathBuf>,

    /// Serve requests on a single thread and enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Print the mount point and exit
    #[arg(long)]
    print_mountpoint: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = MountConfig::from_env();
    if let Some(mountpoint) = cli.mountpoint.clone() {
        config = config.mountpoint(mountpoint);
    }
    if let Some(dir) = cli.integration_dir.clone() {
        config = config.integration_dir(dir);
    }
    if cli.debug {
        config = config.single_threaded(true);
    }

    let filter = if config.single_threaded { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();

    let lifecycle = MountLifecycle::new(config);

    if cli.print_mountpoint {
        println!("{}", lifecycle.mountpoint().display());
        return ExitCode::SUCCESS;
    }

    match run(lifecycle) {
        Ok(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(lifecycle: MountLifecycle) -> Result<i32> {
    let mountpoint = lifecycle.mountpoint().to_path_buf();
    info!(mountpoint = %mountpoint.display(), "Starting launcherfs");

    match lifecycle.run() {
        Ok(code) => Ok(code),
        Err(LauncherFsError::AlreadyRunning(path)) => {
            info!(mountpoint = %path.display(), "Another instance is already running");
            Ok(EXIT_ALREADY_RUNNING)
        }
        Err(e) => Err(e).with_context(|| format!("Failed to serve {}", mountpoint.display())),
    }
}
