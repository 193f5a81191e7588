//! FUSE filesystem exposing registered AppImages under stable synthetic names.
//!
//! Each registered file appears at the mount root as `<id>.AppImage`, with a
//! zero-padded decimal id (`0000.AppImage`, `0001.AppImage`, ...). Reads
//! return the backing file's bytes with the AppImage magic marker zeroed, so
//! the virtual copies are not detected as AppImages themselves. Two control
//! files sit next to them:
//!
//! - `map` lists `<name> -> <absolute path>` for every registered file
//! - `register` accepts absolute paths, one per line; they are registered
//!   when the writing handle is closed
//!
//! # Usage
//!
//! ```ignore
//! use launcherfs::{MountConfig, MountLifecycle};
//!
//! let lifecycle = MountLifecycle::new(MountConfig::from_env());
//! let exit_code = lifecycle.run()?;
//! ```

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod filesystem;
pub mod handles;
pub mod inode;
pub mod lifecycle;
pub mod registry;
pub mod resolver;

pub use config::MountConfig;
pub use dispatcher::{blank_magic_bytes, DirEntry, Dispatcher, MAGIC_BYTES, REGISTER_MESSAGE};
pub use error::{FsResult, LauncherFsError};
pub use executor::{ExecutorConfig, ExecutorStats, RequestExecutor};
pub use filesystem::LauncherFs;
pub use handles::{RegistrationBuffer, Session, SessionTable};
pub use inode::ROOT_INODE;
pub use lifecycle::{default_mountpoint, MountContext, MountLifecycle, EXIT_ALREADY_RUNNING};
pub use registry::{EntryId, Registry, RegistryEntry};
