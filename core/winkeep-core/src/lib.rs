//! # winkeep-core
//!
//! Launches applications and puts their first new window back where it was
//! last seen.
//!
//! ## Design Principles
//!
//! - **Threads, not async**: one short-lived tracker thread per launch and one
//!   refresh thread per manager.
//! - **Never fatal**: launch, workspace and cleanup calls log failures and
//!   degrade; only internal seams return [`Result`].
//! - **Capabilities over probing**: one [`PlatformAdapter`] per display server,
//!   chosen once at startup.
//! - **Scoped store access**: the SQLite store opens a connection per operation.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use winkeep_core::{load_config, LaunchManager};
//!
//! let manager = LaunchManager::open(load_config(None)?)?;
//! let handle = manager.launch_with_state("gnome-terminal", None);
//! println!("pid {:?}, instance {}", handle.pid, handle.instance_id);
//! ```

pub mod config;
pub mod error;
pub mod geometry;
pub mod launcher;
pub mod manager;
pub mod matcher;
pub mod platform;
pub mod process;
pub mod refresh;
pub mod registry;
pub mod snapshot;
pub mod store;
pub mod tracker;
pub mod types;

#[cfg(test)]
mod testing;

pub use config::{load_config, Config};
pub use error::{Result, WinkeepError};
pub use launcher::{derive_app_name, ProcessLauncher, ShellLauncher, SpawnedProcess};
pub use manager::{LaunchHandle, LaunchManager};
pub use platform::{
    create_platform_adapter, detect_display_server, DisplayServer, PlatformAdapter,
};
pub use process::{ProcessInspector, SysinfoInspector};
pub use store::{InstanceRuntime, SqliteStore, StateStore};
pub use tracker::TrackOutcome;
pub use types::*;
