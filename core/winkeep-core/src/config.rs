//! Runtime configuration loaded from `~/.config/winkeep/config.toml`.
//!
//! Every field has a default, so a missing file or a partial file is valid.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, WinkeepError};

const CONFIG_RELATIVE_PATH: &str = "winkeep/config.toml";
const DB_RELATIVE_PATH: &str = "winkeep/state.db";

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub tracker: TrackerConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
    #[serde(default)]
    pub platform: PlatformConfig,
    #[serde(default)]
    pub launcher: LauncherConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct TrackerConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    #[serde(default = "default_slow_attempts")]
    pub slow_attempts: u32,
    /// Substrings of app names that start slowly and get `slow_attempts`.
    #[serde(default = "default_slow_apps")]
    pub slow_apps: Vec<String>,
    #[serde(default = "default_readback_settle_ms")]
    pub readback_settle_ms: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            attempts: default_attempts(),
            slow_attempts: default_slow_attempts(),
            slow_apps: default_slow_apps(),
            readback_settle_ms: default_readback_settle_ms(),
        }
    }
}

impl TrackerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn readback_settle(&self) -> Duration {
        Duration::from_millis(self.readback_settle_ms)
    }

    /// Attempt budget for an app name, extended for known slow starters.
    pub fn attempts_for(&self, app_name: &str) -> u32 {
        let app_name = app_name.to_lowercase();
        let slow = self
            .slow_apps
            .iter()
            .any(|pattern| !pattern.is_empty() && app_name.contains(&pattern.to_lowercase()));
        if slow {
            self.slow_attempts.max(self.attempts)
        } else {
            self.attempts
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RefreshConfig {
    #[serde(default = "default_refresh_interval_secs")]
    pub interval_secs: u64,
    /// Consecutive failed iterations before backing off.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_backoff_secs")]
    pub backoff_secs: u64,
    #[serde(default = "default_join_timeout_ms")]
    pub join_timeout_ms: u64,
    /// Finished instances kept in memory; older ones are pruned each tick.
    #[serde(default = "default_retain_finished")]
    pub retain_finished: usize,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_refresh_interval_secs(),
            failure_threshold: default_failure_threshold(),
            backoff_secs: default_backoff_secs(),
            join_timeout_ms: default_join_timeout_ms(),
            retain_finished: default_retain_finished(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlatformChoice {
    #[default]
    Auto,
    X11,
    Wayland,
    None,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct PlatformConfig {
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,
    #[serde(default = "default_move_timeout_ms")]
    pub move_timeout_ms: u64,
    #[serde(default)]
    pub force: PlatformChoice,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            query_timeout_ms: default_query_timeout_ms(),
            move_timeout_ms: default_move_timeout_ms(),
            force: PlatformChoice::Auto,
        }
    }
}

impl PlatformConfig {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    pub fn move_timeout(&self) -> Duration {
        Duration::from_millis(self.move_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct LauncherConfig {
    /// Pass `--geometry` style flags to terminals that accept them.
    #[serde(default = "default_geometry_hints")]
    pub geometry_hints: bool,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            geometry_hints: default_geometry_hints(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Default)]
pub struct StoreConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl StoreConfig {
    pub fn resolve_path(&self) -> Result<PathBuf> {
        match &self.path {
            Some(path) => Ok(path.clone()),
            None => default_db_path(),
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_attempts() -> u32 {
    10
}

fn default_slow_attempts() -> u32 {
    15
}

fn default_slow_apps() -> Vec<String> {
    [
        "terminal", "konsole", "xterm", "alacritty", "kitty", "tilix", "urxvt",
    ]
    .iter()
    .map(|value| value.to_string())
    .collect()
}

fn default_readback_settle_ms() -> u64 {
    200
}

fn default_refresh_interval_secs() -> u64 {
    5
}

fn default_failure_threshold() -> u32 {
    2
}

fn default_backoff_secs() -> u64 {
    10
}

fn default_join_timeout_ms() -> u64 {
    2000
}

fn default_retain_finished() -> usize {
    crate::registry::DEFAULT_RETAIN_FINISHED
}

fn default_query_timeout_ms() -> u64 {
    2000
}

fn default_move_timeout_ms() -> u64 {
    5000
}

fn default_geometry_hints() -> bool {
    true
}

pub fn default_config_path() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|dir| dir.join(CONFIG_RELATIVE_PATH))
        .ok_or(WinkeepError::ConfigDirNotFound)
}

pub fn default_db_path() -> Result<PathBuf> {
    dirs::data_dir()
        .map(|dir| dir.join(DB_RELATIVE_PATH))
        .ok_or(WinkeepError::DataDirNotFound)
}

/// Loads configuration from `path`, or the default location when `None`.
/// A missing file yields defaults.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let config_path = match path {
        Some(path) => path.to_path_buf(),
        None => default_config_path()?,
    };

    if !config_path.exists() {
        return Ok(Config::default());
    }

    let content = fs_err::read_to_string(&config_path)
        .map_err(|err| WinkeepError::io(format!("reading {}", config_path.display()), err))?;
    toml::from_str::<Config>(&content).map_err(|err| WinkeepError::ConfigMalformed {
        path: config_path,
        details: err.to_string(),
    })
}
