//! Shared data types: monitors, live windows, remembered geometry and instances.

use serde::{Deserialize, Serialize};

/// Name of the monitor substituted when the OS cannot be queried.
pub const DEFAULT_MONITOR_NAME: &str = "default";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Monitor {
    pub name: String,
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub primary: bool,
    pub connected: bool,
}

impl Monitor {
    /// The synthetic 1920x1080 monitor at the origin.
    pub fn fallback() -> Self {
        Self {
            name: DEFAULT_MONITOR_NAME.to_string(),
            x: 0,
            y: 0,
            width: 1920,
            height: 1080,
            primary: true,
            connected: true,
        }
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        let right = self.x as i64 + self.width as i64;
        let bottom = self.y as i64 + self.height as i64;
        x >= self.x && (x as i64) < right && y >= self.y && (y as i64) < bottom
    }
}

/// Sorts by `(x, y)` and substitutes the fallback monitor for an empty list.
pub fn normalize_monitors(mut monitors: Vec<Monitor>) -> Vec<Monitor> {
    if monitors.is_empty() {
        return vec![Monitor::fallback()];
    }
    monitors.sort_by_key(|monitor| (monitor.x, monitor.y));
    monitors
}

/// A live top-level window, re-read on every poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowRecord {
    /// Opaque platform handle, e.g. `0x03a00007` on X11.
    pub id: String,
    pub pid: u32,
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub desktop: i32,
    pub title: String,
}

impl WindowRecord {
    /// Numeric value of a hex (`0x...`) or decimal handle, used for ordering.
    pub fn handle_value(&self) -> Option<u64> {
        let id = self.id.trim();
        match id.strip_prefix("0x").or_else(|| id.strip_prefix("0X")) {
            Some(hex) => u64::from_str_radix(hex, 16).ok(),
            None => id.parse().ok(),
        }
    }

    pub fn geometry(&self) -> Geometry {
        Geometry {
            x: self.x,
            y: self.y,
            width: self.width,
            height: self.height,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Geometry {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShowState {
    #[default]
    Normal,
    Maximized,
    Minimized,
    Fullscreen,
}

impl ShowState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShowState::Normal => "normal",
            ShowState::Maximized => "maximized",
            ShowState::Minimized => "minimized",
            ShowState::Fullscreen => "fullscreen",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "normal" => Some(ShowState::Normal),
            "maximized" => Some(ShowState::Maximized),
            "minimized" => Some(ShowState::Minimized),
            "fullscreen" => Some(ShowState::Fullscreen),
            _ => None,
        }
    }
}

/// Remembered geometry for one app_name.
///
/// `x`/`y` are relative to the monitor at `display_index` when that index is
/// valid for the monitor list at read time, and global otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowState {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub display_index: i32,
    #[serde(default)]
    pub state: ShowState,
    #[serde(default = "default_remember")]
    pub remember: bool,
    #[serde(default)]
    pub last_used: Option<String>,
}

fn default_remember() -> bool {
    true
}

impl WindowState {
    pub fn new(x: i32, y: i32, width: u32, height: u32, display_index: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            display_index,
            state: ShowState::Normal,
            remember: true,
            last_used: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceStatus {
    Idle,
    Launching,
    Running,
    Failed,
    Killed,
}

impl InstanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceStatus::Idle => "idle",
            InstanceStatus::Launching => "launching",
            InstanceStatus::Running => "running",
            InstanceStatus::Failed => "failed",
            InstanceStatus::Killed => "killed",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "idle" => Some(InstanceStatus::Idle),
            "launching" => Some(InstanceStatus::Launching),
            "running" => Some(InstanceStatus::Running),
            "failed" => Some(InstanceStatus::Failed),
            "killed" => Some(InstanceStatus::Killed),
            _ => None,
        }
    }

    /// Position in the one-directional lifecycle. Idle here means "exited".
    fn rank(&self) -> u8 {
        match self {
            InstanceStatus::Launching => 0,
            InstanceStatus::Running => 1,
            InstanceStatus::Idle | InstanceStatus::Failed | InstanceStatus::Killed => 2,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.rank() == 2
    }

    pub fn can_transition_to(&self, next: InstanceStatus) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }
}

/// Progress of the window-positioning flow for one launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackingState {
    Launching,
    /// Window matched, moved and its actual geometry persisted.
    Positioned,
    /// Window matched with no target geometry; its geometry was learned.
    Recorded,
    /// Poll attempts exhausted without a successful match and move.
    Untracked,
    /// The spawn itself failed.
    Failed,
}

impl TrackingState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackingState::Launching => "launching",
            TrackingState::Positioned => "positioned",
            TrackingState::Recorded => "recorded",
            TrackingState::Untracked => "untracked",
            TrackingState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TrackingState::Launching)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Instance {
    pub instance_id: String,
    pub app_name: String,
    pub command: String,
    pub pid: Option<u32>,
    pub status: InstanceStatus,
    pub tracking: TrackingState,
    pub window_id: Option<String>,
    pub started_at: String,
    pub ended_at: Option<String>,
}

/// Immutable input to one launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    pub command: String,
    pub override_state: Option<WindowState>,
}

impl LaunchRequest {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            override_state: None,
        }
    }

    pub fn with_state(mut self, state: WindowState) -> Self {
        self.override_state = Some(state);
        self
    }
}

/// One window captured into a named workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceEntry {
    pub app_name: String,
    pub command: String,
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub display_index: i32,
}

impl WorkspaceEntry {
    pub fn window_state(&self) -> WindowState {
        WindowState::new(
            self.x,
            self.y,
            self.width,
            self.height,
            self.display_index,
        )
    }
}
