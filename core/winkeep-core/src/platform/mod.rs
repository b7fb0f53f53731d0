//! Platform capability layer: monitor geometry, window listing and window moves.
//!
//! One [`PlatformAdapter`] implementation exists per display server. The
//! factory picks one at startup; unsupported operations answer with empty
//! lists or `false` instead of being probed at call sites.

mod command;
mod fallback;
mod wayland;
mod x11;

use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use crate::config::{PlatformChoice, PlatformConfig};
use crate::types::{Geometry, Monitor, ShowState, WindowRecord};

pub use command::{locate_tool, run_with_timeout};
pub use fallback::FallbackAdapter;
pub use wayland::WaylandAdapter;
pub use x11::{parse_wmctrl_windows, parse_xrandr_monitors, X11Adapter};

/// Smallest window edge accepted by [`clamp_geometry`].
pub const MIN_WINDOW_SIZE: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayServer {
    X11,
    Wayland,
    Other,
}

impl DisplayServer {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisplayServer::X11 => "x11",
            DisplayServer::Wayland => "wayland",
            DisplayServer::Other => "other",
        }
    }
}

pub trait PlatformAdapter: Send + Sync {
    fn name(&self) -> &'static str;

    /// Ordered by `(x, y)`, never empty.
    fn get_monitors(&self) -> Vec<Monitor>;

    /// Current top-level windows; empty when the platform cannot be queried.
    fn get_all_windows(&self) -> Vec<WindowRecord>;

    /// Moves and resizes `handle`. Callers clamp through [`clamp_geometry`].
    fn move_window(&self, handle: &str, x: i32, y: i32, width: u32, height: u32) -> bool;

    /// Applies maximized/minimized/fullscreen. Not supported by default.
    fn apply_show_state(&self, _handle: &str, _state: ShowState) -> bool {
        false
    }

    fn display_server(&self) -> DisplayServer;

    /// Whether `get_all_windows`/`move_window` can ever succeed here.
    fn supports_window_control(&self) -> bool;
}

/// Clamps a move request to `x, y >= 0` and `width, height >= MIN_WINDOW_SIZE`.
pub fn clamp_geometry(x: i32, y: i32, width: u32, height: u32) -> Geometry {
    Geometry {
        x: x.max(0),
        y: y.max(0),
        width: width.max(MIN_WINDOW_SIZE),
        height: height.max(MIN_WINDOW_SIZE),
    }
}

/// Detects the display server from the process environment.
pub fn detect_display_server() -> DisplayServer {
    detect_display_server_with(|key| std::env::var(key).ok())
}

fn detect_display_server_with(lookup: impl Fn(&str) -> Option<String>) -> DisplayServer {
    let present = |key: &str| lookup(key).is_some_and(|value| !value.trim().is_empty());

    match lookup("XDG_SESSION_TYPE")
        .map(|value| value.trim().to_lowercase())
        .as_deref()
    {
        Some("wayland") => return DisplayServer::Wayland,
        Some("x11") => return DisplayServer::X11,
        _ => {}
    }

    if present("WAYLAND_DISPLAY") {
        DisplayServer::Wayland
    } else if present("DISPLAY") {
        DisplayServer::X11
    } else {
        DisplayServer::Other
    }
}

/// Selects the adapter once at startup.
pub fn create_platform_adapter(config: &PlatformConfig) -> Arc<dyn PlatformAdapter> {
    let detected = detect_display_server();
    let adapter: Arc<dyn PlatformAdapter> = match (config.force, detected) {
        (PlatformChoice::X11, _) | (PlatformChoice::Auto, DisplayServer::X11) => {
            Arc::new(X11Adapter::new(config))
        }
        (PlatformChoice::Wayland, _) | (PlatformChoice::Auto, DisplayServer::Wayland) => {
            Arc::new(WaylandAdapter::new(config))
        }
        (PlatformChoice::None, _) | (PlatformChoice::Auto, DisplayServer::Other) => {
            Arc::new(FallbackAdapter)
        }
    };

    info!(
        display_server = detected.as_str(),
        forced = ?config.force,
        adapter = adapter.name(),
        window_control = adapter.supports_window_control(),
        "Platform adapter selected"
    );
    adapter
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn detect(vars: &[(&str, &str)]) -> DisplayServer {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        detect_display_server_with(|key| vars.get(key).cloned())
    }

    #[test]
    fn session_type_wins_over_socket_variables() {
        assert_eq!(
            detect(&[("XDG_SESSION_TYPE", "x11"), ("WAYLAND_DISPLAY", "wayland-0")]),
            DisplayServer::X11
        );
        assert_eq!(
            detect(&[("XDG_SESSION_TYPE", "Wayland"), ("DISPLAY", ":0")]),
            DisplayServer::Wayland
        );
    }

    #[test]
    fn falls_back_to_socket_variables() {
        assert_eq!(detect(&[("WAYLAND_DISPLAY", "wayland-1")]), DisplayServer::Wayland);
        assert_eq!(detect(&[("DISPLAY", ":1")]), DisplayServer::X11);
        assert_eq!(detect(&[("XDG_SESSION_TYPE", "tty"), ("DISPLAY", " ")]), DisplayServer::Other);
        assert_eq!(detect(&[]), DisplayServer::Other);
    }

    #[test]
    fn clamp_enforces_origin_and_minimum_size() {
        assert_eq!(
            clamp_geometry(-20, 15, 40, 600),
            Geometry {
                x: 0,
                y: 15,
                width: MIN_WINDOW_SIZE,
                height: 600
            }
        );
        assert_eq!(
            clamp_geometry(100, 200, 800, 600),
            Geometry {
                x: 100,
                y: 200,
                width: 800,
                height: 600
            }
        );
    }

    #[test]
    fn forced_none_selects_fallback_adapter() {
        let config = PlatformConfig {
            force: PlatformChoice::None,
            ..PlatformConfig::default()
        };
        let adapter = create_platform_adapter(&config);
        assert_eq!(adapter.name(), "fallback");
        assert_eq!(adapter.get_monitors(), vec![Monitor::fallback()]);
        assert!(adapter.get_all_windows().is_empty());
        assert!(!adapter.move_window("0x1", 0, 0, 800, 600));
    }
}
