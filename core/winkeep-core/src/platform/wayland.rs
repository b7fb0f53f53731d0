//! Wayland adapter. Compositors do not let clients list or move other
//! clients' windows, so only monitor queries are answered (through XWayland's
//! `xrandr` when present).

use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

use super::command::{locate_tool, run_with_timeout};
use super::x11::parse_xrandr_monitors;
use super::{DisplayServer, PlatformAdapter};
use crate::config::PlatformConfig;
use crate::types::{normalize_monitors, Monitor, WindowRecord};

pub struct WaylandAdapter {
    xrandr: Option<PathBuf>,
    query_timeout: Duration,
}

impl WaylandAdapter {
    pub fn new(config: &PlatformConfig) -> Self {
        info!("Wayland session: window listing and moves are not supported");
        Self {
            xrandr: locate_tool("xrandr"),
            query_timeout: config.query_timeout(),
        }
    }
}

impl PlatformAdapter for WaylandAdapter {
    fn name(&self) -> &'static str {
        "wayland"
    }

    fn get_monitors(&self) -> Vec<Monitor> {
        let monitors = self
            .xrandr
            .as_ref()
            .and_then(|xrandr| run_with_timeout(xrandr, &["--query"], self.query_timeout))
            .map(|output| parse_xrandr_monitors(&output))
            .unwrap_or_default();
        normalize_monitors(monitors)
    }

    fn get_all_windows(&self) -> Vec<WindowRecord> {
        Vec::new()
    }

    fn move_window(&self, _handle: &str, _x: i32, _y: i32, _width: u32, _height: u32) -> bool {
        false
    }

    fn display_server(&self) -> DisplayServer {
        DisplayServer::Wayland
    }

    fn supports_window_control(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn answers_monitors_without_window_control() {
        let adapter = WaylandAdapter {
            xrandr: None,
            query_timeout: Duration::from_millis(10),
        };
        assert_eq!(adapter.get_monitors(), vec![Monitor::fallback()]);
        assert!(adapter.get_all_windows().is_empty());
        assert!(!adapter.move_window("0x1", 10, 10, 800, 600));
        assert_eq!(adapter.display_server(), DisplayServer::Wayland);
    }
}
