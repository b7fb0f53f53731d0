//! X11 adapter backed by `xrandr` (monitors) and `wmctrl` (windows).

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};

use super::command::{locate_tool, run_with_timeout};
use super::{clamp_geometry, DisplayServer, PlatformAdapter};
use crate::config::PlatformConfig;
use crate::types::{normalize_monitors, Monitor, ShowState, WindowRecord};

static XRANDR_OUTPUT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\S+)\s+(connected|disconnected)\s+(primary\s+)?(\d+)x(\d+)\+(-?\d+)\+(-?\d+)")
        .expect("valid xrandr regex")
});

// id desktop pid x y w h host title
static WMCTRL_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(0x[0-9a-fA-F]+)\s+(-?\d+)\s+(\d+)\s+(-?\d+)\s+(-?\d+)\s+(\d+)\s+(\d+)\s+(\S+)\s?(.*)$",
    )
    .expect("valid wmctrl regex")
});

pub struct X11Adapter {
    xrandr: Option<PathBuf>,
    wmctrl: Option<PathBuf>,
    query_timeout: Duration,
    move_timeout: Duration,
}

impl X11Adapter {
    pub fn new(config: &PlatformConfig) -> Self {
        Self {
            xrandr: locate_tool("xrandr"),
            wmctrl: locate_tool("wmctrl"),
            query_timeout: config.query_timeout(),
            move_timeout: config.move_timeout(),
        }
    }

    fn wmctrl(&self, args: &[&str], timeout: Duration) -> Option<String> {
        let wmctrl = self.wmctrl.as_ref()?;
        run_with_timeout(wmctrl, args, timeout)
    }
}

impl PlatformAdapter for X11Adapter {
    fn name(&self) -> &'static str {
        "x11"
    }

    fn get_monitors(&self) -> Vec<Monitor> {
        let output = self
            .xrandr
            .as_ref()
            .and_then(|xrandr| run_with_timeout(xrandr, &["--query"], self.query_timeout));
        match output {
            Some(output) => normalize_monitors(parse_xrandr_monitors(&output)),
            None => normalize_monitors(Vec::new()),
        }
    }

    fn get_all_windows(&self) -> Vec<WindowRecord> {
        self.wmctrl(&["-l", "-p", "-G"], self.query_timeout)
            .map(|output| parse_wmctrl_windows(&output))
            .unwrap_or_default()
    }

    fn move_window(&self, handle: &str, x: i32, y: i32, width: u32, height: u32) -> bool {
        if self.wmctrl.is_none() {
            return false;
        }
        let target = clamp_geometry(x, y, width, height);

        // Maximized windows ignore move requests under most window managers.
        let _ = self.wmctrl(
            &["-i", "-r", handle, "-b", "remove,maximized_vert,maximized_horz"],
            self.move_timeout,
        );

        let spec = format!(
            "0,{},{},{},{}",
            target.x, target.y, target.width, target.height
        );
        let moved = self
            .wmctrl(&["-i", "-r", handle, "-e", &spec], self.move_timeout)
            .is_some();
        if moved {
            debug!(window_id = handle, geometry = %spec, "Window move requested");
        } else {
            warn!(window_id = handle, geometry = %spec, "Window move failed");
        }
        moved
    }

    fn apply_show_state(&self, handle: &str, state: ShowState) -> bool {
        let property = match state {
            ShowState::Normal => return true,
            ShowState::Maximized => "add,maximized_vert,maximized_horz",
            ShowState::Fullscreen => "add,fullscreen",
            ShowState::Minimized => "add,hidden",
        };
        self.wmctrl(&["-i", "-r", handle, "-b", property], self.move_timeout)
            .is_some()
    }

    fn display_server(&self) -> DisplayServer {
        DisplayServer::X11
    }

    fn supports_window_control(&self) -> bool {
        self.wmctrl.is_some()
    }
}

/// Parses `xrandr --query`, keeping connected outputs that have a mode set.
pub fn parse_xrandr_monitors(output: &str) -> Vec<Monitor> {
    output
        .lines()
        .filter_map(|line| {
            let caps = XRANDR_OUTPUT.captures(line)?;
            if &caps[2] != "connected" {
                return None;
            }
            Some(Monitor {
                name: caps[1].to_string(),
                primary: caps.get(3).is_some(),
                width: caps[4].parse().ok()?,
                height: caps[5].parse().ok()?,
                x: caps[6].parse().ok()?,
                y: caps[7].parse().ok()?,
                connected: true,
            })
        })
        .collect()
}

/// Parses `wmctrl -l -p -G`. Malformed lines are skipped, never half-parsed.
pub fn parse_wmctrl_windows(output: &str) -> Vec<WindowRecord> {
    output
        .lines()
        .filter_map(|line| {
            let caps = WMCTRL_LINE.captures(line.trim_end())?;
            Some(WindowRecord {
                id: caps[1].to_string(),
                desktop: caps[2].parse().ok()?,
                pid: caps[3].parse().ok()?,
                x: caps[4].parse().ok()?,
                y: caps[5].parse().ok()?,
                width: caps[6].parse().ok()?,
                height: caps[7].parse().ok()?,
                title: caps[9].to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_connected_outputs_and_primary_flag() {
        let raw = "\
Screen 0: minimum 320 x 200, current 4480 x 1440, maximum 16384 x 16384
eDP-1 connected primary 1920x1080+2560+0 (normal left inverted right x axis y axis) 344mm x 194mm
   1920x1080     60.02*+
HDMI-1 connected 2560x1440+0+0 (normal left inverted right x axis y axis) 597mm x 336mm
DP-1 disconnected (normal left inverted right x axis y axis)
DP-2 connected (normal left inverted right x axis y axis)
";
        let monitors = normalize_monitors(parse_xrandr_monitors(raw));
        assert_eq!(monitors.len(), 2);
        assert_eq!(monitors[0].name, "HDMI-1");
        assert_eq!((monitors[0].x, monitors[0].y), (0, 0));
        assert!(!monitors[0].primary);
        assert_eq!(monitors[1].name, "eDP-1");
        assert_eq!((monitors[1].x, monitors[1].width, monitors[1].height), (2560, 1920, 1080));
        assert!(monitors[1].primary);
    }

    #[test]
    fn garbage_xrandr_output_yields_default_monitor() {
        let monitors = normalize_monitors(parse_xrandr_monitors("Can't open display\n"));
        assert_eq!(monitors, vec![Monitor::fallback()]);
    }

    #[test]
    fn parses_wmctrl_windows_including_empty_titles() {
        let raw = "\
0x03a00007  0 4242   10   52   800  600  host Terminal - ~/src
0x04000003 -1 1337   0    0    1920 32   host
0x05c0000a  1 0      100  200  640  480  N/A Firefox — Mozilla Firefox
broken line
";
        let windows = parse_wmctrl_windows(raw);
        assert_eq!(windows.len(), 3);

        assert_eq!(windows[0].id, "0x03a00007");
        assert_eq!(windows[0].pid, 4242);
        assert_eq!((windows[0].x, windows[0].y), (10, 52));
        assert_eq!((windows[0].width, windows[0].height), (800, 600));
        assert_eq!(windows[0].title, "Terminal - ~/src");

        assert_eq!(windows[1].desktop, -1);
        assert_eq!(windows[1].title, "");

        assert_eq!(windows[2].pid, 0);
        assert_eq!(windows[2].title, "Firefox — Mozilla Firefox");
    }

    #[test]
    fn adapter_without_tools_degrades_to_defaults() {
        let adapter = X11Adapter {
            xrandr: None,
            wmctrl: None,
            query_timeout: Duration::from_millis(10),
            move_timeout: Duration::from_millis(10),
        };
        assert_eq!(adapter.get_monitors(), vec![Monitor::fallback()]);
        assert!(adapter.get_all_windows().is_empty());
        assert!(!adapter.move_window("0x1", 0, 0, 800, 600));
        assert!(!adapter.supports_window_control());
    }

    #[cfg(unix)]
    #[test]
    fn failing_tool_yields_default_monitor() {
        let adapter = X11Adapter {
            xrandr: Some(PathBuf::from("/bin/false")),
            wmctrl: Some(PathBuf::from("/bin/false")),
            query_timeout: Duration::from_millis(500),
            move_timeout: Duration::from_millis(500),
        };
        assert_eq!(adapter.get_monitors(), vec![Monitor::fallback()]);
        assert!(adapter.get_all_windows().is_empty());
        assert!(!adapter.move_window("0x1", 0, 0, 800, 600));
    }
}
