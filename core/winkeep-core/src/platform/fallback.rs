use super::{DisplayServer, PlatformAdapter};
use crate::types::{Monitor, WindowRecord};

/// Adapter for environments without a supported display server.
#[derive(Debug, Clone, Copy, Default)]
pub struct FallbackAdapter;

impl PlatformAdapter for FallbackAdapter {
    fn name(&self) -> &'static str {
        "fallback"
    }

    fn get_monitors(&self) -> Vec<Monitor> {
        vec![Monitor::fallback()]
    }

    fn get_all_windows(&self) -> Vec<WindowRecord> {
        Vec::new()
    }

    fn move_window(&self, _handle: &str, _x: i32, _y: i32, _width: u32, _height: u32) -> bool {
        false
    }

    fn display_server(&self) -> DisplayServer {
        DisplayServer::Other
    }

    fn supports_window_control(&self) -> bool {
        false
    }
}
