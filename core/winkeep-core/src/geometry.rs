//! Conversion between monitor-relative stored geometry and global coordinates.

use crate::platform::clamp_geometry;
use crate::types::{Geometry, Monitor, WindowState};

/// Global move target for `state` against the monitor list read right now.
///
/// A `display_index` outside the list means the stored `x, y` are already
/// global (e.g. the monitor was disconnected since they were saved).
pub fn resolve_target(state: &WindowState, monitors: &[Monitor]) -> Geometry {
    let (x, y) = match monitor_at(monitors, state.display_index) {
        Some(monitor) => (
            monitor.x.saturating_add(state.x),
            monitor.y.saturating_add(state.y),
        ),
        None => (state.x, state.y),
    };
    clamp_geometry(x, y, state.width, state.height)
}

fn monitor_at(monitors: &[Monitor], display_index: i32) -> Option<&Monitor> {
    usize::try_from(display_index)
        .ok()
        .and_then(|index| monitors.get(index))
}

/// Splits a global geometry into `(display_index, relative geometry)` using
/// the monitor containing its top-left corner. Without one, the geometry is
/// kept global under display index `-1`.
pub fn to_relative(geometry: Geometry, monitors: &[Monitor]) -> (i32, Geometry) {
    match monitors
        .iter()
        .position(|monitor| monitor.contains(geometry.x, geometry.y))
    {
        Some(index) => {
            let monitor = &monitors[index];
            (
                index as i32,
                Geometry {
                    x: geometry.x - monitor.x,
                    y: geometry.y - monitor.y,
                    ..geometry
                },
            )
        }
        None => (-1, geometry),
    }
}
