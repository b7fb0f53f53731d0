//! Heuristic association of a newly created window with a launch.
//!
//! A candidate is any window absent from the pre-launch snapshot whose pid
//! resolves to a process name. It matches when the app name is a
//! case-insensitive substring of that process name or of the window title.
//!
//! When several candidates match, the window owned by the spawned pid wins,
//! then the lowest numeric handle. Listing order from the OS query is not
//! creation order, so it is not used as the tie-break.

use tracing::debug;

use crate::process::ProcessInspector;
use crate::snapshot::WindowSnapshot;
use crate::types::WindowRecord;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowMatch {
    pub window: WindowRecord,
    pub process_name: String,
}

/// Whether `app_name` identifies a window with this process name and title.
pub fn matches_app(app_name: &str, process_name: &str, title: &str) -> bool {
    let needle = app_name.trim().to_lowercase();
    if needle.is_empty() {
        return false;
    }
    process_name.to_lowercase().contains(&needle) || title.to_lowercase().contains(&needle)
}

pub fn find_match(
    snapshot: &WindowSnapshot,
    windows: &[WindowRecord],
    app_name: &str,
    spawned_pid: Option<u32>,
    inspector: &dyn ProcessInspector,
) -> Option<WindowMatch> {
    let mut matches: Vec<WindowMatch> = Vec::new();

    for candidate in snapshot.new_windows(windows) {
        let Some(process_name) = inspector.process_name(candidate.pid) else {
            debug!(
                window_id = %candidate.id,
                pid = candidate.pid,
                "Skipping candidate without a resolvable process"
            );
            continue;
        };
        if matches_app(app_name, &process_name, &candidate.title) {
            matches.push(WindowMatch {
                window: candidate.clone(),
                process_name,
            });
        }
    }

    if matches.len() > 1 {
        debug!(app_name, count = matches.len(), "Multiple candidate windows; applying tie-break");
    }

    matches.into_iter().min_by_key(|candidate| {
        let owned_by_spawn = spawned_pid.is_some_and(|pid| pid == candidate.window.pid);
        (
            !owned_by_spawn,
            candidate.window.handle_value().unwrap_or(u64::MAX),
        )
    })
}
