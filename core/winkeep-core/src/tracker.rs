//! Per-launch window positioning.
//!
//! A tracker polls the platform on a fixed cadence until a window that was
//! not in the pre-launch snapshot matches the launched app. It then either
//! moves that window to the remembered geometry (`Positioned`) or, with no
//! remembered geometry, learns the window's own geometry (`Recorded`).
//! Exhausting the attempt budget yields `Untracked`; nothing is raised.
//!
//! The geometry persisted after a move is the window's actual geometry read
//! back from the platform, not the requested one.

use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::TrackerConfig;
use crate::geometry::{resolve_target, to_relative};
use crate::matcher::{find_match, WindowMatch};
use crate::platform::PlatformAdapter;
use crate::process::ProcessInspector;
use crate::snapshot::WindowSnapshot;
use crate::store::StateStore;
use crate::types::{Geometry, Monitor, ShowState, TrackingState, WindowState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub attempts: u32,
    pub readback_settle: Duration,
}

impl PollPolicy {
    pub fn for_app(config: &TrackerConfig, app_name: &str) -> Self {
        Self {
            interval: config.poll_interval(),
            attempts: config.attempts_for(app_name),
            readback_settle: config.readback_settle(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackOutcome {
    Positioned { window_id: String, geometry: Geometry },
    Recorded { window_id: String, geometry: Geometry },
    Untracked,
}

impl TrackOutcome {
    pub fn tracking_state(&self) -> TrackingState {
        match self {
            TrackOutcome::Positioned { .. } => TrackingState::Positioned,
            TrackOutcome::Recorded { .. } => TrackingState::Recorded,
            TrackOutcome::Untracked => TrackingState::Untracked,
        }
    }

    pub fn window_id(&self) -> Option<&str> {
        match self {
            TrackOutcome::Positioned { window_id, .. } | TrackOutcome::Recorded { window_id, .. } => {
                Some(window_id)
            }
            TrackOutcome::Untracked => None,
        }
    }

    pub fn geometry(&self) -> Option<Geometry> {
        match self {
            TrackOutcome::Positioned { geometry, .. } | TrackOutcome::Recorded { geometry, .. } => {
                Some(*geometry)
            }
            TrackOutcome::Untracked => None,
        }
    }
}

/// Everything one tracking run needs, captured on the caller's thread.
#[derive(Debug, Clone)]
pub struct TrackRequest {
    pub app_name: String,
    pub snapshot: WindowSnapshot,
    pub spawned_pid: Option<u32>,
    /// Geometry to restore; `None` learns the window's own geometry instead.
    pub target: Option<WindowState>,
    pub policy: PollPolicy,
}

#[derive(Clone)]
pub struct PositionTracker {
    platform: Arc<dyn PlatformAdapter>,
    store: Arc<dyn StateStore>,
    inspector: Arc<dyn ProcessInspector>,
}

impl PositionTracker {
    pub fn new(
        platform: Arc<dyn PlatformAdapter>,
        store: Arc<dyn StateStore>,
        inspector: Arc<dyn ProcessInspector>,
    ) -> Self {
        Self {
            platform,
            store,
            inspector,
        }
    }

    pub fn run(&self, request: &TrackRequest) -> TrackOutcome {
        let TrackRequest {
            app_name, policy, ..
        } = request;

        for attempt in 1..=policy.attempts {
            // First poll is immediate; the budget is (attempts - 1) intervals.
            if attempt > 1 {
                thread::sleep(policy.interval);
            }

            let windows = self.platform.get_all_windows();
            let found = find_match(
                &request.snapshot,
                &windows,
                app_name,
                request.spawned_pid,
                self.inspector.as_ref(),
            );
            let Some(found) = found else {
                debug!(
                    app_name = %app_name,
                    attempt,
                    max_attempts = policy.attempts,
                    windows = windows.len(),
                    "No matching window yet"
                );
                continue;
            };

            info!(
                app_name = %app_name,
                attempt,
                window_id = %found.window.id,
                process = %found.process_name,
                "Matched launched window"
            );

            let outcome = match &request.target {
                Some(target) => self.position(app_name, &found, target, policy.readback_settle),
                None => Some(self.record(app_name, &found)),
            };
            if let Some(outcome) = outcome {
                return outcome;
            }
        }

        warn!(
            app_name = %app_name,
            attempts = policy.attempts,
            "Window tracking exhausted attempts; leaving window unpositioned"
        );
        TrackOutcome::Untracked
    }

    /// `None` when the move was refused so polling continues.
    fn position(
        &self,
        app_name: &str,
        found: &WindowMatch,
        target: &WindowState,
        settle: Duration,
    ) -> Option<TrackOutcome> {
        let monitors = self.platform.get_monitors();
        let requested = resolve_target(target, &monitors);
        let window_id = found.window.id.clone();

        if !self.platform.move_window(
            &window_id,
            requested.x,
            requested.y,
            requested.width,
            requested.height,
        ) {
            warn!(
                app_name,
                window_id = %window_id,
                x = requested.x,
                y = requested.y,
                width = requested.width,
                height = requested.height,
                "Window move failed"
            );
            return None;
        }

        if target.state != ShowState::Normal
            && !self.platform.apply_show_state(&window_id, target.state)
        {
            warn!(app_name, window_id = %window_id, state = target.state.as_str(), "Failed to apply show state");
        }

        thread::sleep(settle);

        let actual = self
            .platform
            .get_all_windows()
            .into_iter()
            .find(|window| window.id == window_id)
            .map(|window| window.geometry());
        match actual {
            Some(actual) => {
                self.persist(app_name, actual, &monitors);
                self.persist_show_state(app_name, target.state);
                info!(
                    app_name,
                    window_id = %window_id,
                    x = actual.x,
                    y = actual.y,
                    width = actual.width,
                    height = actual.height,
                    "Window positioned"
                );
                Some(TrackOutcome::Positioned {
                    window_id,
                    geometry: actual,
                })
            }
            None => {
                debug!(app_name, window_id = %window_id, "Window vanished before readback; not persisting");
                Some(TrackOutcome::Positioned {
                    window_id,
                    geometry: requested,
                })
            }
        }
    }

    fn record(&self, app_name: &str, found: &WindowMatch) -> TrackOutcome {
        let monitors = self.platform.get_monitors();
        let geometry = found.window.geometry();
        self.persist(app_name, geometry, &monitors);
        info!(
            app_name,
            window_id = %found.window.id,
            "Recorded geometry for app without saved state"
        );
        TrackOutcome::Recorded {
            window_id: found.window.id.clone(),
            geometry,
        }
    }

    fn persist(&self, app_name: &str, geometry: Geometry, monitors: &[Monitor]) {
        let (display_index, relative) = to_relative(geometry, monitors);
        if let Err(err) = self
            .store
            .save_window_state(app_name, relative, display_index)
        {
            warn!(app_name, error = %err, "Failed to persist window state");
        }
    }

    fn persist_show_state(&self, app_name: &str, state: ShowState) {
        if let Err(err) = self
            .store
            .set_window_preferences(app_name, Some(state), None)
        {
            warn!(app_name, error = %err, "Failed to persist show state");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;
    use crate::testing::{monitor, window, FakeInspector, FakePlatform};

    fn policy(attempts: u32) -> PollPolicy {
        PollPolicy {
            interval: Duration::ZERO,
            attempts,
            readback_settle: Duration::ZERO,
        }
    }

    fn store() -> (tempfile::TempDir, Arc<SqliteStore>) {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = SqliteStore::new(dir.path().join("state.db")).expect("store");
        (dir, Arc::new(store))
    }

    fn tracker(platform: &FakePlatform, store: &Arc<SqliteStore>, inspector: FakeInspector) -> PositionTracker {
        PositionTracker::new(
            Arc::new(platform.clone()),
            store.clone(),
            Arc::new(inspector),
        )
    }

    fn request(app_name: &str, snapshot: WindowSnapshot, target: Option<WindowState>, attempts: u32) -> TrackRequest {
        TrackRequest {
            app_name: app_name.to_string(),
            snapshot,
            spawned_pid: None,
            target,
            policy: policy(attempts),
        }
    }

    #[test]
    fn policy_extends_attempts_for_slow_apps() {
        let config = TrackerConfig::default();
        assert_eq!(PollPolicy::for_app(&config, "gedit").attempts, 10);
        assert_eq!(PollPolicy::for_app(&config, "gnome-terminal").attempts, 15);
        assert_eq!(
            PollPolicy::for_app(&config, "gedit").interval,
            Duration::from_millis(500)
        );
    }

    #[test]
    fn positions_new_window_within_attempt_budget() {
        let existing = window("0x01", 10, "Files");
        let mut fresh = window("0x02", 20, "Untitled");
        fresh.x = 5;
        let platform = FakePlatform::new(vec![monitor("A", 0, 0, 1920, 1080)]).with_listings(vec![
            vec![existing.clone()],
            vec![existing.clone()],
            vec![existing.clone(), fresh.clone()],
        ]);
        let (_dir, store) = store();
        let inspector = FakeInspector::new()
            .with_process(10, "nautilus")
            .with_process(20, "gedit");
        let snapshot = WindowSnapshot::capture(&[existing]);

        let outcome = tracker(&platform, &store, inspector).run(&request(
            "gedit",
            snapshot,
            Some(WindowState::new(100, 200, 800, 600, 0)),
            10,
        ));

        let expected = Geometry {
            x: 100,
            y: 200,
            width: 800,
            height: 600,
        };
        assert_eq!(
            outcome,
            TrackOutcome::Positioned {
                window_id: "0x02".into(),
                geometry: expected
            }
        );
        let moves = platform.move_log();
        assert_eq!(moves.len(), 1);
        assert_eq!((moves[0].x, moves[0].y, moves[0].width, moves[0].height), (100, 200, 800, 600));

        let saved = store
            .get_window_state_for_app("gedit")
            .expect("query")
            .expect("state");
        assert_eq!((saved.x, saved.y, saved.width, saved.height, saved.display_index), (100, 200, 800, 600, 0));
    }

    #[test]
    fn refused_moves_exhaust_attempts_and_leave_store_untouched() {
        let platform = FakePlatform::new(vec![monitor("A", 0, 0, 1920, 1080)])
            .with_listings(vec![vec![window("0x02", 20, "gedit")]])
            .with_move_result(false);
        let (_dir, store) = store();
        let inspector = FakeInspector::new().with_process(20, "gedit");

        let outcome = tracker(&platform, &store, inspector).run(&request(
            "gedit",
            WindowSnapshot::default(),
            Some(WindowState::new(100, 200, 800, 600, 0)),
            4,
        ));

        assert_eq!(outcome, TrackOutcome::Untracked);
        assert_eq!(platform.move_log().len(), 4);
        assert!(store.get_window_state_for_app("gedit").expect("query").is_none());
    }

    #[test]
    fn persists_readback_geometry_rather_than_request() {
        let platform = FakePlatform::new(vec![monitor("A", 0, 0, 1920, 1080)])
            .with_listings(vec![vec![window("0x02", 20, "gedit")]])
            .with_move_result(true)
            .without_applied_moves();
        let (_dir, store) = store();
        let inspector = FakeInspector::new().with_process(20, "gedit");

        let outcome = tracker(&platform, &store, inspector).run(&request(
            "gedit",
            WindowSnapshot::default(),
            Some(WindowState::new(300, 300, 900, 700, 0)),
            3,
        ));

        // The fake window manager ignored the request; its geometry is stored.
        assert_eq!(outcome.geometry().map(|g| (g.x, g.y)), Some((10, 10)));
        let saved = store
            .get_window_state_for_app("gedit")
            .expect("query")
            .expect("state");
        assert_eq!((saved.x, saved.y, saved.width, saved.height), (10, 10, 640, 480));
    }

    #[test]
    fn records_geometry_when_no_target() {
        let platform = FakePlatform::new(vec![
            monitor("A", 0, 0, 1920, 1080),
            monitor("B", 1920, 0, 1920, 1080),
        ]);
        let mut fresh = window("0x09", 30, "Terminal");
        fresh.x = 2000;
        fresh.y = 100;
        let platform = platform.with_listings(vec![vec![fresh]]);
        let (_dir, store) = store();
        let inspector = FakeInspector::new().with_process(30, "xterm");

        let outcome = tracker(&platform, &store, inspector).run(&request(
            "xterm",
            WindowSnapshot::default(),
            None,
            2,
        ));

        assert_eq!(outcome.tracking_state(), TrackingState::Recorded);
        assert!(platform.move_log().is_empty());
        let saved = store
            .get_window_state_for_app("xterm")
            .expect("query")
            .expect("state");
        assert_eq!((saved.x, saved.y, saved.display_index), (80, 100, 1));
    }

    #[test]
    fn applies_non_normal_show_state_after_move() {
        let platform = FakePlatform::new(vec![monitor("A", 0, 0, 1920, 1080)])
            .with_listings(vec![vec![window("0x02", 20, "gedit")]]);
        let (_dir, store) = store();
        let inspector = FakeInspector::new().with_process(20, "gedit");
        let mut target = WindowState::new(0, 0, 800, 600, 0);
        target.state = ShowState::Maximized;

        let outcome = tracker(&platform, &store, inspector).run(&request(
            "gedit",
            WindowSnapshot::default(),
            Some(target),
            1,
        ));

        assert_eq!(outcome.tracking_state(), TrackingState::Positioned);
        let applied = platform.show_states.lock().expect("lock").clone();
        assert_eq!(applied, vec![("0x02".to_string(), ShowState::Maximized)]);
    }

    #[test]
    fn no_candidates_yields_untracked_after_budget() {
        let existing = window("0x01", 10, "gedit");
        let platform = FakePlatform::new(vec![monitor("A", 0, 0, 1920, 1080)])
            .with_listings(vec![vec![existing.clone()]]);
        let (_dir, store) = store();
        let inspector = FakeInspector::new().with_process(10, "gedit");

        let outcome = tracker(&platform, &store, inspector).run(&request(
            "gedit",
            WindowSnapshot::capture(&[existing]),
            None,
            3,
        ));

        assert_eq!(outcome, TrackOutcome::Untracked);
        assert_eq!(platform.query_count(), 3);
        assert!(store.get_window_state_for_app("gedit").expect("query").is_none());
    }

    #[test]
    fn first_poll_does_not_wait_for_interval() {
        let platform = FakePlatform::new(vec![monitor("A", 0, 0, 1920, 1080)])
            .with_listings(vec![vec![window("0x02", 20, "gedit")]]);
        let (_dir, store) = store();
        let inspector = FakeInspector::new().with_process(20, "gedit");
        let mut request = request(
            "gedit",
            WindowSnapshot::default(),
            Some(WindowState::new(0, 0, 800, 600, 0)),
            3,
        );
        request.policy.interval = Duration::from_secs(30);

        let started = std::time::Instant::now();
        let outcome = tracker(&platform, &store, inspector).run(&request);

        assert_eq!(outcome.tracking_state(), TrackingState::Positioned);
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(platform.query_count(), 2);
    }

    #[test]
    fn exhausted_budget_sleeps_between_attempts_only() {
        let platform = FakePlatform::new(vec![monitor("A", 0, 0, 1920, 1080)]);
        let (_dir, store) = store();
        let mut request = request("gedit", WindowSnapshot::default(), None, 4);
        request.policy.interval = Duration::from_millis(100);

        let started = std::time::Instant::now();
        let outcome = tracker(&platform, &store, FakeInspector::new()).run(&request);
        let elapsed = started.elapsed();

        assert_eq!(outcome, TrackOutcome::Untracked);
        assert!(elapsed >= Duration::from_millis(300));
    }

    #[test]
    fn positioned_show_state_is_remembered() {
        let platform = FakePlatform::new(vec![monitor("A", 0, 0, 1920, 1080)])
            .with_listings(vec![vec![window("0x02", 20, "gedit")]]);
        let (_dir, store) = store();
        let inspector = FakeInspector::new().with_process(20, "gedit");
        let mut target = WindowState::new(40, 50, 800, 600, 0);
        target.state = ShowState::Maximized;

        let outcome = tracker(&platform, &store, inspector).run(&request(
            "gedit",
            WindowSnapshot::default(),
            Some(target),
            1,
        ));

        assert_eq!(outcome.tracking_state(), TrackingState::Positioned);
        let saved = store
            .get_window_state_for_app("gedit")
            .expect("query")
            .expect("state");
        assert_eq!(saved.state, ShowState::Maximized);
        assert!(saved.remember);
    }
}
