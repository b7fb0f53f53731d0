//! Public launch surface.
//!
//! [`LaunchManager::launch_with_state`] snapshots windows, spawns the command
//! and hands positioning to a per-launch tracker thread. It returns as soon as
//! the spawn call does and never fails outright: spawn errors fall back to a
//! bare exec, and total failure is reported through `pid: None`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::geometry::{resolve_target, to_relative};
use crate::launcher::{derive_app_name, with_geometry_hint, ProcessLauncher, ShellLauncher};
use crate::matcher::matches_app;
use crate::platform::{create_platform_adapter, PlatformAdapter};
use crate::process::{ProcessInspector, SysinfoInspector};
use crate::refresh::{RefreshContext, RefreshLoop};
use crate::registry::InstanceRegistry;
use crate::snapshot::WindowSnapshot;
use crate::store::{InstanceRuntime, SqliteStore, StateStore};
use crate::tracker::{PollPolicy, PositionTracker, TrackOutcome, TrackRequest};
use crate::types::{
    Instance, InstanceStatus, LaunchRequest, ShowState, TrackingState, WindowState,
    WorkspaceEntry,
};

/// Result of one launch.
#[derive(Debug)]
pub struct LaunchHandle {
    /// `None` when both the managed and the fallback spawn failed.
    pub pid: Option<u32>,
    /// Empty when the command was rejected before an instance existed.
    pub instance_id: String,
    tracker: Option<JoinHandle<TrackOutcome>>,
}

impl LaunchHandle {
    fn failed(instance_id: String) -> Self {
        Self {
            pid: None,
            instance_id,
            tracker: None,
        }
    }

    pub fn is_tracking(&self) -> bool {
        self.tracker.is_some()
    }

    /// Blocks until the tracker finishes. `None` when no tracker ran.
    pub fn wait(self) -> Option<TrackOutcome> {
        match self.tracker?.join() {
            Ok(outcome) => Some(outcome),
            Err(_) => {
                warn!(instance_id = %self.instance_id, "Tracker thread panicked");
                None
            }
        }
    }
}

pub struct LaunchManager {
    config: Config,
    platform: Arc<dyn PlatformAdapter>,
    store: Arc<dyn StateStore>,
    inspector: Arc<dyn ProcessInspector>,
    launcher: Arc<dyn ProcessLauncher>,
    registry: InstanceRegistry,
    tracker: PositionTracker,
    refresh: Mutex<Option<RefreshLoop>>,
}

impl LaunchManager {
    /// Builds a manager from explicit collaborators. The refresh loop is not
    /// started; call [`LaunchManager::start_refresh`].
    pub fn new(
        config: Config,
        platform: Arc<dyn PlatformAdapter>,
        store: Arc<dyn StateStore>,
        inspector: Arc<dyn ProcessInspector>,
        launcher: Arc<dyn ProcessLauncher>,
    ) -> Self {
        let tracker = PositionTracker::new(
            Arc::clone(&platform),
            Arc::clone(&store),
            Arc::clone(&inspector),
        );
        let registry = InstanceRegistry::with_retention(config.refresh.retain_finished);
        Self {
            config,
            platform,
            store,
            inspector,
            launcher,
            registry,
            tracker,
            refresh: Mutex::new(None),
        }
    }

    /// Production wiring: detected platform, SQLite store, sysinfo and the
    /// shell launcher, with the refresh loop running.
    pub fn open(config: Config) -> Result<Self> {
        let db_path = config.store.resolve_path()?;
        let store = SqliteStore::new(db_path)?;
        info!(path = %store.path().display(), "State store opened");
        let platform = create_platform_adapter(&config.platform);
        let manager = Self::new(
            config,
            platform,
            Arc::new(store),
            Arc::new(SysinfoInspector),
            Arc::new(ShellLauncher),
        );
        manager.start_refresh();
        Ok(manager)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn platform(&self) -> &Arc<dyn PlatformAdapter> {
        &self.platform
    }

    fn refresh_guard(&self) -> MutexGuard<'_, Option<RefreshLoop>> {
        self.refresh
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn start_refresh(&self) -> bool {
        let mut guard = self.refresh_guard();
        if guard.as_ref().is_some_and(RefreshLoop::is_running) {
            return true;
        }
        let ctx = RefreshContext {
            platform: Arc::clone(&self.platform),
            store: Arc::clone(&self.store),
            inspector: Arc::clone(&self.inspector),
            registry: self.registry.clone(),
        };
        match RefreshLoop::spawn(self.config.refresh.clone(), ctx) {
            Ok(refresh) => {
                *guard = Some(refresh);
                true
            }
            Err(err) => {
                error!(error = %err, "Failed to start refresh loop");
                false
            }
        }
    }

    pub fn launch(&self, request: LaunchRequest) -> LaunchHandle {
        self.launch_with_state(&request.command, request.override_state)
    }

    /// Launches `command` and positions its first new window at
    /// `override_state`, or at the remembered state for its app name.
    pub fn launch_with_state(
        &self,
        command: &str,
        override_state: Option<WindowState>,
    ) -> LaunchHandle {
        let Some(app_name) = derive_app_name(command) else {
            warn!("Ignoring launch of empty command");
            return LaunchHandle::failed(String::new());
        };

        let instance = self.registry.register(&app_name, command);
        let instance_id = instance.instance_id.clone();
        self.record_runtime(
            &instance_id,
            InstanceRuntime {
                app_name: Some(app_name.clone()),
                command: Some(command.to_string()),
                status: Some(instance.status),
                tracking: Some(instance.tracking),
                started_at: Some(instance.started_at.clone()),
                ..InstanceRuntime::default()
            },
        );

        let target = match override_state {
            Some(state) => Some(state),
            None => self.stored_state(&app_name),
        };
        let remember = target.as_ref().map_or(true, |state| state.remember);
        let target = target.filter(|state| state.remember);

        let snapshot = WindowSnapshot::capture(&self.platform.get_all_windows());
        debug!(app_name = %app_name, windows = snapshot.len(), "Captured pre-launch snapshot");

        let spawn_command = match (&target, self.config.launcher.geometry_hints) {
            (Some(state), true) => {
                let resolved = resolve_target(state, &self.platform.get_monitors());
                with_geometry_hint(command, &app_name, resolved)
            }
            _ => command.to_string(),
        };

        let spawned = match self.launcher.spawn(&spawn_command) {
            Ok(spawned) => spawned,
            Err(err) => {
                warn!(app_name = %app_name, error = %err, "Spawn failed; trying fallback");
                return self.fallback_launch(&instance_id, command);
            }
        };

        let pid = spawned.pid;
        self.registry.set_pid(&instance_id, pid);
        if let Some(child) = spawned.child {
            self.registry.attach_child(&instance_id, child);
        }
        self.registry.set_status(&instance_id, InstanceStatus::Running);
        self.record_runtime(
            &instance_id,
            InstanceRuntime {
                pid: Some(pid),
                status: Some(InstanceStatus::Running),
                ..InstanceRuntime::default()
            },
        );
        info!(app_name = %app_name, pid, instance_id = %instance_id, "Launched");

        if !remember {
            debug!(app_name = %app_name, "Window memory disabled for app; not tracking");
            self.finish_tracking(&instance_id, TrackingState::Untracked, None);
            return LaunchHandle {
                pid: Some(pid),
                instance_id,
                tracker: None,
            };
        }

        let request = TrackRequest {
            policy: PollPolicy::for_app(&self.config.tracker, &app_name),
            app_name,
            snapshot,
            spawned_pid: Some(pid),
            target,
        };
        let tracker = self.spawn_tracker(&instance_id, request);
        LaunchHandle {
            pid: Some(pid),
            instance_id,
            tracker,
        }
    }

    fn stored_state(&self, app_name: &str) -> Option<WindowState> {
        match self.store.get_window_state_for_app(app_name) {
            Ok(state) => state,
            Err(err) => {
                warn!(app_name, error = %err, "Failed to read stored window state");
                None
            }
        }
    }

    fn fallback_launch(&self, instance_id: &str, command: &str) -> LaunchHandle {
        self.registry.set_status(instance_id, InstanceStatus::Failed);
        self.registry
            .set_tracking(instance_id, TrackingState::Failed, None);

        let pid = match self.launcher.spawn_fallback(command) {
            Ok(spawned) => {
                info!(pid = spawned.pid, command, "Fallback spawn succeeded; window will not be tracked");
                self.registry.set_pid(instance_id, spawned.pid);
                if let Some(child) = spawned.child {
                    self.registry.attach_child(instance_id, child);
                }
                Some(spawned.pid)
            }
            Err(err) => {
                error!(command, error = %err, "Fallback spawn failed");
                None
            }
        };

        let ended_at = self
            .registry
            .get(instance_id)
            .and_then(|instance| instance.ended_at);
        self.record_runtime(
            instance_id,
            InstanceRuntime {
                pid,
                status: Some(InstanceStatus::Failed),
                tracking: Some(TrackingState::Failed),
                ended_at,
                ..InstanceRuntime::default()
            },
        );
        LaunchHandle {
            pid,
            instance_id: instance_id.to_string(),
            tracker: None,
        }
    }

    fn spawn_tracker(&self, instance_id: &str, request: TrackRequest) -> Option<JoinHandle<TrackOutcome>> {
        let tracker = self.tracker.clone();
        let registry = self.registry.clone();
        let store = Arc::clone(&self.store);
        let thread_instance_id = instance_id.to_string();
        let thread_name = format!("winkeep-track-{}", request.app_name);

        let spawned = thread::Builder::new().name(thread_name).spawn(move || {
            let outcome = tracker.run(&request);
            let tracking = outcome.tracking_state();
            let window_id = outcome.window_id().map(str::to_string);
            registry.set_tracking(&thread_instance_id, tracking, window_id.clone());
            let runtime = InstanceRuntime {
                tracking: Some(tracking),
                window_id,
                geometry: outcome.geometry(),
                ..InstanceRuntime::default()
            };
            if let Err(err) = store.update_instance_runtime(&thread_instance_id, &runtime) {
                warn!(instance_id = %thread_instance_id, error = %err, "Failed to record tracking outcome");
            }
            info!(
                instance_id = %thread_instance_id,
                app_name = %request.app_name,
                tracking = tracking.as_str(),
                "Tracking finished"
            );
            outcome
        });

        match spawned {
            Ok(handle) => Some(handle),
            Err(err) => {
                warn!(instance_id, error = %err, "Failed to start tracker thread");
                self.finish_tracking(instance_id, TrackingState::Untracked, None);
                None
            }
        }
    }

    fn finish_tracking(&self, instance_id: &str, tracking: TrackingState, window_id: Option<String>) {
        self.registry
            .set_tracking(instance_id, tracking, window_id.clone());
        self.record_runtime(
            instance_id,
            InstanceRuntime {
                tracking: Some(tracking),
                window_id,
                ..InstanceRuntime::default()
            },
        );
    }

    fn record_runtime(&self, instance_id: &str, runtime: InstanceRuntime) {
        if let Err(err) = self.store.update_instance_runtime(instance_id, &runtime) {
            warn!(instance_id, error = %err, "Failed to record instance runtime");
        }
    }

    /// Read-only snapshot of every instance, oldest first.
    pub fn get_instance_info(&self) -> Vec<Instance> {
        self.registry.snapshot()
    }

    pub fn kill_instance(&self, instance_id: &str) -> bool {
        if !self.registry.kill(instance_id) {
            return false;
        }
        let ended_at = self
            .registry
            .get(instance_id)
            .and_then(|instance| instance.ended_at);
        self.record_runtime(
            instance_id,
            InstanceRuntime {
                status: Some(InstanceStatus::Killed),
                ended_at,
                ..InstanceRuntime::default()
            },
        );
        true
    }

    pub fn window_state_for_app(&self, app_name: &str) -> Option<WindowState> {
        self.stored_state(app_name)
    }

    /// Changes the remembered show state and remember flag of `app_name`.
    /// Returns `false` when the app has no remembered geometry yet.
    pub fn set_app_preferences(
        &self,
        app_name: &str,
        state: Option<ShowState>,
        remember: Option<bool>,
    ) -> bool {
        match self.store.set_window_preferences(app_name, state, remember) {
            Ok(updated) => updated,
            Err(err) => {
                warn!(app_name, error = %err, "Failed to update window preferences");
                false
            }
        }
    }

    pub fn forget_app(&self, app_name: &str) -> bool {
        match self.store.forget_window_state(app_name) {
            Ok(removed) => removed,
            Err(err) => {
                warn!(app_name, error = %err, "Failed to forget window state");
                false
            }
        }
    }

    /// Captures windows of running instances and of remembered apps into the
    /// workspace `name`. Returns `false` when nothing was captured or saving
    /// failed.
    pub fn save_current_workspace(&self, name: &str) -> bool {
        let entries = self.capture_workspace();
        if entries.is_empty() {
            warn!(workspace = name, "No tracked windows to save");
            return false;
        }
        match self.store.save_workspace(name, &entries) {
            Ok(()) => {
                info!(workspace = name, entries = entries.len(), "Workspace saved");
                true
            }
            Err(err) => {
                warn!(workspace = name, error = %err, "Failed to save workspace");
                false
            }
        }
    }

    fn capture_workspace(&self) -> Vec<WorkspaceEntry> {
        let running: HashMap<u32, Instance> = self
            .registry
            .snapshot()
            .into_iter()
            .filter(|instance| instance.status == InstanceStatus::Running)
            .filter_map(|instance| instance.pid.map(|pid| (pid, instance)))
            .collect();

        let mut known: Vec<(String, String)> = running
            .values()
            .map(|instance| (instance.app_name.clone(), instance.command.clone()))
            .collect();
        match self.store.list_app_names() {
            Ok(names) => {
                for name in names {
                    if !known.iter().any(|(app_name, _)| *app_name == name) {
                        known.push((name.clone(), name));
                    }
                }
            }
            Err(err) => warn!(error = %err, "Failed to list remembered apps"),
        }

        let monitors = self.platform.get_monitors();
        let mut entries = Vec::new();
        for window in self.platform.get_all_windows() {
            let owner = match running.get(&window.pid) {
                Some(instance) => Some((instance.app_name.clone(), instance.command.clone())),
                None => self.inspector.process_name(window.pid).and_then(|process_name| {
                    known
                        .iter()
                        .find(|(app_name, _)| matches_app(app_name, &process_name, &window.title))
                        .cloned()
                }),
            };
            let Some((app_name, command)) = owner else {
                continue;
            };
            let (display_index, relative) = to_relative(window.geometry(), &monitors);
            entries.push(WorkspaceEntry {
                app_name,
                command,
                x: relative.x,
                y: relative.y,
                width: relative.width,
                height: relative.height,
                display_index,
            });
        }
        entries
    }

    /// Launches every entry of workspace `name` at its saved geometry.
    pub fn restore_workspace(&self, name: &str) -> Vec<LaunchHandle> {
        let entries = match self.store.load_workspace(name) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(workspace = name, error = %err, "Failed to load workspace");
                return Vec::new();
            }
        };
        if entries.is_empty() {
            warn!(workspace = name, "Workspace not found or empty");
        }
        entries
            .iter()
            .map(|entry| self.launch_with_state(&entry.command, Some(entry.window_state())))
            .collect()
    }

    pub fn list_workspaces(&self) -> Vec<String> {
        self.store.list_workspaces().unwrap_or_else(|err| {
            warn!(error = %err, "Failed to list workspaces");
            Vec::new()
        })
    }

    /// Stops the refresh loop. Safe to call more than once.
    pub fn cleanup(&self) {
        let refresh = self.refresh_guard().take();
        if let Some(mut refresh) = refresh {
            let joined = refresh.stop();
            info!(joined, "Launch manager cleaned up");
        }
    }
}

impl Drop for LaunchManager {
    fn drop(&mut self) {
        self.cleanup();
    }
}
