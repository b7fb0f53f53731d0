//! Scriptable fakes shared by unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::{Result, WinkeepError};
use crate::launcher::{ProcessLauncher, SpawnedProcess};
use crate::platform::{DisplayServer, PlatformAdapter};
use crate::process::ProcessInspector;
use crate::store::{InstanceRuntime, SqliteStore, StateStore};
use crate::types::{Geometry, Monitor, ShowState, WindowRecord, WindowState, WorkspaceEntry};

#[derive(Debug, Clone, Default)]
pub struct FakeInspector {
    processes: HashMap<u32, String>,
}

impl FakeInspector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_process(mut self, pid: u32, name: &str) -> Self {
        self.processes.insert(pid, name.to_string());
        self
    }
}

impl ProcessInspector for FakeInspector {
    fn process_name(&self, pid: u32) -> Option<String> {
        self.processes.get(&pid).cloned()
    }

    fn is_alive(&self, pid: u32) -> bool {
        self.processes.contains_key(&pid)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedMove {
    pub handle: String,
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// Platform fake. Each `get_all_windows` call pops the next scripted
/// listing; the last listing repeats once the script runs out.
#[derive(Clone)]
pub struct FakePlatform {
    pub monitors: Vec<Monitor>,
    listings: Arc<Mutex<VecDeque<Vec<WindowRecord>>>>,
    last_listing: Arc<Mutex<Vec<WindowRecord>>>,
    move_result: bool,
    /// Applied moves update the listed geometry of the moved window.
    apply_moves: bool,
    pub moves: Arc<Mutex<Vec<RecordedMove>>>,
    pub show_states: Arc<Mutex<Vec<(String, ShowState)>>>,
    pub window_queries: Arc<Mutex<usize>>,
}

impl FakePlatform {
    pub fn new(monitors: Vec<Monitor>) -> Self {
        Self {
            monitors,
            listings: Arc::new(Mutex::new(VecDeque::new())),
            last_listing: Arc::new(Mutex::new(Vec::new())),
            move_result: true,
            apply_moves: true,
            moves: Arc::new(Mutex::new(Vec::new())),
            show_states: Arc::new(Mutex::new(Vec::new())),
            window_queries: Arc::new(Mutex::new(0)),
        }
    }

    pub fn with_listings(self, listings: Vec<Vec<WindowRecord>>) -> Self {
        *self.listings.lock().expect("lock listings") = listings.into();
        self
    }

    pub fn with_move_result(mut self, result: bool) -> Self {
        self.move_result = result;
        self
    }

    pub fn without_applied_moves(mut self) -> Self {
        self.apply_moves = false;
        self
    }

    pub fn move_log(&self) -> Vec<RecordedMove> {
        self.moves.lock().expect("lock moves").clone()
    }

    pub fn query_count(&self) -> usize {
        *self.window_queries.lock().expect("lock queries")
    }
}

impl PlatformAdapter for FakePlatform {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn get_monitors(&self) -> Vec<Monitor> {
        self.monitors.clone()
    }

    fn get_all_windows(&self) -> Vec<WindowRecord> {
        *self.window_queries.lock().expect("lock queries") += 1;
        let mut last = self.last_listing.lock().expect("lock last listing");
        if let Some(next) = self.listings.lock().expect("lock listings").pop_front() {
            *last = next;
        }
        last.clone()
    }

    fn move_window(&self, handle: &str, x: i32, y: i32, width: u32, height: u32) -> bool {
        self.moves.lock().expect("lock moves").push(RecordedMove {
            handle: handle.to_string(),
            x,
            y,
            width,
            height,
        });
        if self.move_result && self.apply_moves {
            let mut last = self.last_listing.lock().expect("lock last listing");
            for window in last.iter_mut().filter(|window| window.id == handle) {
                window.x = x;
                window.y = y;
                window.width = width;
                window.height = height;
            }
        }
        self.move_result
    }

    fn apply_show_state(&self, handle: &str, state: ShowState) -> bool {
        self.show_states
            .lock()
            .expect("lock show states")
            .push((handle.to_string(), state));
        true
    }

    fn display_server(&self) -> DisplayServer {
        DisplayServer::X11
    }

    fn supports_window_control(&self) -> bool {
        true
    }
}

pub fn monitor(name: &str, x: i32, y: i32, width: u32, height: u32) -> Monitor {
    Monitor {
        name: name.to_string(),
        x,
        y,
        width,
        height,
        primary: x == 0 && y == 0,
        connected: true,
    }
}

pub fn window(id: &str, pid: u32, title: &str) -> WindowRecord {
    WindowRecord {
        id: id.to_string(),
        pid,
        x: 10,
        y: 10,
        width: 640,
        height: 480,
        desktop: 0,
        title: title.to_string(),
    }
}

/// Launcher fake handing out scripted pids without spawning anything.
#[derive(Clone, Default)]
pub struct FakeLauncher {
    next_pid: Arc<Mutex<u32>>,
    fail_spawn: bool,
    fail_fallback: bool,
    pub spawned: Arc<Mutex<Vec<String>>>,
    pub fallback_spawned: Arc<Mutex<Vec<String>>>,
}

impl FakeLauncher {
    pub fn starting_at(pid: u32) -> Self {
        Self {
            next_pid: Arc::new(Mutex::new(pid)),
            ..Self::default()
        }
    }

    pub fn failing_spawn(mut self) -> Self {
        self.fail_spawn = true;
        self
    }

    pub fn failing_fallback(mut self) -> Self {
        self.fail_fallback = true;
        self
    }

    fn next(&self) -> SpawnedProcess {
        let mut next = self.next_pid.lock().expect("lock pid");
        let pid = *next;
        *next += 1;
        SpawnedProcess { pid, child: None }
    }

    fn failure(command: &str) -> WinkeepError {
        WinkeepError::SpawnFailed {
            command: command.to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "scripted failure"),
        }
    }
}

impl ProcessLauncher for FakeLauncher {
    fn spawn(&self, command: &str) -> Result<SpawnedProcess> {
        self.spawned.lock().expect("lock spawned").push(command.to_string());
        if self.fail_spawn {
            return Err(Self::failure(command));
        }
        Ok(self.next())
    }

    fn spawn_fallback(&self, command: &str) -> Result<SpawnedProcess> {
        self.fallback_spawned
            .lock()
            .expect("lock fallback")
            .push(command.to_string());
        if self.fail_fallback {
            return Err(Self::failure(command));
        }
        Ok(self.next())
    }
}

/// Store wrapper that fails every call while `set_failing(true)` is in
/// effect, and can fail a fixed number of instance runtime writes.
#[derive(Clone)]
pub struct FlakyStore {
    pub inner: Arc<SqliteStore>,
    failing: Arc<AtomicBool>,
    runtime_failures_left: Arc<AtomicUsize>,
    failed_calls: Arc<AtomicUsize>,
}

impl FlakyStore {
    pub fn new(inner: Arc<SqliteStore>) -> Self {
        Self {
            inner,
            failing: Arc::new(AtomicBool::new(false)),
            runtime_failures_left: Arc::new(AtomicUsize::new(0)),
            failed_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing_runtime_updates(self, count: usize) -> Self {
        self.runtime_failures_left.store(count, Ordering::SeqCst);
        self
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn failed_calls(&self) -> usize {
        self.failed_calls.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(self.failure());
        }
        Ok(())
    }

    fn failure(&self) -> WinkeepError {
        self.failed_calls.fetch_add(1, Ordering::SeqCst);
        WinkeepError::store("scripted failure", rusqlite::Error::InvalidQuery)
    }
}

impl StateStore for FlakyStore {
    fn get_window_state_for_app(&self, app_name: &str) -> Result<Option<WindowState>> {
        self.check()?;
        self.inner.get_window_state_for_app(app_name)
    }

    fn save_window_state(&self, app_name: &str, geometry: Geometry, display_index: i32) -> Result<()> {
        self.check()?;
        self.inner.save_window_state(app_name, geometry, display_index)
    }

    fn set_window_preferences(
        &self,
        app_name: &str,
        state: Option<ShowState>,
        remember: Option<bool>,
    ) -> Result<bool> {
        self.check()?;
        self.inner.set_window_preferences(app_name, state, remember)
    }

    fn update_instance_runtime(&self, instance_id: &str, runtime: &InstanceRuntime) -> Result<()> {
        self.check()?;
        let scripted = self
            .runtime_failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if scripted {
            return Err(self.failure());
        }
        self.inner.update_instance_runtime(instance_id, runtime)
    }

    fn touch_last_used(&self, app_name: &str, at: &str) -> Result<bool> {
        self.check()?;
        self.inner.touch_last_used(app_name, at)
    }

    fn list_app_names(&self) -> Result<Vec<String>> {
        self.check()?;
        self.inner.list_app_names()
    }

    fn forget_window_state(&self, app_name: &str) -> Result<bool> {
        self.check()?;
        self.inner.forget_window_state(app_name)
    }

    fn save_workspace(&self, name: &str, entries: &[WorkspaceEntry]) -> Result<()> {
        self.check()?;
        self.inner.save_workspace(name, entries)
    }

    fn load_workspace(&self, name: &str) -> Result<Vec<WorkspaceEntry>> {
        self.check()?;
        self.inner.load_workspace(name)
    }

    fn list_workspaces(&self) -> Result<Vec<String>> {
        self.check()?;
        self.inner.list_workspaces()
    }
}
