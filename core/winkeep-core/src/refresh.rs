//! Background refresh loop.
//!
//! Every tick re-lists windows, refreshes `last_used` for remembered apps that
//! currently have a window, and reaps exited instances. An exit whose store
//! write fails stays pending and is retried on the next tick. Other errors end
//! the tick, never the loop. Stopping is cooperative and the join is bounded.

use chrono::Utc;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::RefreshConfig;
use crate::error::Result;
use crate::matcher::matches_app;
use crate::platform::PlatformAdapter;
use crate::process::ProcessInspector;
use crate::registry::InstanceRegistry;
use crate::store::{InstanceRuntime, StateStore};

const STOP_CHECK_SLICE: Duration = Duration::from_millis(50);

#[derive(Clone)]
pub struct RefreshContext {
    pub platform: Arc<dyn PlatformAdapter>,
    pub store: Arc<dyn StateStore>,
    pub inspector: Arc<dyn ProcessInspector>,
    pub registry: InstanceRegistry,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    pub windows: usize,
    pub touched: Vec<String>,
    pub exited: usize,
    /// Exits still waiting for a successful store write.
    pub pending_exits: usize,
}

/// One refresh tick.
pub fn refresh_once(ctx: &RefreshContext) -> Result<RefreshReport> {
    let exited = ctx.registry.reap_exited(ctx.inspector.as_ref()).len();
    let pending_exits = persist_exits(ctx);
    ctx.registry.prune_finished();

    let windows = ctx.platform.get_all_windows();
    let app_names = ctx.store.list_app_names()?;

    let mut touched = BTreeSet::new();
    if !app_names.is_empty() {
        for window in &windows {
            let Some(process_name) = ctx.inspector.process_name(window.pid) else {
                continue;
            };
            for app_name in &app_names {
                if matches_app(app_name, &process_name, &window.title) {
                    touched.insert(app_name.clone());
                }
            }
        }
    }

    let now = Utc::now().to_rfc3339();
    for app_name in &touched {
        ctx.store.touch_last_used(app_name, &now)?;
    }

    Ok(RefreshReport {
        windows: windows.len(),
        touched: touched.into_iter().collect(),
        exited,
        pending_exits,
    })
}

/// Writes every pending exit; returns how many are still pending.
fn persist_exits(ctx: &RefreshContext) -> usize {
    let mut still_pending = 0;
    for instance in ctx.registry.pending_exits() {
        let runtime = InstanceRuntime {
            status: Some(instance.status),
            ended_at: instance.ended_at.clone(),
            ..InstanceRuntime::default()
        };
        match ctx
            .store
            .update_instance_runtime(&instance.instance_id, &runtime)
        {
            Ok(()) => ctx.registry.mark_exit_persisted(&instance.instance_id),
            Err(err) => {
                still_pending += 1;
                warn!(
                    instance_id = %instance.instance_id,
                    error = %err,
                    "Failed to persist instance exit; will retry"
                );
            }
        }
    }
    still_pending
}

pub struct RefreshLoop {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    done: Receiver<()>,
    join_timeout: Duration,
}

impl RefreshLoop {
    pub fn spawn(config: RefreshConfig, ctx: RefreshContext) -> std::io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let (done_tx, done) = mpsc::channel();
        let join_timeout = Duration::from_millis(config.join_timeout_ms);
        let interval_secs = config.interval_secs;
        let thread_stop = Arc::clone(&stop);

        let handle = thread::Builder::new()
            .name("winkeep-refresh".to_string())
            .spawn(move || {
                run_loop(&config, &ctx, &thread_stop);
                let _ = done_tx.send(());
            })?;

        info!(interval_secs, "Refresh loop started");
        Ok(Self {
            stop,
            handle: Some(handle),
            done,
            join_timeout,
        })
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Signals the loop and waits up to the join timeout. Returns whether the
    /// thread was joined; a thread still busy is detached.
    pub fn stop(&mut self) -> bool {
        let Some(handle) = self.handle.take() else {
            return true;
        };
        self.stop.store(true, Ordering::SeqCst);

        match self.done.recv_timeout(self.join_timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if handle.join().is_err() {
                    warn!("Refresh loop thread panicked");
                }
                info!("Refresh loop stopped");
                true
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    timeout_ms = self.join_timeout.as_millis() as u64,
                    "Refresh loop did not stop in time; detaching"
                );
                false
            }
        }
    }
}

impl Drop for RefreshLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_loop(config: &RefreshConfig, ctx: &RefreshContext, stop: &AtomicBool) {
    let interval = Duration::from_secs(config.interval_secs);
    let backoff = Duration::from_secs(config.backoff_secs);
    let threshold = config.failure_threshold.max(1);
    let mut consecutive_failures: u32 = 0;

    while !stop.load(Ordering::SeqCst) {
        match refresh_once(ctx) {
            Ok(report) => {
                consecutive_failures = 0;
                debug!(
                    windows = report.windows,
                    touched = report.touched.len(),
                    exited = report.exited,
                    pending_exits = report.pending_exits,
                    "Refresh tick complete"
                );
            }
            Err(err) => {
                consecutive_failures = consecutive_failures.saturating_add(1);
                warn!(
                    error = %err,
                    consecutive_failures,
                    "Refresh tick failed"
                );
            }
        }

        let pause = if consecutive_failures >= threshold {
            warn!(
                backoff_secs = config.backoff_secs,
                consecutive_failures, "Refresh loop backing off"
            );
            consecutive_failures = 0;
            backoff
        } else {
            interval
        };
        sleep_unless_stopped(stop, pause);
    }
}

fn sleep_unless_stopped(stop: &AtomicBool, duration: Duration) {
    let deadline = Instant::now() + duration;
    loop {
        if stop.load(Ordering::SeqCst) {
            return;
        }
        let now = Instant::now();
        if now >= deadline {
            return;
        }
        thread::sleep(STOP_CHECK_SLICE.min(deadline - now));
    }
}
