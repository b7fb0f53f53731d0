//! In-process table of tracked instances.
//!
//! Every read and write goes through one mutex. The table also owns the
//! spawned `Child` handles so exited children can be reaped.
//!
//! Exits stay pending until the caller confirms they were persisted, and only
//! persisted terminal instances are eligible for pruning.

use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::process::Child;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};
use ulid::{Generator, Ulid};

use crate::process::ProcessInspector;
use crate::types::{Instance, InstanceStatus, TrackingState};

/// Finished instances kept for `get_instance_info` before the oldest are pruned.
pub const DEFAULT_RETAIN_FINISHED: usize = 256;

struct RegistryInner {
    // Monotonic ULID keys sort by creation time, even within one millisecond.
    ids: Generator,
    instances: BTreeMap<String, Instance>,
    children: HashMap<String, Child>,
    unpersisted_exits: BTreeSet<String>,
}

impl Default for RegistryInner {
    fn default() -> Self {
        Self {
            ids: Generator::new(),
            instances: BTreeMap::new(),
            children: HashMap::new(),
            unpersisted_exits: BTreeSet::new(),
        }
    }
}

#[derive(Clone)]
pub struct InstanceRegistry {
    inner: Arc<Mutex<RegistryInner>>,
    retain_finished: usize,
}

impl Default for InstanceRegistry {
    fn default() -> Self {
        Self::with_retention(DEFAULT_RETAIN_FINISHED)
    }
}

impl InstanceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retention(retain_finished: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(RegistryInner::default())),
            retain_finished,
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Creates a fresh `launching` instance. Launches never reuse instances.
    pub fn register(&self, app_name: &str, command: &str) -> Instance {
        let mut inner = self.lock();
        let instance_id = inner.ids.generate().unwrap_or_else(|_| Ulid::new());
        let instance = Instance {
            instance_id: instance_id.to_string(),
            app_name: app_name.to_string(),
            command: command.to_string(),
            pid: None,
            status: InstanceStatus::Launching,
            tracking: TrackingState::Launching,
            window_id: None,
            started_at: Utc::now().to_rfc3339(),
            ended_at: None,
        };
        inner
            .instances
            .insert(instance.instance_id.clone(), instance.clone());
        instance
    }

    pub fn get(&self, instance_id: &str) -> Option<Instance> {
        self.lock().instances.get(instance_id).cloned()
    }

    /// Read-only copy of every instance, oldest first.
    pub fn snapshot(&self) -> Vec<Instance> {
        self.lock().instances.values().cloned().collect()
    }

    pub fn set_pid(&self, instance_id: &str, pid: u32) {
        if let Some(instance) = self.lock().instances.get_mut(instance_id) {
            instance.pid = Some(pid);
        }
    }

    /// Applies a forward status transition; backwards or post-terminal
    /// transitions are ignored and reported as `false`.
    pub fn set_status(&self, instance_id: &str, status: InstanceStatus) -> bool {
        let mut inner = self.lock();
        let Some(instance) = inner.instances.get_mut(instance_id) else {
            return false;
        };
        apply_status(instance, status)
    }

    pub fn set_tracking(
        &self,
        instance_id: &str,
        tracking: TrackingState,
        window_id: Option<String>,
    ) {
        if let Some(instance) = self.lock().instances.get_mut(instance_id) {
            instance.tracking = tracking;
            if window_id.is_some() {
                instance.window_id = window_id;
            }
        }
    }

    pub fn attach_child(&self, instance_id: &str, child: Child) {
        self.lock().children.insert(instance_id.to_string(), child);
    }

    /// `(instance_id, pid)` for every instance still running.
    pub fn running_pids(&self) -> Vec<(String, u32)> {
        self.lock()
            .instances
            .values()
            .filter(|instance| instance.status == InstanceStatus::Running)
            .filter_map(|instance| instance.pid.map(|pid| (instance.instance_id.clone(), pid)))
            .collect()
    }

    /// Reaps exited children and marks running instances whose process is
    /// gone. Returns the instances that changed status.
    pub fn reap_exited(&self, inspector: &dyn ProcessInspector) -> Vec<Instance> {
        let mut inner = self.lock();
        let mut exits: Vec<(String, InstanceStatus)> = Vec::new();

        inner.children.retain(|instance_id, child| match child.try_wait() {
            Ok(Some(status)) => {
                exits.push((instance_id.clone(), exit_status_to_instance(&status)));
                false
            }
            Ok(None) => true,
            Err(err) => {
                warn!(instance_id = %instance_id, error = %err, "Failed to poll child status");
                true
            }
        });

        let children = &inner.children;
        let orphaned: Vec<String> = inner
            .instances
            .values()
            .filter(|instance| instance.status == InstanceStatus::Running)
            .filter(|instance| !children.contains_key(&instance.instance_id))
            .filter(|instance| !instance.pid.is_some_and(|pid| inspector.is_alive(pid)))
            .map(|instance| instance.instance_id.clone())
            .collect();
        exits.extend(
            orphaned
                .into_iter()
                .map(|instance_id| (instance_id, InstanceStatus::Idle)),
        );

        let mut changed = Vec::new();
        for (instance_id, status) in exits {
            if let Some(instance) = inner.instances.get_mut(&instance_id) {
                if apply_status(instance, status) {
                    debug!(
                        instance_id = %instance_id,
                        app_name = %instance.app_name,
                        status = status.as_str(),
                        "Instance exited"
                    );
                    changed.push(instance.clone());
                }
            }
        }
        inner.unpersisted_exits.extend(
            changed
                .iter()
                .map(|instance| instance.instance_id.clone()),
        );
        changed
    }

    /// Reaped instances whose exit has not been confirmed persisted yet.
    pub fn pending_exits(&self) -> Vec<Instance> {
        let inner = self.lock();
        inner
            .unpersisted_exits
            .iter()
            .filter_map(|instance_id| inner.instances.get(instance_id).cloned())
            .collect()
    }

    pub fn mark_exit_persisted(&self, instance_id: &str) {
        self.lock().unpersisted_exits.remove(instance_id);
    }

    /// Drops the oldest finished instances beyond the retention limit.
    /// Instances with a pending exit or a live child handle are kept.
    pub fn prune_finished(&self) -> usize {
        let mut inner = self.lock();
        let RegistryInner {
            instances,
            children,
            unpersisted_exits,
            ..
        } = &mut *inner;

        let finished: Vec<String> = instances
            .values()
            .filter(|instance| instance.status.is_terminal())
            .filter(|instance| !unpersisted_exits.contains(&instance.instance_id))
            .filter(|instance| !children.contains_key(&instance.instance_id))
            .map(|instance| instance.instance_id.clone())
            .collect();
        let excess = finished.len().saturating_sub(self.retain_finished);
        for instance_id in finished.iter().take(excess) {
            instances.remove(instance_id);
        }
        if excess > 0 {
            debug!(pruned = excess, "Pruned finished instances");
        }
        excess
    }

    /// Terminates the instance's process group and marks it `killed`.
    pub fn kill(&self, instance_id: &str) -> bool {
        let mut inner = self.lock();
        let Some(pid) = inner
            .instances
            .get(instance_id)
            .filter(|instance| !instance.status.is_terminal())
            .and_then(|instance| instance.pid)
        else {
            return false;
        };

        let signalled = signal_process_group(pid);
        if !signalled {
            if let Some(child) = inner.children.get_mut(instance_id) {
                if let Err(err) = child.kill() {
                    warn!(instance_id, pid, error = %err, "Failed to kill instance");
                    return false;
                }
            } else {
                return false;
            }
        }

        info!(instance_id, pid, "Instance killed");
        inner
            .instances
            .get_mut(instance_id)
            .map(|instance| apply_status(instance, InstanceStatus::Killed))
            .unwrap_or(false)
    }
}

fn apply_status(instance: &mut Instance, status: InstanceStatus) -> bool {
    if !instance.status.can_transition_to(status) {
        return false;
    }
    instance.status = status;
    if status.is_terminal() && instance.ended_at.is_none() {
        instance.ended_at = Some(Utc::now().to_rfc3339());
    }
    true
}

#[cfg(unix)]
fn exit_status_to_instance(status: &std::process::ExitStatus) -> InstanceStatus {
    use std::os::unix::process::ExitStatusExt;
    if status.signal().is_some() {
        InstanceStatus::Killed
    } else {
        InstanceStatus::Idle
    }
}

#[cfg(not(unix))]
fn exit_status_to_instance(_status: &std::process::ExitStatus) -> InstanceStatus {
    InstanceStatus::Idle
}

#[cfg(unix)]
fn signal_process_group(pid: u32) -> bool {
    let Ok(pgid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    // Launched children lead their own process group (pgid == pid).
    // SAFETY: libc::kill only delivers a signal; it touches no memory owned by
    // this process. The pgid comes from a child we spawned with process_group(0).
    // If the group already exited the call fails with ESRCH and we fall back.
    #[allow(unsafe_code)]
    unsafe {
        libc::kill(-pgid, libc::SIGTERM) == 0
    }
}

#[cfg(not(unix))]
fn signal_process_group(_pid: u32) -> bool {
    false
}
