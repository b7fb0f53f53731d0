//! Process inspection helpers.

use sysinfo::{Pid, ProcessRefreshKind, ProcessStatus, System};

/// Resolves OS-level facts about a pid. Best-effort: `None`/`false` on any failure.
pub trait ProcessInspector: Send + Sync {
    fn process_name(&self, pid: u32) -> Option<String>;
    fn is_alive(&self, pid: u32) -> bool;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SysinfoInspector;

impl SysinfoInspector {
    fn with_process<T>(pid: u32, op: impl FnOnce(&sysinfo::Process) -> T) -> Option<T> {
        if pid == 0 {
            return None;
        }
        let mut sys = System::new();
        let sys_pid = Pid::from(pid as usize);
        sys.refresh_process_specifics(sys_pid, ProcessRefreshKind::new());
        sys.process(sys_pid).map(op)
    }
}

impl ProcessInspector for SysinfoInspector {
    fn process_name(&self, pid: u32) -> Option<String> {
        Self::with_process(pid, |process| process.name().to_string())
            .filter(|name| !name.is_empty())
    }

    fn is_alive(&self, pid: u32) -> bool {
        Self::with_process(pid, |process| {
            !matches!(process.status(), ProcessStatus::Zombie | ProcessStatus::Dead)
        })
        .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_current_process() {
        let inspector = SysinfoInspector;
        let pid = std::process::id();
        assert!(inspector.is_alive(pid));
        assert!(inspector.process_name(pid).is_some());
    }

    #[test]
    fn pid_zero_is_unknown() {
        let inspector = SysinfoInspector;
        assert!(inspector.process_name(0).is_none());
        assert!(!inspector.is_alive(0));
    }
}
