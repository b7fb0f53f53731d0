//! Bounded execution of OS introspection tools (`xrandr`, `wmctrl`).

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

const WAIT_SLICE: Duration = Duration::from_millis(10);

/// Resolves a tool on `PATH` once. Absence is logged a single time here and
/// then cached by the caller as a capability flag.
pub fn locate_tool(name: &str) -> Option<PathBuf> {
    match which::which(name) {
        Ok(path) => {
            debug!(tool = name, path = %path.display(), "Located platform tool");
            Some(path)
        }
        Err(err) => {
            warn!(tool = name, error = %err, "Platform tool not found; dependent queries degrade to defaults");
            None
        }
    }
}

/// Runs `program args...` and returns stdout when it exits successfully
/// within `timeout`. Timeouts kill the child and yield `None`, exactly like
/// a missing tool or a failed exit.
pub fn run_with_timeout(program: &Path, args: &[&str], timeout: Duration) -> Option<String> {
    let mut child = match Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
    {
        Ok(child) => child,
        Err(err) => {
            warn!(program = %program.display(), error = %err, "Failed to run platform tool");
            return None;
        }
    };

    // Drain stdout on a separate thread so a chatty tool cannot block on a
    // full pipe while we wait for it to exit.
    let reader = child.stdout.take().map(|mut stdout| {
        thread::spawn(move || {
            let mut buffer = Vec::new();
            let _ = stdout.read_to_end(&mut buffer);
            buffer
        })
    });

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break Some(status),
            Ok(None) if Instant::now() >= deadline => {
                warn!(
                    program = %program.display(),
                    args = ?args,
                    timeout_ms = timeout.as_millis() as u64,
                    "Platform tool timed out"
                );
                let _ = child.kill();
                let _ = child.wait();
                break None;
            }
            Ok(None) => thread::sleep(WAIT_SLICE),
            Err(err) => {
                warn!(program = %program.display(), error = %err, "Failed to wait for platform tool");
                let _ = child.kill();
                let _ = child.wait();
                break None;
            }
        }
    };

    match status {
        Some(status) if status.success() => {
            // A timed-out child may leave grandchildren holding the pipe, so
            // the reader is only joined after a clean exit.
            let output = reader
                .and_then(|handle| handle.join().ok())
                .unwrap_or_default();
            Some(String::from_utf8_lossy(&output).to_string())
        }
        Some(status) => {
            debug!(program = %program.display(), args = ?args, status = %status, "Platform tool exited unsuccessfully");
            None
        }
        None => None,
    }
}
