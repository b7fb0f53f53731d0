//! Process spawning for launches.

use std::path::Path;
use std::process::{Child, Command, Stdio};
use tracing::{debug, info};

use crate::error::{Result, WinkeepError};
use crate::types::Geometry;

/// Terminals that take X11-style `-geometry +X+Y`.
const XLIB_GEOMETRY_TERMINALS: &[&str] = &["xterm", "urxvt", "rxvt", "uxterm"];
/// Terminals that take `--geometry=+X+Y`.
const GNU_GEOMETRY_TERMINALS: &[&str] = &["gnome-terminal", "xfce4-terminal", "mate-terminal"];

pub struct SpawnedProcess {
    pub pid: u32,
    /// Owned handle for reaping; absent when the launcher cannot provide one.
    pub child: Option<Child>,
}

pub trait ProcessLauncher: Send + Sync {
    /// Runs `command` through the shell in its own process group.
    fn spawn(&self, command: &str) -> Result<SpawnedProcess>;

    /// Bare exec of the first token with the remaining tokens as arguments.
    fn spawn_fallback(&self, command: &str) -> Result<SpawnedProcess>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ShellLauncher;

impl ProcessLauncher for ShellLauncher {
    fn spawn(&self, command: &str) -> Result<SpawnedProcess> {
        if command.trim().is_empty() {
            return Err(WinkeepError::EmptyCommand);
        }
        let mut cmd = Command::new("/bin/sh");
        cmd.arg("-c").arg(command);
        detach(&mut cmd);
        spawn_command(cmd, command)
    }

    fn spawn_fallback(&self, command: &str) -> Result<SpawnedProcess> {
        let mut tokens = command.split_whitespace();
        let program = tokens.next().ok_or(WinkeepError::EmptyCommand)?;
        let mut cmd = Command::new(program);
        cmd.args(tokens)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        spawn_command(cmd, command)
    }
}

fn spawn_command(mut cmd: Command, command: &str) -> Result<SpawnedProcess> {
    let child = cmd.spawn().map_err(|source| WinkeepError::SpawnFailed {
        command: command.to_string(),
        source,
    })?;
    let pid = child.id();
    info!(pid, command, "Process spawned");
    Ok(SpawnedProcess {
        pid,
        child: Some(child),
    })
}

#[cfg(unix)]
fn detach(cmd: &mut Command) {
    use std::os::unix::process::CommandExt;
    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .process_group(0);
}

#[cfg(not(unix))]
fn detach(cmd: &mut Command) {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
}

/// Lowercased basename of the command's first token.
pub fn derive_app_name(command: &str) -> Option<String> {
    let program = command.split_whitespace().next()?;
    let name = Path::new(program)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(program);
    if name.is_empty() {
        return None;
    }
    Some(name.to_lowercase())
}

/// Adds a position-only geometry flag for terminals whose CLI accepts one.
///
/// Best-effort: the tracker still moves the window after it appears.
pub fn with_geometry_hint(command: &str, app_name: &str, target: Geometry) -> String {
    if command.contains("geometry") {
        return command.to_string();
    }
    let flag = if XLIB_GEOMETRY_TERMINALS.contains(&app_name) {
        format!("-geometry +{}+{}", target.x, target.y)
    } else if GNU_GEOMETRY_TERMINALS.contains(&app_name) {
        format!("--geometry=+{}+{}", target.x, target.y)
    } else {
        return command.to_string();
    };

    let trimmed = command.trim_start();
    let (program, rest) = match trimmed.find(char::is_whitespace) {
        Some(split) => trimmed.split_at(split),
        None => (trimmed, ""),
    };
    debug!(app_name, flag = %flag, "Adding terminal geometry hint");
    format!("{} {}{}", program, flag, rest)
}
