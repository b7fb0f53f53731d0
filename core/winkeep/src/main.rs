//! winkeep: launch applications at their remembered window geometry.
//!
//! ## Subcommands
//!
//! - `launch`: start a command and position its first new window
//! - `monitors` / `windows` / `server`: inspect the display
//! - `state` / `forget`: read or drop remembered geometry for an app
//! - `prefs`: set the remembered show state or turn window memory off
//! - `workspace`: save, restore or list named window layouts
//!
//! Results are printed to stdout as JSON; diagnostics go to stderr and the log file.

mod logging;

use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use winkeep_core::{
    create_platform_adapter, load_config, Config, LaunchHandle, LaunchManager, ShowState,
    TrackOutcome, WindowState,
};

#[derive(Parser)]
#[command(name = "winkeep")]
#[command(about = "Launch applications and restore their window geometry")]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to ~/.config/winkeep/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Launch a command and position its window
    Launch {
        /// Command line to run through the shell
        #[arg(required = true, trailing_var_arg = true, value_name = "COMMAND")]
        command: Vec<String>,

        /// Target x, relative to --display
        #[arg(long, allow_hyphen_values = true, requires_all = ["y", "width", "height"])]
        x: Option<i32>,

        /// Target y, relative to --display
        #[arg(long, allow_hyphen_values = true, requires = "x")]
        y: Option<i32>,

        #[arg(long, requires = "x")]
        width: Option<u32>,

        #[arg(long, requires = "x")]
        height: Option<u32>,

        /// Monitor index the coordinates are relative to
        #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
        display: i32,

        /// normal, maximized, minimized or fullscreen (with --x)
        #[arg(long, requires = "x", value_parser = parse_show_state)]
        state: Option<ShowState>,

        /// Return right after spawning instead of waiting for the window.
        /// Tracking stops when winkeep exits, so the window is left where the
        /// window manager put it.
        #[arg(long)]
        no_wait: bool,
    },

    /// List monitors
    Monitors,

    /// List top-level windows
    Windows,

    /// Show the detected display server and adapter
    Server,

    /// Show remembered geometry for an app
    State {
        #[arg(value_name = "APP")]
        app: String,
    },

    /// Drop remembered geometry for an app
    Forget {
        #[arg(value_name = "APP")]
        app: String,
    },

    /// Change the remembered show state or remember flag of an app
    Prefs {
        #[arg(value_name = "APP")]
        app: String,

        #[arg(long, value_parser = parse_show_state)]
        state: Option<ShowState>,

        /// `false` launches the app without positioning its window
        #[arg(long)]
        remember: Option<bool>,
    },

    /// Named window layouts
    Workspace {
        #[command(subcommand)]
        action: WorkspaceCommand,
    },
}

#[derive(Subcommand)]
enum WorkspaceCommand {
    /// Capture the current windows of known apps
    Save { name: String },

    /// Relaunch every app in a workspace at its saved geometry
    Restore {
        name: String,

        /// Return right after spawning; windows are not positioned
        #[arg(long)]
        no_wait: bool,
    },

    /// List saved workspaces
    List,
}

#[derive(Serialize)]
struct LaunchReport {
    pid: Option<u32>,
    instance_id: String,
    tracking: Option<&'static str>,
    window_id: Option<String>,
}

#[derive(Serialize)]
struct ServerReport {
    display_server: &'static str,
    adapter: &'static str,
    window_control: bool,
}

fn main() {
    let _logging_guard = logging::init();
    let cli = Cli::parse();
    let config = load_or_default(cli.config.as_deref());

    if let Err(err) = run(cli.command, config) {
        tracing::error!(error = %err, "winkeep failed");
        std::process::exit(1);
    }
}

fn load_or_default(path: Option<&std::path::Path>) -> Config {
    match load_config(path) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(error = %err, "Falling back to default configuration");
            Config::default()
        }
    }
}

fn run(command: Commands, config: Config) -> Result<(), String> {
    match command {
        Commands::Monitors => {
            let platform = create_platform_adapter(&config.platform);
            print_json(&platform.get_monitors())
        }
        Commands::Windows => {
            let platform = create_platform_adapter(&config.platform);
            print_json(&platform.get_all_windows())
        }
        Commands::Server => {
            let platform = create_platform_adapter(&config.platform);
            print_json(&ServerReport {
                display_server: platform.display_server().as_str(),
                adapter: platform.name(),
                window_control: platform.supports_window_control(),
            })
        }
        Commands::Launch {
            command,
            x,
            y,
            width,
            height,
            display,
            state,
            no_wait,
        } => {
            let override_state = match (x, y, width, height) {
                (Some(x), Some(y), Some(width), Some(height)) => {
                    let mut window_state = WindowState::new(x, y, width, height, display);
                    window_state.state = state.unwrap_or_default();
                    Some(window_state)
                }
                _ => None,
            };
            let manager = LaunchManager::open(config)?;
            let handle = manager.launch_with_state(&command.join(" "), override_state);
            let report = finish_launch(handle, no_wait);
            manager.cleanup();
            if report.pid.is_none() {
                print_json(&report)?;
                return Err("launch failed".to_string());
            }
            print_json(&report)
        }
        Commands::State { app } => {
            let manager = LaunchManager::open(config)?;
            let state = manager.window_state_for_app(&app.to_lowercase());
            manager.cleanup();
            print_json(&state)
        }
        Commands::Forget { app } => {
            let manager = LaunchManager::open(config)?;
            let removed = manager.forget_app(&app.to_lowercase());
            manager.cleanup();
            print_json(&serde_json::json!({ "app": app, "removed": removed }))
        }
        Commands::Prefs {
            app,
            state,
            remember,
        } => {
            let manager = LaunchManager::open(config)?;
            let updated = manager.set_app_preferences(&app.to_lowercase(), state, remember);
            manager.cleanup();
            print_json(&serde_json::json!({ "app": app, "updated": updated }))?;
            if updated {
                Ok(())
            } else {
                Err(format!("no remembered geometry for {}", app))
            }
        }
        Commands::Workspace { action } => {
            let manager = LaunchManager::open(config)?;
            let result = run_workspace(&manager, action);
            manager.cleanup();
            result
        }
    }
}

fn run_workspace(manager: &LaunchManager, action: WorkspaceCommand) -> Result<(), String> {
    match action {
        WorkspaceCommand::Save { name } => {
            let saved = manager.save_current_workspace(&name);
            print_json(&serde_json::json!({ "workspace": name, "saved": saved }))?;
            if saved {
                Ok(())
            } else {
                Err(format!("workspace {} was not saved", name))
            }
        }
        WorkspaceCommand::Restore { name, no_wait } => {
            let reports: Vec<LaunchReport> = manager
                .restore_workspace(&name)
                .into_iter()
                .map(|handle| finish_launch(handle, no_wait))
                .collect();
            print_json(&reports)
        }
        WorkspaceCommand::List => print_json(&manager.list_workspaces()),
    }
}

fn finish_launch(handle: LaunchHandle, no_wait: bool) -> LaunchReport {
    let pid = handle.pid;
    let instance_id = handle.instance_id.clone();
    let outcome = if no_wait { None } else { handle.wait() };
    LaunchReport {
        pid,
        instance_id,
        tracking: outcome
            .as_ref()
            .map(|outcome| outcome.tracking_state().as_str()),
        window_id: outcome
            .as_ref()
            .and_then(TrackOutcome::window_id)
            .map(str::to_string),
    }
}

fn parse_show_state(value: &str) -> Result<ShowState, String> {
    ShowState::from_str(&value.to_lowercase())
        .ok_or_else(|| format!("unknown show state `{}`", value))
}

fn print_json<T: Serialize>(value: &T) -> Result<(), String> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|err| format!("Failed to render output: {}", err))?;
    println!("{}", rendered);
    Ok(())
}
