//! akeyshually CLI
//!
//! Control surface for the daemon: lifecycle (start/stop/restart), overlay
//! management (enable/disable/list/clear) and config editing. The daemon
//! itself is the separate `akeyshuallyd` binary; this tool talks to it
//! through the pid file and signals.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use clap::{Parser, Subcommand};
use miette::{miette, IntoDiagnostic, Result};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;

use akeyshually_config::pidfile::{self, REPLACING_ENV};
use akeyshually_config::{overlay, paths};

const DAEMON_BIN: &str = "akeyshuallyd";

#[derive(Parser, Debug)]
#[command(name = "akeyshually")]
#[command(about = "Keyboard shortcut daemon for Linux")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the daemon in the background
    Start,

    /// Stop the running daemon
    Stop,

    /// Restart the daemon (picks up config changes)
    Restart,

    /// Enable an overlay config and restart the daemon if running
    Enable {
        /// Overlay file in the config dir (.toml added when missing)
        file: String,
    },

    /// Disable an overlay config and restart the daemon if running
    Disable {
        /// Overlay file in the config dir (.toml added when missing)
        file: String,
    },

    /// List config files and their enabled status
    #[command(alias = "ls")]
    List,

    /// Disable all overlays
    Clear,

    /// Open a config file in $EDITOR
    #[command(aliases = ["conf", "edit"])]
    Config {
        /// File to edit (defaults to config.toml)
        file: Option<String>,
    },

    /// Print the version
    Version,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let config_dir = paths::config_dir()?;

    match cli.command {
        Commands::Start => cmd_start(&config_dir),
        Commands::Stop => cmd_stop(&config_dir),
        Commands::Restart => cmd_restart(&config_dir),
        Commands::Enable { file } => cmd_enable(&config_dir, &file),
        Commands::Disable { file } => cmd_disable(&config_dir, &file),
        Commands::List => cmd_list(&config_dir),
        Commands::Clear => cmd_clear(&config_dir),
        Commands::Config { file } => cmd_config(&config_dir, file.as_deref()),
        Commands::Version => cmd_version(),
    }
}

fn cmd_version() -> Result<()> {
    println!("akeyshually {}", env!("CARGO_PKG_VERSION"));
    Ok(())
}

// --- Daemon lifecycle ---

fn cmd_start(config_dir: &Path) -> Result<()> {
    if let Some(pid) = running_daemon(config_dir) {
        return Err(miette!("the daemon is already running (pid {pid})"));
    }
    remove_pid_file(config_dir); // stale

    let pid = spawn_daemon(None)?;
    write_pid_file(config_dir, pid)?;
    println!("daemon started (pid {pid})");
    Ok(())
}

fn cmd_stop(config_dir: &Path) -> Result<()> {
    if systemd_unit_active() {
        systemctl("stop")?;
        println!("service stopped");
        return Ok(());
    }

    let Some(pid) = running_daemon(config_dir) else {
        return Err(miette!("nothing is running"));
    };

    kill(Pid::from_raw(pid as i32), Signal::SIGTERM)
        .map_err(|e| miette!("failed to stop daemon (pid {pid}): {e}"))?;
    remove_pid_file(config_dir);
    println!("daemon stopped (pid {pid})");
    Ok(())
}

fn cmd_restart(config_dir: &Path) -> Result<()> {
    if systemd_unit_active() {
        systemctl("restart")?;
        return Ok(());
    }

    let old_pid = running_daemon(config_dir);
    if let Some(pid) = old_pid {
        kill(Pid::from_raw(pid as i32), Signal::SIGTERM)
            .map_err(|e| miette!("failed to stop daemon: {e}"))?;
        remove_pid_file(config_dir);
    }

    let pid = spawn_daemon(old_pid)?;
    write_pid_file(config_dir, pid)?;
    Ok(())
}

/// Spawn the daemon binary detached: own session, stdio to /dev/null.
/// `replacing` carries the restart handshake.
fn spawn_daemon(replacing: Option<u32>) -> Result<u32> {
    let binary = daemon_binary();

    let mut command = Command::new(&binary);
    command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .current_dir("/");
    if let Some(pid) = replacing {
        command.env(REPLACING_ENV, pid.to_string());
    }

    unsafe {
        use std::os::unix::process::CommandExt;
        command.pre_exec(|| {
            nix::unistd::setsid()
                .map(|_| ())
                .map_err(std::io::Error::from)
        });
    }

    let child = command
        .spawn()
        .map_err(|e| miette!("failed to spawn {}: {e}", binary.display()))?;
    Ok(child.id())
}

/// The daemon binary lives next to this binary when installed together;
/// otherwise rely on PATH.
fn daemon_binary() -> PathBuf {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            let sibling = dir.join(DAEMON_BIN);
            if sibling.exists() {
                return sibling;
            }
        }
    }
    PathBuf::from(DAEMON_BIN)
}

fn systemd_unit_active() -> bool {
    Command::new("systemctl")
        .args(["--user", "is-active", "--quiet", "akeyshually"])
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

fn systemctl(verb: &str) -> Result<()> {
    let status = Command::new("systemctl")
        .args(["--user", verb, "akeyshually"])
        .status()
        .into_diagnostic()?;
    if !status.success() {
        return Err(miette!("systemctl --user {verb} akeyshually failed"));
    }
    Ok(())
}

// --- Overlays ---

fn cmd_enable(config_dir: &Path, file: &str) -> Result<()> {
    let filename = with_toml_extension(file);

    if !config_dir.join(&filename).exists() {
        return Err(miette!("overlay not found: {filename}"));
    }

    overlay::add_overlay(config_dir, &filename)?;
    println!("enabled {filename}");
    notify_overlay_change(config_dir, &format!("Enabled {filename}"));
    restart_if_running(config_dir)
}

fn cmd_disable(config_dir: &Path, file: &str) -> Result<()> {
    let filename = with_toml_extension(file);

    let enabled = overlay::read_enabled(config_dir)?;
    if !enabled.iter().any(|e| *e == filename) {
        return Err(miette!("overlay not enabled: {filename}"));
    }

    overlay::remove_overlay(config_dir, &filename)?;
    println!("disabled {filename}");
    notify_overlay_change(config_dir, &format!("Disabled {filename}"));
    restart_if_running(config_dir)
}

fn cmd_list(config_dir: &Path) -> Result<()> {
    let enabled = overlay::read_enabled(config_dir).unwrap_or_else(|e| {
        eprintln!("warning: failed to read enabled state: {e}");
        Vec::new()
    });

    println!("Configuration files:");
    println!("  {:<20} [base - always active]", "config.toml");

    let mut overlays: Vec<String> = Vec::new();
    if let Ok(entries) = std::fs::read_dir(config_dir) {
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.ends_with(".toml") && name != "config.toml" {
                overlays.push(name);
            }
        }
    }
    overlays.sort();

    for name in overlays {
        let status = if enabled.iter().any(|e| *e == name) {
            "[enabled]"
        } else {
            "[disabled]"
        };
        println!("  {name:<20} {status}");
    }
    Ok(())
}

fn cmd_clear(config_dir: &Path) -> Result<()> {
    overlay::clear_overlays(config_dir)?;
    println!("all overlays disabled");
    restart_if_running(config_dir)
}

fn restart_if_running(config_dir: &Path) -> Result<()> {
    if running_daemon(config_dir).is_some() || systemd_unit_active() {
        cmd_restart(config_dir)?;
    }
    Ok(())
}

fn notify_overlay_change(config_dir: &Path, message: &str) {
    let wants_notification = akeyshually_config::load_from_dir(config_dir)
        .map(|cfg| cfg.settings.notify_on_overlay_change)
        .unwrap_or(false);
    if wants_notification {
        let _ = notify_rust::Notification::new()
            .appname("akeyshually")
            .summary("akeyshually")
            .body(message)
            .show();
    }
}

// --- Config editing ---

fn cmd_config(config_dir: &Path, file: Option<&str>) -> Result<()> {
    let filename = with_toml_extension(file.unwrap_or("config.toml"));
    let path = config_dir.join(&filename);

    if !path.exists() {
        return Err(miette!(
            "config file not found: {}\nrun the daemon once to generate the defaults",
            path.display()
        ));
    }

    let editor = std::env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());
    let status = Command::new(&editor)
        .arg(&path)
        .status()
        .map_err(|e| miette!("failed to run {editor}: {e}"))?;
    if !status.success() {
        return Err(miette!("{editor} exited with an error"));
    }
    Ok(())
}

// --- Pid file helpers ---

fn running_daemon(config_dir: &Path) -> Option<u32> {
    pidfile::running_daemon(config_dir).unwrap_or_else(|e| {
        eprintln!("warning: unreadable pid file: {e}");
        None
    })
}

fn write_pid_file(config_dir: &Path, pid: u32) -> Result<()> {
    pidfile::write(config_dir, pid).into_diagnostic()
}

fn remove_pid_file(config_dir: &Path) {
    let _ = pidfile::remove(config_dir);
}

fn with_toml_extension(file: &str) -> String {
    if file.ends_with(".toml") {
        file.to_string()
    } else {
        format!("{file}.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_toml_extension() {
        assert_eq!(with_toml_extension("gaming"), "gaming.toml");
        assert_eq!(with_toml_extension("gaming.toml"), "gaming.toml");
    }
}
