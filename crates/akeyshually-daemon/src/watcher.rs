//! Config-directory watching for hot reload.
//!
//! Shortcut state is compiled once at startup, so a reload is a restart:
//! when `config.toml` or an enabled overlay changes, the daemon re-execs
//! itself with the restart handshake set and exits. Events are debounced
//! so editors that write multiple times only trigger one restart.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use akeyshually_config::pidfile::REPLACING_ENV;

use crate::notification::notify_error;

const DEBOUNCE: Duration = Duration::from_secs(1);

/// Watch the config directory until a relevant change, then restart the
/// daemon. Runs on a blocking thread; only returns on watcher failure.
pub fn watch_and_restart(config_dir: PathBuf) -> Result<()> {
    let (tx, rx) = std::sync::mpsc::channel::<notify::Result<Event>>();

    let mut watcher = RecommendedWatcher::new(tx, notify::Config::default())
        .context("failed to create file watcher")?;
    watcher
        .watch(&config_dir, RecursiveMode::NonRecursive)
        .with_context(|| format!("failed to watch {}", config_dir.display()))?;

    // A symlinked config.toml changes in its target directory, not here.
    let config_path = akeyshually_config::paths::config_file(&config_dir);
    if let Ok(real) = std::fs::canonicalize(&config_path) {
        if let Some(real_dir) = real.parent() {
            if real_dir != config_dir {
                if let Err(e) = watcher.watch(real_dir, RecursiveMode::NonRecursive) {
                    tracing::warn!(
                        "failed to watch symlink target {}: {}",
                        real_dir.display(),
                        e
                    );
                }
            }
        }
    }

    let mut last_restart = Instant::now() - DEBOUNCE;

    for event in rx {
        let event = match event {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!("watcher error: {}", e);
                continue;
            }
        };

        if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
            continue;
        }

        let relevant = event
            .paths
            .iter()
            .any(|path| triggers_reload(&config_dir, path));
        if !relevant {
            continue;
        }

        if last_restart.elapsed() < DEBOUNCE {
            continue;
        }
        last_restart = Instant::now();

        tracing::info!("configuration changed, restarting");
        restart_self();
    }

    Ok(())
}

/// Only the base config and currently enabled overlays trigger a reload.
fn triggers_reload(config_dir: &Path, path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    if !name.ends_with(".toml") {
        return false;
    }
    if name == "config.toml" {
        return true;
    }
    akeyshually_config::overlay::read_enabled(config_dir)
        .map(|enabled| enabled.iter().any(|e| e == name))
        .unwrap_or(false)
}

/// Re-exec the daemon binary in a new session and exit this process. The
/// replacement inherits our arguments and is told which pid it replaces.
fn restart_self() {
    let executable = match std::env::current_exe().and_then(std::fs::canonicalize) {
        Ok(path) => path,
        Err(e) => {
            tracing::error!("failed to resolve executable path: {}", e);
            return;
        }
    };

    let mut command = std::process::Command::new(&executable);
    command
        .args(std::env::args().skip(1))
        .env(REPLACING_ENV, std::process::id().to_string());

    // Detach from our session so the replacement survives our exit.
    unsafe {
        use std::os::unix::process::CommandExt;
        command.pre_exec(|| {
            nix::unistd::setsid()
                .map(|_| ())
                .map_err(std::io::Error::from)
        });
    }

    match command.spawn() {
        Ok(child) => {
            tracing::info!("spawned replacement daemon (pid {})", child.id());
            std::process::exit(0);
        }
        Err(e) => {
            tracing::error!("failed to restart: {}", e);
            notify_error("akeyshually reload failed", &format!("{e}"));
        }
    }
}
