//! akeyshuallyd
//!
//! Grabs keyboards at the kernel input layer, matches key events against
//! the configured shortcut table, executes commands for matches and
//! forwards everything else to per-device virtual clones so the desktop
//! keeps working untouched.

mod device_manager;
mod dispatcher;
mod executor;
mod matcher;
mod notification;
mod runtime;
mod table;
mod watcher;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use evdev::EventType;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use akeyshually_config::{overlay, paths, pidfile};

use crate::device_manager::{Discovery, KeyboardPair, MouseDevice};
use crate::dispatcher::{Dispatcher, Verdict};
use crate::executor::Executor;
use crate::matcher::Matcher;
use crate::notification::notify_error;
use crate::runtime::Runtime;
use crate::table::ShortcutTable;

#[derive(Parser, Debug)]
#[command(name = "akeyshuallyd")]
#[command(about = "Keyboard shortcut daemon (runs in the foreground)")]
#[command(version)]
struct Args {
    /// Verbose logging of classification and dispatch decisions
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    let config_dir = paths::config_dir().context("failed to locate config directory")?;

    // Single instance, unless we are the replacement in a restart. An
    // unreadable pid file is not fatal, it just loses the check.
    let running = pidfile::running_daemon(&config_dir).unwrap_or_else(|e| {
        tracing::warn!("unreadable pid file: {}", e);
        None
    });
    if let Some(pid) = running {
        if !pidfile::is_replacing(pid) {
            bail!("daemon is already running (pid {pid})");
        }
    }

    akeyshually_config::ensure_config_exists(&config_dir)
        .context("failed to initialize config directory")?;
    if let Err(e) = pidfile::write(&config_dir, std::process::id()) {
        tracing::warn!("failed to write pid file: {}", e);
    }

    let result = run(&config_dir).await;

    if let Err(e) = pidfile::remove(&config_dir) {
        tracing::warn!("failed to remove pid file: {}", e);
    }
    result
}

async fn run(config_dir: &std::path::Path) -> Result<()> {
    let enabled = overlay::read_enabled(config_dir).unwrap_or_else(|e| {
        tracing::warn!("failed to read enabled overlays: {}", e);
        Vec::new()
    });
    if !enabled.is_empty() {
        tracing::info!("enabled overlays: {}", enabled.join(", "));
    }

    let config = match overlay::load_with_overlays(config_dir, &enabled) {
        Ok(config) => config,
        Err(e) => {
            notify_error("akeyshually startup failed", &format!("config error: {e}"));
            return Err(e).context("failed to load configuration");
        }
    };

    let discovery = match device_manager::discover() {
        Ok(discovery) => discovery,
        Err(e) => {
            notify_error("akeyshually startup failed", &format!("{e}"));
            return Err(e);
        }
    };
    let Discovery { keyboards, mice } = discovery;

    tracing::info!("akeyshually started with {} keyboard(s)", keyboards.len());
    for pair in &keyboards {
        tracing::info!("  - {}", pair.name);
    }
    if !mice.is_empty() {
        tracing::info!(
            "monitoring {} mouse device(s) for tap cancellation",
            mice.len()
        );
    }

    let matcher = Arc::new(Matcher::new());
    let table = Arc::new(ShortcutTable::build(&config));
    tracing::info!("{} combo(s) loaded", table.combo_count());

    let executor = Executor::new(&config);
    let runtime = Runtime::new(executor, config.default_interval_ms());

    let shutdown = CancellationToken::new();
    let mut tasks = Vec::new();

    for pair in keyboards {
        let dispatcher = Dispatcher::new(
            matcher.clone(),
            table.clone(),
            runtime.clone(),
            config.settings.disable_media_keys,
        );
        tasks.push(tokio::spawn(run_keyboard(
            pair,
            dispatcher,
            shutdown.clone(),
        )));
    }

    for mouse in mice {
        tasks.push(tokio::spawn(run_mouse(
            mouse,
            matcher.clone(),
            shutdown.clone(),
        )));
    }

    // Config changes restart the daemon. The watcher blocks forever, so
    // it gets a plain detached thread rather than a runtime worker.
    let watch_dir = config_dir.to_path_buf();
    std::thread::spawn(move || {
        if let Err(e) = watcher::watch_and_restart(watch_dir) {
            tracing::warn!("config watcher stopped: {}", e);
        }
    });

    wait_for_signal().await?;
    tracing::info!("shutting down");

    shutdown.cancel();
    runtime.shutdown();
    for task in tasks {
        let _ = tokio::time::timeout(Duration::from_secs(2), task).await;
    }

    Ok(())
}

async fn wait_for_signal() -> Result<()> {
    let mut sigterm = signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
    Ok(())
}

/// Per-keyboard reader: every kernel event is dispatched, and forwarded
/// events are written to this device's clone in arrival order.
async fn run_keyboard(pair: KeyboardPair, mut dispatcher: Dispatcher, shutdown: CancellationToken) {
    let KeyboardPair {
        name,
        physical,
        mut output,
    } = pair;

    let mut stream = match physical.into_event_stream() {
        Ok(stream) => stream,
        Err(e) => {
            tracing::error!("failed to open event stream for {}: {}", name, e);
            return;
        }
    };

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            event = stream.next_event() => match event {
                Ok(event) => {
                    let verdict = if event.event_type() == EventType::KEY {
                        dispatcher.on_key(event.code(), event.value())
                    } else {
                        // Non-key events (sync reports and friends) are
                        // forwarded verbatim to preserve report timing.
                        Verdict::Forward
                    };
                    if verdict == Verdict::Forward {
                        if let Err(e) = output.emit(&[event]) {
                            tracing::warn!("failed to forward event on {}: {}", name, e);
                        }
                    }
                }
                Err(e) if device_manager::is_disconnect(&e) => {
                    tracing::warn!("{} disconnected", name);
                    return;
                }
                Err(e) => {
                    tracing::error!("read error on {}: {}", name, e);
                    return;
                }
            }
        }
    }

    if let Err(e) = stream.device_mut().ungrab() {
        tracing::debug!("ungrab {}: {}", name, e);
    }
    tracing::debug!("released {}", name);
}

/// Mouse reader: write-only into the shared tap state. Any button press
/// cancels a pending tap or double tap.
async fn run_mouse(mouse: MouseDevice, matcher: Arc<Matcher>, shutdown: CancellationToken) {
    let MouseDevice { name, device } = mouse;

    let mut stream = match device.into_event_stream() {
        Ok(stream) => stream,
        Err(e) => {
            tracing::warn!("failed to open event stream for {}: {}", name, e);
            return;
        }
    };

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            event = stream.next_event() => match event {
                Ok(event) => {
                    if event.event_type() == EventType::KEY && event.value() == 1 {
                        matcher.clear_tap_candidate();
                        matcher.clear_double_tap();
                    }
                }
                Err(e) if device_manager::is_disconnect(&e) => {
                    tracing::warn!("{} disconnected", name);
                    return;
                }
                Err(e) => {
                    tracing::warn!("read error on {}: {}", name, e);
                    return;
                }
            }
        }
    }
}
