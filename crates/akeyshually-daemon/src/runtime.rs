//! Behavior runtime
//!
//! Background workers for the non-normal behaviors: repeat loops, toggle
//! loops, hold timers, whileheld subprocesses, and the double-tap timeout.
//! All handles live in per-combo maps under one mutex; critical sections
//! are map operations only, and anything that can block (signalling,
//! reaping) happens after the handle has been cloned out.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use akeyshually_config::ParsedShortcut;

use crate::executor::{Executor, HeldChild};
use crate::matcher::Matcher;

#[derive(Default)]
struct BehaviorHandles {
    repeat_loops: std::collections::HashMap<String, CancellationToken>,
    toggle_loops: std::collections::HashMap<String, CancellationToken>,
    hold_timers: std::collections::HashMap<String, CancellationToken>,
    held_processes: std::collections::HashMap<String, HeldChild>,
}

/// Shared behavior runtime. Cloning is cheap; every dispatcher holds one.
#[derive(Clone)]
pub struct Runtime {
    executor: Executor,
    default_interval_ms: f64,
    handles: Arc<Mutex<BehaviorHandles>>,
}

impl Runtime {
    pub fn new(executor: Executor, default_interval_ms: f64) -> Self {
        Self {
            executor,
            default_interval_ms,
            handles: Arc::new(Mutex::new(BehaviorHandles::default())),
        }
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    /// Effective interval of a shortcut; 0 falls back to the configured
    /// default.
    pub fn interval_of(&self, shortcut: &ParsedShortcut) -> Duration {
        let ms = if shortcut.interval_ms == 0.0 {
            self.default_interval_ms
        } else {
            shortcut.interval_ms
        };
        // A zero-period ticker panics; clamp whatever the config produced.
        Duration::from_secs_f64(ms.max(1.0) / 1000.0)
    }

    /// Run a command once, detached.
    pub fn execute(&self, command: &str) {
        self.executor.spawn(command);
    }

    /// Start the repeat-whileheld loop for a combo: one execution now,
    /// then one per interval until cancelled. A previous loop for the same
    /// combo is cancelled first, so at most one exists per combo.
    pub fn start_repeat(&self, combo: &str, command: &str, interval: Duration) {
        let token = CancellationToken::new();
        {
            let mut handles = self.handles.lock();
            if let Some(old) = handles
                .repeat_loops
                .insert(combo.to_string(), token.clone())
            {
                old.cancel();
            }
        }
        self.spawn_repeat_worker(token, command.to_string(), interval);
    }

    /// Cancel the repeat loop for a combo, if one is running.
    pub fn stop_repeat(&self, combo: &str) {
        let token = self.handles.lock().repeat_loops.remove(combo);
        if let Some(token) = token {
            token.cancel();
        }
    }

    /// Latch a repeat loop: start one if the combo has none, cancel it
    /// otherwise. Toggle loops survive key release.
    pub fn toggle_repeat(&self, combo: &str, command: &str, interval: Duration) {
        let existing = self.handles.lock().toggle_loops.remove(combo);
        if let Some(token) = existing {
            token.cancel();
            tracing::debug!("toggle stopped: {}", combo);
            return;
        }

        let token = CancellationToken::new();
        self.handles
            .lock()
            .toggle_loops
            .insert(combo.to_string(), token.clone());
        tracing::debug!("toggle started: {}", combo);
        self.spawn_repeat_worker(token, command.to_string(), interval);
    }

    fn spawn_repeat_worker(&self, token: CancellationToken, command: String, interval: Duration) {
        let executor = self.executor.clone();
        tokio::spawn(async move {
            executor.spawn(&command);

            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick of an interval completes immediately and the
            // command already ran above.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = token.cancelled() => return,
                    _ = ticker.tick() => executor.spawn(&command),
                }
            }
        });
    }

    /// Arm the hold-after-threshold timer for a combo. Expiry executes the
    /// command once and drops the entry; release cancels through
    /// [`Runtime::stop_for`].
    pub fn start_hold(&self, combo: &str, command: &str, interval: Duration) {
        let token = CancellationToken::new();
        {
            let mut handles = self.handles.lock();
            if let Some(old) = handles.hold_timers.insert(combo.to_string(), token.clone()) {
                old.cancel();
            }
        }

        let executor = self.executor.clone();
        let handles = self.handles.clone();
        let combo = combo.to_string();
        let command = command.to_string();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(interval) => {
                    // Replacement cancels the old token before inserting a
                    // new one, both under the lock, so an uncancelled token
                    // still owns the map entry.
                    let fire = {
                        let mut handles = handles.lock();
                        if token.is_cancelled() {
                            false
                        } else {
                            handles.hold_timers.remove(&combo);
                            true
                        }
                    };
                    if fire {
                        executor.spawn(&command);
                    }
                }
            }
        });
    }

    /// Start the whileheld subprocess for a combo, terminating a stale one
    /// first.
    pub fn start_held(&self, combo: &str, command: &str) {
        self.stop_held(combo);
        if let Some(held) = self.executor.spawn_held(command) {
            self.handles
                .lock()
                .held_processes
                .insert(combo.to_string(), held);
        }
    }

    /// Terminate and forget the whileheld subprocess for a combo.
    pub fn stop_held(&self, combo: &str) {
        let held = self.handles.lock().held_processes.remove(combo);
        if let Some(held) = held {
            self.executor.terminate_held(combo, held);
        }
    }

    /// Key-release cleanup: cancel the repeat loop and hold timer, and
    /// terminate the whileheld subprocess for this combo. Toggle loops
    /// deliberately survive.
    pub fn stop_for(&self, combo: &str) {
        let (repeat, hold, held) = {
            let mut handles = self.handles.lock();
            (
                handles.repeat_loops.remove(combo),
                handles.hold_timers.remove(combo),
                handles.held_processes.remove(combo),
            )
        };
        if let Some(token) = repeat {
            token.cancel();
        }
        if let Some(token) = hold {
            token.cancel();
        }
        if let Some(held) = held {
            self.executor.terminate_held(combo, held);
        }
    }

    /// Double-tap timeout: when the window elapses with the key still
    /// pending, fire the single-tap fallback. The matcher slot decides
    /// the race against a second release.
    pub fn spawn_double_tap_expiry(
        &self,
        token: CancellationToken,
        interval: Duration,
        code: u16,
        matcher: Arc<Matcher>,
        fallback: Option<String>,
    ) {
        let executor = self.executor.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(interval) => {
                    if matcher.expire_double_tap(code) {
                        if let Some(command) = fallback {
                            executor.spawn(&command);
                        }
                    }
                }
            }
        });
    }

    /// Daemon shutdown: cancel every loop and timer and terminate every
    /// tracked subprocess.
    pub fn shutdown(&self) {
        let (tokens, helds) = {
            let mut handles = self.handles.lock();
            let mut tokens: Vec<CancellationToken> =
                handles.repeat_loops.drain().map(|(_, t)| t).collect();
            tokens.extend(handles.toggle_loops.drain().map(|(_, t)| t));
            tokens.extend(handles.hold_timers.drain().map(|(_, t)| t));
            let helds: Vec<(String, HeldChild)> = handles.held_processes.drain().collect();
            (tokens, helds)
        };

        for token in tokens {
            token.cancel();
        }
        for (combo, held) in helds {
            self.executor.terminate_held(&combo, held);
        }
    }

}

/// Handle-map introspection for the engine tests.
#[cfg(test)]
impl Runtime {
    pub fn has_repeat(&self, combo: &str) -> bool {
        self.handles.lock().repeat_loops.contains_key(combo)
    }

    pub fn has_toggle(&self, combo: &str) -> bool {
        self.handles.lock().toggle_loops.contains_key(combo)
    }

    pub fn has_hold(&self, combo: &str) -> bool {
        self.handles.lock().hold_timers.contains_key(combo)
    }

    pub fn has_held_process(&self, combo: &str) -> bool {
        self.handles.lock().held_processes.contains_key(combo)
    }
}
