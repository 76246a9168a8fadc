//! Event dispatcher
//!
//! One dispatcher per grabbed keyboard. Every kernel event from that
//! device passes through [`Dispatcher::on_key`], which decides whether the
//! event is forwarded verbatim to the paired virtual clone or suppressed,
//! and drives shortcut execution, buffering, tap candidacy and the
//! double-tap state machine along the way.
//!
//! The dispatcher never writes to the device itself; the device task owns
//! the virtual clone and is its only writer, which keeps per-device event
//! order intact without any cross-thread contention.

use std::collections::HashSet;
use std::sync::Arc;

use akeyshually_config::keymap;
use akeyshually_config::{BehaviorMode, ParsedShortcut, TimingMode};

use crate::matcher::Matcher;
use crate::runtime::Runtime;
use crate::table::{ShortcutTable, BEHAVIOR_ORDER};

/// What happens to the physical event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Write the event unchanged to the paired virtual device.
    Forward,
    /// Swallow the event; downstream applications never see it.
    Suppress,
}

/// Per-keyboard dispatch state over the shared matcher, table and runtime.
pub struct Dispatcher {
    matcher: Arc<Matcher>,
    table: Arc<ShortcutTable>,
    runtime: Runtime,
    disable_media_keys: bool,
    /// Key codes currently suppressed awaiting their release.
    buffered: HashSet<u16>,
}

impl Dispatcher {
    pub fn new(
        matcher: Arc<Matcher>,
        table: Arc<ShortcutTable>,
        runtime: Runtime,
        disable_media_keys: bool,
    ) -> Self {
        Self {
            matcher,
            table,
            runtime,
            disable_media_keys,
            buffered: HashSet::new(),
        }
    }

    /// Decide the fate of one key event (`value`: 0 release, 1 press,
    /// 2 autorepeat). Non-key events never reach this; the device task
    /// forwards them verbatim.
    pub fn on_key(&mut self, code: u16, value: i32) -> Verdict {
        // Media keys stay with the system when configured so.
        if self.disable_media_keys && keymap::is_media_key(code) {
            return Verdict::Forward;
        }

        if keymap::is_modifier_code(code) {
            return self.on_modifier(code, value);
        }

        match value {
            1 => self.on_press(code),
            0 => self.on_release(code),
            // Autorepeat of a suppressed key must not leak to the clone.
            _ => {
                if self.buffered.contains(&code) {
                    Verdict::Suppress
                } else {
                    Verdict::Forward
                }
            }
        }
    }

    /// Modifiers are always forwarded; they only update shared state and
    /// may fire a tap or drive the double-tap machine on release.
    fn on_modifier(&mut self, code: u16, value: i32) -> Verdict {
        match value {
            1 => {
                self.matcher.update_modifier(code, true);
                // Candidate only when this is the sole modifier down and a
                // tap command is registered; any other modifier press
                // disturbs an existing candidate.
                let alone = self.matcher.mask().count() == 1;
                if alone && self.table.tap_command_for(code).is_some() {
                    self.matcher.mark_tap_candidate(code);
                } else {
                    self.matcher.clear_tap_candidate();
                }
            }
            0 => {
                let table = self.table.clone();
                if let Some(double_tap) = table.double_tap_for(code) {
                    // The double-tap machine runs first; its timeout
                    // fallback covers the registered tap command.
                    let fallback = table.tap_command_for(code).map(str::to_string);
                    self.drive_double_tap(code, double_tap, fallback);
                } else if self.matcher.take_tap(code) {
                    if let Some(command) = table.tap_command_for(code) {
                        tracing::debug!("tap: {}", command);
                        self.runtime.execute(command);
                    }
                }
                self.matcher.update_modifier(code, false);
            }
            _ => {}
        }
        Verdict::Forward
    }

    fn on_press(&mut self, code: u16) -> Verdict {
        // Any non-modifier press disturbs a pending tap.
        self.matcher.clear_tap_candidate();

        // Double-tap keys are suppressed on press; everything happens on
        // their releases.
        if self.table.double_tap_for(code).is_some() {
            self.buffered.insert(code);
            return Verdict::Suppress;
        }

        let Some(combo) = self.effective_combo(code) else {
            return Verdict::Forward;
        };

        let has_release = self.table.has_release_variant(&combo);
        let fired = self.fire_press_shortcut(&combo);

        if fired || has_release {
            self.buffered.insert(code);
            Verdict::Suppress
        } else {
            Verdict::Forward
        }
    }

    fn on_release(&mut self, code: u16) -> Verdict {
        // The combo is re-formed with the modifier mask as it is now, not
        // as it was at press time. Intentional: release shortcuts match
        // against the live state even if a modifier went up first.
        let combo = self.effective_combo(code);

        if let Some(combo) = &combo {
            self.runtime.stop_for(combo);
        }

        if self.buffered.contains(&code) {
            let table = self.table.clone();
            if let Some(double_tap) = table.double_tap_for(code) {
                self.buffered.remove(&code);
                let fallback = combo.as_deref().and_then(|c| {
                    table
                        .lookup(c, BehaviorMode::Normal, TimingMode::OnPress)
                        .map(|s| s.command().to_string())
                });
                self.drive_double_tap(code, double_tap, fallback);
                return Verdict::Suppress;
            }
        }

        if self.buffered.remove(&code) {
            if let Some(combo) = &combo {
                self.fire_release_shortcuts(combo);
            }
            return Verdict::Suppress;
        }

        Verdict::Forward
    }

    /// The combo this key code matches under: a passthrough entry wins
    /// regardless of held modifiers, otherwise mask + key name.
    fn effective_combo(&self, code: u16) -> Option<String> {
        if let Some(combo) = self.table.passthrough_combo_for(code) {
            return Some(combo.to_string());
        }
        self.matcher.combo_for(code)
    }

    /// Try press-timing shortcuts in behavior order; at most one fires.
    fn fire_press_shortcut(&mut self, combo: &str) -> bool {
        let table = self.table.clone();
        for behavior in BEHAVIOR_ORDER {
            if let Some(shortcut) = table.lookup(combo, behavior, TimingMode::OnPress) {
                tracing::debug!("shortcut: {} ({})", combo, behavior);
                self.run_press_behavior(combo, shortcut);
                return true;
            }
        }
        false
    }

    fn run_press_behavior(&mut self, combo: &str, shortcut: &ParsedShortcut) {
        match shortcut.behavior {
            BehaviorMode::Normal => self.runtime.execute(shortcut.command()),
            BehaviorMode::WhileHeld => self.runtime.start_held(combo, shortcut.command()),
            BehaviorMode::Hold => {
                let interval = self.runtime.interval_of(shortcut);
                self.runtime.start_hold(combo, shortcut.command(), interval);
            }
            BehaviorMode::RepeatWhileHeld => {
                let interval = self.runtime.interval_of(shortcut);
                self.runtime
                    .start_repeat(combo, shortcut.command(), interval);
            }
            BehaviorMode::RepeatToggle => {
                let interval = self.runtime.interval_of(shortcut);
                self.runtime
                    .toggle_repeat(combo, shortcut.command(), interval);
            }
            BehaviorMode::Switch => {
                let command =
                    self.matcher
                        .next_switch_command(combo, shortcut.timing, &shortcut.commands);
                self.runtime.execute(&command);
            }
            // Double tap never reaches the behavior order; its key codes
            // are intercepted before combo matching.
            BehaviorMode::DoubleTap => {}
        }
    }

    /// Fire every release-timing shortcut under the combo, in behavior
    /// order. Unlike the press side, all matches fire.
    fn fire_release_shortcuts(&mut self, combo: &str) {
        let table = self.table.clone();
        for behavior in BEHAVIOR_ORDER {
            let Some(shortcut) = table.lookup(combo, behavior, TimingMode::OnRelease) else {
                continue;
            };
            tracing::debug!("release shortcut: {} ({})", combo, behavior);
            match behavior {
                BehaviorMode::RepeatToggle => {
                    let interval = self.runtime.interval_of(shortcut);
                    self.runtime
                        .toggle_repeat(combo, shortcut.command(), interval);
                }
                BehaviorMode::Switch => {
                    let command = self.matcher.next_switch_command(
                        combo,
                        shortcut.timing,
                        &shortcut.commands,
                    );
                    self.runtime.execute(&command);
                }
                // Hold-style behaviors have nothing to wait for once the
                // key is already up; they degrade to a single execution.
                _ => self.runtime.execute(shortcut.command()),
            }
        }
    }

    /// Advance the double-tap machine on a release of `code`. A pending
    /// first release makes this the double tap; otherwise this release
    /// arms the window and the timeout fires `fallback`.
    fn drive_double_tap(
        &mut self,
        code: u16,
        double_tap: &ParsedShortcut,
        fallback: Option<String>,
    ) {
        if self.matcher.double_tap_hit(code) {
            tracing::debug!("double tap: {}", double_tap.combo);
            self.runtime.execute(double_tap.command());
        } else {
            let token = self.matcher.arm_double_tap(code);
            let interval = self.runtime.interval_of(double_tap);
            self.runtime.spawn_double_tap_expiry(
                token,
                interval,
                code,
                self.matcher.clone(),
                fallback,
            );
        }
    }
}
