//! Mutable matching state shared across device tasks.
//!
//! One [`Matcher`] instance serves every keyboard and mouse reader: the
//! modifier mask is daemon-wide (combos cannot span physical keyboards,
//! but modifier state must survive whichever device delivered the key),
//! the tap candidate is a single shared cell that mouse readers clear,
//! and the double-tap slot pairs a pending key code with the cancellation
//! handle of its timeout.

use std::collections::HashMap;

use parking_lot::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use akeyshually_config::TimingMode;

/// A normalized modifier; left and right key variants collapse into one.
///
/// The variant order is the canonical combo order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Modifier {
    Super,
    Ctrl,
    Alt,
    Shift,
}

impl Modifier {
    pub const ALL: [Modifier; 4] = [
        Modifier::Super,
        Modifier::Ctrl,
        Modifier::Alt,
        Modifier::Shift,
    ];

    /// Classify a key code, if it is a modifier key.
    pub fn from_code(code: u16) -> Option<Self> {
        use evdev::Key;
        match Key::new(code) {
            Key::KEY_LEFTMETA | Key::KEY_RIGHTMETA => Some(Modifier::Super),
            Key::KEY_LEFTCTRL | Key::KEY_RIGHTCTRL => Some(Modifier::Ctrl),
            Key::KEY_LEFTALT | Key::KEY_RIGHTALT => Some(Modifier::Alt),
            Key::KEY_LEFTSHIFT | Key::KEY_RIGHTSHIFT => Some(Modifier::Shift),
            _ => None,
        }
    }

    /// Canonical combo name of the modifier.
    pub fn name(self) -> &'static str {
        match self {
            Modifier::Super => "super",
            Modifier::Ctrl => "ctrl",
            Modifier::Alt => "alt",
            Modifier::Shift => "shift",
        }
    }
}

/// Snapshot of which modifiers are currently held.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModifierMask {
    down: [bool; 4],
}

impl ModifierMask {
    pub fn set(&mut self, modifier: Modifier, pressed: bool) {
        self.down[modifier as usize] = pressed;
    }

    pub fn is_down(&self, modifier: Modifier) -> bool {
        self.down[modifier as usize]
    }

    /// Number of distinct modifiers held.
    pub fn count(&self) -> usize {
        self.down.iter().filter(|d| **d).count()
    }

    pub fn any(&self) -> bool {
        self.down.iter().any(|d| *d)
    }

    /// Held modifiers in canonical order.
    pub fn iter_down(&self) -> impl Iterator<Item = Modifier> + '_ {
        Modifier::ALL.into_iter().filter(|m| self.is_down(*m))
    }
}

#[derive(Default)]
struct DoubleTapSlot {
    pending: Option<u16>,
    cancel: Option<CancellationToken>,
}

/// Shared matcher state. Cheap to lock: every critical section is a field
/// read or a map operation.
#[derive(Default)]
pub struct Matcher {
    mask: Mutex<ModifierMask>,
    tap_candidate: RwLock<Option<u16>>,
    double_tap: Mutex<DoubleTapSlot>,
    switch_cursors: Mutex<HashMap<(String, TimingMode), usize>>,
}

impl Matcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a modifier press or release. Non-modifier codes are ignored.
    pub fn update_modifier(&self, code: u16, pressed: bool) {
        if let Some(modifier) = Modifier::from_code(code) {
            self.mask.lock().set(modifier, pressed);
        }
    }

    /// Snapshot of the current modifier mask.
    pub fn mask(&self) -> ModifierMask {
        *self.mask.lock()
    }

    /// Build the canonical combo string for a key code under the current
    /// mask. `None` when the code has no name in the key table.
    pub fn combo_for(&self, code: u16) -> Option<String> {
        let name = akeyshually_config::keymap::name(code)?;
        let mask = self.mask();

        if !mask.any() {
            return Some(name.to_string());
        }

        let mut parts: Vec<&str> = Vec::with_capacity(5);
        for modifier in mask.iter_down() {
            parts.push(modifier.name());
        }
        parts.push(name);
        Some(parts.join("+"))
    }

    // --- Tap candidacy ---

    /// Mark a modifier as the tap candidate.
    pub fn mark_tap_candidate(&self, code: u16) {
        *self.tap_candidate.write() = Some(code);
    }

    /// Clear the tap candidate. Called on any non-modifier press, any
    /// modifier press that is not alone, and any mouse button press.
    pub fn clear_tap_candidate(&self) {
        *self.tap_candidate.write() = None;
    }

    /// If `code` is still the candidate, consume it and report a tap.
    pub fn take_tap(&self, code: u16) -> bool {
        let mut candidate = self.tap_candidate.write();
        if *candidate == Some(code) {
            *candidate = None;
            true
        } else {
            false
        }
    }

    // --- Double tap ---

    /// Second-release check: if `code` is the pending double-tap key, the
    /// armed timer is cancelled, the slot cleared, and the double tap
    /// reported. Otherwise the caller should arm.
    pub fn double_tap_hit(&self, code: u16) -> bool {
        let mut slot = self.double_tap.lock();
        if slot.pending == Some(code) {
            if let Some(cancel) = slot.cancel.take() {
                cancel.cancel();
            }
            slot.pending = None;
            true
        } else {
            false
        }
    }

    /// Arm the double-tap window for `code`, replacing any other pending
    /// key (its timer is cancelled without firing a fallback). Returns the
    /// token the timeout task should watch.
    pub fn arm_double_tap(&self, code: u16) -> CancellationToken {
        let mut slot = self.double_tap.lock();
        if let Some(old) = slot.cancel.take() {
            old.cancel();
        }
        let token = CancellationToken::new();
        slot.pending = Some(code);
        slot.cancel = Some(token.clone());
        token
    }

    /// Timer-expiry check: clears the slot and reports true only if `code`
    /// is still pending. The slot lock makes expiry and a racing second
    /// release mutually exclusive, so exactly one of them fires.
    pub fn expire_double_tap(&self, code: u16) -> bool {
        let mut slot = self.double_tap.lock();
        if slot.pending == Some(code) {
            slot.pending = None;
            slot.cancel = None;
            true
        } else {
            false
        }
    }

    /// Drop any pending double tap (mouse input, shutdown).
    pub fn clear_double_tap(&self) {
        let mut slot = self.double_tap.lock();
        if let Some(cancel) = slot.cancel.take() {
            cancel.cancel();
        }
        slot.pending = None;
    }

    // --- Switch cursors ---

    /// Read and advance the switch cursor for `(combo, timing)`, returning
    /// the command at the pre-advance index.
    pub fn next_switch_command(
        &self,
        combo: &str,
        timing: TimingMode,
        commands: &[String],
    ) -> String {
        let mut cursors = self.switch_cursors.lock();
        let cursor = cursors
            .entry((combo.to_string(), timing))
            .or_insert(0);
        let command = commands[*cursor % commands.len()].clone();
        *cursor = (*cursor + 1) % commands.len();
        command
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evdev::Key;

    #[test]
    fn test_modifier_from_code_collapses_variants() {
        assert_eq!(
            Modifier::from_code(Key::KEY_LEFTMETA.code()),
            Some(Modifier::Super)
        );
        assert_eq!(
            Modifier::from_code(Key::KEY_RIGHTMETA.code()),
            Some(Modifier::Super)
        );
        assert_eq!(
            Modifier::from_code(Key::KEY_RIGHTCTRL.code()),
            Some(Modifier::Ctrl)
        );
        assert_eq!(Modifier::from_code(Key::KEY_A.code()), None);
    }

    #[test]
    fn test_mask_tracks_press_release_history() {
        let m = Matcher::new();
        m.update_modifier(Key::KEY_LEFTMETA.code(), true);
        m.update_modifier(Key::KEY_LEFTSHIFT.code(), true);
        assert_eq!(m.mask().count(), 2);
        assert!(m.mask().is_down(Modifier::Super));
        assert!(m.mask().is_down(Modifier::Shift));

        m.update_modifier(Key::KEY_LEFTMETA.code(), false);
        assert_eq!(m.mask().count(), 1);
        assert!(!m.mask().is_down(Modifier::Super));

        // Non-modifier codes never touch the mask
        m.update_modifier(Key::KEY_A.code(), true);
        assert_eq!(m.mask().count(), 1);
    }

    #[test]
    fn test_combo_for_without_modifiers() {
        let m = Matcher::new();
        assert_eq!(m.combo_for(Key::KEY_K.code()), Some("k".to_string()));
        assert_eq!(m.combo_for(Key::KEY_SYSRQ.code()), Some("print".to_string()));
        // Unnamed codes produce no combo
        assert_eq!(m.combo_for(0x2ff), None);
    }

    #[test]
    fn test_combo_for_uses_canonical_order() {
        let m = Matcher::new();
        // Press shift before super; the combo still leads with super
        m.update_modifier(Key::KEY_LEFTSHIFT.code(), true);
        m.update_modifier(Key::KEY_LEFTMETA.code(), true);
        assert_eq!(
            m.combo_for(Key::KEY_K.code()),
            Some("super+shift+k".to_string())
        );
    }

    #[test]
    fn test_tap_candidate_lifecycle() {
        let m = Matcher::new();
        let meta = Key::KEY_LEFTMETA.code();

        m.mark_tap_candidate(meta);
        assert!(m.take_tap(meta));
        // Consumed: a second release is not a tap
        assert!(!m.take_tap(meta));

        m.mark_tap_candidate(meta);
        m.clear_tap_candidate();
        assert!(!m.take_tap(meta));

        // A different code is never the candidate
        m.mark_tap_candidate(meta);
        assert!(!m.take_tap(Key::KEY_LEFTCTRL.code()));
    }

    #[test]
    fn test_double_tap_hit_and_expire_are_exclusive() {
        let m = Matcher::new();
        let meta = Key::KEY_LEFTMETA.code();

        // Nothing pending: not a hit
        assert!(!m.double_tap_hit(meta));

        let token = m.arm_double_tap(meta);
        assert!(!token.is_cancelled());

        // Second release within the window
        assert!(m.double_tap_hit(meta));
        assert!(token.is_cancelled());
        // Slot is cleared, expiry must not fire
        assert!(!m.expire_double_tap(meta));
    }

    #[test]
    fn test_double_tap_expiry_path() {
        let m = Matcher::new();
        let meta = Key::KEY_LEFTMETA.code();

        m.arm_double_tap(meta);
        assert!(m.expire_double_tap(meta));
        // After expiry the next release arms again instead of hitting
        assert!(!m.double_tap_hit(meta));
    }

    #[test]
    fn test_arm_replaces_other_pending_key() {
        let m = Matcher::new();
        let meta = Key::KEY_LEFTMETA.code();
        let k = Key::KEY_K.code();

        let first = m.arm_double_tap(meta);
        let _second = m.arm_double_tap(k);
        assert!(first.is_cancelled());
        assert!(!m.expire_double_tap(meta));
        assert!(m.double_tap_hit(k));
    }

    #[test]
    fn test_switch_cursor_cycles() {
        let m = Matcher::new();
        let commands: Vec<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();

        let mut seen = Vec::new();
        for _ in 0..6 {
            seen.push(m.next_switch_command("f2", TimingMode::OnPress, &commands));
        }
        assert_eq!(seen, ["a", "b", "c", "a", "b", "c"]);
    }

    #[test]
    fn test_switch_cursors_are_independent_per_timing() {
        let m = Matcher::new();
        let commands: Vec<String> = ["a", "b"].iter().map(|s| s.to_string()).collect();

        assert_eq!(m.next_switch_command("f2", TimingMode::OnPress, &commands), "a");
        assert_eq!(
            m.next_switch_command("f2", TimingMode::OnRelease, &commands),
            "a"
        );
        assert_eq!(m.next_switch_command("f2", TimingMode::OnPress, &commands), "b");
    }
}
