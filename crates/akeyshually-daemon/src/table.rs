//! Compiled shortcut table
//!
//! Read-only index over the parsed shortcut set, built once at startup and
//! shared across all device tasks. Lookups are keyed by
//! `(combo, behavior, timing)` plus a few specialized views: lone-modifier
//! tap commands, double-tap-enabled key codes, and passthrough keys.

use std::collections::HashMap;

use akeyshually_config::keymap;
use akeyshually_config::{BehaviorMode, Config, ParsedShortcut, TimingMode};

/// Press-time tie-break order. The first behavior with a matching entry
/// fires and suppresses the rest for that event; release shortcuts are
/// evaluated against the same order but all matches fire.
pub const BEHAVIOR_ORDER: [BehaviorMode; 6] = [
    BehaviorMode::Normal,
    BehaviorMode::WhileHeld,
    BehaviorMode::Hold,
    BehaviorMode::RepeatWhileHeld,
    BehaviorMode::RepeatToggle,
    BehaviorMode::Switch,
];

#[derive(Debug, Default)]
struct ComboEntry {
    variants: HashMap<(BehaviorMode, TimingMode), ParsedShortcut>,
    has_release: bool,
}

/// The compiled, immutable shortcut index.
#[derive(Debug, Default)]
pub struct ShortcutTable {
    combos: HashMap<String, ComboEntry>,
    /// Key code -> double-tap shortcut. Lone-modifier combos register both
    /// the left and right key codes.
    double_tap: HashMap<u16, ParsedShortcut>,
    /// Modifier key code -> tap command, from on-release entries whose
    /// combo is a single modifier name.
    tap_commands: HashMap<u16, String>,
    /// Key code -> declared combo for passthrough entries. Matching skips
    /// the live modifier mask entirely for these keys.
    passthrough: HashMap<u16, String>,
}

impl ShortcutTable {
    /// Compile the table from a loaded configuration.
    pub fn build(config: &Config) -> Self {
        let mut table = ShortcutTable::default();

        for shortcuts in config.parsed.values() {
            for shortcut in shortcuts {
                table.register(shortcut);
            }
        }

        table
    }

    fn register(&mut self, shortcut: &ParsedShortcut) {
        let entry = self.combos.entry(shortcut.combo.clone()).or_default();
        let key = (shortcut.behavior, shortcut.timing);
        if entry.variants.insert(key, shortcut.clone()).is_some() {
            tracing::warn!(
                "duplicate shortcut for {} ({}, {}), keeping the later entry",
                shortcut.combo,
                shortcut.behavior,
                shortcut.timing.suffix()
            );
        }
        if shortcut.timing == TimingMode::OnRelease {
            entry.has_release = true;
        }

        // Lone-modifier taps: an on-release entry on a bare modifier name
        // registers for both physical variants of that modifier.
        if shortcut.timing == TimingMode::OnRelease && shortcut.commands.len() == 1 {
            if let Some(codes) = keymap::modifier_codes(&shortcut.combo) {
                for code in codes {
                    self.tap_commands.insert(code, shortcut.command().to_string());
                }
            }
        }

        if shortcut.behavior == BehaviorMode::DoubleTap {
            match self.double_tap_codes(&shortcut.combo) {
                Some(codes) => {
                    for code in codes {
                        self.double_tap.insert(code, shortcut.clone());
                    }
                }
                None => tracing::warn!(
                    "doubletap only works on a single key or lone modifier, ignoring {}",
                    shortcut.combo
                ),
            }
        }

        if shortcut.passthrough {
            match self.combo_key_code(&shortcut.combo) {
                Some(code) => {
                    self.passthrough.insert(code, shortcut.combo.clone());
                }
                None => tracing::warn!(
                    "passthrough needs a key in the combo, ignoring {}",
                    shortcut.combo
                ),
            }
        }
    }

    /// Key codes a double-tap combo listens on: the single key's code, or
    /// both codes of a lone modifier. Multi-part combos are not eligible.
    fn double_tap_codes(&self, combo: &str) -> Option<Vec<u16>> {
        if combo.contains('+') {
            return None;
        }
        if let Some(codes) = keymap::modifier_codes(combo) {
            return Some(codes.to_vec());
        }
        keymap::code(combo).map(|c| vec![c])
    }

    /// The code of the (single) non-modifier key in a combo.
    fn combo_key_code(&self, combo: &str) -> Option<u16> {
        combo
            .split('+')
            .find(|part| !keymap::is_modifier_name(part))
            .and_then(keymap::code)
    }

    /// Exact lookup by combo, behavior and timing.
    pub fn lookup(
        &self,
        combo: &str,
        behavior: BehaviorMode,
        timing: TimingMode,
    ) -> Option<&ParsedShortcut> {
        self.combos.get(combo)?.variants.get(&(behavior, timing))
    }

    /// True if any on-release entry exists under this combo. Drives the
    /// press-side buffering decision.
    pub fn has_release_variant(&self, combo: &str) -> bool {
        self.combos.get(combo).is_some_and(|e| e.has_release)
    }

    /// The double-tap shortcut listening on this key code, if any.
    pub fn double_tap_for(&self, code: u16) -> Option<&ParsedShortcut> {
        self.double_tap.get(&code)
    }

    /// The tap command registered for a lone modifier key code, if any.
    pub fn tap_command_for(&self, code: u16) -> Option<&str> {
        self.tap_commands.get(&code).map(String::as_str)
    }

    /// The declared combo of a passthrough entry on this key code, if any.
    pub fn passthrough_combo_for(&self, code: u16) -> Option<&str> {
        self.passthrough.get(&code).map(String::as_str)
    }

    /// Number of distinct combos in the table.
    pub fn combo_count(&self) -> usize {
        self.combos.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use akeyshually_config::parser::parse_config_str;
    use evdev::Key;

    fn table(toml: &str) -> ShortcutTable {
        ShortcutTable::build(&parse_config_str(toml).unwrap())
    }

    #[test]
    fn test_lookup_by_behavior_and_timing() {
        let t = table(
            r#"
            [shortcuts]
            "super+k" = "press-cmd"
            "super+k.onrelease" = "release-cmd"
            "super+k.whileheld" = "held-cmd"
            "#,
        );

        let press = t
            .lookup("super+k", BehaviorMode::Normal, TimingMode::OnPress)
            .unwrap();
        assert_eq!(press.commands, vec!["press-cmd"]);

        let release = t
            .lookup("super+k", BehaviorMode::Normal, TimingMode::OnRelease)
            .unwrap();
        assert_eq!(release.commands, vec!["release-cmd"]);

        let held = t
            .lookup("super+k", BehaviorMode::WhileHeld, TimingMode::OnPress)
            .unwrap();
        assert_eq!(held.commands, vec!["held-cmd"]);

        assert!(t
            .lookup("super+j", BehaviorMode::Normal, TimingMode::OnPress)
            .is_none());
    }

    #[test]
    fn test_has_release_variant() {
        let t = table(
            r#"
            [shortcuts]
            "super+k.onrelease" = "x"
            "super+j" = "y"
            "#,
        );
        assert!(t.has_release_variant("super+k"));
        assert!(!t.has_release_variant("super+j"));
        assert!(!t.has_release_variant("super+unknown"));
    }

    #[test]
    fn test_tap_registers_both_modifier_codes() {
        let t = table(
            r#"
            [shortcuts]
            "super.onrelease" = "rofi"
            "#,
        );
        assert_eq!(t.tap_command_for(Key::KEY_LEFTMETA.code()), Some("rofi"));
        assert_eq!(t.tap_command_for(Key::KEY_RIGHTMETA.code()), Some("rofi"));
        assert_eq!(t.tap_command_for(Key::KEY_LEFTCTRL.code()), None);
    }

    #[test]
    fn test_on_press_lone_modifier_is_not_a_tap() {
        let t = table(
            r#"
            [shortcuts]
            "super" = "x"
            "#,
        );
        assert_eq!(t.tap_command_for(Key::KEY_LEFTMETA.code()), None);
    }

    #[test]
    fn test_double_tap_registration() {
        let t = table(
            r#"
            [shortcuts]
            "super.doubletap(300)" = "launcher"
            "k.doubletap" = "kmap"
            "#,
        );

        let dt = t.double_tap_for(Key::KEY_LEFTMETA.code()).unwrap();
        assert_eq!(dt.commands, vec!["launcher"]);
        assert_eq!(dt.interval_ms, 300.0);
        assert!(t.double_tap_for(Key::KEY_RIGHTMETA.code()).is_some());

        assert!(t.double_tap_for(Key::KEY_K.code()).is_some());
        assert!(t.double_tap_for(Key::KEY_J.code()).is_none());
    }

    #[test]
    fn test_double_tap_on_multi_part_combo_ignored() {
        let t = table(
            r#"
            [shortcuts]
            "super+k.doubletap" = "x"
            "j" = "keep-the-table-nonempty"
            "#,
        );
        assert!(t.double_tap_for(Key::KEY_K.code()).is_none());
    }

    #[test]
    fn test_passthrough_lookup() {
        let t = table(
            r#"
            [shortcuts]
            "f5.passthrough" = "refresh"
            "f6" = "plain"
            "#,
        );
        assert_eq!(t.passthrough_combo_for(Key::KEY_F5.code()), Some("f5"));
        assert_eq!(t.passthrough_combo_for(Key::KEY_F6.code()), None);
    }

    #[test]
    fn test_switch_entry() {
        let t = table(
            r#"
            [shortcuts]
            "f2.switch" = ["a", "b", "c"]
            "#,
        );
        let s = t
            .lookup("f2", BehaviorMode::Switch, TimingMode::OnPress)
            .unwrap();
        assert_eq!(s.commands.len(), 3);
    }
}
