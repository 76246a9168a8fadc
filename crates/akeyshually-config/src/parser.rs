//! Key-spec parsing
//!
//! A shortcut key looks like `KEYCOMBO(.MODIFIER)*`:
//!
//! - `KEYCOMBO` is `part(+part)*` where parts are the modifiers
//!   super/ctrl/alt/shift (plus their aliases) and at most one key name
//!   from the fixed table. A lone modifier name is also a valid combo.
//! - Suffix modifiers select a behavior (`whileheld`, `hold`, `toggle`,
//!   `repeat-whileheld`/`loop`, `repeat-toggle`, `switch`, `doubletap`),
//!   a timing (`onpress`/`onrelease`) or `passthrough`. Behaviors other
//!   than `switch` may carry an interval: `.repeat-whileheld(50)`.
//!
//! Declared modifier order never matters: `ctrl+super+k` and
//! `super+ctrl+k` both canonicalize to `super+ctrl+k`.

use std::collections::HashMap;

use crate::error::ConfigError;
use crate::keymap;
use crate::model::{
    normalize_interval, BehaviorMode, Config, ParsedShortcut, RawConfig, ShortcutValue, TimingMode,
};

/// Parse the contents of a config file into a [`Config`].
///
/// Every `[shortcuts]` entry is parsed and validated; the first invalid
/// entry fails the whole load with the offending key in the error.
pub fn parse_config_str(content: &str) -> Result<Config, ConfigError> {
    let raw: RawConfig = toml::from_str(content).map_err(|source| ConfigError::Toml {
        src: content.to_string(),
        source,
    })?;

    if raw.shortcuts.is_empty() {
        return Err(ConfigError::NoShortcuts);
    }

    let mut config = Config {
        settings: raw.settings,
        shortcuts: raw.shortcuts,
        commands: raw.command_variables,
        parsed: HashMap::new(),
    };

    if config.settings.default_interval != 0.0 {
        config.settings.default_interval = normalize_interval(config.settings.default_interval);
    }

    rebuild_parsed(&mut config)?;

    Ok(config)
}

/// Re-parse every raw shortcut entry into `config.parsed`.
///
/// Called after the initial load and again after each overlay merge.
pub fn rebuild_parsed(config: &mut Config) -> Result<(), ConfigError> {
    config.parsed.clear();
    for (key, value) in &config.shortcuts {
        let shortcut = parse_shortcut(key, value)?;
        config
            .parsed
            .entry(shortcut.combo.clone())
            .or_default()
            .push(shortcut);
    }
    Ok(())
}

/// Parse one `[shortcuts]` key/value pair.
pub fn parse_shortcut(key: &str, value: &ShortcutValue) -> Result<ParsedShortcut, ConfigError> {
    let mut parts = key.split('.');
    let combo_spec = parts.next().unwrap_or_default();
    if combo_spec.is_empty() {
        return Err(ConfigError::InvalidShortcut {
            key: key.to_string(),
            reason: "empty key combo".to_string(),
        });
    }

    let combo = canonicalize_combo(key, combo_spec)?;

    let commands = match value {
        ShortcutValue::Single(cmd) => vec![cmd.clone()],
        ShortcutValue::Multi(cmds) => cmds.clone(),
    };

    let mut shortcut = ParsedShortcut {
        combo,
        behavior: BehaviorMode::Normal,
        timing: TimingMode::OnPress,
        interval_ms: 0.0,
        commands,
        passthrough: false,
    };

    let mut behavior_seen = false;
    for part in parts {
        let part = part.trim().to_lowercase();

        if let Some((behavior, interval)) = parse_interval_suffix(key, &part)? {
            set_behavior(key, &mut shortcut, &mut behavior_seen, behavior)?;
            shortcut.interval_ms = normalize_interval(interval);
            continue;
        }

        match part.as_str() {
            "whileheld" => {
                set_behavior(key, &mut shortcut, &mut behavior_seen, BehaviorMode::WhileHeld)?
            }
            "hold" => set_behavior(key, &mut shortcut, &mut behavior_seen, BehaviorMode::Hold)?,
            // Legacy spelling of repeat-toggle
            "toggle" | "repeat-toggle" => set_behavior(
                key,
                &mut shortcut,
                &mut behavior_seen,
                BehaviorMode::RepeatToggle,
            )?,
            "repeat-whileheld" | "loop" => set_behavior(
                key,
                &mut shortcut,
                &mut behavior_seen,
                BehaviorMode::RepeatWhileHeld,
            )?,
            "switch" => set_behavior(key, &mut shortcut, &mut behavior_seen, BehaviorMode::Switch)?,
            "doubletap" => set_behavior(
                key,
                &mut shortcut,
                &mut behavior_seen,
                BehaviorMode::DoubleTap,
            )?,
            "onrelease" => shortcut.timing = TimingMode::OnRelease,
            "onpress" => shortcut.timing = TimingMode::OnPress,
            "passthrough" => shortcut.passthrough = true,
            other => {
                return Err(ConfigError::InvalidShortcut {
                    key: key.to_string(),
                    reason: format!("unknown modifier: {other}"),
                });
            }
        }
    }

    validate_commands(key, &shortcut)?;

    Ok(shortcut)
}

/// Canonicalize a combo spec: aliases resolved, modifiers deduplicated and
/// emitted in super, ctrl, alt, shift order, key name last.
fn canonicalize_combo(key: &str, combo_spec: &str) -> Result<String, ConfigError> {
    let mut has = [false; 4]; // super, ctrl, alt, shift
    let mut key_name: Option<String> = None;

    for part in combo_spec.split('+') {
        let part = keymap::normalize(part);
        if part.is_empty() {
            return Err(ConfigError::InvalidShortcut {
                key: key.to_string(),
                reason: "empty component in key combo".to_string(),
            });
        }

        if let Some(idx) = modifier_index(&part) {
            if has[idx] {
                return Err(ConfigError::InvalidShortcut {
                    key: key.to_string(),
                    reason: format!("duplicate modifier: {part}"),
                });
            }
            has[idx] = true;
        } else {
            if key_name.is_some() {
                return Err(ConfigError::InvalidShortcut {
                    key: key.to_string(),
                    reason: format!("more than one key in combo: {part}"),
                });
            }
            if keymap::code(&part).is_none() {
                return Err(ConfigError::UnknownKey {
                    key: key.to_string(),
                    name: part,
                });
            }
            key_name = Some(part);
        }
    }

    let mod_count = has.iter().filter(|m| **m).count();
    if key_name.is_none() && mod_count != 1 {
        return Err(ConfigError::InvalidShortcut {
            key: key.to_string(),
            reason: "combo needs a key, or exactly one lone modifier".to_string(),
        });
    }

    let mut parts = Vec::with_capacity(5);
    for (idx, name) in ["super", "ctrl", "alt", "shift"].iter().enumerate() {
        if has[idx] {
            parts.push(name.to_string());
        }
    }
    if let Some(name) = key_name {
        parts.push(name);
    }

    Ok(parts.join("+"))
}

fn modifier_index(name: &str) -> Option<usize> {
    match name {
        "super" => Some(0),
        "ctrl" => Some(1),
        "alt" => Some(2),
        "shift" => Some(3),
        _ => None,
    }
}

/// Recognize `behavior(number)` suffixes. `switch` and `passthrough` never
/// take an interval.
fn parse_interval_suffix(
    key: &str,
    part: &str,
) -> Result<Option<(BehaviorMode, f64)>, ConfigError> {
    let Some((name, rest)) = part.split_once('(') else {
        return Ok(None);
    };
    let Some(number) = rest.strip_suffix(')') else {
        return Err(ConfigError::InvalidShortcut {
            key: key.to_string(),
            reason: format!("malformed interval notation: {part}"),
        });
    };

    let behavior = match name {
        "whileheld" => BehaviorMode::WhileHeld,
        "hold" => BehaviorMode::Hold,
        "toggle" | "repeat-toggle" => BehaviorMode::RepeatToggle,
        "repeat-whileheld" | "loop" => BehaviorMode::RepeatWhileHeld,
        "doubletap" => BehaviorMode::DoubleTap,
        other => {
            return Err(ConfigError::InvalidShortcut {
                key: key.to_string(),
                reason: format!("'{other}' does not take an interval"),
            });
        }
    };

    let interval: f64 = number.parse().map_err(|_| ConfigError::InvalidShortcut {
        key: key.to_string(),
        reason: format!("invalid interval: {number}"),
    })?;
    if interval < 0.0 {
        return Err(ConfigError::InvalidShortcut {
            key: key.to_string(),
            reason: format!("interval must not be negative: {number}"),
        });
    }

    Ok(Some((behavior, interval)))
}

fn set_behavior(
    key: &str,
    shortcut: &mut ParsedShortcut,
    behavior_seen: &mut bool,
    behavior: BehaviorMode,
) -> Result<(), ConfigError> {
    if *behavior_seen {
        return Err(ConfigError::InvalidShortcut {
            key: key.to_string(),
            reason: format!(
                "conflicting behaviors: {} and {}",
                shortcut.behavior, behavior
            ),
        });
    }
    *behavior_seen = true;
    shortcut.behavior = behavior;
    Ok(())
}

fn validate_commands(key: &str, shortcut: &ParsedShortcut) -> Result<(), ConfigError> {
    if shortcut.behavior == BehaviorMode::Switch {
        if shortcut.commands.len() < 2 {
            return Err(ConfigError::InvalidShortcut {
                key: key.to_string(),
                reason: "switch behavior requires an array of at least 2 commands".to_string(),
            });
        }
    } else if shortcut.commands.len() != 1 {
        return Err(ConfigError::InvalidShortcut {
            key: key.to_string(),
            reason: format!("{} behavior requires a single command", shortcut.behavior),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single(cmd: &str) -> ShortcutValue {
        ShortcutValue::Single(cmd.to_string())
    }

    fn multi(cmds: &[&str]) -> ShortcutValue {
        ShortcutValue::Multi(cmds.iter().map(|c| c.to_string()).collect())
    }

    #[test]
    fn test_parse_plain_combo() {
        let s = parse_shortcut("super+k", &single("rofi")).unwrap();
        assert_eq!(s.combo, "super+k");
        assert_eq!(s.behavior, BehaviorMode::Normal);
        assert_eq!(s.timing, TimingMode::OnPress);
        assert_eq!(s.interval_ms, 0.0);
        assert_eq!(s.commands, vec!["rofi"]);
        assert!(!s.passthrough);
    }

    #[test]
    fn test_modifier_order_is_canonical() {
        let a = parse_shortcut("ctrl+super+k", &single("x")).unwrap();
        let b = parse_shortcut("super+ctrl+k", &single("x")).unwrap();
        assert_eq!(a.combo, "super+ctrl+k");
        assert_eq!(a.combo, b.combo);

        let c = parse_shortcut("shift+alt+ctrl+super+t", &single("x")).unwrap();
        assert_eq!(c.combo, "super+ctrl+alt+shift+t");
    }

    #[test]
    fn test_aliases_resolve() {
        let s = parse_shortcut("win+Enter", &single("x")).unwrap();
        assert_eq!(s.combo, "super+return");

        let s = parse_shortcut("control+esc", &single("x")).unwrap();
        assert_eq!(s.combo, "ctrl+escape");

        let s = parse_shortcut("PrintScreen", &single("x")).unwrap();
        assert_eq!(s.combo, "print");
    }

    #[test]
    fn test_lone_modifier_combo() {
        let s = parse_shortcut("super.onrelease", &single("rofi")).unwrap();
        assert_eq!(s.combo, "super");
        assert_eq!(s.timing, TimingMode::OnRelease);
    }

    #[test]
    fn test_modifiers_without_key_rejected() {
        let err = parse_shortcut("super+ctrl", &single("x")).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidShortcut { .. }));
    }

    #[test]
    fn test_unknown_key_fails() {
        let err = parse_shortcut("super+frobnicate", &single("x")).unwrap_err();
        match err {
            ConfigError::UnknownKey { name, .. } => assert_eq!(name, "frobnicate"),
            other => panic!("expected UnknownKey, got {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_modifier_rejected() {
        let err = parse_shortcut("super+meta+k", &single("x")).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidShortcut { .. }));
    }

    #[test]
    fn test_behavior_suffixes() {
        let s = parse_shortcut("super+f.whileheld", &single("x")).unwrap();
        assert_eq!(s.behavior, BehaviorMode::WhileHeld);

        let s = parse_shortcut("super+f.hold", &single("x")).unwrap();
        assert_eq!(s.behavior, BehaviorMode::Hold);

        let s = parse_shortcut("super+f.repeat-whileheld", &single("x")).unwrap();
        assert_eq!(s.behavior, BehaviorMode::RepeatWhileHeld);

        let s = parse_shortcut("super+f.doubletap", &single("x")).unwrap();
        assert_eq!(s.behavior, BehaviorMode::DoubleTap);
    }

    #[test]
    fn test_legacy_and_alias_spellings() {
        let s = parse_shortcut("super+f.toggle", &single("x")).unwrap();
        assert_eq!(s.behavior, BehaviorMode::RepeatToggle);

        let s = parse_shortcut("super+f.loop", &single("x")).unwrap();
        assert_eq!(s.behavior, BehaviorMode::RepeatWhileHeld);

        let s = parse_shortcut("super+f.loop(50)", &single("x")).unwrap();
        assert_eq!(s.behavior, BehaviorMode::RepeatWhileHeld);
        assert_eq!(s.interval_ms, 50.0);
    }

    #[test]
    fn test_interval_notation() {
        let s = parse_shortcut("super+up.repeat-whileheld(50)", &single("x")).unwrap();
        assert_eq!(s.interval_ms, 50.0);

        // Values below 10 are seconds
        let s = parse_shortcut("super+f.hold(2)", &single("x")).unwrap();
        assert_eq!(s.interval_ms, 2000.0);

        let s = parse_shortcut("super.doubletap(300)", &single("x")).unwrap();
        assert_eq!(s.behavior, BehaviorMode::DoubleTap);
        assert_eq!(s.interval_ms, 300.0);
    }

    #[test]
    fn test_interval_rejected_where_meaningless() {
        assert!(parse_shortcut("f2.switch(100)", &multi(&["a", "b"])).is_err());
        assert!(parse_shortcut("f2.passthrough(100)", &single("x")).is_err());
    }

    #[test]
    fn test_malformed_interval() {
        assert!(parse_shortcut("super+k.hold(abc)", &single("x")).is_err());
        assert!(parse_shortcut("super+k.hold(100", &single("x")).is_err());
        assert!(parse_shortcut("super+k.hold(-5)", &single("x")).is_err());

        // An explicit zero means "use the configured default"
        let s = parse_shortcut("super+k.hold(0)", &single("x")).unwrap();
        assert_eq!(s.interval_ms, 0.0);
    }

    #[test]
    fn test_conflicting_behaviors_rejected() {
        let err = parse_shortcut("super+k.hold.whileheld", &single("x")).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidShortcut { .. }));
    }

    #[test]
    fn test_timing_and_passthrough() {
        let s = parse_shortcut("super+k.onrelease", &single("x")).unwrap();
        assert_eq!(s.timing, TimingMode::OnRelease);

        let s = parse_shortcut("f5.passthrough", &single("x")).unwrap();
        assert!(s.passthrough);

        let s = parse_shortcut("super+k.whileheld.onrelease", &single("x")).unwrap();
        assert_eq!(s.behavior, BehaviorMode::WhileHeld);
        assert_eq!(s.timing, TimingMode::OnRelease);
    }

    #[test]
    fn test_switch_validation() {
        let s = parse_shortcut("f2.switch", &multi(&["a", "b", "c"])).unwrap();
        assert_eq!(s.behavior, BehaviorMode::Switch);
        assert_eq!(s.commands.len(), 3);

        assert!(parse_shortcut("f2.switch", &multi(&["a"])).is_err());
        assert!(parse_shortcut("f2.switch", &single("a")).is_err());
        assert!(parse_shortcut("f2", &multi(&["a", "b"])).is_err());
    }

    #[test]
    fn test_unknown_suffix_rejected() {
        let err = parse_shortcut("super+k.bogus", &single("x")).unwrap_err();
        match err {
            ConfigError::InvalidShortcut { reason, .. } => {
                assert!(reason.contains("unknown modifier"))
            }
            other => panic!("expected InvalidShortcut, got {other:?}"),
        }
    }

    #[test]
    fn test_spec_string_round_trip() {
        let specs: &[(&str, ShortcutValue)] = &[
            ("super+k", single("x")),
            ("super", single("x")),
            ("super.onrelease", single("x")),
            ("super+up.repeat-whileheld(50)", single("x")),
            ("super+f.whileheld", single("x")),
            ("super+f.hold(500)", single("x")),
            ("super.doubletap(300)", single("x")),
            ("f2.switch", multi(&["a", "b"])),
            ("f5.passthrough", single("x")),
            ("super+k.repeat-toggle.onrelease", single("x")),
        ];

        for (spec, value) in specs {
            let parsed = parse_shortcut(spec, value).unwrap();
            let reparsed = parse_shortcut(&parsed.spec_string(), value).unwrap();
            assert_eq!(parsed, reparsed, "round trip of {spec}");
        }
    }

    #[test]
    fn test_parse_config_str() {
        let cfg = parse_config_str(
            r#"
            [settings]
            default_interval = 100

            [shortcuts]
            "super+k" = "rofi"
            "super+k.onrelease" = "notify-send released"
            "f2.switch" = ["a", "b"]

            [command_variables]
            rofi = "rofi -show drun"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.settings.default_interval, 100.0);
        assert_eq!(cfg.parsed["super+k"].len(), 2);
        assert_eq!(cfg.parsed["f2"].len(), 1);
        assert_eq!(cfg.resolve_command("rofi"), "rofi -show drun");
    }

    #[test]
    fn test_parse_config_default_interval_heuristic() {
        let cfg = parse_config_str(
            r#"
            [settings]
            default_interval = 2

            [shortcuts]
            "super+k" = "x"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.settings.default_interval, 2000.0);
    }

    #[test]
    fn test_parse_config_requires_shortcuts() {
        let err = parse_config_str("[settings]\ndefault_interval = 100\n").unwrap_err();
        assert!(matches!(err, ConfigError::NoShortcuts));
    }

    #[test]
    fn test_parse_config_bad_toml() {
        let err = parse_config_str("[shortcuts\n\"a\" = \"b\"").unwrap_err();
        assert!(matches!(err, ConfigError::Toml { .. }));
    }
}
