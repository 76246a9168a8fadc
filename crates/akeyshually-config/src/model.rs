//! Configuration data model

use std::collections::HashMap;
use std::fmt;

use serde::Deserialize;

/// Global settings from the `[settings]` table.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Default interval for timed behaviors. Values below 10 are read as
    /// seconds, everything else as milliseconds.
    pub default_interval: f64,
    /// Forward media keys untouched and let the system handle them.
    pub disable_media_keys: bool,
    /// Shell used to run commands. Empty means `$SHELL`, falling back to `sh`.
    pub shell: String,
    /// File sourced before each command (e.g. `~/.profile`).
    pub env_file: String,
    /// Send a desktop notification when an overlay is enabled or disabled.
    pub notify_on_overlay_change: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_interval: 0.0,
            disable_media_keys: false,
            shell: String::new(),
            env_file: String::new(),
            notify_on_overlay_change: false,
        }
    }
}

/// Fallback applied when `default_interval` is absent or zero.
pub const DEFAULT_INTERVAL_MS: f64 = 150.0;

/// What a shortcut does when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BehaviorMode {
    /// Run the command once.
    Normal,
    /// Keep a subprocess alive while the key is held, SIGTERM on release.
    WhileHeld,
    /// Run once after the key has been held for the interval.
    Hold,
    /// Re-run the command on an interval while the key is held.
    RepeatWhileHeld,
    /// Like `RepeatWhileHeld`, but latched: press starts, next press stops.
    RepeatToggle,
    /// Cycle through an array of commands, one per press.
    Switch,
    /// Two releases within the interval; single release falls back.
    DoubleTap,
}

impl BehaviorMode {
    /// The suffix spelling used in key specs.
    pub fn suffix(self) -> &'static str {
        match self {
            BehaviorMode::Normal => "normal",
            BehaviorMode::WhileHeld => "whileheld",
            BehaviorMode::Hold => "hold",
            BehaviorMode::RepeatWhileHeld => "repeat-whileheld",
            BehaviorMode::RepeatToggle => "repeat-toggle",
            BehaviorMode::Switch => "switch",
            BehaviorMode::DoubleTap => "doubletap",
        }
    }
}

impl fmt::Display for BehaviorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

/// Whether a shortcut fires on key press or key release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TimingMode {
    #[default]
    OnPress,
    OnRelease,
}

impl TimingMode {
    pub fn suffix(self) -> &'static str {
        match self {
            TimingMode::OnPress => "onpress",
            TimingMode::OnRelease => "onrelease",
        }
    }
}

/// One parsed shortcut entry.
///
/// Created when the configuration loads, owned by the shortcut table, and
/// immutable until the engine restarts after a config change.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedShortcut {
    /// Canonical combo: modifiers in super, ctrl, alt, shift order, then
    /// the key name, joined by `+`. A lone modifier name is also valid.
    pub combo: String,
    pub behavior: BehaviorMode,
    pub timing: TimingMode,
    /// Milliseconds; 0 means use the configured default.
    pub interval_ms: f64,
    /// Exactly one command, except `switch` which carries two or more.
    pub commands: Vec<String>,
    /// Match on the bare key regardless of held modifiers.
    pub passthrough: bool,
}

impl ParsedShortcut {
    /// The first command. Valid for every behavior except `switch`, which
    /// indexes into `commands` through its cursor instead.
    pub fn command(&self) -> &str {
        &self.commands[0]
    }

    /// Reconstruct the key-spec string this shortcut parses from.
    ///
    /// `parse(spec_string(s)) == s` for every valid shortcut.
    pub fn spec_string(&self) -> String {
        let mut spec = self.combo.clone();
        if self.behavior != BehaviorMode::Normal {
            spec.push('.');
            spec.push_str(self.behavior.suffix());
            if self.interval_ms != 0.0 {
                spec.push_str(&format!("({})", self.interval_ms));
            }
        }
        if self.timing == TimingMode::OnRelease {
            spec.push_str(".onrelease");
        }
        if self.passthrough {
            spec.push_str(".passthrough");
        }
        spec
    }
}

/// Raw value of a `[shortcuts]` entry before validation.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ShortcutValue {
    Single(String),
    Multi(Vec<String>),
}

/// Deserialized shape of a config file, before shortcut parsing.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfig {
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub shortcuts: HashMap<String, ShortcutValue>,
    #[serde(default)]
    pub command_variables: HashMap<String, String>,
}

/// Fully loaded configuration: settings, parsed shortcuts, command aliases.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub settings: Settings,
    /// Raw shortcut entries, kept for overlay merging.
    pub shortcuts: HashMap<String, ShortcutValue>,
    /// Command aliases from `[command_variables]`.
    pub commands: HashMap<String, String>,
    /// Parsed shortcuts grouped by canonical combo.
    pub parsed: HashMap<String, Vec<ParsedShortcut>>,
}

impl Config {
    /// Resolve a command reference through `[command_variables]`.
    ///
    /// Unknown references are returned unchanged and run as shell commands.
    pub fn resolve_command<'a>(&'a self, reference: &'a str) -> &'a str {
        self.commands
            .get(reference)
            .map(String::as_str)
            .unwrap_or(reference)
    }

    /// Effective default interval in milliseconds.
    pub fn default_interval_ms(&self) -> f64 {
        if self.settings.default_interval == 0.0 {
            DEFAULT_INTERVAL_MS
        } else {
            self.settings.default_interval
        }
    }
}

/// Apply the `< 10` seconds heuristic to an interval value.
///
/// `5` means 5 seconds (5000 ms); `50` means 50 ms. Preserved as a
/// user-facing convention even at the awkward boundary values.
pub fn normalize_interval(value: f64) -> f64 {
    if value >= 10.0 {
        value
    } else {
        value * 1000.0
    }
}
