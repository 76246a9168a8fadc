//! Configuration loading for akeyshually.
//!
//! A single TOML file plus optional overlay files merged on top in the
//! order listed by the `.enabled` state file. Shortcut keys use a dot
//! suffix grammar parsed by [`parser`]; key names resolve through the
//! fixed table in [`keymap`].

pub mod error;
pub mod keymap;
pub mod model;
pub mod overlay;
pub mod parser;
pub mod paths;
pub mod pidfile;

pub use error::ConfigError;
pub use model::{
    BehaviorMode, Config, ParsedShortcut, RawConfig, Settings, ShortcutValue, TimingMode,
    DEFAULT_INTERVAL_MS,
};

use std::path::Path;

/// Load the base config from the default config directory.
pub fn load() -> Result<Config, ConfigError> {
    let dir = paths::config_dir()?;
    load_from_dir(&dir)
}

/// Load the base config from a specific directory (no overlays).
pub fn load_from_dir(dir: &Path) -> Result<Config, ConfigError> {
    overlay::load_with_overlays(dir, &[])
}

/// Load the base config plus the overlays currently enabled in `dir`.
pub fn load_enabled(dir: &Path) -> Result<Config, ConfigError> {
    let overlays = overlay::read_enabled(dir).unwrap_or_else(|e| {
        tracing::warn!("failed to read enabled overlays: {}", e);
        Vec::new()
    });
    overlay::load_with_overlays(dir, &overlays)
}

/// Default config file contents, embedded at build time.
pub const DEFAULT_CONFIG: &str = include_str!("../defaults/config.toml");

/// User systemd unit, embedded at build time.
pub const DEFAULT_SERVICE_UNIT: &str = include_str!("../defaults/akeyshually.service");

/// Create the config directory and materialize the embedded defaults for
/// any file that does not exist yet.
pub fn ensure_config_exists(dir: &Path) -> Result<(), ConfigError> {
    std::fs::create_dir_all(dir)?;

    let defaults: [(&Path, &str); 2] = [
        (Path::new("config.toml"), DEFAULT_CONFIG),
        (Path::new("akeyshually.service"), DEFAULT_SERVICE_UNIT),
    ];
    for (name, content) in defaults {
        let dest = dir.join(name);
        if !dest.exists() {
            std::fs::write(&dest, content)?;
        }
    }
    Ok(())
}
