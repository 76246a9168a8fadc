//! Configuration directory and state-file paths.

use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// The configuration directory: `$XDG_CONFIG_HOME/akeyshually`, falling
/// back to `~/.config/akeyshually`.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        if !xdg.is_empty() {
            return Ok(PathBuf::from(xdg).join("akeyshually"));
        }
    }
    let home = std::env::var("HOME").map_err(|_| {
        ConfigError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "HOME is not set",
        ))
    })?;
    Ok(PathBuf::from(home).join(".config").join("akeyshually"))
}

/// Path of the base config file inside a config directory.
pub fn config_file(dir: &Path) -> PathBuf {
    dir.join("config.toml")
}

/// Path of the daemon pid file inside a config directory.
pub fn pid_file(dir: &Path) -> PathBuf {
    dir.join("akeyshually.pid")
}

/// Path of the enabled-overlay list inside a config directory.
pub fn enabled_state_file(dir: &Path) -> PathBuf {
    dir.join(".enabled")
}

/// Expand a leading `~` in a user-supplied path.
pub fn expand_home(path: &str) -> String {
    shellexpand::tilde(path).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_file_names() {
        let dir = Path::new("/tmp/akeyshually-test");
        assert_eq!(config_file(dir), dir.join("config.toml"));
        assert_eq!(pid_file(dir), dir.join("akeyshually.pid"));
        assert_eq!(enabled_state_file(dir), dir.join(".enabled"));
    }
}
