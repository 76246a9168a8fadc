//! Overlay configs and the `.enabled` state file.
//!
//! Overlays are sibling `*.toml` files in the config dir, merged over the
//! base config in the order listed by `.enabled`. The state file is a
//! plain newline-separated list of filenames, deduplicated, rewritten
//! atomically (temp file + rename).

use std::collections::HashSet;
use std::path::Path;

use crate::error::ConfigError;
use crate::model::{Config, RawConfig};
use crate::parser;
use crate::paths;

/// Read the list of enabled overlay filenames. A missing state file means
/// an empty list.
pub fn read_enabled(dir: &Path) -> Result<Vec<String>, ConfigError> {
    let path = paths::enabled_state_file(dir);
    let content = match std::fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(ConfigError::Io(e)),
    };

    let mut seen = HashSet::new();
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| seen.insert(line.to_string()))
        .map(str::to_string)
        .collect())
}

/// Write the enabled list, deduplicated, atomically.
pub fn write_enabled(dir: &Path, files: &[String]) -> Result<(), ConfigError> {
    let path = paths::enabled_state_file(dir);
    let tmp = path.with_extension("tmp");

    let mut seen = HashSet::new();
    let unique: Vec<&str> = files
        .iter()
        .map(String::as_str)
        .filter(|f| !f.is_empty() && seen.insert(f.to_string()))
        .collect();

    let mut content = unique.join("\n");
    if !content.is_empty() {
        content.push('\n');
    }

    std::fs::write(&tmp, content)?;
    std::fs::rename(&tmp, &path)?;
    Ok(())
}

/// Add an overlay to the enabled list (no-op when already present).
pub fn add_overlay(dir: &Path, filename: &str) -> Result<(), ConfigError> {
    let mut files = read_enabled(dir)?;
    if files.iter().any(|f| f == filename) {
        return Ok(());
    }
    files.push(filename.to_string());
    write_enabled(dir, &files)
}

/// Remove an overlay from the enabled list.
pub fn remove_overlay(dir: &Path, filename: &str) -> Result<(), ConfigError> {
    let files: Vec<String> = read_enabled(dir)?
        .into_iter()
        .filter(|f| f != filename)
        .collect();
    write_enabled(dir, &files)
}

/// Disable every overlay.
pub fn clear_overlays(dir: &Path) -> Result<(), ConfigError> {
    write_enabled(dir, &[])
}

/// Merge an overlay into a base config.
///
/// Overlay shortcuts and command variables override the base entry by key;
/// a nonzero overlay `default_interval` replaces the base value. Parsed
/// shortcuts must be rebuilt by the caller afterwards.
pub fn merge_raw(base: &mut Config, overlay: RawConfig) {
    for (key, value) in overlay.shortcuts {
        base.shortcuts.insert(key, value);
    }
    for (key, value) in overlay.command_variables {
        base.commands.insert(key, value);
    }
    if overlay.settings.default_interval != 0.0 {
        base.settings.default_interval =
            crate::model::normalize_interval(overlay.settings.default_interval);
    }
}

/// Load the base config from `dir` and merge the given overlays on top, in
/// order. An overlay that fails to read or parse is skipped with a
/// warning; an invalid shortcut introduced by the merge fails the load.
pub fn load_with_overlays(dir: &Path, overlays: &[String]) -> Result<Config, ConfigError> {
    let base_path = paths::config_file(dir);
    if !base_path.exists() {
        return Err(ConfigError::NotFound {
            path: base_path.display().to_string(),
        });
    }
    let content = std::fs::read_to_string(&base_path)?;
    let mut config = parser::parse_config_str(&content)?;

    for filename in overlays {
        let path = dir.join(filename);
        let raw = match load_overlay_raw(&path) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!("skipping overlay {}: {}", filename, e);
                continue;
            }
        };
        merge_raw(&mut config, raw);
    }

    parser::rebuild_parsed(&mut config)?;
    Ok(config)
}

fn load_overlay_raw(path: &Path) -> Result<RawConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content).map_err(|source| ConfigError::Toml {
        src: content,
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("akeyshually-{name}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_enabled_state_round_trip() {
        let dir = temp_dir("enabled");

        assert!(read_enabled(&dir).unwrap().is_empty());

        add_overlay(&dir, "gaming.toml").unwrap();
        add_overlay(&dir, "work.toml").unwrap();
        add_overlay(&dir, "gaming.toml").unwrap(); // duplicate ignored
        assert_eq!(read_enabled(&dir).unwrap(), vec!["gaming.toml", "work.toml"]);

        remove_overlay(&dir, "gaming.toml").unwrap();
        assert_eq!(read_enabled(&dir).unwrap(), vec!["work.toml"]);

        clear_overlays(&dir).unwrap();
        assert!(read_enabled(&dir).unwrap().is_empty());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_enabled_state_deduplicates_on_read() {
        let dir = temp_dir("dedup");
        std::fs::write(
            paths::enabled_state_file(&dir),
            "a.toml\nb.toml\na.toml\n\n  \nb.toml\n",
        )
        .unwrap();
        assert_eq!(read_enabled(&dir).unwrap(), vec!["a.toml", "b.toml"]);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_overlay_merge_overrides() {
        let dir = temp_dir("merge");
        std::fs::write(
            paths::config_file(&dir),
            r#"
            [settings]
            default_interval = 100

            [shortcuts]
            "super+k" = "base-command"
            "super+j" = "untouched"

            [command_variables]
            term = "alacritty"
            "#,
        )
        .unwrap();
        std::fs::write(
            dir.join("gaming.toml"),
            r#"
            [settings]
            default_interval = 50

            [shortcuts]
            "super+k" = "overlay-command"

            [command_variables]
            term = "foot"
            "#,
        )
        .unwrap();

        let cfg = load_with_overlays(&dir, &["gaming.toml".to_string()]).unwrap();
        assert_eq!(cfg.settings.default_interval, 50.0);
        assert_eq!(cfg.parsed["super+k"][0].commands, vec!["overlay-command"]);
        assert_eq!(cfg.parsed["super+j"][0].commands, vec!["untouched"]);
        assert_eq!(cfg.resolve_command("term"), "foot");

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_broken_overlay_is_skipped() {
        let dir = temp_dir("broken");
        std::fs::write(
            paths::config_file(&dir),
            "[shortcuts]\n\"super+k\" = \"base\"\n",
        )
        .unwrap();
        std::fs::write(dir.join("bad.toml"), "[shortcuts\nbroken").unwrap();

        let cfg = load_with_overlays(&dir, &["bad.toml".to_string(), "missing.toml".to_string()])
            .unwrap();
        assert_eq!(cfg.parsed["super+k"][0].commands, vec!["base"]);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_missing_base_config() {
        let dir = temp_dir("missing-base");
        let err = load_with_overlays(&dir, &[]).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound { .. }));
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
