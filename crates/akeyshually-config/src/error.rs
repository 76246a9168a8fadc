//! Configuration error type with load diagnostics.

use miette::{Diagnostic, LabeledSpan, SourceCode};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config not found: {path}")]
    NotFound { path: String },

    #[error("failed to parse TOML configuration")]
    Toml {
        /// Source text, kept for the labeled span.
        src: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid shortcut '{key}': {reason}")]
    InvalidShortcut { key: String, reason: String },

    #[error("unknown key '{name}' in shortcut '{key}'")]
    UnknownKey { key: String, name: String },

    #[error("no shortcuts defined in config")]
    NoShortcuts,

    #[error("failed to read configuration file")]
    Io(#[from] std::io::Error),
}

impl Diagnostic for ConfigError {
    fn code<'a>(&'a self) -> Option<Box<dyn std::fmt::Display + 'a>> {
        let code = match self {
            ConfigError::NotFound { .. } => "akeyshually::config::not_found",
            ConfigError::Toml { .. } => "akeyshually::config::toml",
            ConfigError::InvalidShortcut { .. } => "akeyshually::config::invalid_shortcut",
            ConfigError::UnknownKey { .. } => "akeyshually::config::unknown_key",
            ConfigError::NoShortcuts => "akeyshually::config::no_shortcuts",
            ConfigError::Io(_) => "akeyshually::config::io",
        };
        Some(Box::new(code))
    }

    fn help<'a>(&'a self) -> Option<Box<dyn std::fmt::Display + 'a>> {
        let help: Option<String> = match self {
            ConfigError::NotFound { .. } => Some(
                "Run the daemon once to materialize the default config, or create \
                 ~/.config/akeyshually/config.toml yourself."
                    .to_string(),
            ),
            ConfigError::Toml { .. } => {
                Some("Check the TOML syntax near the highlighted location.".to_string())
            }
            ConfigError::InvalidShortcut { .. } => Some(
                "Key specs look like \"super+k\", \"super+k.whileheld\" or \
                 \"f2.repeat-whileheld(50).onrelease\"."
                    .to_string(),
            ),
            ConfigError::UnknownKey { .. } => Some(
                "Valid names are letters, digits, f1-f24, arrows, return, space, tab, \
                 escape, backspace, print, home/end/pageup/pagedown, delete/insert and \
                 the media keys."
                    .to_string(),
            ),
            ConfigError::NoShortcuts => {
                Some("Add at least one entry to the [shortcuts] table.".to_string())
            }
            ConfigError::Io(e) => match e.kind() {
                std::io::ErrorKind::PermissionDenied => {
                    Some("Check that the configuration file is readable.".to_string())
                }
                _ => None,
            },
        };
        help.map(|s| Box::new(s) as Box<dyn std::fmt::Display>)
    }

    fn source_code(&self) -> Option<&dyn SourceCode> {
        match self {
            ConfigError::Toml { src, .. } => Some(src as &dyn SourceCode),
            _ => None,
        }
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        match self {
            ConfigError::Toml { source, .. } => {
                let span = source.span()?;
                Some(Box::new(std::iter::once(LabeledSpan::new_with_span(
                    Some("syntax error here".to_string()),
                    miette::SourceSpan::from(span),
                ))))
            }
            _ => None,
        }
    }

    fn severity(&self) -> Option<miette::Severity> {
        Some(miette::Severity::Error)
    }
}
