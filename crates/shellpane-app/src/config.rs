use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Deserialize;
use shellpane_types::{home_dir, DEFAULT_BUFFER_LINES};

/// Application configuration, read from `~/.shellpane/config.toml` with
/// environment overrides.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Output buffer capacity per session, in lines.
    pub buffer_lines: usize,
    /// Shell override; the session falls back to $SHELL.
    pub shell: Option<String>,
    /// Transcript log directory; `None` disables transcripts.
    pub log_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            buffer_lines: DEFAULT_BUFFER_LINES,
            shell: None,
            log_dir: shellpane_dir().map(|d| d.join("logs")),
        }
    }
}

impl Config {
    /// Load the config file if present, then apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = match shellpane_dir().map(|d| d.join("config.toml")) {
            Some(path) if path.exists() => {
                let raw = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                Self::from_toml_str(&raw)
                    .with_context(|| format!("Failed to parse {}", path.display()))?
            }
            _ => Self::default(),
        };

        if let Ok(lines) = std::env::var("SHELLPANE_BUFFER_LINES") {
            if let Ok(lines) = lines.parse() {
                config.buffer_lines = lines;
            }
        }
        if let Ok(shell) = std::env::var("SHELLPANE_SHELL") {
            config.shell = Some(shell);
        }
        if let Ok(dir) = std::env::var("SHELLPANE_LOG_DIR") {
            config.log_dir = if dir.is_empty() {
                None
            } else {
                Some(PathBuf::from(dir))
            };
        }

        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }
}

/// The application's home directory (`~/.shellpane`).
pub fn shellpane_dir() -> Option<PathBuf> {
    home_dir().map(|home| home.join(".shellpane"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_file_is_partial() {
        let config = Config::from_toml_str("shell = \"/bin/zsh\"\n").unwrap();
        assert_eq!(config.buffer_lines, DEFAULT_BUFFER_LINES);
        assert_eq!(config.shell.as_deref(), Some("/bin/zsh"));
    }

    #[test]
    fn full_file_parses() {
        let config = Config::from_toml_str(
            "buffer_lines = 500\nshell = \"/bin/bash\"\nlog_dir = \"/tmp/sp-logs\"\n",
        )
        .unwrap();
        assert_eq!(config.buffer_lines, 500);
        assert_eq!(config.log_dir, Some(PathBuf::from("/tmp/sp-logs")));
    }

    #[test]
    fn empty_file_is_all_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.buffer_lines, DEFAULT_BUFFER_LINES);
        assert_eq!(config.shell, None);
    }
}
