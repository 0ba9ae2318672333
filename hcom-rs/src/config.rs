//! `hcom.conf` console configuration.
//!
//! A plain `key = value` file:
//!
//! | Key | Value |
//! |-----|-------|
//! | `startup_script` | script run before the first prompt |
//! | `working_directory` | initial `pwd` |
//! | `echo` | `on` / `off` |
//! | `color` | `on` / `off` |
//! | `history_size` | maximum remembered lines, `0` for unlimited |
//! | `log_filter` | `tracing` filter used when `HCOM_LOG` is unset |
//!
//! Lines starting with `#` are comments.  A malformed line is reported and
//! skipped; the remaining lines still apply.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;

// ── Public API ────────────────────────────────────────────────────────────────

/// A non-fatal error encountered while loading a config file.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigError {
    pub line: usize,
    pub message: String,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

impl std::error::Error for ConfigError {}

/// Console settings.  Unset keys keep their defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsoleConfig {
    pub startup_script: Option<PathBuf>,
    pub working_directory: Option<PathBuf>,
    pub echo: bool,
    pub color: bool,
    /// `None` keeps every line.
    pub history_size: Option<usize>,
    pub log_filter: Option<String>,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        ConsoleConfig {
            startup_script: None,
            working_directory: None,
            echo: true,
            color: true,
            history_size: Some(1000),
            log_filter: None,
        }
    }
}

impl ConsoleConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a config string.
    ///
    /// Returns the config and a list of any errors on individual lines.
    pub fn load_str(s: &str) -> (Self, Vec<ConfigError>) {
        let mut config = ConsoleConfig::new();
        let mut errors = Vec::new();

        for (i, raw) in s.lines().enumerate() {
            let lineno = i + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                errors.push(ConfigError {
                    line: lineno,
                    message: format!("expected key = value, got '{line}'"),
                });
                continue;
            };
            if let Err(message) = config.apply(key.trim(), unquote(value.trim())) {
                errors.push(ConfigError { line: lineno, message });
            }
        }

        (config, errors)
    }

    /// Read and parse a config file from disk.
    pub fn load_file(path: &Path) -> std::io::Result<(Self, Vec<ConfigError>)> {
        let s = std::fs::read_to_string(path)?;
        Ok(Self::load_str(&s))
    }

    /// Set one key.
    pub fn apply(&mut self, key: &str, value: &str) -> Result<(), String> {
        match key {
            "startup_script" => self.startup_script = non_empty(value).map(PathBuf::from),
            "working_directory" => self.working_directory = non_empty(value).map(PathBuf::from),
            "echo" => self.echo = parse_switch(key, value)?,
            "color" => self.color = parse_switch(key, value)?,
            "history_size" => {
                let n: usize = value
                    .parse()
                    .map_err(|_| format!("history_size: not a number: '{value}'"))?;
                self.history_size = (n > 0).then_some(n);
            }
            "log_filter" => self.log_filter = non_empty(value).map(str::to_owned),
            other => return Err(format!("unknown key '{other}'")),
        }
        Ok(())
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

/// `hcom.conf` in the platform configuration directory.
pub fn default_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "hcom").map(|dirs| dirs.config_dir().join("hcom.conf"))
}

/// The default config file, if one exists.
pub fn find_user_config() -> Option<PathBuf> {
    default_path().filter(|p| p.is_file())
}

// ── Value parsing ─────────────────────────────────────────────────────────────

fn parse_switch(key: &str, value: &str) -> Result<bool, String> {
    match value {
        "on" | "true" | "1" => Ok(true),
        "off" | "false" | "0" => Ok(false),
        _ => Err(format!("{key}: expected on or off, got '{value}'")),
    }
}

fn non_empty(value: &str) -> Option<&str> {
    (!value.is_empty()).then_some(value)
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
