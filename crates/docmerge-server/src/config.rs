//! Server configuration
//!
//! Defaults, then an optional TOML file named by `DOCMERGE_CONFIG`, then
//! environment overrides. The result is read-only once the server starts.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable naming the TOML config file
pub const CONFIG_PATH_VAR: &str = "DOCMERGE_CONFIG";
/// Environment override for [`ServerConfig::bind_addr`]
pub const ADDR_VAR: &str = "DOCMERGE_ADDR";
/// Environment override for [`ServerConfig::max_body_bytes`]
pub const MAX_BODY_VAR: &str = "DOCMERGE_MAX_BODY_BYTES";
/// Environment override for [`ServerConfig::log_level`]
pub const LOG_LEVEL_VAR: &str = "LOG_LEVEL";

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

/// Errors raised while loading configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value '{value}' for {var}")]
    InvalidOverride { var: &'static str, value: String },

    #[error("Unknown log level '{0}' (expected debug, info, warn, warning or error)")]
    InvalidLogLevel(String),
}

/// Runtime settings for the HTTP server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address to listen on
    pub bind_addr: String,
    /// Largest request body accepted, in bytes
    pub max_body_bytes: usize,
    /// Default log level when `RUST_LOG` is unset
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            log_level: "info".to_string(),
        }
    }
}

impl ServerConfig {
    /// Load from the process environment
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read or parsed, or if
    /// an override holds an unusable value.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var_os(CONFIG_PATH_VAR) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        config.apply_overrides(|var| std::env::var(var).ok())?;
        Ok(config)
    }

    /// Parse a TOML config file; missing keys keep their defaults
    ///
    /// # Errors
    ///
    /// Returns `Read` or `Parse` on failure.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Parse TOML text; missing keys keep their defaults
    ///
    /// # Errors
    ///
    /// Returns `Parse` if the text is not valid TOML for this structure, or
    /// `InvalidLogLevel` if `log_level` is not recognised.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(text)?;
        config.log_level = normalize_log_level(&config.log_level)?.to_string();
        Ok(config)
    }

    /// Apply environment overrides through `lookup`
    ///
    /// # Errors
    ///
    /// Returns `InvalidOverride` or `InvalidLogLevel` for values that cannot
    /// be used. Nothing is applied past the first bad value.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup(ADDR_VAR) {
            if addr.trim().is_empty() {
                return Err(ConfigError::InvalidOverride {
                    var: ADDR_VAR,
                    value: addr,
                });
            }
            self.bind_addr = addr.trim().to_string();
        }
        if let Some(raw) = lookup(MAX_BODY_VAR) {
            self.max_body_bytes = match raw.trim().parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ConfigError::InvalidOverride {
                        var: MAX_BODY_VAR,
                        value: raw,
                    })
                }
            };
        }
        if let Some(level) = lookup(LOG_LEVEL_VAR) {
            self.log_level = normalize_log_level(&level)?.to_string();
        }
        Ok(())
    }

    /// `EnvFilter` directive for the configured level
    #[must_use]
    pub fn filter_directive(&self) -> String {
        let level = &self.log_level;
        format!("docmerge_server={level},docmerge_core={level},tower_http={level}")
    }
}

/// Map a user-supplied level name to a tracing level name
///
/// # Errors
///
/// Returns `InvalidLogLevel` for anything outside the accepted set.
pub fn normalize_log_level(level: &str) -> Result<&'static str, ConfigError> {
    match level.trim().to_ascii_lowercase().as_str() {
        "debug" => Ok("debug"),
        "info" => Ok("info"),
        "warn" | "warning" => Ok("warn"),
        "error" => Ok("error"),
        _ => Err(ConfigError::InvalidLogLevel(level.to_string())),
    }
}
