//! Startup configuration: a TOML file overridden by `VEIL_*`
//! environment variables, validated once, then read-only.

use crate::fragments::{DEFAULT_GRAM_WIDTH, MIN_GRAM_WIDTH};
use crate::secret::{IndexSecret, SecretError};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable holding inline secret material.
pub const ENV_SECRET: &str = "VEIL_SECRET";

const ENV_SECRET_FILE: &str = "VEIL_SECRET_FILE";
const ENV_GRAM_WIDTH: &str = "VEIL_GRAM_WIDTH";
const ENV_K_ANONYMITY: &str = "VEIL_K_ANONYMITY";
const ENV_RETENTION_SECS: &str = "VEIL_RETENTION_SECS";
const ENV_MAX_RESULTS: &str = "VEIL_MAX_RESULTS";
const ENV_BACKEND: &str = "VEIL_BACKEND";
const ENV_SQLITE_PATH: &str = "VEIL_SQLITE_PATH";

const DEFAULT_RETENTION_SECS: u64 = 30 * 24 * 60 * 60;

/// Which index store backs the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// In-process set store; the whole index lives in RAM.
    Memory,
    /// Single-table SQLite database on disk.
    Sqlite,
}

/// Startup options. All of these are fixed for the process lifetime;
/// in particular the secret and the gram width bake into every derived
/// key, so changing either means rebuilding the index.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Inline PRF key material, hex or base64. Takes precedence over
    /// `secret_file` and the environment.
    pub secret: Option<String>,
    /// Path to a file holding the PRF key material.
    pub secret_file: Option<PathBuf>,
    /// Reporting-only version of the secret family.
    pub secret_version: u32,
    /// N-gram width for `contains`. Must be at least 2.
    pub gram_width: u8,
    /// Minimum result-set size that escapes suppression; 1 disables.
    pub k_anonymity: usize,
    /// Time-to-live applied to newly indexed entries, in seconds.
    pub retention_secs: u64,
    /// Hard cap on result cardinality returned to callers.
    pub max_results: usize,
    /// Store backend selection.
    pub backend: BackendKind,
    /// Database path for the sqlite backend.
    pub sqlite_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            secret: None,
            secret_file: None,
            secret_version: 1,
            gram_width: DEFAULT_GRAM_WIDTH,
            k_anonymity: 5,
            retention_secs: DEFAULT_RETENTION_SECS,
            max_results: 1000,
            backend: BackendKind::Memory,
            sqlite_path: None,
        }
    }
}

/// Configuration that cannot be loaded or cannot be served.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Unreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("{var} is not valid here: {reason}")]
    Env { var: &'static str, reason: String },
    #[error("gram_width is {got}, minimum is {min}")]
    GramWidthTooNarrow { got: u8, min: u8 },
    #[error("k_anonymity must be at least 1")]
    ZeroAnonymityThreshold,
    #[error("max_results must be at least 1")]
    ZeroMaxResults,
    #[error("retention_secs must be at least 1")]
    ZeroRetention,
    #[error("sqlite backend selected but sqlite_path is not set")]
    MissingSqlitePath,
    #[error(transparent)]
    Secret(#[from] SecretError),
}

impl Config {
    /// Loads the file (when present), layers environment overrides on
    /// top, and validates the result.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) if path.exists() => {
                let raw = fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
                    path: path.display().to_string(),
                    source,
                })?;
                toml::from_str(&raw).map_err(|source| ConfigError::Parse {
                    path: path.display().to_string(),
                    source,
                })?
            }
            _ => Self::default(),
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Applies `VEIL_*` environment overrides in place.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env(ENV_SECRET) {
            self.secret = Some(value);
        }
        if let Some(value) = read_env(ENV_SECRET_FILE) {
            self.secret_file = Some(PathBuf::from(value));
        }
        if let Some(value) = read_env(ENV_GRAM_WIDTH) {
            self.gram_width = parse_env(ENV_GRAM_WIDTH, &value)?;
        }
        if let Some(value) = read_env(ENV_K_ANONYMITY) {
            self.k_anonymity = parse_env(ENV_K_ANONYMITY, &value)?;
        }
        if let Some(value) = read_env(ENV_RETENTION_SECS) {
            self.retention_secs = parse_env(ENV_RETENTION_SECS, &value)?;
        }
        if let Some(value) = read_env(ENV_MAX_RESULTS) {
            self.max_results = parse_env(ENV_MAX_RESULTS, &value)?;
        }
        if let Some(value) = read_env(ENV_BACKEND) {
            self.backend = match value.trim() {
                "memory" => BackendKind::Memory,
                "sqlite" => BackendKind::Sqlite,
                other => {
                    return Err(ConfigError::Env {
                        var: ENV_BACKEND,
                        reason: format!("unknown backend {other:?}"),
                    })
                }
            };
        }
        if let Some(value) = read_env(ENV_SQLITE_PATH) {
            self.sqlite_path = Some(PathBuf::from(value));
        }
        Ok(())
    }

    /// Rejects configurations the process must not serve with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.gram_width < MIN_GRAM_WIDTH {
            return Err(ConfigError::GramWidthTooNarrow {
                got: self.gram_width,
                min: MIN_GRAM_WIDTH,
            });
        }
        if self.k_anonymity == 0 {
            return Err(ConfigError::ZeroAnonymityThreshold);
        }
        if self.max_results == 0 {
            return Err(ConfigError::ZeroMaxResults);
        }
        if self.retention_secs == 0 {
            return Err(ConfigError::ZeroRetention);
        }
        if self.backend == BackendKind::Sqlite && self.sqlite_path.is_none() {
            return Err(ConfigError::MissingSqlitePath);
        }
        Ok(())
    }

    /// Resolves the PRF secret: inline material first, then the secret
    /// file. [`Config::apply_env`] has already folded `VEIL_SECRET`
    /// and `VEIL_SECRET_FILE` into those fields.
    pub fn load_secret(&self) -> Result<IndexSecret, SecretError> {
        if let Some(encoded) = &self.secret {
            return IndexSecret::from_encoded(encoded, self.secret_version);
        }
        if let Some(path) = &self.secret_file {
            return IndexSecret::from_file(path, self.secret_version);
        }
        Err(SecretError::Missing)
    }

    /// Retention as a duration.
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }
}

fn read_env(var: &'static str) -> Option<String> {
    env::var(var).ok().filter(|v| !v.is_empty())
}

fn parse_env<T: std::str::FromStr>(var: &'static str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Env {
        var,
        reason: e.to_string(),
    })
}
