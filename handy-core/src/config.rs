//! Configuration loading for Handy.
//!
//! Config is read from a TOML file named by `--config <path>` or the
//! `HANDY_CONFIG` environment variable, then validated.
//! [`HandyConfig::for_environment`] gives the built-in presets.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

/// Environment variable naming the config file.
pub const CONFIG_ENV_VAR: &str = "HANDY_CONFIG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HandyConfig {
    pub environment: Environment,
    pub cache: CacheSettings,
    pub query: QuerySettings,
    pub session: SessionSettings,
    pub persistence: PersistenceConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Development,
    Production,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheSettings {
    pub default_ttl_ms: u64,
}

impl CacheSettings {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_millis(self.default_ttl_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QuerySettings {
    pub stale_time_ms: u64,
    pub refetch_on_mount: bool,
}

impl QuerySettings {
    pub fn stale_time(&self) -> Duration {
        Duration::from_millis(self.stale_time_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionSettings {
    /// Write a default client profile when a signed-in user has none.
    pub provision_missing_profile: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistenceBackend {
    Memory,
    Lmdb,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PersistenceConfig {
    pub backend: PersistenceBackend,
    pub path: Option<PathBuf>,
    pub max_size_mb: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

impl HandyConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_path_from_args().or_else(config_path_from_env);
        let path = path.ok_or(ConfigError::MissingConfigPath)?;
        let config = Self::from_path(&path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })
    }

    /// Built-in preset for an environment.
    ///
    /// Development caches for one minute and logs at `debug`; production
    /// caches for thirty minutes and logs errors only.
    pub fn for_environment(environment: Environment) -> Self {
        let (default_ttl_ms, level) = match environment {
            Environment::Development => (60 * 1000, "debug"),
            Environment::Production => (30 * 60 * 1000, "error"),
        };
        Self {
            environment,
            cache: CacheSettings { default_ttl_ms },
            query: QuerySettings {
                stale_time_ms: 5 * 60 * 1000,
                refetch_on_mount: true,
            },
            session: SessionSettings {
                provision_missing_profile: false,
            },
            persistence: PersistenceConfig {
                backend: PersistenceBackend::Memory,
                path: None,
                max_size_mb: 64,
            },
            logging: LoggingConfig {
                level: level.to_string(),
                json: environment == Environment::Production,
            },
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache.default_ttl_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "cache.default_ttl_ms".to_string(),
                reason: "must be > 0".to_string(),
            });
        }
        if self.persistence.backend == PersistenceBackend::Lmdb {
            match &self.persistence.path {
                Some(path) if !path.as_os_str().is_empty() => {}
                _ => {
                    return Err(ConfigError::InvalidValue {
                        field: "persistence.path".to_string(),
                        reason: "required for the lmdb backend".to_string(),
                    })
                }
            }
            if self.persistence.max_size_mb == 0 {
                return Err(ConfigError::InvalidValue {
                    field: "persistence.max_size_mb".to_string(),
                    reason: "must be > 0".to_string(),
                });
            }
        }
        let level = self.logging.level.to_ascii_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "logging.level".to_string(),
                reason: format!("must be one of {}", LOG_LEVELS.join(", ")),
            });
        }
        Ok(())
    }
}

fn config_path_from_env() -> Option<PathBuf> {
    std::env::var(CONFIG_ENV_VAR).ok().map(PathBuf::from)
}

fn config_path_from_args() -> Option<PathBuf> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next().map(PathBuf::from);
        }
    }
    None
}
