//! Engine configuration: defaults, then a TOML file, then `OBJREPO_*` environment variables.

use crate::errors::DbError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Queries at or above this many milliseconds are reported on the metrics log.
    pub slow_query_ms: u64,
    pub log_dir: Option<PathBuf>,
    pub log_level: String,
    pub log_retention: usize,
    /// Persist `dev6!` benchmark lines to `dev6.log`.
    pub dev_log: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { slow_query_ms: 500, log_dir: None, log_level: "info".into(), log_retention: 7, dev_log: false }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, DbError> {
    raw.trim().parse().map_err(|_| DbError::Config(format!("{key}: cannot parse `{raw}`")))
}

impl EngineConfig {
    /// # Errors
    /// `DbError::Config` for malformed TOML or wrongly typed keys.
    pub fn from_toml_str(s: &str) -> Result<Self, DbError> {
        toml::from_str(s).map_err(|e| DbError::Config(e.to_string()))
    }

    /// # Errors
    /// `DbError::Io` if the file cannot be read, `DbError::Config` if it does not parse.
    pub fn from_toml_file(path: &Path) -> Result<Self, DbError> {
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }

    /// Full precedence chain: defaults, then `path` if given, then the process environment.
    ///
    /// # Errors
    /// As [`EngineConfig::from_toml_file`] and [`EngineConfig::apply_overrides`].
    pub fn load(path: Option<&Path>) -> Result<Self, DbError> {
        let base = match path {
            Some(p) => Self::from_toml_file(p)?,
            None => Self::default(),
        };
        base.with_env_overrides()
    }

    /// # Errors
    /// As [`EngineConfig::apply_overrides`].
    pub fn with_env_overrides(self) -> Result<Self, DbError> {
        self.apply_overrides(|k| std::env::var(k).ok())
    }

    /// Applies `OBJREPO_SLOW_QUERY_MS`, `OBJREPO_LOG_DIR`, `OBJREPO_LOG_LEVEL`,
    /// `OBJREPO_LOG_RETENTION` and `OBJREPO_DEV6` as returned by `lookup`.
    ///
    /// # Errors
    /// `DbError::Config` when a numeric variable does not parse.
    pub fn apply_overrides<F>(mut self, lookup: F) -> Result<Self, DbError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("OBJREPO_SLOW_QUERY_MS") {
            self.slow_query_ms = parse_env("OBJREPO_SLOW_QUERY_MS", &v)?;
        }
        if let Some(v) = lookup("OBJREPO_LOG_DIR") {
            self.log_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("OBJREPO_LOG_LEVEL") {
            self.log_level = v.to_ascii_lowercase();
        }
        if let Some(v) = lookup("OBJREPO_LOG_RETENTION") {
            self.log_retention = parse_env("OBJREPO_LOG_RETENTION", &v)?;
        }
        if let Some(v) = lookup("OBJREPO_DEV6") {
            self.dev_log = matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }
        Ok(self)
    }

    /// Installs the rolling-file logger described by this config.
    ///
    /// # Errors
    /// `DbError::Config` if the log directory or appenders cannot be set up.
    pub fn init_logging(&self) -> Result<(), DbError> {
        crate::utils::logger::configure_logging_with_dev(
            self.log_dir.as_deref(),
            Some(&self.log_level),
            Some(self.log_retention),
            self.dev_log,
        )
        .map_err(|e| DbError::Config(format!("logging: {e}")))
    }
}
