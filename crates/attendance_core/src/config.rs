//! Environment-driven core configuration.
//!
//! # Invariants
//! - A missing `ATTENDANCE_DB_PATH` selects an in-memory store.
//! - A missing `ATTENDANCE_LOG_DIR` leaves logging uninitialized.
//! - Unknown uniqueness policies are rejected; the log level is validated
//!   when logging starts.

use crate::logging::default_log_level;
use crate::repo::attendance_repo::UniquenessPolicy;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

pub const ENV_DB_PATH: &str = "ATTENDANCE_DB_PATH";
pub const ENV_LOG_LEVEL: &str = "ATTENDANCE_LOG_LEVEL";
pub const ENV_LOG_DIR: &str = "ATTENDANCE_LOG_DIR";
pub const ENV_UNIQUENESS: &str = "ATTENDANCE_UNIQUENESS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidValue { key: &'static str, value: String },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidValue { key, value } => write!(f, "invalid value `{value}` for {key}"),
        }
    }
}

impl Error for ConfigError {}

/// Process-level settings for the attendance core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreConfig {
    pub db_path: Option<PathBuf>,
    pub log_level: String,
    pub log_dir: Option<PathBuf>,
    pub uniqueness: UniquenessPolicy,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            log_level: default_log_level().to_string(),
            log_dir: None,
            uniqueness: UniquenessPolicy::default(),
        }
    }
}

impl CoreConfig {
    /// Reads configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads configuration through an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let value = |key: &str| {
            lookup(key)
                .map(|raw| raw.trim().to_string())
                .filter(|raw| !raw.is_empty())
        };

        let uniqueness = match value(ENV_UNIQUENESS) {
            Some(raw) => match UniquenessPolicy::parse(&raw) {
                Some(policy) => policy,
                None => {
                    return Err(ConfigError::InvalidValue {
                        key: ENV_UNIQUENESS,
                        value: raw,
                    })
                }
            },
            None => UniquenessPolicy::default(),
        };

        Ok(Self {
            db_path: value(ENV_DB_PATH).map(PathBuf::from),
            log_level: value(ENV_LOG_LEVEL).unwrap_or_else(|| default_log_level().to_string()),
            log_dir: value(ENV_LOG_DIR).map(PathBuf::from),
            uniqueness,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_uses_defaults() {
        let config = CoreConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, CoreConfig::default());
        assert_eq!(config.uniqueness, UniquenessPolicy::Tolerate);
    }

    #[test]
    fn values_are_read_and_trimmed() {
        let config = CoreConfig::from_lookup(lookup(&[
            (ENV_DB_PATH, " /var/lib/attendance.db "),
            (ENV_LOG_LEVEL, "warn"),
            (ENV_UNIQUENESS, "Reject"),
        ]))
        .unwrap();
        assert_eq!(config.db_path, Some(PathBuf::from("/var/lib/attendance.db")));
        assert_eq!(config.log_level, "warn");
        assert_eq!(config.log_dir, None);
        assert_eq!(config.uniqueness, UniquenessPolicy::Reject);
    }

    #[test]
    fn unknown_uniqueness_policy_is_rejected() {
        let err = CoreConfig::from_lookup(lookup(&[(ENV_UNIQUENESS, "maybe")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidValue {
                key: ENV_UNIQUENESS,
                value: "maybe".to_string()
            }
        );
    }
}
