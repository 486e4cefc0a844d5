//! Environment-driven settings.
//!
//! Everything is resolved once at startup by [`Settings::from_env`]; CLI
//! flags override individual fields afterwards.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::gateway::{OpenRouterConfig, DEFAULT_MODEL};
use crate::store::SqliteStore;

pub const DEFAULT_DELAY_MS: u64 = 50;
pub const DEFAULT_CONCURRENCY: usize = 1;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} must be {expected}, got {value:?}")]
    Invalid {
        name: &'static str,
        expected: &'static str,
        value: String,
    },
    #[error("OPENROUTER_API_KEY is not set")]
    MissingApiKey,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub timeout: Option<Duration>,
    pub db_path: PathBuf,
    pub model: String,
    pub delay: Duration,
    pub concurrency: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            timeout: None,
            db_path: PathBuf::from(crate::store::sqlite::DEFAULT_DB_PATH),
            model: DEFAULT_MODEL.to_string(),
            delay: Duration::from_millis(DEFAULT_DELAY_MS),
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Resolve settings through an arbitrary variable lookup. Empty values
    /// count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let timeout = match get("OPENROUTER_TIMEOUT_SECONDS") {
            Some(v) => Some(Duration::from_secs(parse_positive(
                "OPENROUTER_TIMEOUT_SECONDS",
                &v,
            )?)),
            None => None,
        };
        let delay = match get("SYNTHETIC_STUDENTS_DELAY_MS") {
            Some(v) => Duration::from_millis(v.trim().parse().map_err(|_| ConfigError::Invalid {
                name: "SYNTHETIC_STUDENTS_DELAY_MS",
                expected: "a whole number of milliseconds",
                value: v.clone(),
            })?),
            None => Duration::from_millis(DEFAULT_DELAY_MS),
        };
        let concurrency = match get("SYNTHETIC_STUDENTS_CONCURRENCY") {
            Some(v) => parse_positive("SYNTHETIC_STUDENTS_CONCURRENCY", &v)? as usize,
            None => DEFAULT_CONCURRENCY,
        };

        Ok(Self {
            api_key: get("OPENROUTER_API_KEY"),
            base_url: get("OPENROUTER_BASE_URL"),
            timeout,
            db_path: get("SYNTHETIC_STUDENTS_DB")
                .map(PathBuf::from)
                .unwrap_or_else(SqliteStore::default_path),
            model: get("SYNTHETIC_STUDENTS_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            delay,
            concurrency,
        })
    }

    /// Adapter configuration. Fails without an API key.
    pub fn openrouter(&self) -> Result<OpenRouterConfig, ConfigError> {
        let key = self.api_key.clone().ok_or(ConfigError::MissingApiKey)?;
        let mut config = OpenRouterConfig::new(key);
        if let Some(url) = &self.base_url {
            config = config.base_url(url);
        }
        if let Some(timeout) = self.timeout {
            config = config.timeout(timeout);
        }
        Ok(config)
    }
}

fn parse_positive(name: &'static str, value: &str) -> Result<u64, ConfigError> {
    match value.trim().parse::<u64>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ConfigError::Invalid {
            name,
            expected: "a positive integer",
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let s = Settings::from_lookup(lookup(&[])).unwrap();
        assert!(s.api_key.is_none());
        assert_eq!(s.model, DEFAULT_MODEL);
        assert_eq!(s.delay, Duration::from_millis(50));
        assert_eq!(s.concurrency, 1);
        assert!(matches!(s.openrouter(), Err(ConfigError::MissingApiKey)));
    }

    #[test]
    fn reads_overrides() {
        let s = Settings::from_lookup(lookup(&[
            ("OPENROUTER_API_KEY", "sk-test"),
            ("OPENROUTER_BASE_URL", "http://localhost:9999/api/v1/"),
            ("OPENROUTER_TIMEOUT_SECONDS", "5"),
            ("SYNTHETIC_STUDENTS_DB", "/tmp/x.db"),
            ("SYNTHETIC_STUDENTS_MODEL", "openai/gpt-4o-mini"),
            ("SYNTHETIC_STUDENTS_DELAY_MS", "0"),
            ("SYNTHETIC_STUDENTS_CONCURRENCY", "4"),
        ]))
        .unwrap();
        assert_eq!(s.db_path, PathBuf::from("/tmp/x.db"));
        assert_eq!(s.model, "openai/gpt-4o-mini");
        assert_eq!(s.delay, Duration::ZERO);
        assert_eq!(s.concurrency, 4);
        let cfg = s.openrouter().unwrap();
        assert_eq!(cfg.base_url, "http://localhost:9999/api/v1");
        assert_eq!(cfg.timeout, Duration::from_secs(5));
    }

    #[test]
    fn rejects_bad_numbers() {
        assert!(Settings::from_lookup(lookup(&[("SYNTHETIC_STUDENTS_CONCURRENCY", "0")])).is_err());
        assert!(Settings::from_lookup(lookup(&[("SYNTHETIC_STUDENTS_DELAY_MS", "soon")])).is_err());
        // Blank counts as unset.
        assert!(Settings::from_lookup(lookup(&[("OPENROUTER_API_KEY", "  ")]))
            .unwrap()
            .api_key
            .is_none());
    }
}
