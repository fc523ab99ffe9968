//! Downloader configuration
//!
//! Loaded from a JSON file. Only the database and log paths are required;
//! everything else falls back to the defaults the public API tolerates.

use crate::fetcher::DEFAULT_API_BASE_URL;
use crate::range_space::DownloadSize;
use crate::Error;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Fixed-delay retry budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    /// At least one attempt is always made
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_filepath: PathBuf,
    pub log_filepath: PathBuf,

    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Number of parallel range workers
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// `tiny`, `sample` or `full`
    #[serde(default = "default_size")]
    pub size: String,

    #[serde(default = "default_fetch_attempts")]
    pub fetch_attempts: u32,
    #[serde(default = "default_fetch_retry_delay_ms")]
    pub fetch_retry_delay_ms: u64,

    #[serde(default = "default_insert_attempts")]
    pub insert_attempts: u32,
    #[serde(default = "default_insert_retry_delay_ms")]
    pub insert_retry_delay_ms: u64,

    /// SQLite busy handler timeout, per statement
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_workers() -> usize {
    3
}

fn default_size() -> String {
    "full".to_string()
}

fn default_fetch_attempts() -> u32 {
    10
}

fn default_fetch_retry_delay_ms() -> u64 {
    500
}

fn default_insert_attempts() -> u32 {
    100
}

fn default_insert_retry_delay_ms() -> u64 {
    100
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

impl Config {
    /// Read and validate a config file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::Config(format!("cannot read {:?}: {}", path.as_ref(), e))
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, Error> {
        let config: Config = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.database_filepath.as_os_str().is_empty() {
            return Err(Error::Config("database_filepath is empty".into()));
        }
        if self.log_filepath.as_os_str().is_empty() {
            return Err(Error::Config("log_filepath is empty".into()));
        }
        if self.api_base_url.is_empty() {
            return Err(Error::Config("api_base_url is empty".into()));
        }
        if self.workers == 0 {
            return Err(Error::Config("workers must be at least 1".into()));
        }
        if self.fetch_attempts == 0 || self.insert_attempts == 0 {
            return Err(Error::Config("retry attempts must be at least 1".into()));
        }
        self.download_size()?;
        Ok(())
    }

    pub fn download_size(&self) -> Result<DownloadSize, Error> {
        DownloadSize::parse(&self.size)
            .ok_or_else(|| Error::Config(format!("unknown size {:?}", self.size)))
    }

    pub fn fetch_retry(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.fetch_attempts,
            Duration::from_millis(self.fetch_retry_delay_ms),
        )
    }

    pub fn insert_retry(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.insert_attempts,
            Duration::from_millis(self.insert_retry_delay_ms),
        )
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = Config::from_json(
            r#"{"database_filepath": "./db/passwords.db", "log_filepath": "./logs/dl.log"}"#,
        )
        .unwrap();

        assert_eq!(config.database_filepath, PathBuf::from("./db/passwords.db"));
        assert_eq!(config.api_base_url, "https://api.pwnedpasswords.com/range/");
        assert_eq!(config.workers, 3);
        assert_eq!(config.download_size().unwrap(), DownloadSize::Full);
        assert_eq!(
            config.fetch_retry(),
            RetryPolicy::new(10, Duration::from_millis(500))
        );
        assert_eq!(
            config.insert_retry(),
            RetryPolicy::new(100, Duration::from_millis(100))
        );
        assert_eq!(config.busy_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_json(
            r#"{
                "database_filepath": "a.db",
                "log_filepath": "a.log",
                "api_base_url": "http://127.0.0.1:9000/range/",
                "workers": 8,
                "size": "Tiny",
                "fetch_attempts": 2,
                "fetch_retry_delay_ms": 1
            }"#,
        )
        .unwrap();

        assert_eq!(config.workers, 8);
        assert_eq!(config.download_size().unwrap(), DownloadSize::Tiny);
        assert_eq!(config.fetch_retry().attempts, 2);
        assert_eq!(config.fetch_retry().delay, Duration::from_millis(1));
    }

    #[test]
    fn test_missing_required_field() {
        let err = Config::from_json(r#"{"database_filepath": "a.db"}"#).unwrap_err();
        assert!(matches!(err, Error::Json(_)));
    }

    #[test]
    fn test_invalid_values_rejected() {
        for raw in [
            r#"{"database_filepath": "a.db", "log_filepath": "a.log", "workers": 0}"#,
            r#"{"database_filepath": "a.db", "log_filepath": "a.log", "size": "huge"}"#,
            r#"{"database_filepath": "a.db", "log_filepath": "a.log", "fetch_attempts": 0}"#,
            r#"{"database_filepath": "", "log_filepath": "a.log"}"#,
        ] {
            let err = Config::from_json(raw).unwrap_err();
            assert!(matches!(err, Error::Config(_)), "{raw}: {err}");
        }
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"database_filepath": "x.db", "log_filepath": "x.log", "workers": 2}}"#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.workers, 2);

        let err = Config::load(file.path().with_extension("missing")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_retry_policy_makes_at_least_one_attempt() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).attempts, 1);
    }
}
