//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (REPLICA_*)
//! 2. TOML config file (if REPLICA_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Relay templates used when none are configured.
///
/// `{url}` is replaced by the percent-encoded target, `{raw_url}` by the target verbatim.
pub const DEFAULT_RELAYS: &[&str] = &["https://api.allorigins.win/raw?url={url}", "https://corsproxy.io/?{url}"];

/// Which storage backs the resource cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    /// Process-local map; gone when the process exits.
    Memory,
    /// SQLite file at `db_path`.
    Sqlite,
}

impl CacheBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheBackend::Memory => "memory",
            CacheBackend::Sqlite => "sqlite",
        }
    }
}

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (REPLICA_*)
/// 2. TOML config file (if REPLICA_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Ordered relay templates tried for every fetch.
    ///
    /// Set via REPLICA_RELAYS environment variable (e.g. `["https://a/?{url}"]`).
    #[serde(default = "default_relays")]
    pub relays: Vec<String>,

    /// User-Agent string for HTTP requests.
    ///
    /// Set via REPLICA_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// HTTP request timeout in milliseconds, per relay attempt.
    ///
    /// Set via REPLICA_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum bytes accepted from a single relay response.
    ///
    /// Set via REPLICA_MAX_BYTES environment variable.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// Resource cache backend.
    ///
    /// Set via REPLICA_CACHE_BACKEND environment variable (`memory` or `sqlite`).
    #[serde(default = "default_cache_backend")]
    pub cache_backend: CacheBackend,

    /// Path to SQLite cache database.
    ///
    /// Set via REPLICA_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Entries kept before the oldest are evicted.
    ///
    /// Set via REPLICA_CACHE_MAX_ENTRIES environment variable.
    #[serde(default = "default_cache_max_entries")]
    pub cache_max_entries: usize,

    /// Number of archive downloads allowed in flight at once.
    ///
    /// Set via REPLICA_ARCHIVE_CONCURRENCY environment variable.
    #[serde(default = "default_archive_concurrency")]
    pub archive_concurrency: usize,

    /// Archive entry name for the rewritten document.
    ///
    /// Set via REPLICA_ARCHIVE_INDEX_NAME environment variable.
    #[serde(default = "default_archive_index_name")]
    pub archive_index_name: String,
}

fn default_relays() -> Vec<String> {
    DEFAULT_RELAYS.iter().map(|r| r.to_string()).collect()
}

fn default_user_agent() -> String {
    "replica/0.1".into()
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_max_bytes() -> usize {
    10_485_760 // 10MB
}

fn default_cache_backend() -> CacheBackend {
    CacheBackend::Sqlite
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./replica-cache.sqlite")
}

fn default_cache_max_entries() -> usize {
    2_000
}

fn default_archive_concurrency() -> usize {
    1
}

fn default_archive_index_name() -> String {
    "index.html".into()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            relays: default_relays(),
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
            max_bytes: default_max_bytes(),
            cache_backend: default_cache_backend(),
            db_path: default_db_path(),
            cache_max_entries: default_cache_max_entries(),
            archive_concurrency: default_archive_concurrency(),
            archive_index_name: default_archive_index_name(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `REPLICA_`
    /// 2. TOML file from `REPLICA_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("REPLICA_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("REPLICA_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.relays.len(), 2);
        assert!(config.relays[0].contains("allorigins"));
        assert!(config.relays[1].contains("corsproxy"));
        assert_eq!(config.user_agent, "replica/0.1");
        assert_eq!(config.timeout_ms, 20_000);
        assert_eq!(config.max_bytes, 10_485_760);
        assert_eq!(config.cache_backend, CacheBackend::Sqlite);
        assert_eq!(config.db_path, PathBuf::from("./replica-cache.sqlite"));
        assert_eq!(config.cache_max_entries, 2_000);
        assert_eq!(config.archive_concurrency, 1);
        assert_eq!(config.archive_index_name, "index.html");
    }

    #[test]
    fn test_timeout_duration() {
        let config = AppConfig::default();
        assert_eq!(config.timeout(), Duration::from_millis(20_000));
    }

    #[test]
    fn test_load_from_env_and_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "replica.toml",
                r#"
                    cache_backend = "memory"
                    archive_concurrency = 4
                    relays = ["https://relay.test/fetch?u={url}"]
                "#,
            )?;
            jail.set_env("REPLICA_CONFIG_FILE", "replica.toml");
            jail.set_env("REPLICA_TIMEOUT_MS", "5000");

            let config = AppConfig::load().map_err(|e| e.to_string())?;
            assert_eq!(config.cache_backend, CacheBackend::Memory);
            assert_eq!(config.archive_concurrency, 4);
            assert_eq!(config.relays, vec!["https://relay.test/fetch?u={url}".to_string()]);
            assert_eq!(config.timeout_ms, 5000);
            Ok(())
        });
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("REPLICA_ARCHIVE_CONCURRENCY", "0");
            let result = AppConfig::load();
            assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "archive_concurrency"));
            Ok(())
        });
    }
}
