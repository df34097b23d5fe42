//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

/// Placeholders a relay template may carry.
const RELAY_PLACEHOLDERS: &[&str] = &["{url}", "{raw_url}"];

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `relays` is empty, or a template lacks a placeholder or is not an http(s) URL
    /// - `max_bytes` is 0 or exceeds 50MB
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - `user_agent` is empty
    /// - `archive_concurrency` is outside 1..=16
    /// - `cache_max_entries` is 0
    /// - `archive_index_name` is empty or contains a path separator
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.relays.is_empty() {
            return Err(ConfigError::Invalid { field: "relays".into(), reason: "at least one relay is required".into() });
        }
        for relay in &self.relays {
            validate_relay(relay)?;
        }

        if self.max_bytes == 0 {
            return Err(ConfigError::Invalid { field: "max_bytes".into(), reason: "must be greater than 0".into() });
        }
        if self.max_bytes > 50 * 1024 * 1024 {
            return Err(ConfigError::Invalid { field: "max_bytes".into(), reason: "must not exceed 50MB".into() });
        }

        if self.timeout_ms < 100 {
            return Err(ConfigError::Invalid { field: "timeout_ms".into(), reason: "must be at least 100ms".into() });
        }
        if self.timeout_ms > 300_000 {
            return Err(ConfigError::Invalid {
                field: "timeout_ms".into(),
                reason: "must not exceed 5 minutes (300000ms)".into(),
            });
        }

        if self.user_agent.is_empty() {
            return Err(ConfigError::Invalid { field: "user_agent".into(), reason: "must not be empty".into() });
        }

        if !(1..=16).contains(&self.archive_concurrency) {
            return Err(ConfigError::Invalid {
                field: "archive_concurrency".into(),
                reason: "must be between 1 and 16".into(),
            });
        }

        if self.cache_max_entries == 0 {
            return Err(ConfigError::Invalid {
                field: "cache_max_entries".into(),
                reason: "must be greater than 0".into(),
            });
        }

        if self.archive_index_name.is_empty() || self.archive_index_name.contains('/') {
            return Err(ConfigError::Invalid {
                field: "archive_index_name".into(),
                reason: "must be a bare file name".into(),
            });
        }

        if self.archive_concurrency > 1 {
            tracing::warn!(
                archive_concurrency = self.archive_concurrency,
                "archive downloads will run in parallel; relays see more simultaneous load"
            );
        }

        Ok(())
    }
}

fn validate_relay(relay: &str) -> Result<(), ConfigError> {
    if !RELAY_PLACEHOLDERS.iter().any(|p| relay.contains(p)) {
        return Err(ConfigError::Invalid {
            field: "relays".into(),
            reason: format!("'{relay}' has no {{url}} or {{raw_url}} placeholder"),
        });
    }

    let sample = relay.replace("{url}", "sample").replace("{raw_url}", "https://sample.invalid/");
    match url::Url::parse(&sample) {
        Ok(u) if u.scheme() == "http" || u.scheme() == "https" => Ok(()),
        _ => Err(ConfigError::Invalid { field: "relays".into(), reason: format!("'{relay}' is not an http(s) URL") }),
    }
}
