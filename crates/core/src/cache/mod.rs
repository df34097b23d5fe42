//! Resource cache keyed by absolute URL.
//!
//! Entries are immutable snapshots of a fetched asset: once written they are
//! served as-is (no revalidation) until the store is cleared or evicts them.
//! Keys are compared byte-for-byte; no URL normalization happens here.
//!
//! Two backends implement [`ResourceStore`]:
//!
//! - [`MemoryStore`] keeps entries in a process-local map
//! - [`CacheDb`] persists them in SQLite via tokio-rusqlite

pub mod connection;
pub mod memory;
pub mod migrations;
pub mod resources;

pub use crate::Error;

pub use connection::CacheDb;
pub use memory::MemoryStore;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{AppConfig, CacheBackend};

/// A stored snapshot of a previously fetched resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Absolute URL the content was fetched from.
    pub url: String,
    /// Text content; empty for binary resources kept only as a data URI.
    pub raw_content: String,
    pub content_type: String,
    pub fetched_at: DateTime<Utc>,
    /// `data:` URI encoding of the content, when one was produced.
    pub base64: Option<String>,
}

impl CacheEntry {
    /// Entry holding textual content such as a stylesheet.
    pub fn text(url: impl Into<String>, content: impl Into<String>, content_type: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            raw_content: content.into(),
            content_type: content_type.into(),
            fetched_at: Utc::now(),
            base64: None,
        }
    }

    /// Entry holding only a `data:` URI encoding.
    pub fn encoded(url: impl Into<String>, content_type: impl Into<String>, data_uri: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            raw_content: String::new(),
            content_type: content_type.into(),
            fetched_at: Utc::now(),
            base64: Some(data_uri.into()),
        }
    }
}

/// Storage contract for the resource cache.
///
/// Callers look an URL up before any network fetch for it and write the
/// result back after a successful fetch. `set` replaces any existing entry.
/// Implementations must make each call atomic on its own; pairing a `get`
/// with a later `set` is the caller's concern.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Exact-match lookup by absolute URL.
    async fn get(&self, url: &str) -> Result<Option<CacheEntry>, Error>;

    /// Insert or overwrite the entry for `entry.url`.
    async fn set(&self, entry: CacheEntry) -> Result<(), Error>;

    /// Number of stored entries.
    async fn size(&self) -> Result<usize, Error>;

    /// Remove every entry.
    async fn clear(&self) -> Result<(), Error>;
}

/// Open the store selected by `config.cache_backend`.
pub async fn open_store(config: &AppConfig) -> Result<Arc<dyn ResourceStore>, Error> {
    match config.cache_backend {
        CacheBackend::Memory => {
            tracing::debug!(max_entries = config.cache_max_entries, "using in-memory resource cache");
            Ok(Arc::new(MemoryStore::with_max_entries(config.cache_max_entries)))
        }
        CacheBackend::Sqlite => {
            tracing::debug!(path = %config.db_path.display(), "using sqlite resource cache");
            let db = CacheDb::open(&config.db_path).await?;
            Ok(Arc::new(db.with_max_entries(config.cache_max_entries)))
        }
    }
}
