//! Opening the SQLite resource cache.

use std::path::Path;

use tokio_rusqlite::Connection;

use super::migrations;
use crate::Error;

/// Applied to every connection before migrations.
const PRAGMAS: &str = "PRAGMA journal_mode=WAL;
     PRAGMA synchronous=NORMAL;
     PRAGMA busy_timeout=5000;
     PRAGMA temp_store=MEMORY;";

/// SQLite-backed resource cache.
///
/// Statements run on tokio-rusqlite's background thread. Clones share the
/// connection and the entry cap.
#[derive(Clone, Debug)]
pub struct CacheDb {
    pub(crate) conn: Connection,
    pub(crate) max_entries: Option<usize>,
}

impl CacheDb {
    /// Open (or create) the cache file at `path` and bring its schema up to date.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let conn = Connection::open(path).await.map_err(|e| Error::Database(e.into()))?;
        let db = Self::initialize(conn).await?;
        tracing::debug!(path = %path.display(), "opened resource cache");
        Ok(db)
    }

    /// Open a private in-memory cache; contents vanish with the handle.
    pub async fn open_in_memory() -> Result<Self, Error> {
        let conn = Connection::open_in_memory().await.map_err(|e| Error::Database(e.into()))?;
        Self::initialize(conn).await
    }

    /// Cap the number of stored resources; the oldest are purged after each write.
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = Some(max_entries);
        self
    }

    async fn initialize(conn: Connection) -> Result<Self, Error> {
        conn.call(|conn| conn.execute_batch(PRAGMAS)).await.map_err(Error::Database)?;

        let applied = migrations::run(&conn).await?;
        if applied > 0 {
            tracing::info!(applied, "resource cache schema updated");
        }

        Ok(Self { conn, max_entries: None })
    }
}
