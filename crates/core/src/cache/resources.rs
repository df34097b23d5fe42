//! Resource entry operations for the SQLite cache.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

use super::connection::CacheDb;
use super::{CacheEntry, ResourceStore};
use crate::Error;

/// Fixed-width timestamps so lexical order in SQLite matches time order.
fn encode_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn decode_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .unwrap_or_else(|e| {
            tracing::warn!(fetched_at = raw, error = %e, "unreadable cache timestamp");
            DateTime::<Utc>::UNIX_EPOCH
        })
}

impl CacheDb {
    /// Get a cached resource by its absolute URL.
    ///
    /// Returns None if the URL doesn't exist in the cache.
    pub async fn get_resource(&self, url: &str) -> Result<Option<CacheEntry>, Error> {
        let url = url.to_string();
        self.conn
            .call(move |conn| -> Result<Option<CacheEntry>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT url, raw_content, content_type, fetched_at, base64
                     FROM resources WHERE url = ?1",
                )?;

                let result = stmt.query_row(params![url], |row| {
                    let fetched_at: String = row.get(3)?;
                    Ok(CacheEntry {
                        url: row.get(0)?,
                        raw_content: row.get(1)?,
                        content_type: row.get(2)?,
                        fetched_at: decode_timestamp(&fetched_at),
                        base64: row.get(4)?,
                    })
                });

                match result {
                    Ok(entry) => Ok(Some(entry)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Insert or replace a cached resource.
    ///
    /// Uses UPSERT semantics. When a capacity is configured the oldest
    /// entries beyond it are purged in the same call.
    pub async fn put_resource(&self, entry: &CacheEntry) -> Result<(), Error> {
        let entry = entry.clone();
        let fetched_at = encode_timestamp(&entry.fetched_at);

        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO resources (url, raw_content, content_type, fetched_at, base64)
                    VALUES (?1, ?2, ?3, ?4, ?5)
                    ON CONFLICT(url) DO UPDATE SET
                        raw_content = excluded.raw_content,
                        content_type = excluded.content_type,
                        fetched_at = excluded.fetched_at,
                        base64 = excluded.base64",
                    params![entry.url, entry.raw_content, entry.content_type, fetched_at, entry.base64],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)?;

        if let Some(max) = self.max_entries {
            let evicted = self.purge_lru_resources(max).await?;
            if evicted > 0 {
                tracing::debug!(evicted, "evicted oldest cache entries");
            }
        }

        Ok(())
    }

    /// Count cached resources.
    pub async fn count_resources(&self) -> Result<usize, Error> {
        self.conn
            .call(|conn| -> Result<usize, Error> {
                let count: i64 = conn.query_row("SELECT COUNT(*) FROM resources", [], |row| row.get(0))?;
                Ok(count as usize)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete every cached resource.
    ///
    /// Returns the number of deleted entries.
    pub async fn purge_all_resources(&self) -> Result<u64, Error> {
        self.conn
            .call(|conn| -> Result<u64, Error> {
                let count = conn.execute("DELETE FROM resources", [])?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Purge oldest entries until count <= max_entries.
    ///
    /// Returns the number of deleted entries.
    pub async fn purge_lru_resources(&self, max_entries: usize) -> Result<u64, Error> {
        let max = max_entries as i64;
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 = conn.query_row("SELECT COUNT(*) FROM resources", [], |row| row.get(0))?;
                if count <= max {
                    return Ok(0);
                }

                let to_delete = count - max;
                let deleted = conn.execute(
                    "DELETE FROM resources WHERE url IN (
                    SELECT url FROM resources ORDER BY fetched_at ASC LIMIT ?1
                )",
                    params![to_delete],
                )?;
                Ok(deleted as u64)
            })
            .await
            .map_err(Error::from)
    }
}

#[async_trait]
impl ResourceStore for CacheDb {
    async fn get(&self, url: &str) -> Result<Option<CacheEntry>, Error> {
        self.get_resource(url).await
    }

    async fn set(&self, entry: CacheEntry) -> Result<(), Error> {
        self.put_resource(&entry).await
    }

    async fn size(&self) -> Result<usize, Error> {
        self.count_resources().await
    }

    async fn clear(&self) -> Result<(), Error> {
        let deleted = self.purge_all_resources().await?;
        tracing::debug!(deleted, "cleared resource cache");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn entry_at(url: &str, age_secs: i64) -> CacheEntry {
        let mut entry = CacheEntry::text(url, "body{}", "text/css");
        entry.fetched_at = Utc::now() - Duration::seconds(age_secs);
        entry
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let entry = CacheEntry::encoded("https://x.test/a.png", "image/png", "data:image/png;base64,AA==");

        db.put_resource(&entry).await.unwrap();

        let retrieved = db.get_resource("https://x.test/a.png").await.unwrap().unwrap();
        assert_eq!(retrieved.url, entry.url);
        assert_eq!(retrieved.raw_content, "");
        assert_eq!(retrieved.content_type, "image/png");
        assert_eq!(retrieved.base64, entry.base64);
        assert_eq!(retrieved.fetched_at.timestamp_millis(), entry.fetched_at.timestamp_millis());
    }

    #[tokio::test]
    async fn test_get_missing() {
        let db = CacheDb::open_in_memory().await.unwrap();
        assert!(db.get_resource("https://x.test/none").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_overwrites() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.put_resource(&CacheEntry::text("https://x.test/a.css", "old", "text/css"))
            .await
            .unwrap();
        db.put_resource(&CacheEntry::text("https://x.test/a.css", "new", "text/css"))
            .await
            .unwrap();

        assert_eq!(db.count_resources().await.unwrap(), 1);
        let retrieved = db.get_resource("https://x.test/a.css").await.unwrap().unwrap();
        assert_eq!(retrieved.raw_content, "new");
    }

    #[tokio::test]
    async fn test_store_trait_clear() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let store: &dyn ResourceStore = &db;
        store.set(entry_at("https://x.test/a.css", 0)).await.unwrap();
        store.set(entry_at("https://x.test/b.css", 0)).await.unwrap();
        assert_eq!(store.size().await.unwrap(), 2);

        store.clear().await.unwrap();
        assert_eq!(store.size().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_capacity_evicts_oldest() {
        let db = CacheDb::open_in_memory().await.unwrap().with_max_entries(2);
        db.put_resource(&entry_at("https://x.test/old.css", 60)).await.unwrap();
        db.put_resource(&entry_at("https://x.test/mid.css", 30)).await.unwrap();
        db.put_resource(&entry_at("https://x.test/new.css", 0)).await.unwrap();

        assert_eq!(db.count_resources().await.unwrap(), 2);
        assert!(db.get_resource("https://x.test/old.css").await.unwrap().is_none());
        assert!(db.get_resource("https://x.test/new.css").await.unwrap().is_some());
    }

    #[test]
    fn test_timestamp_roundtrip_is_fixed_width() {
        let ts = DateTime::parse_from_rfc3339("2025-01-20T00:00:00Z").unwrap().with_timezone(&Utc);
        let encoded = encode_timestamp(&ts);
        assert_eq!(encoded, "2025-01-20T00:00:00.000Z");
        assert_eq!(decode_timestamp(&encoded), ts);
    }
}
