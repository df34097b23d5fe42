//! cache_stats tool implementation.
//!
//! Reports how many resources the cache holds.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::tools::json_result;
use replica_core::ResourceStore;

/// Output from the cache_stats tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheStatsOutput {
    /// Number of cached resources.
    pub entries: usize,
    /// Active backend (`memory` or `sqlite`).
    pub backend: String,
}

/// Implementation of the cache_stats tool.
pub async fn stats_impl(store: &dyn ResourceStore, backend: &str) -> Result<CallToolResult, McpError> {
    let entries = store.size().await?;
    let output = CacheStatsOutput { entries, backend: backend.to_string() };
    Ok(json_result(&output)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::output_json;
    use replica_core::{CacheDb, CacheEntry, MemoryStore};

    #[tokio::test]
    async fn test_stats_empty() {
        let store = MemoryStore::new();
        let result = stats_impl(&store, "memory").await.unwrap();
        let output = output_json(&result);
        assert_eq!(output["entries"], 0);
        assert_eq!(output["backend"], "memory");
    }

    #[tokio::test]
    async fn test_stats_counts_sqlite_entries() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.set(CacheEntry::text("https://x.test/a.css", "a{}", "text/css")).await.unwrap();
        db.set(CacheEntry::text("https://x.test/b.css", "b{}", "text/css")).await.unwrap();
        db.set(CacheEntry::text("https://x.test/a.css", "a{color:red}", "text/css")).await.unwrap();

        let output = output_json(&stats_impl(&db, "sqlite").await.unwrap());
        assert_eq!(output["entries"], 2);
    }
}
