//! cache_clear tool implementation.
//!
//! Removes every cached resource.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::tools::json_result;
use replica_core::ResourceStore;

/// Output from the cache_clear tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheClearOutput {
    /// Number of entries removed.
    pub deleted: usize,
}

/// Implementation of the cache_clear tool.
pub async fn clear_impl(store: &dyn ResourceStore) -> Result<CallToolResult, McpError> {
    let deleted = store.size().await?;
    store.clear().await?;
    tracing::info!(deleted, "resource cache cleared");

    Ok(json_result(&CacheClearOutput { deleted })?)
}
