//! MCP tool implementations.
//!
//! This module contains all tools exposed by the replica server.

pub mod cache;
pub mod page_archive;
pub mod page_clone;

pub use cache::{CacheStatsOutput, clear_impl, stats_impl};
pub use page_archive::{PageArchiveParams, archive_impl};
pub use page_clone::{PageCloneParams, clone_impl};

use rmcp::model::{CallToolResult, Content};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::ToolError;
use replica_client::HeaderSet;

/// One request header forwarded to every relay.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct HeaderParam {
    pub name: String,
    pub value: String,
}

/// Validate caller headers, keeping their order.
pub(crate) fn header_set(headers: &[HeaderParam]) -> Result<HeaderSet, replica_core::Error> {
    HeaderSet::from_pairs(headers.iter().map(|h| (h.name.as_str(), h.value.as_str())))
}

/// Wrap a serializable output as pretty JSON text content.
pub(crate) fn json_result<T: Serialize>(output: &T) -> Result<CallToolResult, ToolError> {
    let json = serde_json::to_string_pretty(output)?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}
