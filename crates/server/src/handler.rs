//! MCP server handler implementation.
//!
//! This module defines the main server handler that
//! routes tool calls to the appropriate implementations.
use std::sync::Arc;

use crate::tools::{PageArchiveParams, PageCloneParams, archive_impl, clear_impl, clone_impl, stats_impl};
use replica_client::Cloner;
use replica_core::CacheBackend;

use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{
        tool::{ToolCallContext, ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};

/// The main MCP server handler for mcp-replica.
#[derive(Clone)]
pub struct ReplicaServer {
    tool_router: ToolRouter<Self>,
    cloner: Arc<Cloner>,
    backend: CacheBackend,
}

/// Tool router implementation using the #[tool_router] macro.
///
/// This macro generates the routing logic that maps tool names to handler methods.
#[tool_router]
impl ReplicaServer {
    /// Create a new server handler around a configured pipeline.
    pub fn new(cloner: Arc<Cloner>, backend: CacheBackend) -> Self {
        Self { tool_router: Self::tool_router(), cloner, backend }
    }

    /// Clone a page into a single HTML document.
    ///
    /// With `inline` set, stylesheets become `<style>` blocks and images become data URIs;
    /// assets that cannot be fetched keep their absolute URLs and are listed as failed.
    #[tool(
        description = "Fetch a web page through relay proxies and return normalized HTML. Set inline=true to embed stylesheets and images."
    )]
    async fn page_clone(&self, params: Parameters<PageCloneParams>) -> Result<CallToolResult, McpError> {
        clone_impl(&self.cloner, params.0).await
    }

    /// Package a page and its resources into a zip archive on disk.
    #[tool(
        description = "Fetch a web page and its stylesheets, scripts and images, and write an offline zip archive to output_path."
    )]
    async fn page_archive(&self, params: Parameters<PageArchiveParams>) -> Result<CallToolResult, McpError> {
        archive_impl(&self.cloner, params.0).await
    }

    #[tool(description = "Report the number of resources held in the cache.")]
    async fn cache_stats(&self) -> Result<CallToolResult, McpError> {
        stats_impl(self.cloner.store().as_ref(), self.backend.as_str()).await
    }

    #[tool(description = "Remove every resource from the cache.")]
    async fn cache_clear(&self) -> Result<CallToolResult, McpError> {
        clear_impl(self.cloner.store().as_ref()).await
    }
}

impl ServerHandler for ReplicaServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "mcp-replica".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::model::ErrorData> {
        Ok(ListToolsResult { meta: None, tools: self.tool_router.list_all(), next_cursor: None })
    }

    async fn call_tool(
        &self, request: CallToolRequestParam, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::model::ErrorData> {
        self.tool_router
            .call(ToolCallContext::new(self, request, context))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::cloner;

    #[test]
    fn test_tools_registered() {
        let server = ReplicaServer::new(cloner(), CacheBackend::Memory);
        let mut names: Vec<String> = server.tool_router.list_all().into_iter().map(|t| t.name.to_string()).collect();
        names.sort();
        assert_eq!(names, vec!["cache_clear", "cache_stats", "page_archive", "page_clone"]);
    }

    #[test]
    fn test_server_info() {
        let server = ReplicaServer::new(cloner(), CacheBackend::Memory);
        let info = server.get_info();
        assert_eq!(info.server_info.name, "mcp-replica");
        assert!(info.capabilities.tools.is_some());
    }
}
