//! mcp-replica server entry point.
//!
//! This is the main binary that boots the MCP server on stdio transport.
//! Logging goes to stderr to avoid interfering with the JSON-RPC protocol on stdout.

use std::sync::Arc;

use anyhow::Result;
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use tracing_subscriber::EnvFilter;

use replica_client::{Cloner, FetchConfig, RelayFetcher};
use replica_core::{AppConfig, open_store};

mod error;
mod handler;
mod tools;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;
    tracing::info!(relays = config.relays.len(), backend = config.cache_backend.as_str(), "Starting mcp-replica server on stdio transport");

    let store = open_store(&config).await?;
    let fetcher = Arc::new(RelayFetcher::new(FetchConfig::from(&config))?);
    let cloner = Cloner::from_config(&config, fetcher, store);

    let handler = handler::ReplicaServer::new(Arc::new(cloner), config.cache_backend);
    let transport = stdio();
    let server = serve_server(handler, transport).await?;

    server.waiting().await?;

    Ok(())
}
