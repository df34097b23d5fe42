//! page_clone tool implementation.
//!
//! Fetches a page through the relays and returns the normalized document,
//! optionally with its stylesheets and images embedded inline.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::tools::{HeaderParam, header_set, json_result};
use replica_client::{Cloner, EmbedFailure};

/// Parameters for the page_clone tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PageCloneParams {
    /// Absolute http(s) URL of the page to clone.
    pub url: String,

    /// Embed stylesheets and images into the document.
    #[serde(default)]
    pub inline: bool,

    /// Extra request headers forwarded to every relay, in order.
    #[serde(default)]
    pub headers: Vec<HeaderParam>,
}

/// One asset that could not be embedded.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FailedResource {
    pub url: String,
    pub kind: String,
    pub error: String,
}

impl From<EmbedFailure> for FailedResource {
    fn from(failure: EmbedFailure) -> Self {
        Self { url: failure.url, kind: failure.kind.as_str().to_string(), error: failure.error }
    }
}

/// Output from the page_clone tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PageCloneOutput {
    pub source_url: String,
    pub title: String,
    pub fetched_at: String,
    pub html: String,
    /// Present in inline mode, e.g. "3 of 4 resources included".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub failed: Vec<FailedResource>,
}

/// Implementation of the page_clone tool.
pub async fn clone_impl(cloner: &Cloner, params: PageCloneParams) -> Result<CallToolResult, McpError> {
    let headers = header_set(&params.headers)?;
    let document = cloner.clone_page(&params.url, &headers, params.inline).await?;

    let summary = params.inline.then(|| document.summary());
    let output = PageCloneOutput {
        source_url: document.source_url,
        title: document.title,
        fetched_at: document.fetched_at.to_rfc3339(),
        html: document.html,
        summary,
        failed: document.failed.into_iter().map(FailedResource::from).collect(),
    };

    Ok(json_result(&output)?)
}
