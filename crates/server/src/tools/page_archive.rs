//! page_archive tool implementation.
//!
//! Clones a page, downloads its resources and writes a zip archive that
//! opens offline from `index.html`.

use std::path::Path;

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::ToolError;
use crate::tools::{HeaderParam, header_set, json_result};
use replica_client::{Cloner, Resource};

/// Parameters for the page_archive tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PageArchiveParams {
    /// Absolute http(s) URL of the page to archive.
    pub url: String,

    /// Absolute filesystem path the zip archive is written to.
    pub output_path: String,

    /// Extra request headers forwarded to every relay, in order.
    #[serde(default)]
    pub headers: Vec<HeaderParam>,
}

/// A resource stored in the archive.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ArchivedResource {
    pub url: String,
    pub path: String,
}

/// Output from the page_archive tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PageArchiveOutput {
    pub output_path: String,
    /// Size of the written archive in bytes.
    pub bytes: usize,
    pub index: String,
    pub summary: String,
    pub delivered: Vec<ArchivedResource>,
    /// URLs left pointing at the live site.
    pub undelivered: Vec<String>,
}

fn archived(resource: Resource) -> ArchivedResource {
    ArchivedResource { url: resource.url, path: resource.local_path }
}

/// Implementation of the page_archive tool.
pub async fn archive_impl(cloner: &Cloner, params: PageArchiveParams) -> Result<CallToolResult, McpError> {
    let output_path = Path::new(&params.output_path);
    if !output_path.is_absolute() {
        return Err(ToolError::InvalidInput(format!("output_path must be absolute: {}", params.output_path)).into());
    }

    let headers = header_set(&params.headers)?;
    let archive = cloner
        .clone_archive(&params.url, &headers, |progress| {
            tracing::debug!(completed = progress.completed, total = progress.total, "archive progress");
        })
        .await?;

    tokio::fs::write(output_path, &archive.bytes)
        .await
        .map_err(|e| ToolError::WriteFailed(format!("{}: {e}", output_path.display())))?;

    tracing::info!(path = %output_path.display(), bytes = archive.bytes.len(), "archive written");

    let output = PageArchiveOutput {
        output_path: params.output_path.clone(),
        bytes: archive.bytes.len(),
        summary: archive.summary(),
        index: archive.index_name,
        delivered: archive.delivered.into_iter().map(archived).collect(),
        undelivered: archive.undelivered.into_iter().map(|r| r.url).collect(),
    };

    Ok(json_result(&output)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::{PAGE_URL, cloner, output_json};

    #[tokio::test]
    async fn test_archive_written_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("site.zip");
        let params = PageArchiveParams {
            url: PAGE_URL.to_string(),
            output_path: path.display().to_string(),
            headers: Vec::new(),
        };

        let output = output_json(&archive_impl(&cloner(), params).await.unwrap());

        assert_eq!(output["summary"], "2 of 3 resources included");
        assert_eq!(output["index"], "index.html");
        assert_eq!(output["delivered"][0]["path"], "css/s.css");
        assert_eq!(output["delivered"][1]["path"], "images/a.png");
        assert_eq!(output["undelivered"][0], "https://site.test/gone.png");

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(output["bytes"], bytes.len());
        assert_eq!(&bytes[..2], b"PK");
    }

    #[tokio::test]
    async fn test_archive_requires_absolute_path() {
        let params = PageArchiveParams {
            url: PAGE_URL.to_string(),
            output_path: "relative.zip".to_string(),
            headers: Vec::new(),
        };

        let err = archive_impl(&cloner(), params).await.unwrap_err();
        assert!(err.message.starts_with("INVALID_INPUT"));
    }

    #[tokio::test]
    async fn test_archive_unwritable_destination() {
        let dir = tempfile::tempdir().unwrap();
        let params = PageArchiveParams {
            url: PAGE_URL.to_string(),
            output_path: dir.path().join("no/such/dir/site.zip").display().to_string(),
            headers: Vec::new(),
        };

        let err = archive_impl(&cloner(), params).await.unwrap_err();
        assert!(err.message.starts_with("WRITE_FAILED"));
    }
}
