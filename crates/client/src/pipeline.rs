//! End-to-end cloning pipeline.
//!
//! Fetch the primary document through the relays, normalize it, then either
//! embed its assets inline or package them into an archive. Only a failed
//! primary fetch aborts a run; processing failures fall back to the
//! unprocessed document and asset failures are reported per resource.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use url::Url;

use crate::archive::{ArchiveAssembler, ArchiveWriter, AssemblyReport, Progress};
use crate::embed::{EmbedFailure, InlineEmbedder};
use crate::extract::{Resource, extract_resources, normalize, rewrite_paths, strip_base};
use crate::fetch::{Fetcher, canonicalize};
use crate::headers::HeaderSet;
use crate::publish::{extract_title, suggest_slug};
use replica_core::{AppConfig, Error, PageStore, PublishRequest, ResourceStore};

/// A processed document ready to hand to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct ClonedDocument {
    pub source_url: String,
    pub html: String,
    pub title: String,
    pub fetched_at: DateTime<Utc>,
    /// Assets embedded inline; zero unless inline mode was requested.
    pub embedded: usize,
    /// Assets that could not be embedded.
    pub failed: Vec<EmbedFailure>,
}

impl ClonedDocument {
    /// Human-readable partial-success line for inline mode.
    pub fn summary(&self) -> String {
        format!("{} of {} resources included", self.embedded, self.embedded + self.failed.len())
    }
}

/// A finished archive and what went into it.
#[derive(Debug, Clone)]
pub struct ArchiveOutput {
    pub bytes: Vec<u8>,
    pub delivered: Vec<Resource>,
    pub undelivered: Vec<Resource>,
    /// Archive entry holding the rewritten document.
    pub index_name: String,
}

impl ArchiveOutput {
    pub fn summary(&self) -> String {
        format!("{} of {} resources included", self.delivered.len(), self.delivered.len() + self.undelivered.len())
    }
}

/// Wires the fetcher, cache, embedder and assembler together.
pub struct Cloner {
    fetcher: Arc<dyn Fetcher>,
    store: Arc<dyn ResourceStore>,
    archive_concurrency: usize,
    index_name: String,
}

impl Cloner {
    /// Sequential archive downloads, document stored as `index.html`.
    pub fn new(fetcher: Arc<dyn Fetcher>, store: Arc<dyn ResourceStore>) -> Self {
        Self { fetcher, store, archive_concurrency: 1, index_name: "index.html".into() }
    }

    pub fn from_config(config: &AppConfig, fetcher: Arc<dyn Fetcher>, store: Arc<dyn ResourceStore>) -> Self {
        Self {
            fetcher,
            store,
            archive_concurrency: config.archive_concurrency,
            index_name: config.archive_index_name.clone(),
        }
    }

    /// Shared resource cache.
    pub fn store(&self) -> &Arc<dyn ResourceStore> {
        &self.store
    }

    /// Validate `url` and fetch the primary document.
    ///
    /// The primary document is never served from the cache.
    pub async fn fetch_document(&self, url: &str, headers: &HeaderSet) -> Result<(Url, String), Error> {
        let target = canonicalize(url)?;
        let fetched = self.fetcher.fetch(target.as_str(), headers).await?;
        let html = fetched.text();

        if html.trim().is_empty() {
            return Err(Error::EmptyResponse(format!("empty document from {target}")));
        }

        tracing::info!(url = %target, relay = %fetched.relay, bytes = fetched.body.len(), "fetched document");
        Ok((target, html))
    }

    /// Fetch and normalize a page, optionally embedding its assets.
    pub async fn clone_page(&self, url: &str, headers: &HeaderSet, inline: bool) -> Result<ClonedDocument, Error> {
        let (target, raw) = self.fetch_document(url, headers).await?;
        let fetched_at = Utc::now();

        let mut html = normalize(&raw, &target).unwrap_or_else(|e| {
            tracing::warn!(url = %target, error = %e, "normalization failed, keeping raw document");
            raw
        });

        let mut embedded = 0;
        let mut failed = Vec::new();

        if inline {
            let embedder = InlineEmbedder::new(self.fetcher.clone(), self.store.clone());
            match embedder.embed(&html, &target, headers).await {
                Ok(outcome) => {
                    tracing::info!(url = %target, "{}", outcome.summary());
                    html = outcome.html;
                    embedded = outcome.embedded;
                    failed = outcome.failed;
                }
                Err(e) => tracing::warn!(url = %target, error = %e, "embedding failed, keeping normalized document"),
            }
        }

        Ok(ClonedDocument {
            source_url: target.to_string(),
            title: extract_title(&html),
            html,
            fetched_at,
            embedded,
            failed,
        })
    }

    /// Package a cloned document and its resources into a zip archive.
    ///
    /// Only delivered resources have their references rewritten to local
    /// paths; undelivered ones keep their absolute URLs.
    pub async fn archive<F>(
        &self, document: &ClonedDocument, headers: &HeaderSet, on_progress: F,
    ) -> Result<ArchiveOutput, Error>
    where
        F: FnMut(Progress) + Send,
    {
        let base = Url::parse(&document.source_url).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        let resources = extract_resources(&document.html, &base);

        let assembler = ArchiveAssembler::new(self.fetcher.clone())
            .with_store(self.store.clone())
            .with_concurrency(self.archive_concurrency);

        let mut writer = ArchiveWriter::new();
        let AssemblyReport { delivered, undelivered } =
            assembler.assemble(&resources, headers, &mut writer, on_progress).await;

        let rewritten = rewrite_paths(&document.html, &delivered);
        let index = strip_base(&rewritten).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "could not remove base element from archived document");
            rewritten
        });

        writer.add(&self.index_name, index.as_bytes())?;
        let bytes = writer.finish()?;

        tracing::info!(
            url = %document.source_url,
            delivered = delivered.len(),
            undelivered = undelivered.len(),
            bytes = bytes.len(),
            "archive finalized"
        );

        Ok(ArchiveOutput { bytes, delivered, undelivered, index_name: self.index_name.clone() })
    }

    /// Fetch, normalize and archive a page.
    pub async fn clone_archive<F>(&self, url: &str, headers: &HeaderSet, on_progress: F) -> Result<ArchiveOutput, Error>
    where
        F: FnMut(Progress) + Send,
    {
        let document = self.clone_page(url, headers, false).await?;
        self.archive(&document, headers, on_progress).await
    }

    /// Hand a finished document to an external page store.
    pub async fn publish(&self, pages: &dyn PageStore, document: &ClonedDocument) -> Result<String, Error> {
        let request = PublishRequest {
            source_url: document.source_url.clone(),
            title: document.title.clone(),
            slug_hint: suggest_slug(&document.title, &document.html),
            html: document.html.clone(),
        };

        let id = pages.publish(request).await?;
        tracing::info!(url = %document.source_url, id = %id, "published document");
        Ok(id)
    }
}
