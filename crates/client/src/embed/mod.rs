//! Inline embedding of external assets.
//!
//! Produces a single self-contained document: images and background images
//! become `data:` URIs and external stylesheets become `<style>` blocks.
//!
//! Work happens in two passes. The first scans the document and retrieves
//! each referenced asset (cache first, relays second, one at a time); the
//! second rewrites the markup with whatever was retrieved. An asset that
//! cannot be retrieved keeps its original reference.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, LazyLock};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use html_escape::{decode_html_entities, encode_double_quoted_attribute};
use lol_html::html_content::ContentType;
use lol_html::{Settings, element};
use regex::Regex;
use scraper::{Html, Selector};
use serde::Serialize;
use url::Url;

use crate::extract::normalize::rewrite;
use crate::extract::resources::{ResourceKind, is_stylesheet_rel};
use crate::extract::style::{background_urls, has_background, rewrite_background_urls};
use crate::fetch::url::{is_data_uri, resolve_reference};
use crate::fetch::{Fetched, Fetcher};
use crate::headers::HeaderSet;
use replica_core::{CacheEntry, Error, ResourceStore};

static STYLE_CLOSE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)</style").expect("invalid style regex"));

/// Build a `data:` URI.
pub fn data_uri(content_type: &str, body: &[u8]) -> String {
    let mut encoded = String::with_capacity(base64::encoded_len(body.len(), true).unwrap_or(0) + 16 + content_type.len());
    encoded.push_str("data:");
    encoded.push_str(content_type);
    encoded.push_str(";base64,");
    STANDARD.encode_string(body, &mut encoded);
    encoded
}

/// Decode the payload of a base64 `data:` URI.
pub fn decode_data_uri(uri: &str) -> Option<Vec<u8>> {
    let (meta, payload) = uri.strip_prefix("data:")?.split_once(',')?;
    if !meta.ends_with(";base64") {
        return None;
    }
    STANDARD.decode(payload).ok()
}

/// Media type from the file extension, for relays that report none.
pub fn guess_media_type(url: &str, kind: ResourceKind) -> &'static str {
    let path = url.split(['?', '#']).next().unwrap_or(url).to_ascii_lowercase();
    let ext = path.rsplit_once('.').map(|(_, ext)| ext).unwrap_or_default();
    match ext {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "avif" => "image/avif",
        "ico" => "image/x-icon",
        "css" => "text/css",
        "js" | "mjs" => "text/javascript",
        "woff2" => "font/woff2",
        "woff" => "font/woff",
        _ => kind.fallback_content_type(),
    }
}

/// Cache entry recorded after a successful fetch.
///
/// Textual kinds keep their content; everything else is kept as a data URI.
pub fn cache_entry_for(url: &str, kind: ResourceKind, fetched: &Fetched) -> CacheEntry {
    let content_type = fetched.media_type(guess_media_type(url, kind));
    match kind {
        ResourceKind::Stylesheet | ResourceKind::Script => match std::str::from_utf8(&fetched.body) {
            Ok(text) => CacheEntry::text(url, text, content_type),
            Err(_) => CacheEntry::encoded(url, &content_type, data_uri(&content_type, &fetched.body)),
        },
        ResourceKind::Image | ResourceKind::Other => {
            CacheEntry::encoded(url, &content_type, data_uri(&content_type, &fetched.body))
        }
    }
}

/// An asset that could not be embedded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmbedFailure {
    pub url: String,
    pub kind: ResourceKind,
    pub error: String,
}

/// Result of an embedding run.
#[derive(Debug, Clone)]
pub struct EmbedOutcome {
    pub html: String,
    /// Distinct assets substituted into the document.
    pub embedded: usize,
    /// Distinct assets left as references.
    pub failed: Vec<EmbedFailure>,
}

impl EmbedOutcome {
    pub fn total(&self) -> usize {
        self.embedded + self.failed.len()
    }

    /// Human-readable partial-success line.
    pub fn summary(&self) -> String {
        format!("{} of {} resources included", self.embedded, self.total())
    }
}

/// Absolute asset URLs a document references, grouped by processing step.
#[derive(Debug, Default)]
struct EmbedPlan {
    images: Vec<String>,
    backgrounds: Vec<String>,
    stylesheets: Vec<String>,
}

impl EmbedPlan {
    fn scan(html: &str, base: &Url) -> Self {
        let document = Html::parse_document(html);
        let images = Selector::parse("img[src]").expect("invalid selector");
        let styled = Selector::parse("[style]").expect("invalid selector");
        let links = Selector::parse("link[rel][href]").expect("invalid selector");

        let mut plan = Self::default();

        for el in document.select(&images) {
            if let Some(src) = el.value().attr("src")
                && !is_data_uri(src)
                && let Some(url) = resolve_reference(base, src)
            {
                plan.images.push(url);
            }
        }

        for el in document.select(&styled) {
            let Some(style) = el.value().attr("style") else { continue };
            if has_background(style) {
                plan.backgrounds.extend(background_urls(style).iter().filter_map(|r| resolve_reference(base, r)));
            }
        }

        for el in document.select(&links) {
            if el.value().attr("rel").is_some_and(is_stylesheet_rel)
                && let Some(href) = el.value().attr("href")
                && let Some(url) = resolve_reference(base, href)
            {
                plan.stylesheets.push(url);
            }
        }

        plan
    }
}

fn style_block(css: &str, media: Option<&str>) -> String {
    let css = STYLE_CLOSE.replace_all(css, "<\\/style");
    match media {
        Some(media) => format!("<style media=\"{}\">{}</style>", encode_double_quoted_attribute(media), css),
        None => format!("<style>{css}</style>"),
    }
}

/// Embeds assets as data URIs, reading through a shared resource cache.
pub struct InlineEmbedder {
    fetcher: Arc<dyn Fetcher>,
    store: Arc<dyn ResourceStore>,
}

impl InlineEmbedder {
    pub fn new(fetcher: Arc<dyn Fetcher>, store: Arc<dyn ResourceStore>) -> Self {
        Self { fetcher, store }
    }

    async fn cached(&self, url: &str) -> Option<CacheEntry> {
        match self.store.get(url).await {
            Ok(Some(entry)) => {
                tracing::debug!(url, "cache hit");
                Some(entry)
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(url, error = %e, "cache lookup failed, fetching instead");
                None
            }
        }
    }

    async fn remember(&self, entry: CacheEntry) {
        let url = entry.url.clone();
        if let Err(e) = self.store.set(entry).await {
            tracing::warn!(url, error = %e, "failed to write cache entry");
        }
    }

    /// Data URI for an image, cache first.
    async fn image_data_uri(&self, url: &str, headers: &HeaderSet) -> Result<String, Error> {
        if let Some(entry) = self.cached(url).await {
            if let Some(uri) = entry.base64 {
                return Ok(uri);
            }
            if !entry.raw_content.is_empty() {
                return Ok(data_uri(&entry.content_type, entry.raw_content.as_bytes()));
            }
        }

        let fetched = self.fetcher.fetch(url, headers).await?;
        let entry = cache_entry_for(url, ResourceKind::Image, &fetched);
        let uri = entry.base64.clone().unwrap_or_default();
        self.remember(entry).await;
        Ok(uri)
    }

    /// Stylesheet text, cache first.
    async fn stylesheet_text(&self, url: &str, headers: &HeaderSet) -> Result<String, Error> {
        if let Some(entry) = self.cached(url).await {
            if !entry.raw_content.is_empty() {
                return Ok(entry.raw_content);
            }
            if let Some(bytes) = entry.base64.as_deref().and_then(decode_data_uri) {
                return Ok(String::from_utf8_lossy(&bytes).into_owned());
            }
        }

        let fetched = self.fetcher.fetch(url, headers).await?;
        let text = fetched.text();
        self.remember(CacheEntry::text(url, text.clone(), fetched.media_type("text/css"))).await;
        Ok(text)
    }

    /// Retrieve each URL once, in order, collecting results and failures.
    async fn collect(
        &self, urls: &[String], kind: ResourceKind, headers: &HeaderSet, resolved: &mut HashMap<String, String>,
        failed: &mut Vec<EmbedFailure>,
    ) {
        for url in urls {
            if resolved.contains_key(url) || failed.iter().any(|f| &f.url == url) {
                continue;
            }
            let result = match kind {
                ResourceKind::Stylesheet => self.stylesheet_text(url, headers).await,
                _ => self.image_data_uri(url, headers).await,
            };
            match result {
                Ok(value) => {
                    resolved.insert(url.clone(), value);
                }
                Err(e) => {
                    tracing::warn!(url = %url, error = %e, "asset left as reference");
                    failed.push(EmbedFailure { url: url.clone(), kind, error: e.to_string() });
                }
            }
        }
    }

    /// Embed every image, background image and stylesheet of `html`.
    ///
    /// Asset failures never abort the run; they are reported on the outcome.
    pub async fn embed(&self, html: &str, base: &Url, headers: &HeaderSet) -> Result<EmbedOutcome, Error> {
        let plan = EmbedPlan::scan(html, base);

        let mut images = HashMap::new();
        let mut sheets = HashMap::new();
        let mut failed = Vec::new();

        self.collect(&plan.images, ResourceKind::Image, headers, &mut images, &mut failed).await;
        self.collect(&plan.backgrounds, ResourceKind::Image, headers, &mut images, &mut failed).await;
        self.collect(&plan.stylesheets, ResourceKind::Stylesheet, headers, &mut sheets, &mut failed).await;

        if images.is_empty() && sheets.is_empty() {
            return Ok(EmbedOutcome { html: html.to_string(), embedded: 0, failed });
        }

        // lol_html hands attribute values over undecoded.
        let lookup = |reference: &str| resolve_reference(base, &decode_html_entities(reference));
        let applied: RefCell<HashSet<String>> = RefCell::new(HashSet::new());

        let output = rewrite(
            html,
            Settings {
                element_content_handlers: vec![
                    element!("img[src]", |el| {
                        if let Some((url, uri)) = el
                            .get_attribute("src")
                            .and_then(|src| lookup(&src))
                            .and_then(|url| images.get(&url).map(|uri| (url, uri)))
                        {
                            el.set_attribute("src", uri)?;
                            applied.borrow_mut().insert(url);
                        }
                        Ok(())
                    }),
                    element!("[style]", |el| {
                        let Some(style) = el.get_attribute("style") else { return Ok(()) };
                        let style = decode_html_entities(&style);
                        if !has_background(&style) {
                            return Ok(());
                        }
                        let mut used = Vec::new();
                        let rebuilt = rewrite_background_urls(&style, |r| {
                            let url = lookup(r)?;
                            let uri = images.get(&url)?.clone();
                            used.push(url);
                            Some(uri)
                        });
                        if let Some(rebuilt) = rebuilt {
                            el.set_attribute("style", &encode_double_quoted_attribute(&rebuilt))?;
                            applied.borrow_mut().extend(used);
                        }
                        Ok(())
                    }),
                    element!("link[rel][href]", |el| {
                        if !el.get_attribute("rel").is_some_and(|rel| is_stylesheet_rel(&rel)) {
                            return Ok(());
                        }
                        if let Some((url, css)) = el
                            .get_attribute("href")
                            .and_then(|href| lookup(&href))
                            .and_then(|url| sheets.get(&url).map(|css| (url, css)))
                        {
                            let media = el.get_attribute("media").map(|m| decode_html_entities(&m).into_owned());
                            el.replace(&style_block(css, media.as_deref()), ContentType::Html);
                            applied.borrow_mut().insert(url);
                        }
                        Ok(())
                    }),
                ],
                ..Settings::default()
            },
        )?;

        let applied = applied.into_inner();
        let mut unmatched: Vec<&String> =
            images.keys().chain(sheets.keys()).filter(|url| !applied.contains(*url)).collect();
        unmatched.sort();
        for url in unmatched {
            tracing::warn!(url = %url, "retrieved asset matched no reference in the document");
            let kind = if sheets.contains_key(url) { ResourceKind::Stylesheet } else { ResourceKind::Image };
            failed.push(EmbedFailure { url: url.clone(), kind, error: "reference could not be substituted".into() });
        }
        let embedded = applied.len();

        tracing::debug!(embedded, failed = failed.len(), "embedded assets");

        Ok(EmbedOutcome { html: output, embedded, failed })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeFetcher;
    use replica_core::MemoryStore;

    const PNG: &[u8] = &[0x89, b'P', b'N', b'G'];

    fn base() -> Url {
        Url::parse("https://x.test/p/").unwrap()
    }

    fn embedder(fetcher: Arc<FakeFetcher>, store: Arc<MemoryStore>) -> InlineEmbedder {
        InlineEmbedder::new(fetcher, store)
    }

    #[test]
    fn test_data_uri_roundtrip() {
        let uri = data_uri("image/png", PNG);
        assert!(uri.starts_with("data:image/png;base64,"));
        assert_eq!(decode_data_uri(&uri).unwrap(), PNG);
        assert!(decode_data_uri("data:text/plain,hello").is_none());
    }

    #[test]
    fn test_guess_media_type() {
        assert_eq!(guess_media_type("https://x.test/a.PNG?v=1", ResourceKind::Image), "image/png");
        assert_eq!(guess_media_type("https://x.test/a", ResourceKind::Stylesheet), "text/css");
        assert_eq!(guess_media_type("https://x.test/a", ResourceKind::Image), "application/octet-stream");
    }

    #[tokio::test]
    async fn test_embeds_image_and_caches_it() {
        let fetcher = Arc::new(FakeFetcher::new().serve("https://x.test/a.png", PNG, Some("image/png")));
        let store = Arc::new(MemoryStore::new());
        let embedder = embedder(fetcher.clone(), store.clone());

        let outcome = embedder
            .embed(r#"<img src="/a.png" alt="a">"#, &base(), &HeaderSet::new())
            .await
            .unwrap();

        let expected = data_uri("image/png", PNG);
        assert!(outcome.html.contains(&format!(r#"<img src="{expected}" alt="a">"#)));
        assert_eq!(outcome.embedded, 1);
        assert!(outcome.failed.is_empty());

        let entry = store.get("https://x.test/a.png").await.unwrap().unwrap();
        assert_eq!(entry.base64.as_deref(), Some(expected.as_str()));
        assert_eq!(entry.content_type, "image/png");
    }

    #[tokio::test]
    async fn test_cache_hit_skips_fetcher() {
        let fetcher = Arc::new(FakeFetcher::new());
        let store = Arc::new(MemoryStore::new());
        store
            .set(CacheEntry::encoded("https://x.test/a.png", "image/png", "data:image/png;base64,AA=="))
            .await
            .unwrap();
        store
            .set(CacheEntry::text("https://x.test/s.css", "body{color:red}", "text/css"))
            .await
            .unwrap();

        let html = r#"<link rel="stylesheet" href="/s.css"><img src="/a.png"><img src="https://x.test/a.png">"#;
        let outcome = embedder(fetcher.clone(), store).embed(html, &base(), &HeaderSet::new()).await.unwrap();

        assert_eq!(fetcher.calls(), 0);
        assert_eq!(outcome.embedded, 2);
        assert_eq!(outcome.html.matches("data:image/png;base64,AA==").count(), 2);
        assert!(outcome.html.contains("<style>body{color:red}</style>"));
    }

    #[tokio::test]
    async fn test_repeated_reference_fetched_once() {
        let fetcher = Arc::new(FakeFetcher::new().serve("https://x.test/a.png", PNG, Some("image/png")));
        let store = Arc::new(MemoryStore::new());
        let html = r#"<img src="/a.png"><div style="background: url(/a.png)"></div><img src="/a.png">"#;

        let outcome = embedder(fetcher.clone(), store).embed(html, &base(), &HeaderSet::new()).await.unwrap();

        assert_eq!(fetcher.calls(), 1);
        assert_eq!(outcome.embedded, 1);
        assert_eq!(outcome.html.matches("data:image/png;base64,").count(), 3);
    }

    #[tokio::test]
    async fn test_failed_asset_leaves_document_unchanged() {
        let fetcher = Arc::new(FakeFetcher::new().fail("https://x.test/a.png"));
        let store = Arc::new(MemoryStore::new());
        let html = r#"<html><body><img src="https://x.test/a.png"></body></html>"#;

        let outcome = embedder(fetcher, store.clone()).embed(html, &base(), &HeaderSet::new()).await.unwrap();

        assert_eq!(outcome.html, html);
        assert_eq!(outcome.embedded, 0);
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].url, "https://x.test/a.png");
        assert_eq!(outcome.summary(), "0 of 1 resources included");
        assert_eq!(store.size().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_background_style_is_rebuilt() {
        let fetcher = Arc::new(FakeFetcher::new().serve("https://x.test/p/bg.gif", &b"GIF89a"[..], None));
        let store = Arc::new(MemoryStore::new());
        let html = r#"<div style="color: red; background-image: url('bg.gif')"></div>"#;

        let outcome = embedder(fetcher, store).embed(html, &base(), &HeaderSet::new()).await.unwrap();

        let expected = format!("color: red; background-image: url('{}')", data_uri("image/gif", b"GIF89a"));
        assert!(outcome.html.contains(&expected), "{}", outcome.html);
    }

    #[tokio::test]
    async fn test_stylesheet_link_replaced_in_place() {
        let css = "a{color:blue}</style><script>x</script>";
        let fetcher = Arc::new(FakeFetcher::new().serve("https://cdn.test/site.css", css, Some("text/css")));
        let store = Arc::new(MemoryStore::new());
        let html = r#"<head><title>T</title><link rel="stylesheet" media="print" href="https://cdn.test/site.css"><link rel="icon" href="/f.ico"></head>"#;

        let outcome = embedder(fetcher.clone(), store.clone()).embed(html, &base(), &HeaderSet::new()).await.unwrap();

        assert_eq!(
            outcome.html,
            r#"<head><title>T</title><style media="print">a{color:blue}<\/style><script>x</script></style><link rel="icon" href="/f.ico"></head>"#
        );
        assert_eq!(fetcher.requested(), vec!["https://cdn.test/site.css".to_string()]);

        let entry = store.get("https://cdn.test/site.css").await.unwrap().unwrap();
        assert_eq!(entry.raw_content, css);
        assert_eq!(entry.content_type, "text/css");
    }

    #[tokio::test]
    async fn test_entity_encoded_references_are_substituted() {
        let fetcher = Arc::new(
            FakeFetcher::new()
                .serve("https://x.test/a.png?x=1&y=2", PNG, Some("image/png"))
                .serve("https://x.test/s.css?v=1&lang=en", "s{}", Some("text/css")),
        );
        let store = Arc::new(MemoryStore::new());
        let html = r#"<link rel="stylesheet" href="/s.css?v=1&#x26;lang=en"><img src="/a.png?x=1&#38;y=2">"#;

        let outcome = embedder(fetcher.clone(), store).embed(html, &base(), &HeaderSet::new()).await.unwrap();

        assert_eq!(fetcher.calls(), 2);
        assert_eq!(outcome.embedded, 2);
        assert!(outcome.failed.is_empty());
        assert_eq!(outcome.summary(), "2 of 2 resources included");
        assert!(outcome.html.contains(&format!(r#"<img src="{}">"#, data_uri("image/png", PNG))), "{}", outcome.html);
        assert!(outcome.html.contains("<style>s{}</style>"));
        assert!(!outcome.html.contains("a.png?x=1"));
    }

    #[tokio::test]
    async fn test_processing_order() {
        let fetcher = Arc::new(
            FakeFetcher::new()
                .serve("https://x.test/s.css", "s{}", None)
                .serve("https://x.test/bg.png", PNG, None)
                .serve("https://x.test/i.png", PNG, None),
        );
        let store = Arc::new(MemoryStore::new());
        let html = r#"<link rel="stylesheet" href="/s.css"><div style="background:url(/bg.png)"></div><img src="/i.png">"#;

        embedder(fetcher.clone(), store).embed(html, &base(), &HeaderSet::new()).await.unwrap();

        assert_eq!(
            fetcher.requested(),
            vec!["https://x.test/i.png".to_string(), "https://x.test/bg.png".to_string(), "https://x.test/s.css".to_string()]
        );
    }
}
