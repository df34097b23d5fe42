//! Resource graph extraction and archive path rewriting.

use std::collections::HashMap;

use html_escape::encode_double_quoted_attribute;
use regex::{Captures, Regex};
use sanitize_filename::{Options, sanitize_with_options};
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;

use super::style::{background_urls, has_background};
use crate::fetch::url::resolve_reference;

/// What an external resource is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Stylesheet,
    Script,
    Image,
    Other,
}

impl ResourceKind {
    /// Lowercase name used in tool output.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Stylesheet => "stylesheet",
            ResourceKind::Script => "script",
            ResourceKind::Image => "image",
            ResourceKind::Other => "other",
        }
    }

    /// Archive folder the kind is stored under.
    pub fn folder(&self) -> &'static str {
        match self {
            ResourceKind::Stylesheet => "css",
            ResourceKind::Script => "js",
            ResourceKind::Image => "images",
            ResourceKind::Other => "assets",
        }
    }

    /// Media type assumed when a relay reports none.
    pub fn fallback_content_type(&self) -> &'static str {
        match self {
            ResourceKind::Stylesheet => "text/css",
            ResourceKind::Script => "text/javascript",
            ResourceKind::Image | ResourceKind::Other => "application/octet-stream",
        }
    }
}

/// One external asset referenced by a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    /// Absolute http(s) URL.
    pub url: String,
    pub kind: ResourceKind,
    /// Path inside the archive, e.g. `images/logo.png`.
    pub local_path: String,
}

/// True when a `rel` attribute lists `stylesheet`.
pub(crate) fn is_stylesheet_rel(rel: &str) -> bool {
    rel.split_ascii_whitespace().any(|token| token.eq_ignore_ascii_case("stylesheet"))
}

/// Filename safe both as an archive entry and inside markup.
///
/// Reserved and platform-illegal names are handled by `sanitize-filename`;
/// what remains is narrowed to ASCII letters, digits, `.`, `-` and `_`.
fn safe_filename(segment: &str) -> String {
    let options = Options { replacement: "_", ..Options::default() };
    sanitize_with_options(segment, options)
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect()
}

/// Filename from the last path segment; a URL ending in `/` has none.
fn filename_for(url: &str) -> String {
    let name = Url::parse(url)
        .ok()
        .and_then(|u| u.path_segments().and_then(|segments| segments.last().map(String::from)))
        .filter(|segment| !segment.is_empty())
        .map(|segment| safe_filename(&segment))
        .filter(|name| name.chars().any(|c| c != '.' && c != '_'));

    name.unwrap_or_else(|| format!("file-{}", chrono::Utc::now().timestamp_millis()))
}

/// Append a short URL digest before the extension.
fn disambiguate(filename: &str, url: &str) -> String {
    let digest = hex::encode(Sha256::digest(url.as_bytes()));
    let suffix = &digest[..8];
    match filename.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{stem}-{suffix}.{ext}"),
        _ => format!("{filename}-{suffix}"),
    }
}

/// Assigns local paths, keeping one path per (url, kind) and no path shared by two URLs.
#[derive(Default)]
struct PathAllocator {
    by_resource: HashMap<(String, ResourceKind), String>,
    owners: HashMap<String, String>,
}

impl PathAllocator {
    fn allocate(&mut self, url: &str, kind: ResourceKind) -> String {
        if let Some(path) = self.by_resource.get(&(url.to_string(), kind)) {
            return path.clone();
        }

        let mut path = format!("{}/{}", kind.folder(), filename_for(url));
        if self.owners.get(&path).is_some_and(|owner| owner != url) {
            path = format!("{}/{}", kind.folder(), disambiguate(&filename_for(url), url));
        }

        self.owners.insert(path.clone(), url.to_string());
        self.by_resource.insert((url.to_string(), kind), path.clone());
        path
    }
}

/// Collect references in the order the resource list is defined by.
fn candidate_references(html: &str) -> Vec<(String, ResourceKind)> {
    let document = Html::parse_document(html);
    let links = Selector::parse("link[rel][href]").expect("invalid selector");
    let scripts = Selector::parse("script[src]").expect("invalid selector");
    let images = Selector::parse("img[src]").expect("invalid selector");
    let styled = Selector::parse("[style]").expect("invalid selector");

    let mut found = Vec::new();

    for el in document.select(&links) {
        if el.value().attr("rel").is_some_and(is_stylesheet_rel)
            && let Some(href) = el.value().attr("href")
        {
            found.push((href.to_string(), ResourceKind::Stylesheet));
        }
    }

    for el in document.select(&scripts) {
        if let Some(src) = el.value().attr("src") {
            found.push((src.to_string(), ResourceKind::Script));
        }
    }

    for el in document.select(&images) {
        if let Some(src) = el.value().attr("src") {
            found.push((src.to_string(), ResourceKind::Image));
        }
    }

    for el in document.select(&styled) {
        let Some(style) = el.value().attr("style") else { continue };
        if has_background(style) {
            found.extend(background_urls(style).into_iter().map(|r| (r, ResourceKind::Image)));
        }
    }

    found
}

/// List the external resources a document references.
///
/// Order: stylesheet links, script sources, image sources, then `url(...)`
/// references in inline background styles; document order within each
/// group. Repeats are kept. Unresolvable references are dropped.
pub fn extract_resources(html: &str, base: &Url) -> Vec<Resource> {
    let mut allocator = PathAllocator::default();
    let mut resources = Vec::new();
    let mut dropped = 0usize;

    for (reference, kind) in candidate_references(html) {
        let Some(url) = resolve_reference(base, &reference) else {
            dropped += 1;
            continue;
        };
        let local_path = allocator.allocate(&url, kind);
        resources.push(Resource { url, kind, local_path });
    }

    tracing::debug!(base = %base, resources = resources.len(), dropped, "extracted resources");
    resources
}

/// Replace each resource URL with its local path.
///
/// Only occurrences of a known URL delimited by quotes, parentheses or `=`
/// are replaced, so a URL that is a prefix of another URL or part of running
/// text stays intact. Attribute-escaped spellings (`&amp;`) are matched too.
/// Applying the rewrite twice gives the same result as once.
pub fn rewrite_paths(html: &str, resources: &[Resource]) -> String {
    let mut targets: HashMap<String, &str> = HashMap::new();
    for resource in resources {
        targets.insert(resource.url.clone(), &resource.local_path);
        targets.insert(encode_double_quoted_attribute(&resource.url).into_owned(), &resource.local_path);
    }
    if targets.is_empty() {
        return html.to_string();
    }

    let mut spellings: Vec<&str> = targets.keys().map(String::as_str).collect();
    spellings.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));
    let alternation = spellings.iter().map(|s| regex::escape(s)).collect::<Vec<_>>().join("|");

    let pattern = match Regex::new(&format!(r#"(["'(=])({alternation})(["')\s>])"#)) {
        Ok(pattern) => pattern,
        Err(e) => {
            tracing::warn!(error = %e, resources = resources.len(), "could not build rewrite pattern");
            return html.to_string();
        }
    };

    pattern
        .replace_all(html, |caps: &Captures<'_>| match targets.get(&caps[2]) {
            Some(local) => format!("{}{}{}", &caps[1], local, &caps[3]),
            None => caps[0].to_string(),
        })
        .into_owned()
}
