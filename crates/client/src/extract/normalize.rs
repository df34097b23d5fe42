//! Document normalization.
//!
//! Makes a retrieved document render from anywhere: a `<base>` pointing at
//! the source goes first in `<head>`, relative asset references become
//! absolute, and a permissive content policy is appended so the absolute
//! references may load cross-origin.
//!
//! Background `url(...)` references in inline styles are made absolute as
//! well, so archive path rewriting can find them by their absolute URL.

use std::cell::Cell;
use std::sync::LazyLock;

use html_escape::{decode_html_entities, encode_double_quoted_attribute};
use lol_html::html_content::ContentType;
use lol_html::{HtmlRewriter, Settings, element};
use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

use super::style::{has_background, rewrite_background_urls};
use crate::fetch::url::{is_absolute_http, is_data_uri};
use replica_core::Error;

/// Leading doctype and comments that must stay ahead of a synthesized head.
static PRELUDE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)^(?:\s*(?:<!--.*?-->|<!doctype[^>]*>))*").expect("invalid prelude regex"));

/// Content policy appended to every normalized document.
pub const CONTENT_POLICY: &str = "default-src * 'unsafe-inline' 'unsafe-eval' data: blob:";

/// Which head declarations the document already carries.
#[derive(Debug, Default, Clone, Copy)]
struct HeadState {
    has_base: bool,
    has_policy: bool,
}

impl HeadState {
    fn scan(raw: &str, base: &Url) -> Self {
        let document = Html::parse_document(raw);
        let base_sel = Selector::parse("base[href]").expect("invalid selector");
        let meta_sel = Selector::parse("meta[http-equiv][content]").expect("invalid selector");

        let has_base = document
            .select(&base_sel)
            .any(|el| el.value().attr("href").is_some_and(|href| href.trim() == base.as_str()));
        let has_policy = document.select(&meta_sel).any(|el| {
            el.value()
                .attr("http-equiv")
                .is_some_and(|v| v.eq_ignore_ascii_case("content-security-policy"))
                && el.value().attr("content") == Some(CONTENT_POLICY)
        });

        Self { has_base, has_policy }
    }

    fn base_tag(&self, base: &Url) -> Option<String> {
        (!self.has_base).then(|| format!(r#"<base href="{}">"#, encode_double_quoted_attribute(base.as_str())))
    }

    fn policy_tag(&self) -> Option<String> {
        (!self.has_policy).then(|| format!(r#"<meta http-equiv="Content-Security-Policy" content="{CONTENT_POLICY}">"#))
    }
}

/// Absolute form of a relative asset reference, or `None` to leave it as is.
fn absolutize(base: &Url, reference: &str) -> Option<String> {
    let trimmed = reference.trim();
    if trimmed.is_empty() || is_absolute_http(trimmed) || is_data_uri(trimmed) {
        return None;
    }

    match base.join(trimmed) {
        Ok(resolved) if matches!(resolved.scheme(), "http" | "https") => Some(resolved.to_string()),
        Ok(_) => None,
        Err(e) => {
            tracing::warn!(reference = trimmed, error = %e, "skipping unparseable asset reference");
            None
        }
    }
}

/// Run one lol_html pass over `html`.
pub(crate) fn rewrite(html: &str, settings: Settings<'_, '_>) -> Result<String, Error> {
    let mut output = Vec::with_capacity(html.len() + 256);
    let mut rewriter = HtmlRewriter::new(settings, |c: &[u8]| output.extend_from_slice(c));

    rewriter
        .write(html.as_bytes())
        .map_err(|e| Error::ParseFailure(format!("HtmlRewriter error: {e}")))?;
    rewriter
        .end()
        .map_err(|e| Error::ParseFailure(format!("HtmlRewriter end error: {e}")))?;

    String::from_utf8(output).map_err(|e| Error::ParseFailure(format!("invalid UTF-8 in rewritten HTML: {e}")))
}

/// Normalize a retrieved document against its source URL.
///
/// Rewrites `link[href]`, `script[src]`, `img[src]` and inline background
/// references that are neither absolute nor data URIs. Malformed references
/// are logged and left untouched. Applying the operation twice gives the same result as once.
pub fn normalize(raw: &str, base: &Url) -> Result<String, Error> {
    let state = HeadState::scan(raw, base);
    let base_tag = state.base_tag(base);
    let policy_tag = state.policy_tag();
    let head_seen = Cell::new(false);
    let rewritten = Cell::new(0usize);

    let absolutize_attr = |el: &mut lol_html::html_content::Element<'_, '_>, attr: &str| {
        if let Some(value) = el.get_attribute(attr)
            && let Some(resolved) = absolutize(base, &decode_html_entities(&value))
        {
            el.set_attribute(attr, &encode_double_quoted_attribute(&resolved))?;
            rewritten.set(rewritten.get() + 1);
        }
        Ok::<(), lol_html::errors::AttributeNameError>(())
    };

    let output = rewrite(
        raw,
        Settings {
            element_content_handlers: vec![
                element!("head", |el| {
                    if head_seen.replace(true) {
                        return Ok(());
                    }
                    if let Some(tag) = &base_tag {
                        el.prepend(tag, ContentType::Html);
                    }
                    if let Some(tag) = &policy_tag {
                        el.append(tag, ContentType::Html);
                    }
                    Ok(())
                }),
                element!("link[href]", |el| Ok(absolutize_attr(el, "href")?)),
                element!("script[src]", |el| Ok(absolutize_attr(el, "src")?)),
                element!("img[src]", |el| Ok(absolutize_attr(el, "src")?)),
                element!("[style]", |el| {
                    if let Some(style) = el.get_attribute("style").map(|s| decode_html_entities(&s).into_owned())
                        && has_background(&style)
                        && let Some(rebuilt) = rewrite_background_urls(&style, |r| absolutize(base, r))
                    {
                        el.set_attribute("style", &encode_double_quoted_attribute(&rebuilt))?;
                        rewritten.set(rewritten.get() + 1);
                    }
                    Ok(())
                }),
            ],
            ..Settings::default()
        },
    )?;

    tracing::debug!(base = %base, rewritten = rewritten.get(), "normalized document");

    if head_seen.get() || (base_tag.is_none() && policy_tag.is_none()) {
        return Ok(output);
    }

    let head = format!("<head>{}{}</head>", base_tag.unwrap_or_default(), policy_tag.unwrap_or_default());
    insert_head(&output, &head)
}

/// Insert a synthesized `<head>` into a document that has none.
fn insert_head(html: &str, head: &str) -> Result<String, Error> {
    let html_seen = Cell::new(false);
    let output = rewrite(
        html,
        Settings {
            element_content_handlers: vec![element!("html", |el| {
                if !html_seen.replace(true) {
                    el.prepend(head, ContentType::Html);
                }
                Ok(())
            })],
            ..Settings::default()
        },
    )?;

    if html_seen.get() {
        return Ok(output);
    }

    let split = PRELUDE.find(&output).map_or(0, |m| m.end());
    let (prelude, rest) = output.split_at(split);
    Ok(format!("{prelude}{head}{rest}"))
}

/// Remove `<base>` elements so relative references resolve locally.
pub fn strip_base(html: &str) -> Result<String, Error> {
    rewrite(
        html,
        Settings {
            element_content_handlers: vec![element!("base", |el| {
                el.remove();
                Ok(())
            })],
            ..Settings::default()
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://x.test/dir/").unwrap()
    }

    #[test]
    fn test_relative_link_becomes_absolute() {
        let out = normalize(r#"<html><head><link href="style.css"></head></html>"#, &base()).unwrap();
        assert!(out.contains(r#"<link href="https://x.test/dir/style.css">"#));
    }

    #[test]
    fn test_script_and_image_sources() {
        let raw = r#"<html><head></head><body><script src="/app.js"></script><img src="../a.png"></body></html>"#;
        let out = normalize(raw, &base()).unwrap();
        assert!(out.contains(r#"<script src="https://x.test/app.js">"#));
        assert!(out.contains(r#"<img src="https://x.test/a.png">"#));
    }

    #[test]
    fn test_absolute_and_data_untouched() {
        let raw = r#"<html><head></head><body><img src="https://cdn.test/a.png"><img src="data:image/png;base64,AA=="></body></html>"#;
        let out = normalize(raw, &base()).unwrap();
        assert!(out.contains(r#"<img src="https://cdn.test/a.png">"#));
        assert!(out.contains(r#"<img src="data:image/png;base64,AA==">"#));
    }

    #[test]
    fn test_base_first_and_policy_last_in_head() {
        let raw = "<html><head><title>T</title></head><body></body></html>";
        let out = normalize(raw, &base()).unwrap();
        let expected = format!(
            r#"<head><base href="https://x.test/dir/"><title>T</title><meta http-equiv="Content-Security-Policy" content="{CONTENT_POLICY}"></head>"#
        );
        assert!(out.contains(&expected), "{out}");
    }

    #[test]
    fn test_idempotent() {
        let raw = r#"<html><head><link rel="stylesheet" href="a.css"></head><body><img src="i.png"></body></html>"#;
        let once = normalize(raw, &base()).unwrap();
        let twice = normalize(&once, &base()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_missing_head_is_synthesized() {
        let out = normalize("<html><body><img src=\"a.png\"></body></html>", &base()).unwrap();
        assert!(out.starts_with(r#"<html><head><base href="https://x.test/dir/">"#), "{out}");
        assert!(out.contains(r#"<img src="https://x.test/dir/a.png">"#));

        let fragment = normalize("<p>hi</p>", &base()).unwrap();
        assert!(fragment.starts_with("<head><base"));
        assert!(fragment.ends_with("<p>hi</p>"));
    }

    #[test]
    fn test_synthesized_head_follows_doctype() {
        let out = normalize("<!DOCTYPE html><title>T</title><img src=a.png>", &base()).unwrap();
        assert!(out.starts_with(r#"<!DOCTYPE html><head><base href="https://x.test/dir/">"#), "{out}");
        assert!(out.contains(r#"<img src="https://x.test/dir/a.png">"#));

        let commented = normalize("<!-- saved -->\n<!doctype html>\n<p>x</p>", &base()).unwrap();
        assert!(commented.starts_with("<!-- saved -->\n<!doctype html><head>"), "{commented}");
        assert!(commented.ends_with("\n<p>x</p>"));
    }

    #[test]
    fn test_entity_encoded_references() {
        let raw = r#"<html><head></head><body><img src="pic.png?w=1&#38;h=2"><script src="a.js?x=1&amp;y=2"></script></body></html>"#;
        let out = normalize(raw, &base()).unwrap();
        assert!(out.contains(r#"<img src="https://x.test/dir/pic.png?w=1&amp;h=2">"#), "{out}");
        assert!(out.contains(r#"<script src="https://x.test/dir/a.js?x=1&amp;y=2">"#), "{out}");
        assert_eq!(normalize(&out, &base()).unwrap(), out);
    }

    #[test]
    fn test_non_http_reference_left_alone() {
        let raw = r#"<html><head></head><body><img src="javascript:void(0)"></body></html>"#;
        let out = normalize(raw, &base()).unwrap();
        assert!(out.contains(r#"<img src="javascript:void(0)">"#));
    }

    #[test]
    fn test_background_style_references() {
        let raw = r#"<html><head></head><body><div style="color: red; background: url(bg.png)"></div><div style="background-image: url('https://cdn.test/x.png')"></div></body></html>"#;
        let out = normalize(raw, &base()).unwrap();
        assert!(out.contains(r#"style="color: red; background: url('https://x.test/dir/bg.png')""#), "{out}");
        assert!(out.contains(r#"style="background-image: url('https://cdn.test/x.png')""#));
        assert_eq!(normalize(&out, &base()).unwrap(), out);
    }

    #[test]
    fn test_strip_base() {
        let out = strip_base(r#"<head><base href="https://x.test/"><title>T</title></head>"#).unwrap();
        assert_eq!(out, "<head><title>T</title></head>");
    }
}
