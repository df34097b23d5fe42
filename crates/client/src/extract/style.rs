//! Inline `style` attribute helpers.
//!
//! Only `background*` declarations are considered. Declarations are split on
//! top-level `;` so data URIs inside `url(...)` survive intact.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::fetch::url::is_data_uri;

static CSS_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"url\(\s*['"]?([^'")\s]+)['"]?\s*\)"#).expect("invalid css url regex"));

/// True when the style mentions a background property.
pub fn has_background(style: &str) -> bool {
    style.to_ascii_lowercase().contains("background")
}

/// Split a style string on `;` outside of parentheses and quotes.
fn declarations(style: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0;

    for (i, c) in style.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '(') => depth += 1,
            (None, ')') => depth = depth.saturating_sub(1),
            (None, ';') if depth == 0 => {
                parts.push(&style[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&style[start..]);
    parts
}

fn is_background_declaration(declaration: &str) -> bool {
    declaration
        .split_once(':')
        .is_some_and(|(property, _)| property.trim().to_ascii_lowercase().starts_with("background"))
}

/// `url(...)` references in background declarations, in order, data URIs excluded.
pub fn background_urls(style: &str) -> Vec<String> {
    declarations(style)
        .into_iter()
        .filter(|d| is_background_declaration(d))
        .flat_map(|d| CSS_URL.captures_iter(d).map(|caps| caps[1].to_string()).collect::<Vec<_>>())
        .filter(|reference| !is_data_uri(reference))
        .collect()
}

/// Rebuild a style string, replacing background `url(...)` references.
///
/// `replace` receives each reference and returns its substitute, or `None`
/// to keep it. Returns `None` when nothing was replaced.
pub fn rewrite_background_urls(style: &str, mut replace: impl FnMut(&str) -> Option<String>) -> Option<String> {
    let mut changed = false;
    let rebuilt: Vec<String> = declarations(style)
        .into_iter()
        .map(|declaration| {
            if !is_background_declaration(declaration) {
                return declaration.to_string();
            }
            CSS_URL
                .replace_all(declaration, |caps: &Captures<'_>| match replace(&caps[1]) {
                    Some(substitute) => {
                        changed = true;
                        format!("url('{substitute}')")
                    }
                    None => caps[0].to_string(),
                })
                .into_owned()
        })
        .collect();

    changed.then(|| rebuilt.join(";"))
}
