//! Title and slug helpers for handing documents to a page store.

use rslug::slugify;
use scraper::{Html, Selector};
use sha2::{Digest, Sha256};

/// Title used when a document has none.
pub const DEFAULT_TITLE: &str = "Cloned Page";

const MAX_SLUG_LEN: usize = 50;

/// Text of the document's `<title>`, whitespace collapsed.
pub fn extract_title(html: &str) -> String {
    let document = Html::parse_document(html);
    let selector = Selector::parse("title").expect("invalid selector");

    document
        .select(&selector)
        .next()
        .map(|el| el.text().collect::<Vec<_>>().join(" "))
        .map(|text| text.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|text| !text.is_empty())
        .unwrap_or_else(|| DEFAULT_TITLE.to_string())
}

/// Quotation marks dropped before slugifying.
const QUOTE_MARKS: [char; 13] = [
    '\u{0027}', '\u{0022}', '\u{2018}', '\u{2019}', '\u{201C}', '\u{201D}', '\u{201E}', '\u{201B}', '\u{0060}',
    '\u{00AB}', '\u{00BB}', '\u{2039}', '\u{203A}',
];

/// Slug suggestion: transliterated title plus a short digest of the document.
///
/// The title part is lowercase ASCII with runs of other characters
/// collapsed to `-`, at most 50 characters.
pub fn suggest_slug(title: &str, html: &str) -> String {
    let stripped: String = title.chars().filter(|c| !QUOTE_MARKS.contains(c)).collect();
    let mut slug: String = slugify!(&stripped);

    slug.truncate(MAX_SLUG_LEN);
    let slug = slug.trim_matches('-');
    let slug = if slug.is_empty() { "page" } else { slug };

    let digest = hex::encode(Sha256::digest(html.as_bytes()));
    format!("{slug}-{}", &digest[..6])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_title() {
        assert_eq!(extract_title("<html><head><title>  Hello\n  World </title></head></html>"), "Hello World");
    }

    #[test]
    fn test_extract_title_default() {
        assert_eq!(extract_title("<html><body>no title</body></html>"), DEFAULT_TITLE);
        assert_eq!(extract_title("<title>   </title>"), DEFAULT_TITLE);
    }

    #[test]
    fn test_slug_folds_and_collapses() {
        let slug = suggest_slug("Página Clonada: Ação & Reação!", "<html></html>");
        let (title_part, digest) = slug.rsplit_once('-').unwrap();
        assert_eq!(title_part, "pagina-clonada-acao-reacao");
        assert_eq!(digest.len(), 6);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_slug_length_cap() {
        let title = "word ".repeat(30);
        let slug = suggest_slug(&title, "x");
        let title_part = &slug[..slug.len() - 7];
        assert!(title_part.len() <= 50);
        assert!(!title_part.ends_with('-'));
    }

    #[test]
    fn test_slug_depends_on_document() {
        assert_ne!(suggest_slug("Same", "<p>a</p>"), suggest_slug("Same", "<p>b</p>"));
        assert_eq!(suggest_slug("Same", "<p>a</p>"), suggest_slug("Same", "<p>a</p>"));
    }

    #[test]
    fn test_slug_transliterates_beyond_latin_accents() {
        assert!(suggest_slug("Straße", "x").starts_with("strasse-"));
        assert!(suggest_slug("Œuvre «complète»", "x").starts_with("oeuvre-complete-"));
        let greek = suggest_slug("Ελληνικά", "x");
        assert!(!greek.starts_with("page-"), "{greek}");
        assert!(greek.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-'));
    }

    #[test]
    fn test_slug_without_usable_title() {
        assert!(suggest_slug("!!!", "x").starts_with("page-"));
    }
}
