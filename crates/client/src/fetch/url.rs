//! Target URL validation and reference resolution.

use url::Url;

/// Error type for target URL validation failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UrlError {
    #[error("empty URL")]
    Empty,

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

impl From<UrlError> for replica_core::Error {
    fn from(err: UrlError) -> Self {
        replica_core::Error::InvalidUrl(err.to_string())
    }
}

/// Validate a primary document URL.
///
/// Normalization steps:
/// 1. Trim leading/trailing whitespace
/// 2. Require an absolute http(s) URL
/// 3. Lowercase the host
/// 4. Remove fragment (#...)
/// 5. Keep query string intact (do not reorder)
pub fn canonicalize(input: &str) -> Result<Url, UrlError> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let mut parsed = Url::parse(trimmed).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlError::UnsupportedScheme(scheme.to_string())),
    }

    if let Some(host) = parsed.host_str() {
        let lowered = host.to_lowercase();
        parsed
            .set_host(Some(&lowered))
            .map_err(|e| UrlError::InvalidUrl(e.to_string()))?;
    }

    parsed.set_fragment(None);

    Ok(parsed)
}

/// True for references already in absolute http(s) form.
pub fn is_absolute_http(reference: &str) -> bool {
    let lower = reference.trim_start().get(..8).unwrap_or(reference).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// True for inline `data:` references.
pub fn is_data_uri(reference: &str) -> bool {
    reference
        .trim_start()
        .get(..5)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("data:"))
}

/// Resolve an asset reference found in a document to an absolute http(s) URL.
///
/// Absolute references are kept as written when they parse, root-relative
/// ones resolve against the origin and the rest against `base`. Data URIs,
/// unparseable references and non-http results yield `None`.
pub fn resolve_reference(base: &Url, reference: &str) -> Option<String> {
    let reference = reference.trim();
    if reference.is_empty() || is_data_uri(reference) {
        return None;
    }

    if is_absolute_http(reference) {
        return Url::parse(reference).ok().map(|_| reference.to_string());
    }

    let joined = base.join(reference).ok()?;
    match joined.scheme() {
        "http" | "https" => Some(joined.to_string()),
        _ => None,
    }
}
