//! Relay endpoint templates.

use url::form_urlencoded::byte_serialize;

/// A forwarding endpoint that fetches a target URL on the caller's behalf.
///
/// The template embeds the target through one of two placeholders:
/// - `{url}`: replaced by the percent-encoded target
/// - `{raw_url}`: replaced by the target verbatim
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayEndpoint {
    template: String,
}

impl RelayEndpoint {
    pub fn new(template: impl Into<String>) -> Self {
        Self { template: template.into() }
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// Build the request URL for `target`.
    pub fn request_url(&self, target: &str) -> String {
        let encoded: String = byte_serialize(target.as_bytes()).collect();
        self.template.replace("{url}", &encoded).replace("{raw_url}", target)
    }

    /// Scheme and host of the relay, used to label logs and results.
    pub fn label(&self) -> String {
        match url::Url::parse(&self.request_url("")) {
            Ok(u) => format!("{}://{}", u.scheme(), u.host_str().unwrap_or_default()),
            Err(_) => self.template.clone(),
        }
    }
}
