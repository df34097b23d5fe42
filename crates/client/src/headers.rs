//! Caller-supplied request headers.
//!
//! Headers are validated once at the boundary and then forwarded verbatim to
//! every relay request of a run. Templates let callers keep reusable header
//! sets with `{{variable}}` placeholders that are filled just before use.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use reqwest::RequestBuilder;
use reqwest::header::{HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};

use replica_core::Error;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{\{(\w+)\}\}").expect("invalid placeholder regex"));

/// Ordered, validated request headers.
///
/// Duplicate names are kept and sent in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderSet {
    pairs: Vec<(HeaderName, HeaderValue)>,
}

impl HeaderSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and append a single header.
    pub fn insert(&mut self, name: &str, value: &str) -> Result<(), Error> {
        let header_name = HeaderName::from_bytes(name.trim().as_bytes())
            .map_err(|e| Error::InvalidHeader(format!("{name:?}: {e}")))?;
        let header_value =
            HeaderValue::from_str(value.trim()).map_err(|e| Error::InvalidHeader(format!("{name}: {e}")))?;
        self.pairs.push((header_name, header_value));
        Ok(())
    }

    /// Validate and append a header written as `Name: value`.
    pub fn push_line(&mut self, line: &str) -> Result<(), Error> {
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| Error::InvalidHeader(format!("expected 'Name: value', got {line:?}")))?;
        self.insert(name, value)
    }

    /// Build a set from `Name: value` lines.
    pub fn from_lines<I, S>(lines: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self::new();
        for line in lines {
            set.push_line(line.as_ref())?;
        }
        Ok(set)
    }

    /// Build a set from name/value pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut set = Self::new();
        for (name, value) in pairs {
            set.insert(name.as_ref(), value.as_ref())?;
        }
        Ok(set)
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&HeaderName, &HeaderValue)> {
        self.pairs.iter().map(|(n, v)| (n, v))
    }

    /// Attach every header to an outgoing request.
    pub fn apply(&self, mut request: RequestBuilder) -> RequestBuilder {
        for (name, value) in &self.pairs {
            request = request.header(name.clone(), value.clone());
        }
        request
    }
}

/// A named, reusable header set whose values may contain `{{variable}}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderTemplate {
    pub name: String,
    pub headers: Vec<(String, String)>,
}

impl HeaderTemplate {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), headers: Vec::new() }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Distinct placeholder names in order of first appearance.
    pub fn variables(&self) -> Vec<String> {
        let mut found: Vec<String> = Vec::new();
        for (_, value) in &self.headers {
            for caps in PLACEHOLDER.captures_iter(value) {
                let var = &caps[1];
                if !found.iter().any(|v| v == var) {
                    found.push(var.to_string());
                }
            }
        }
        found
    }

    /// Substitute every placeholder and validate the result.
    ///
    /// Fails with `INVALID_INPUT` listing each variable without a non-blank value.
    pub fn fill(&self, values: &HashMap<String, String>) -> Result<HeaderSet, Error> {
        let missing: Vec<String> = self
            .variables()
            .into_iter()
            .filter(|var| values.get(var).is_none_or(|v| v.trim().is_empty()))
            .collect();

        if !missing.is_empty() {
            return Err(Error::InvalidInput(format!(
                "template '{}' is missing values for: {}",
                self.name,
                missing.join(", ")
            )));
        }

        let mut set = HeaderSet::new();
        for (name, value) in &self.headers {
            let filled = PLACEHOLDER.replace_all(value, |caps: &regex::Captures<'_>| {
                values.get(&caps[1]).map(|v| v.trim().to_string()).unwrap_or_default()
            });
            set.insert(name, &filled)?;
        }
        Ok(set)
    }
}
