//! Client code for replica.
//!
//! This crate provides the relay fetch pipeline, document normalization,
//! resource extraction, inline embedding and archive assembly shared by the
//! server and CLI.

pub mod archive;
pub mod embed;
pub mod extract;
pub mod fetch;
pub mod headers;
pub mod pipeline;
pub mod publish;

#[cfg(test)]
mod test_support;

pub use archive::{ArchiveAssembler, ArchiveWriter, AssemblyReport, Progress};
pub use embed::{EmbedFailure, EmbedOutcome, InlineEmbedder};
pub use extract::{Resource, ResourceKind, extract_resources, normalize, rewrite_paths};
pub use fetch::{FetchConfig, Fetched, Fetcher, RelayEndpoint, RelayFetcher};
pub use headers::{HeaderSet, HeaderTemplate};
pub use pipeline::{ArchiveOutput, ClonedDocument, Cloner};
pub use publish::{extract_title, suggest_slug};
