//! Hand-off contract for publishing finished documents.
//!
//! Storage, ownership and public addressing of cloned pages belong to an
//! external collaborator. The pipeline only hands over the document, its
//! source and a suggested slug, and gets back whatever identifier the store
//! assigns.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Error;

/// A finished document ready to be stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishRequest {
    /// URL the document was cloned from.
    pub source_url: String,
    pub title: String,
    /// Slug suggestion; stores may ignore it.
    pub slug_hint: String,
    pub html: String,
}

/// External store that persists cloned documents.
#[async_trait]
pub trait PageStore: Send + Sync {
    /// Persist the document and return its public identifier.
    async fn publish(&self, request: PublishRequest) -> Result<String, Error>;
}
