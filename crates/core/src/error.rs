//! Unified error types for replica.
//!
//! Every variant renders with a stable upper-case code prefix so tool output
//! and logs can be matched without parsing prose.

use rmcp::model::{ErrorCode, ErrorData as McpError};
use tokio_rusqlite::rusqlite;

/// Unified error types for the cloning pipeline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid input parameters (e.g., empty URL, missing template variable).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// Invalid URL.
    #[error("INVALID_URL: {0}")]
    InvalidUrl(String),

    /// A caller-supplied header name or value was rejected.
    #[error("INVALID_HEADER: {0}")]
    InvalidHeader(String),

    /// Every configured relay failed for the given URL.
    #[error("NETWORK_EXHAUSTED: all relays failed for {url} (last error: {last_error})")]
    NetworkExhausted { url: String, last_error: String },

    /// A relay answered with a success status but no usable body.
    #[error("EMPTY_RESPONSE: {0}")]
    EmptyResponse(String),

    /// HTTP error response or transport failure from a single relay.
    #[error("HTTP_ERROR: {0}")]
    HttpError(String),

    /// Fetch response too large.
    #[error("FETCH_TOO_LARGE: {0}")]
    FetchTooLarge(String),

    /// A document, URL or style fragment could not be parsed.
    #[error("PARSE_FAILURE: {0}")]
    ParseFailure(String),

    /// Packaging the archive failed after all resources were attempted.
    #[error("ARCHIVE_FINALIZE_FAILED: {0}")]
    ArchiveFinalize(String),

    /// Database operation failed.
    #[error("CACHE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("CACHE_ERROR: migration failed: {0}")]
    MigrationFailed(String),
}

impl Error {
    /// Message suitable for end users, without relay diagnostics.
    pub fn user_message(&self) -> String {
        match self {
            Error::NetworkExhausted { .. } => {
                "Unable to clone the page: the URL may be blocked or unreachable.".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}

impl From<Error> for McpError {
    fn from(err: Error) -> Self {
        let (code, message) = match &err {
            Error::InvalidInput(msg) => (-32602, msg.clone()),
            Error::InvalidUrl(msg) => (-32602, msg.clone()),
            Error::InvalidHeader(msg) => (-32602, msg.clone()),
            Error::NetworkExhausted { .. } => (-32001, err.to_string()),
            Error::EmptyResponse(msg) => (-32002, msg.clone()),
            Error::HttpError(msg) => (-32003, msg.clone()),
            Error::FetchTooLarge(msg) => (-32004, msg.clone()),
            Error::ParseFailure(msg) => (-32005, msg.clone()),
            Error::ArchiveFinalize(msg) => (-32006, msg.clone()),
            Error::Database(e) => (-32007, e.to_string()),
            Error::MigrationFailed(msg) => (-32007, msg.clone()),
        };

        McpError { code: ErrorCode(code), message: message.into(), data: None }
    }
}
