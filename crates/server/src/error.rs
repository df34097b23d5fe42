//! Structured errors raised by the server itself.
//!
//! Pipeline failures arrive as `replica_core::Error` and convert on their
//! own; these cover what happens around the pipeline.

use rmcp::model::{ErrorCode, ErrorData as McpError};

/// Structured errors for the replica server.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// Invalid input parameters (e.g., relative output path).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// The finished archive could not be written to disk.
    #[error("WRITE_FAILED: {0}")]
    WriteFailed(String),

    /// Tool output could not be serialized.
    #[error("SERIALIZE_FAILED: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl From<ToolError> for McpError {
    fn from(err: ToolError) -> Self {
        let (code, message) = match &err {
            ToolError::InvalidInput(_) => (-32602, err.to_string()),
            ToolError::WriteFailed(_) => (-32009, err.to_string()),
            ToolError::Serialize(_) => (-32603, err.to_string()),
        };

        McpError { code: ErrorCode(code), message: message.into(), data: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        let invalid: McpError = ToolError::InvalidInput("x".into()).into();
        assert_eq!(invalid.code, ErrorCode(-32602));
        assert_eq!(invalid.message, "INVALID_INPUT: x");

        let write: McpError = ToolError::WriteFailed("disk full".into()).into();
        assert_eq!(write.code, ErrorCode(-32009));
    }
}
