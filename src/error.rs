//! Error types for Nexus
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

use crate::llm::LlmError;

/// All error types that can occur outside the provider call itself
#[derive(Debug, Error)]
pub enum NexusError {
    /// Conversation or roadmap not found in storage
    #[error("Not found: {0}")]
    NotFound(String),

    /// Caller input rejected before any work started
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Missing or invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Storage/persistence error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Provider error
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for Nexus operations
pub type Result<T> = std::result::Result<T, NexusError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_error() {
        let err = NexusError::NotFound("conversation 001".to_string());
        assert_eq!(err.to_string(), "Not found: conversation 001");
    }

    #[test]
    fn test_invalid_request_error() {
        let err = NexusError::InvalidRequest("message is blank".to_string());
        assert_eq!(err.to_string(), "Invalid request: message is blank");
    }

    #[test]
    fn test_config_error() {
        let err = NexusError::Config("no models configured".to_string());
        assert_eq!(err.to_string(), "Configuration error: no models configured");
    }

    #[test]
    fn test_storage_error() {
        let err = NexusError::Storage("file locked".to_string());
        assert_eq!(err.to_string(), "Storage error: file locked");
    }

    #[test]
    fn test_llm_error_conversion() {
        let err: NexusError = LlmError::Auth("bad key".to_string()).into();
        assert!(matches!(err, NexusError::Llm(_)));
        assert!(err.to_string().contains("bad key"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: NexusError = io_err.into();
        assert!(matches!(err, NexusError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid").unwrap_err();
        let err: NexusError = json_err.into();
        assert!(matches!(err, NexusError::Json(_)));
    }
}
