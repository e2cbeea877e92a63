//! Error types for the Tandem domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all Tandem operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Turn errors ---
    #[error("Turn error: {0}")]
    Turn(#[from] TurnError),

    // --- Operator input errors ---
    #[error("Operator input error: {0}")]
    Gate(#[from] GateError),

    // --- Checkpoint store errors ---
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

/// Failures that abort a single turn while its stream is being drained.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TurnError {
    /// The producer sent something that breaks the chunk protocol,
    /// e.g. a tool-call fragment without an index.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// Transport or production error mid-turn.
    #[error("stream failure: {0}")]
    StreamFailure(String),

    #[error("cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GateError {
    #[error("operator input closed")]
    InputClosed,

    #[error("failed to read operator input: {0}")]
    Io(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn turn_error_converts_into_top_level() {
        let err: Error = TurnError::ProtocolViolation("fragment without index".into()).into();
        assert!(matches!(err, Error::Turn(TurnError::ProtocolViolation(_))));
        assert!(err.to_string().contains("fragment without index"));
    }

    #[test]
    fn cancelled_is_terse() {
        assert_eq!(TurnError::Cancelled.to_string(), "cancelled");
    }
}
