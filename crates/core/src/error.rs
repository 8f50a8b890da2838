//! Error types for the RelayChat domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; `Error` is the top level
//! returned by the turn controller.

use thiserror::Error;

/// The top-level error type for all RelayChat operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Request validation ---
    #[error("Invalid model selection: {0}")]
    InvalidModel(String),

    #[error("Conversation not found: {0}")]
    ConversationNotFound(String),

    // --- Provider errors ---
    /// The upstream call failed before any output was produced.
    #[error("Provider request failed: {0}")]
    ProviderRequest(#[source] ProviderError),

    /// The upstream call failed after `fragments` pieces of output arrived.
    #[error("Provider stream failed after {fragments} fragment(s): {source}")]
    ProviderStream {
        #[source]
        source: ProviderError,
        fragments: usize,
    },

    // --- Store errors ---
    #[error("Persistence error: {0}")]
    Persistence(#[source] StoreError),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => Error::ConversationNotFound(id),
            other => Error::Persistence(other),
        }
    }
}

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

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

    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Conversation not found: {0}")]
    NotFound(String),
}
