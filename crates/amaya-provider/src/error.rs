//! Provider error types.

use std::time::Duration;
use thiserror::Error;

/// Result type for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Errors that can occur while talking to a model provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// HTTP request failed before a response arrived.
    #[error("Request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// No API key was configured for the provider.
    #[error("Missing API key for provider: {0}")]
    MissingApiKey(String),

    /// The provider rejected the credentials.
    #[error("Invalid API key for provider: {0}")]
    InvalidApiKey(String),

    /// Rate limited.
    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    /// Non-success status other than auth or rate limiting.
    #[error("API error ({status}): {message}")]
    ApiError { status: u16, message: String },

    /// The response body did not have the expected shape.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The conversation handed to the adapter breaks the message protocol.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal provider error.
    #[error("Provider error: {message}")]
    Internal { message: String },
}

impl ProviderError {
    /// Create an invalid response error.
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse(message.into())
    }

    /// Create a protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Create an API error.
    pub fn api_error(status: u16, message: impl Into<String>) -> Self {
        Self::ApiError {
            status,
            message: message.into(),
        }
    }

    /// Network, authentication and rate-limit failures, as opposed to
    /// failures in what was sent or received.
    pub fn is_transport(&self) -> bool {
        match self {
            ProviderError::RequestFailed(_)
            | ProviderError::MissingApiKey(_)
            | ProviderError::InvalidApiKey(_)
            | ProviderError::RateLimited { .. } => true,
            ProviderError::ApiError { status, .. } => *status == 408 || *status >= 500,
            _ => false,
        }
    }

    /// Check if retrying the same request could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::RequestFailed(_) | ProviderError::RateLimited { .. } => true,
            ProviderError::ApiError { status, .. } => *status == 408 || *status >= 500,
            _ => false,
        }
    }

    /// Delay requested by the provider, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ProviderError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}
