//! Error type and runtime abstraction for Bedrock calls
//!
//! `BedrockError` classifies failures of any remote call. `ModelRuntime` is
//! the seam between inference helpers and the service so the batch runner
//! can be driven by a fake in tests.

use crate::models::bedrock::{ConverseRequest, ConverseResponse};
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Error types for Bedrock operations
#[derive(Debug, Error)]
pub enum BedrockError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Request throttled: {0}")]
    Throttled(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("API error (status {status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Failed to decode response: {0}")]
    Decode(String),
}

impl BedrockError {
    /// Map an HTTP status and classified message to an error variant
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            401 | 403 => BedrockError::Authentication(message),
            429 => BedrockError::Throttled(message),
            400 => BedrockError::BadRequest(message),
            404 => BedrockError::NotFound(message),
            409 => BedrockError::Conflict(message),
            _ => BedrockError::ApiError { status, message },
        }
    }

    /// Whether repeating the same request may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            BedrockError::Throttled(_) | BedrockError::Transport(_) | BedrockError::Timeout(_) => {
                true
            }
            BedrockError::ApiError { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for BedrockError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            BedrockError::Timeout(error.to_string())
        } else if error.is_decode() {
            BedrockError::Decode(error.to_string())
        } else {
            BedrockError::Transport(error.to_string())
        }
    }
}

/// Trait for model inference backends
#[async_trait]
pub trait ModelRuntime: Send + Sync {
    /// Send a Converse request to the given model
    async fn converse(
        &self,
        model_id: &str,
        request: &ConverseRequest,
    ) -> Result<ConverseResponse, BedrockError>;

    /// Invoke a model with a provider-specific JSON body
    async fn invoke_model(&self, model_id: &str, body: &Value) -> Result<Value, BedrockError>;

    /// Get the provider name
    fn provider_name(&self) -> &str;
}
