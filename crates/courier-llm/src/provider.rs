//! # Provider Trait
//!
//! Core abstraction for completion backends. Every provider implements
//! [`Provider`] to expose a unified streaming interface.
//!
//! The trait returns a boxed [`Stream`] of [`StreamEvent`]s, allowing the
//! relay to forward chunks incrementally regardless of the underlying API
//! format. The sequence is finite, in-order, and non-restartable; it may
//! yield an `Err` item at any point (network failure, provider error), in
//! which case text already emitted stays with the caller.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

use courier_core::events::StreamEvent;
use courier_core::turns::Turn;

/// Result type alias for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Boxed stream of [`StreamEvent`]s returned by [`Provider::stream`].
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, ProviderError>> + Send>>;

/// Errors that can occur during provider operations.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Provider returned an API error.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error description.
        message: String,
        /// Provider-specific error code.
        code: Option<String>,
        /// Whether this error can be retried.
        retryable: bool,
    },

    /// Provider-specific error.
    #[error("{message}")]
    Other {
        /// Error description.
        message: String,
    },
}

impl ProviderError {
    /// Whether a fresh request might succeed.
    ///
    /// The relay never retries a broken stream, but callers submitting a new
    /// prompt can use this to hint the user.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(_) => true,
            Self::Api { retryable, .. } => *retryable,
            Self::Json(_) | Self::Other { .. } => false,
        }
    }
}

/// Whether the model may autonomously invoke side-effecting capabilities
/// mid-generation.
///
/// This mode does not alter the chunk contract — the stream remains a plain
/// text-delta sequence either way.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolChoice {
    /// The provider decides (its default behavior).
    #[default]
    Auto,
    /// Autonomous invocation disabled.
    None,
}

/// Options for a streaming completion request.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StreamOptions {
    /// Function/tool-invocation behavior mode.
    pub tool_choice: ToolChoice,
    /// Maximum tokens to generate, if capped.
    pub max_tokens: Option<u32>,
    /// Sampling temperature, if overridden.
    pub temperature: Option<f32>,
}

/// A completion backend that streams assistant replies.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Model identifier this provider targets.
    fn model(&self) -> &str;

    /// Open a completion stream for the given conversation history.
    ///
    /// `turns` is the full ordered history including the new user prompt.
    /// The returned stream terminates normally when generation completes;
    /// abnormal termination surfaces as an `Err` item.
    async fn stream(
        &self,
        turns: &[Turn],
        options: &StreamOptions,
    ) -> ProviderResult<ChunkStream>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_choice_default_is_auto() {
        assert_eq!(ToolChoice::default(), ToolChoice::Auto);
    }

    #[test]
    fn tool_choice_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&ToolChoice::Auto).unwrap(), "\"auto\"");
        assert_eq!(serde_json::to_string(&ToolChoice::None).unwrap(), "\"none\"");
    }

    #[test]
    fn other_errors_are_not_retryable() {
        let err = ProviderError::Other {
            message: "boom".into(),
        };
        assert!(!err.is_retryable());
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn api_error_retryable_flag() {
        let err = ProviderError::Api {
            status: 429,
            message: "rate limited".into(),
            code: None,
            retryable: true,
        };
        assert!(err.is_retryable());
        assert_eq!(err.to_string(), "API error (429): rate limited");

        let err = ProviderError::Api {
            status: 400,
            message: "bad request".into(),
            code: Some("invalid_request_error".into()),
            retryable: false,
        };
        assert!(!err.is_retryable());
    }

    #[test]
    fn default_stream_options() {
        let opts = StreamOptions::default();
        assert_eq!(opts.tool_choice, ToolChoice::Auto);
        assert!(opts.max_tokens.is_none());
        assert!(opts.temperature.is_none());
    }
}
