//! Scoring-service boundary.
//!
//! Every judgment the pipeline obtains goes through an [`LlmProvider`]. The
//! evaluators never talk HTTP directly; they build chat messages and hand them
//! to the [`crate::client::ScoringClient`], which owns retries, timeouts and
//! the concurrency ceiling.
//!
//! ## Security
//!
//! Keys are held in [`ServiceKey`] and never appear in `Debug`
//! output or error text.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

mod factory;
mod fixture;
pub mod secrets;

#[cfg(feature = "openai")]
mod openai;

pub use factory::{ProviderFactory, ProviderRegistry};
pub use fixture::{FixtureProvider, FixtureProviderFactory};
pub use secrets::{KeyOrigin, ServiceKey};

#[cfg(feature = "openai")]
pub use openai::{OpenAiProvider, OpenAiProviderFactory};

#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    HttpError(String),

    #[error("rate limit exceeded, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    #[error("response parse error: {0}")]
    ParseError(String),

    #[error("authentication failed")]
    AuthError,

    #[error("timeout after {0:?}")]
    Timeout(Duration),

    #[error("provider not configured: {0}")]
    NotConfigured(String),
}

impl ProviderError {
    /// Whether a retry could plausibly succeed.
    ///
    /// Timeouts are terminal: the caller's deadline already elapsed.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::HttpError(_) | ProviderError::RateLimited { .. } => true,
            ProviderError::ApiError { status, .. } => *status >= 500,
            ProviderError::ParseError(_)
            | ProviderError::AuthError
            | ProviderError::Timeout(_)
            | ProviderError::NotConfigured(_) => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionConfig {
    pub model: String,
    pub max_tokens: u32,
    /// 0.0 keeps judgments as repeatable as the service allows.
    pub temperature: f32,
    /// Ask the service for a JSON object response.
    pub json_mode: bool,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o".to_string(),
            max_tokens: 800,
            temperature: 0.0,
            json_mode: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChatMessage {
    /// "system", "user" or "assistant"
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
    pub usage: TokenUsage,
    pub model: String,
    pub stop_reason: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    /// Prompt tokens served from the provider's prompt cache.
    pub cached_prompt_tokens: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// A scoring service backend.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError>;

    async fn health_check(&self) -> bool;

    fn name(&self) -> &str;

    /// Rough estimate: ~4 chars per token.
    fn estimate_tokens(&self, text: &str) -> u32 {
        (text.len() / 4) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_message_creation() {
        assert_eq!(ChatMessage::system("s").role, "system");
        assert_eq!(ChatMessage::user("u").role, "user");
        assert_eq!(ChatMessage::assistant("a").role, "assistant");
    }

    #[test]
    fn test_token_usage_total() {
        let usage = TokenUsage {
            prompt_tokens: 100,
            completion_tokens: 50,
            cached_prompt_tokens: 20,
        };
        assert_eq!(usage.total(), 150);
    }

    #[test]
    fn test_transient_classification() {
        assert!(ProviderError::HttpError("reset".into()).is_transient());
        assert!(ProviderError::RateLimited { retry_after: None }.is_transient());
        assert!(ProviderError::ApiError { status: 503, message: "busy".into() }.is_transient());
        assert!(!ProviderError::ApiError { status: 400, message: "bad".into() }.is_transient());
        assert!(!ProviderError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(!ProviderError::AuthError.is_transient());
    }
}
