//! Provider adapter for external AI services.
//!
//! This module provides a trait-based abstraction over LLM providers. The
//! same surface covers chat completion, embeddings and speech-to-text; each
//! call returns its [`Usage`] so the caller can price and record it through
//! the provider's own formula ([`AiProvider::cost`]).
//!
//! Implementations:
//! - [`OpenAiCompatibleClient`] for OpenAI and Groq (same wire format)
//! - [`MockProvider`] for offline development

mod error;
mod mock;
mod openai;

pub use error::{classify_http_status, ProviderError, ProviderErrorKind};
pub(crate) use error::parse_retry_after;
pub use mock::MockProvider;
pub use openai::OpenAiCompatibleClient;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Role in a chat conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A message in a chat conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Optional parameters for chat completions.
#[derive(Debug, Clone, Default)]
pub struct CompletionOptions {
    /// Model override; the provider default is used when unset.
    pub model: Option<String>,
    /// Sampling temperature (0 = deterministic).
    pub temperature: Option<f64>,
    /// Maximum output tokens to generate.
    pub max_tokens: Option<u64>,
    /// Ask the provider for a JSON object response.
    pub json_response: bool,
    /// End-user identifier forwarded for abuse monitoring.
    pub user: Option<String>,
}

impl CompletionOptions {
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u64) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn json(mut self) -> Self {
        self.json_response = true;
        self
    }
}

/// Billable usage reported by a provider call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Usage {
    Tokens {
        prompt_tokens: u64,
        completion_tokens: u64,
        total_tokens: u64,
    },
    Embedding {
        total_tokens: u64,
    },
    Audio {
        duration_seconds: f64,
    },
}

impl Usage {
    /// Token usage with a consistent total.
    pub fn tokens(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Usage::Tokens {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
        }
    }

    pub fn none() -> Self {
        Self::tokens(0, 0)
    }

    pub fn embedding(total_tokens: u64) -> Self {
        Usage::Embedding { total_tokens }
    }

    pub fn audio(duration_seconds: f64) -> Self {
        Usage::Audio { duration_seconds }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Result of a chat completion.
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub usage: Usage,
    pub model: Option<String>,
}

/// Result of an embedding call.
#[derive(Debug, Clone)]
pub struct Embedding {
    pub vector: Vec<f32>,
    pub usage: Usage,
}

/// Audio to transcribe.
#[derive(Debug, Clone)]
pub enum AudioSource {
    /// Downloaded by the adapter before upload.
    Url(String),
    Bytes { file_name: String, data: Vec<u8> },
}

/// A timestamped piece of a transcript.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TranscriptSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// Result of a speech-to-text call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcription {
    pub text: String,
    pub segments: Vec<TranscriptSegment>,
    pub language: Option<String>,
    pub duration_seconds: f64,
    #[serde(skip_serializing, default = "Usage::none")]
    pub usage: Usage,
}

/// Uniform capability surface over interchangeable AI backends.
#[async_trait]
pub trait AiProvider: Send + Sync {
    /// Short provider name used in logs and errors.
    fn name(&self) -> &str;

    /// Embed a piece of text.
    async fn embed(&self, text: &str) -> Result<Embedding, ProviderError>;

    /// Run a chat completion.
    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<Completion, ProviderError>;

    /// Stream a chat completion as text deltas.
    ///
    /// Default implementation yields the full completion as a single chunk.
    async fn complete_stream(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<BoxStream<'static, Result<String, ProviderError>>, ProviderError> {
        let completion = self.complete(messages, options).await?;
        Ok(Box::pin(futures::stream::once(async move { Ok(completion.text) })))
    }

    /// Transcribe audio to text.
    async fn transcribe(&self, audio: &AudioSource) -> Result<Transcription, ProviderError>;

    /// Price a call in USD using this provider's formula.
    fn cost(&self, usage: &Usage) -> f64;
}

/// Shared provider handle.
pub type SharedProvider = Arc<dyn AiProvider>;

/// Pull the JSON payload out of a model reply.
///
/// JSON-mode replies are returned as-is; others may wrap the object in a
/// markdown fence or surrounding prose.
pub fn extract_json(text: &str) -> &str {
    let trimmed = text.trim();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return trimmed;
    }

    let open = trimmed.find(['{', '[']);
    let close = trimmed.rfind(['}', ']']);
    match (open, close) {
        (Some(start), Some(end)) if end > start => &trimmed[start..=end],
        _ => trimmed,
    }
}
