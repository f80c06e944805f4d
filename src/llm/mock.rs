//! Offline provider used when `AI_MOCK_RESPONSES=true`.
//!
//! Returns canned completions and deterministic hash embeddings so the HTTP
//! surface can be exercised without API keys. Every call is free.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::{
    AiProvider, AudioSource, ChatMessage, Completion, CompletionOptions, Embedding, ProviderError,
    Role, Transcription, Usage,
};

/// Deterministic stand-in for a real provider.
#[derive(Debug, Clone)]
pub struct MockProvider {
    dimension: usize,
}

impl MockProvider {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    /// Unit-length vector derived from the SHA-256 of the text.
    fn hash_embedding(&self, text: &str) -> Vec<f32> {
        let mut vector = Vec::with_capacity(self.dimension);
        let mut counter: u32 = 0;
        while vector.len() < self.dimension {
            let mut hasher = Sha256::new();
            hasher.update(counter.to_le_bytes());
            hasher.update(text.as_bytes());
            for byte in hasher.finalize() {
                if vector.len() == self.dimension {
                    break;
                }
                vector.push(byte as f32 / 127.5 - 1.0);
            }
            counter += 1;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new(1536)
    }
}

#[async_trait]
impl AiProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn embed(&self, text: &str) -> Result<Embedding, ProviderError> {
        Ok(Embedding {
            vector: self.hash_embedding(text),
            usage: Usage::embedding(0),
        })
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<Completion, ProviderError> {
        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or_default();

        let text = if options.json_response {
            "{}".to_string()
        } else {
            format!("[mock] You said: {}", last_user)
        };

        Ok(Completion {
            text,
            usage: Usage::none(),
            model: Some("mock".to_string()),
        })
    }

    async fn transcribe(&self, _audio: &AudioSource) -> Result<Transcription, ProviderError> {
        Ok(Transcription {
            text: String::new(),
            segments: Vec::new(),
            language: Some("en".to_string()),
            duration_seconds: 0.0,
            usage: Usage::audio(0.0),
        })
    }

    fn cost(&self, _usage: &Usage) -> f64 {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_embeddings_are_deterministic_and_normalized() {
        let mock = MockProvider::new(64);
        let a = mock.embed("career mentor").await.unwrap().vector;
        let b = mock.embed("career mentor").await.unwrap().vector;
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        let norm: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[tokio::test]
    async fn test_json_mode_returns_object() {
        let mock = MockProvider::default();
        let out = mock
            .complete(&[ChatMessage::user("x")], &CompletionOptions::default().json())
            .await
            .unwrap();
        assert!(serde_json::from_str::<serde_json::Value>(&out.text).unwrap().is_object());
    }
}
