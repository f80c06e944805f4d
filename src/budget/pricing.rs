//! Provider price sheets.
//!
//! Prices are fixed policy in USD. Token prices are per million tokens,
//! audio is per minute.

use serde::{Deserialize, Serialize};

use crate::llm::Usage;

/// Price sheet for one provider.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pricing {
    /// USD per 1M prompt tokens (chat).
    pub input_per_million: f64,
    /// USD per 1M completion tokens (chat).
    pub output_per_million: f64,
    /// USD per 1M embedded tokens.
    pub embedding_per_million: f64,
    /// USD per minute of transcribed audio.
    pub transcription_per_minute: f64,
}

impl Pricing {
    /// OpenAI: gpt-4o-mini chat, text-embedding-3-small, whisper-1.
    pub const fn openai() -> Self {
        Self {
            input_per_million: 0.15,
            output_per_million: 0.60,
            embedding_per_million: 0.02,
            transcription_per_minute: 0.006,
        }
    }

    /// Free tier (Groq, mock).
    pub const fn free() -> Self {
        Self {
            input_per_million: 0.0,
            output_per_million: 0.0,
            embedding_per_million: 0.0,
            transcription_per_minute: 0.0,
        }
    }

    /// Cost of a chat completion.
    pub fn chat_cost(&self, prompt_tokens: u64, completion_tokens: u64) -> f64 {
        (prompt_tokens as f64 / 1_000_000.0) * self.input_per_million
            + (completion_tokens as f64 / 1_000_000.0) * self.output_per_million
    }

    /// Cost of an embedding call.
    pub fn embedding_cost(&self, total_tokens: u64) -> f64 {
        (total_tokens as f64 / 1_000_000.0) * self.embedding_per_million
    }

    /// Cost of a transcription call.
    pub fn transcription_cost(&self, duration_seconds: f64) -> f64 {
        (duration_seconds.max(0.0) / 60.0) * self.transcription_per_minute
    }

    /// Price any usage record.
    pub fn cost(&self, usage: &Usage) -> f64 {
        match *usage {
            Usage::Tokens {
                prompt_tokens,
                completion_tokens,
                ..
            } => self.chat_cost(prompt_tokens, completion_tokens),
            Usage::Embedding { total_tokens } => self.embedding_cost(total_tokens),
            Usage::Audio { duration_seconds } => self.transcription_cost(duration_seconds),
        }
    }
}

impl Default for Pricing {
    fn default() -> Self {
        Self::openai()
    }
}
