//! OpenAI-compatible API client (OpenAI, Groq).
//!
//! Both services speak the same `/chat/completions`, `/embeddings` and
//! `/audio/transcriptions` wire format; they differ in base URL, models and
//! price sheet.

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use reqwest_eventsource::{Event, RequestBuilderExt};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use super::error::{parse_retry_after, ProviderError};
use super::{
    AiProvider, AudioSource, ChatMessage, Completion, CompletionOptions, Embedding,
    TranscriptSegment, Transcription, Usage,
};
use crate::budget::Pricing;

pub const OPENAI_API_URL: &str = "https://api.openai.com/v1";
pub const GROQ_API_URL: &str = "https://api.groq.com/openai/v1";

/// Client for any OpenAI-compatible endpoint.
pub struct OpenAiCompatibleClient {
    client: Client,
    name: String,
    base_url: String,
    api_key: String,
    organization: Option<String>,
    chat_model: String,
    embedding_model: Option<String>,
    transcription_model: Option<String>,
    pricing: Pricing,
}

impl OpenAiCompatibleClient {
    /// Create a client for an arbitrary OpenAI-compatible endpoint.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        chat_model: impl Into<String>,
        pricing: Pricing,
    ) -> Self {
        Self {
            client: Client::new(),
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            organization: None,
            chat_model: chat_model.into(),
            embedding_model: None,
            transcription_model: None,
            pricing,
        }
    }

    /// OpenAI with paid pricing.
    pub fn openai(api_key: impl Into<String>, chat_model: impl Into<String>) -> Self {
        Self::new("openai", OPENAI_API_URL, api_key, chat_model, Pricing::openai())
    }

    /// Groq (free tier). Groq serves no embedding model.
    pub fn groq(api_key: impl Into<String>, chat_model: impl Into<String>) -> Self {
        Self::new("groq", GROQ_API_URL, api_key, chat_model, Pricing::free())
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_organization(mut self, organization: Option<String>) -> Self {
        self.organization = organization;
        self
    }

    pub fn with_embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = Some(model.into());
        self
    }

    pub fn with_transcription_model(mut self, model: impl Into<String>) -> Self {
        self.transcription_model = Some(model.into());
        self
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn ensure_configured(&self) -> Result<(), ProviderError> {
        if self.api_key.trim().is_empty() {
            return Err(ProviderError::not_configured(&self.name, "API key is missing"));
        }
        Ok(())
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let builder = builder.header("Authorization", format!("Bearer {}", self.api_key));
        match &self.organization {
            Some(org) => builder.header("OpenAI-Organization", org),
            None => builder,
        }
    }

    /// Send a request and decode a JSON body, mapping every failure.
    async fn send_json<T: DeserializeOwned>(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<T, ProviderError> {
        self.ensure_configured()?;
        let response = self
            .authorized(builder)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(&self.name, &e))?;

        let status = response.status();
        let retry_after = parse_retry_after(response.headers());
        let body = response.text().await.map_err(|e| {
            ProviderError::network(&self.name, format!("Failed to read response body: {}", e))
        })?;

        if !status.is_success() {
            return Err(ProviderError::from_status(
                &self.name,
                status.as_u16(),
                &body,
                retry_after,
            ));
        }

        serde_json::from_str(&body).map_err(|e| {
            ProviderError::parse(&self.name, format!("Failed to parse response: {}, body: {}", e, body))
        })
    }

    fn chat_request(&self, messages: &[ChatMessage], options: &CompletionOptions, stream: bool) -> ChatRequest {
        ChatRequest {
            model: options.model.clone().unwrap_or_else(|| self.chat_model.clone()),
            messages: messages.to_vec(),
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            response_format: options
                .json_response
                .then(|| ResponseFormat { format_type: "json_object".to_string() }),
            user: options.user.clone(),
            stream: stream.then_some(true),
        }
    }

    async fn download_audio(&self, url: &str) -> Result<Vec<u8>, ProviderError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(&self.name, &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::from_status(
                &self.name,
                status.as_u16(),
                "audio download failed",
                None,
            ));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ProviderError::from_reqwest(&self.name, &e))?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl AiProvider for OpenAiCompatibleClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn embed(&self, text: &str) -> Result<Embedding, ProviderError> {
        let model = self
            .embedding_model
            .as_deref()
            .ok_or_else(|| ProviderError::unsupported(&self.name, "embeddings"))?;

        let request = EmbeddingRequest { model, input: text };
        let parsed: EmbeddingResponse = self
            .send_json(self.client.post(self.endpoint("embeddings")).json(&request))
            .await?;

        let vector = parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| ProviderError::parse(&self.name, "No embedding in response"))?;

        let tokens = parsed.usage.map(|u| u.total_tokens.max(u.prompt_tokens)).unwrap_or(0);
        Ok(Embedding {
            vector,
            usage: Usage::embedding(tokens),
        })
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<Completion, ProviderError> {
        let request = self.chat_request(messages, options, false);
        tracing::debug!("Sending request to {}: model={}", self.name, request.model);

        let start = Instant::now();
        let parsed: ChatResponse = self
            .send_json(self.client.post(self.endpoint("chat/completions")).json(&request))
            .await?;
        tracing::debug!("{} completion finished in {:?}", self.name, start.elapsed());

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::parse(&self.name, "No choices in response"))?;

        Ok(Completion {
            text: choice.message.content.unwrap_or_default(),
            usage: parsed
                .usage
                .map(|u| Usage::tokens(u.prompt_tokens, u.completion_tokens))
                .unwrap_or_else(Usage::none),
            model: parsed.model.or(Some(request.model)),
        })
    }

    async fn complete_stream(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<BoxStream<'static, Result<String, ProviderError>>, ProviderError> {
        self.ensure_configured()?;
        let request = self.chat_request(messages, options, true);
        let builder = self.authorized(self.client.post(self.endpoint("chat/completions")).json(&request));
        let mut source = builder
            .eventsource()
            .map_err(|e| ProviderError::network(&self.name, format!("Cannot open stream: {}", e)))?;
        let name = self.name.clone();

        let stream = async_stream::stream! {
            while let Some(event) = source.next().await {
                match event {
                    Ok(Event::Open) => continue,
                    Ok(Event::Message(message)) => {
                        if message.data.trim() == "[DONE]" {
                            break;
                        }
                        match serde_json::from_str::<StreamChunk>(&message.data) {
                            Ok(chunk) => {
                                let delta = chunk
                                    .choices
                                    .into_iter()
                                    .next()
                                    .and_then(|c| c.delta.content);
                                if let Some(text) = delta {
                                    if !text.is_empty() {
                                        yield Ok(text);
                                    }
                                }
                            }
                            Err(e) => {
                                yield Err(ProviderError::parse(&name, format!("Bad stream chunk: {}", e)));
                                break;
                            }
                        }
                    }
                    Err(reqwest_eventsource::Error::StreamEnded) => break,
                    Err(reqwest_eventsource::Error::InvalidStatusCode(status, _)) => {
                        yield Err(ProviderError::from_status(&name, status.as_u16(), "stream rejected", None));
                        break;
                    }
                    Err(e) => {
                        yield Err(ProviderError::network(&name, format!("Stream failed: {}", e)));
                        break;
                    }
                }
            }
            source.close();
        };

        Ok(Box::pin(stream))
    }

    async fn transcribe(&self, audio: &AudioSource) -> Result<Transcription, ProviderError> {
        let model = self
            .transcription_model
            .clone()
            .ok_or_else(|| ProviderError::unsupported(&self.name, "transcription"))?;

        let (file_name, data) = match audio {
            AudioSource::Url(url) => (
                url.rsplit('/').next().filter(|s| !s.is_empty()).unwrap_or("session.mp3").to_string(),
                self.download_audio(url).await?,
            ),
            AudioSource::Bytes { file_name, data } => (file_name.clone(), data.clone()),
        };

        let form = Form::new()
            .part("file", Part::bytes(data).file_name(file_name))
            .text("model", model)
            .text("response_format", "verbose_json")
            .text("timestamp_granularities[]", "segment");

        let parsed: TranscriptionResponse = self
            .send_json(self.client.post(self.endpoint("audio/transcriptions")).multipart(form))
            .await?;

        let duration_seconds = parsed.duration.unwrap_or(0.0);
        Ok(Transcription {
            text: parsed.text,
            segments: parsed
                .segments
                .unwrap_or_default()
                .into_iter()
                .map(|s| TranscriptSegment {
                    start: s.start,
                    end: s.end,
                    text: s.text,
                })
                .collect(),
            language: parsed.language,
            duration_seconds,
            usage: Usage::audio(duration_seconds),
        })
    }

    fn cost(&self, usage: &Usage) -> f64 {
        self.pricing.cost(usage)
    }
}

/// Chat completion request format.
#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<TokenCounts>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Usage data (OpenAI-compatible).
#[derive(Debug, Deserialize)]
struct TokenCounts {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
    #[serde(default)]
    usage: Option<TokenCounts>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    segments: Option<Vec<SegmentData>>,
}

#[derive(Debug, Deserialize)]
struct SegmentData {
    start: f64,
    end: f64,
    text: String,
}
