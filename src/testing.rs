//! Test doubles shared by the unit tests.

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use futures::stream::BoxStream;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::budget::{AlertSink, BudgetAlert, BudgetLedger, BudgetLimits, MemoryLedgerStore, Pricing};
use crate::cache::{MemoryCacheStore, ResponseCache};
use crate::clock::Clock;
use crate::index::{MentorCandidate, MentorFilter, MentorMetadata, VectorIndex};
use crate::llm::{
    AiProvider, AudioSource, ChatMessage, Completion, CompletionOptions, Embedding, ProviderError,
    Transcription, Usage,
};

/// Clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Noon UTC on the given date.
    pub fn at(year: i32, month: u32, day: u32) -> Self {
        let now = Utc
            .with_ymd_and_hms(year, month, day, 12, 0, 0)
            .single()
            .expect("valid test date");
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }

    pub fn advance_secs(&self, secs: i64) {
        self.advance(Duration::seconds(secs));
    }

    pub fn advance_days(&self, days: i64) {
        self.advance(Duration::days(days));
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// Alert sink that keeps every alert.
#[derive(Default)]
pub struct RecordingAlertSink {
    alerts: Mutex<Vec<BudgetAlert>>,
}

impl RecordingAlertSink {
    pub fn alerts(&self) -> Vec<BudgetAlert> {
        self.alerts.lock().unwrap().clone()
    }
}

impl AlertSink for RecordingAlertSink {
    fn notify(&self, alert: &BudgetAlert) {
        self.alerts.lock().unwrap().push(alert.clone());
    }
}

/// Scripted provider that counts its calls.
///
/// Completions are served from a queue; once it is empty the default reply is
/// used. Usage is priced with OpenAI rates.
pub struct StubProvider {
    replies: Mutex<VecDeque<Result<String, ProviderError>>>,
    default_reply: String,
    fail_all: bool,
    broken_stream: bool,
    transcription: Option<Transcription>,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
    pub embed_calls: AtomicUsize,
    pub complete_calls: AtomicUsize,
    pub transcribe_calls: AtomicUsize,
}

impl StubProvider {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            default_reply: "stub reply".to_string(),
            fail_all: false,
            broken_stream: false,
            transcription: None,
            requests: Mutex::new(Vec::new()),
            embed_calls: AtomicUsize::new(0),
            complete_calls: AtomicUsize::new(0),
            transcribe_calls: AtomicUsize::new(0),
        }
    }

    /// A provider whose every call fails with a network error.
    pub fn failing() -> Self {
        Self {
            fail_all: true,
            ..Self::new()
        }
    }

    pub fn with_default_reply(mut self, reply: impl Into<String>) -> Self {
        self.default_reply = reply.into();
        self
    }

    /// Streams one chunk, then fails.
    pub fn with_broken_stream(mut self) -> Self {
        self.broken_stream = true;
        self
    }

    pub fn with_transcription(mut self, transcription: Transcription) -> Self {
        self.transcription = Some(transcription);
        self
    }

    pub fn push_reply(&self, reply: impl Into<String>) {
        self.replies.lock().unwrap().push_back(Ok(reply.into()));
    }

    pub fn push_failure(&self) {
        self.replies
            .lock()
            .unwrap()
            .push_back(Err(ProviderError::network("stub", "connection reset")));
    }

    pub fn total_calls(&self) -> usize {
        self.embed_calls.load(Ordering::SeqCst)
            + self.complete_calls.load(Ordering::SeqCst)
            + self.transcribe_calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.requests.lock().unwrap().clone()
    }

    fn outage(&self) -> ProviderError {
        ProviderError::network("stub", "provider unreachable")
    }
}

#[async_trait]
impl AiProvider for StubProvider {
    fn name(&self) -> &str {
        "stub"
    }

    async fn embed(&self, _text: &str) -> Result<Embedding, ProviderError> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_all {
            return Err(self.outage());
        }
        Ok(Embedding {
            vector: vec![0.1, 0.2, 0.3],
            usage: Usage::embedding(100),
        })
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        _options: &CompletionOptions,
    ) -> Result<Completion, ProviderError> {
        self.complete_calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(messages.to_vec());
        if self.fail_all {
            return Err(self.outage());
        }
        let next = self.replies.lock().unwrap().pop_front();
        let text = match next {
            Some(reply) => reply?,
            None => self.default_reply.clone(),
        };
        Ok(Completion {
            text,
            usage: Usage::tokens(1000, 500),
            model: Some("stub-model".to_string()),
        })
    }

    async fn complete_stream(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<BoxStream<'static, Result<String, ProviderError>>, ProviderError> {
        if !self.broken_stream {
            let completion = self.complete(messages, options).await?;
            return Ok(Box::pin(futures::stream::once(async move { Ok(completion.text) })));
        }
        self.complete_calls.fetch_add(1, Ordering::SeqCst);
        let items = vec![
            Ok("partial".to_string()),
            Err(ProviderError::network("stub", "stream reset")),
            Ok("never seen".to_string()),
        ];
        Ok(Box::pin(futures::stream::iter(items)))
    }

    async fn transcribe(&self, _audio: &AudioSource) -> Result<Transcription, ProviderError> {
        self.transcribe_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_all {
            return Err(self.outage());
        }
        self.transcription
            .clone()
            .ok_or_else(|| ProviderError::unsupported("stub", "transcription"))
    }

    fn cost(&self, usage: &Usage) -> f64 {
        Pricing::openai().cost(usage)
    }
}

/// In-memory vector index returning a fixed candidate list.
pub struct StubIndex {
    candidates: Vec<MentorCandidate>,
    fail: bool,
    pub query_calls: AtomicUsize,
    last_query: Mutex<Option<(usize, MentorFilter)>>,
    upserts: Mutex<Vec<(String, MentorMetadata)>>,
    deletes: Mutex<Vec<String>>,
}

impl StubIndex {
    pub fn new(candidates: Vec<MentorCandidate>) -> Self {
        Self {
            candidates,
            fail: false,
            query_calls: AtomicUsize::new(0),
            last_query: Mutex::new(None),
            upserts: Mutex::new(Vec::new()),
            deletes: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(Vec::new())
        }
    }

    /// `(top_k, filter)` of the most recent query.
    pub fn last_query(&self) -> Option<(usize, MentorFilter)> {
        self.last_query.lock().unwrap().clone()
    }

    pub fn upserts(&self) -> Vec<(String, MentorMetadata)> {
        self.upserts.lock().unwrap().clone()
    }

    pub fn deletes(&self) -> Vec<String> {
        self.deletes.lock().unwrap().clone()
    }
}

#[async_trait]
impl VectorIndex for StubIndex {
    async fn query(
        &self,
        _vector: &[f32],
        top_k: usize,
        filter: &MentorFilter,
    ) -> Result<Vec<MentorCandidate>, ProviderError> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_query.lock().unwrap() = Some((top_k, filter.clone()));
        if self.fail {
            return Err(ProviderError::network("stub-index", "index unreachable"));
        }
        Ok(self.candidates.iter().take(top_k).cloned().collect())
    }

    async fn upsert(
        &self,
        mentor_id: &str,
        _vector: Vec<f32>,
        metadata: &MentorMetadata,
    ) -> Result<(), ProviderError> {
        if self.fail {
            return Err(ProviderError::network("stub-index", "index unreachable"));
        }
        self.upserts
            .lock()
            .unwrap()
            .push((mentor_id.to_string(), metadata.clone()));
        Ok(())
    }

    async fn delete(&self, mentor_id: &str) -> Result<(), ProviderError> {
        if self.fail {
            return Err(ProviderError::network("stub-index", "index unreachable"));
        }
        self.deletes.lock().unwrap().push(mentor_id.to_string());
        Ok(())
    }
}

/// Candidate with the given score signals.
pub fn candidate(
    id: &str,
    semantic: f64,
    rating: f64,
    response: f64,
    load: f64,
    completion: f64,
) -> MentorCandidate {
    MentorCandidate {
        mentor_id: id.to_string(),
        semantic_score: semantic,
        metadata: MentorMetadata {
            name: Some(format!("Mentor {}", id)),
            rating: Some(rating),
            response_rate: Some(response),
            current_load: Some(load),
            completion_rate: Some(completion),
            is_verified: true,
            is_available: true,
            ..Default::default()
        },
    }
}

/// Ledger with generous limits on an in-memory store.
pub fn ledger(clock: Arc<ManualClock>) -> Arc<BudgetLedger> {
    Arc::new(BudgetLedger::new(
        Arc::new(MemoryLedgerStore::new()),
        BudgetLimits::default(),
        clock,
    ))
}

/// Ledger that denies every paid call.
pub fn exhausted_ledger(clock: Arc<ManualClock>) -> Arc<BudgetLedger> {
    Arc::new(BudgetLedger::new(
        Arc::new(MemoryLedgerStore::new()),
        BudgetLimits {
            daily_usd: 0.0,
            monthly_usd: 0.0,
            alert_threshold: 0.8,
            skip_checks: false,
        },
        clock,
    ))
}

/// Enabled one-hour in-memory cache.
pub fn cache(clock: Arc<ManualClock>) -> Arc<ResponseCache> {
    Arc::new(ResponseCache::new(
        Arc::new(MemoryCacheStore::new(clock)),
        std::time::Duration::from_secs(3600),
        true,
    ))
}

/// Local HTTP endpoint that answers every request with a 200 whose body is
/// cut short of its declared length. Returns the base URL.
pub async fn truncated_body_server() -> String {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let _ = socket
                    .write_all(b"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 64\r\n\r\n{\"par")
                    .await;
                // Half-close, then drain so the client sees EOF rather than a reset.
                let _ = socket.shutdown().await;
                while matches!(socket.read(&mut buf).await, Ok(n) if n > 0) {}
            });
        }
    });
    format!("http://{}", addr)
}
