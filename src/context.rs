//! Application context.
//!
//! Everything the request handlers need is constructed once here from the
//! configuration snapshot and shared behind `Arc`s.

use std::sync::Arc;

use crate::budget::{BudgetLedger, LedgerStore, MemoryLedgerStore, SqliteLedgerStore};
use crate::cache::{CacheStore, MemoryCacheStore, ResponseCache, SqliteCacheStore};
use crate::chat::{ChatSettings, Chatbot};
use crate::clock::{system_clock, SharedClock};
use crate::config::{Config, LlmProvider, StorageBackend};
use crate::index::{MemoryIndex, PineconeIndex, SharedIndex};
use crate::llm::{MockProvider, OpenAiCompatibleClient, SharedProvider};
use crate::matching::MatchingEngine;
use crate::query::QueryParser;
use crate::search::SemanticSearch;
use crate::session::SessionIntelligence;
use crate::storage::SqliteDb;

/// Shared services for the lifetime of the process.
pub struct AppContext {
    pub config: Arc<Config>,
    pub clock: SharedClock,
    pub ledger: Arc<BudgetLedger>,
    pub cache: Arc<ResponseCache>,
    /// Serves chat replies (Groq or OpenAI).
    pub chat_provider: SharedProvider,
    /// Serves embeddings, analysis and transcription.
    pub openai: SharedProvider,
    pub index: SharedIndex,
    pub chatbot: Chatbot,
    pub search: SemanticSearch,
    pub matching: MatchingEngine,
    pub sessions: SessionIntelligence,
}

impl AppContext {
    /// Build the context with the system clock.
    pub fn new(config: Arc<Config>) -> anyhow::Result<Self> {
        Self::with_clock(config, system_clock())
    }

    pub fn with_clock(config: Arc<Config>, clock: SharedClock) -> anyhow::Result<Self> {
        let (ledger_store, cache_store) = open_stores(&config, clock.clone())?;

        let ledger = Arc::new(
            BudgetLedger::new(ledger_store, config.budget_limits(), clock.clone())
                .with_exchange_rate(config.costs.usd_to_bdt_rate)
                .with_record_logging(config.monitoring.logging),
        );
        let cache = Arc::new(ResponseCache::new(
            cache_store,
            config.cache.ttl(),
            config.cache.enabled,
        ));

        let (chat_provider, openai) = build_providers(&config);
        let index = build_index(&config);

        let features = config.features;
        let chatbot = Chatbot::new(
            features.chatbot,
            chat_provider.clone(),
            ledger.clone(),
            cache.clone(),
            ChatSettings {
                temperature: config.llm.temperature,
                max_tokens: config.llm.max_tokens,
                log_interactions: config.monitoring.logging,
            },
        );
        let parser = Arc::new(QueryParser::new(openai.clone(), ledger.clone()));
        let search = SemanticSearch::new(
            features.matching,
            parser,
            openai.clone(),
            index.clone(),
            cache.clone(),
            ledger.clone(),
        );
        let matching = MatchingEngine::new(features.matching, openai.clone(), index.clone(), ledger.clone());
        let sessions = SessionIntelligence::new(features.transcription, openai.clone(), ledger.clone());

        tracing::info!(
            "AI context ready: provider={}, storage={}, chatbot={}, matching={}, transcription={}, mock={}",
            config.llm.provider.as_str(),
            ledger.backend_name(),
            features.chatbot,
            features.matching,
            features.transcription,
            config.dev.mock_responses
        );

        Ok(Self {
            config,
            clock,
            ledger,
            cache,
            chat_provider,
            openai,
            index,
            chatbot,
            search,
            matching,
            sessions,
        })
    }
}

fn open_stores(
    config: &Config,
    clock: SharedClock,
) -> anyhow::Result<(Arc<dyn LedgerStore>, Arc<dyn CacheStore>)> {
    match config.storage.backend {
        StorageBackend::Memory => Ok((
            Arc::new(MemoryLedgerStore::new()),
            Arc::new(MemoryCacheStore::new(clock)),
        )),
        StorageBackend::Sqlite => {
            let db = SqliteDb::open(&config.storage.path)?;
            tracing::info!("Using SQLite storage at {}", config.storage.path.display());
            Ok((
                Arc::new(SqliteLedgerStore::new(db.clone())),
                Arc::new(SqliteCacheStore::new(db, clock)),
            ))
        }
    }
}

/// Returns `(chat provider, openai provider)`.
fn build_providers(config: &Config) -> (SharedProvider, SharedProvider) {
    if config.dev.mock_responses {
        tracing::warn!("AI_MOCK_RESPONSES is on; all AI calls are served offline");
        let mock: SharedProvider = Arc::new(MockProvider::default());
        return (mock.clone(), mock);
    }

    let mut openai = OpenAiCompatibleClient::openai(
        config.openai.api_key.clone().unwrap_or_default(),
        config.openai.chat_model.clone(),
    )
    .with_organization(config.openai.organization_id.clone())
    .with_embedding_model(config.openai.embedding_model.clone())
    .with_transcription_model(config.openai.transcription_model.clone());
    if let Some(url) = &config.openai.base_url {
        openai = openai.with_base_url(url.clone());
    }
    let openai: SharedProvider = Arc::new(openai);

    let chat = match config.llm.provider {
        LlmProvider::OpenAi => openai.clone(),
        LlmProvider::Groq => {
            let mut groq = OpenAiCompatibleClient::groq(
                config.groq.api_key.clone().unwrap_or_default(),
                config.groq.model.clone(),
            );
            if let Some(url) = &config.groq.base_url {
                groq = groq.with_base_url(url.clone());
            }
            Arc::new(groq)
        }
    };

    (chat, openai)
}

fn build_index(config: &Config) -> SharedIndex {
    if !config.dev.mock_responses {
        if let (Some(host), Some(key)) = (&config.pinecone.index_host, &config.pinecone.api_key) {
            return Arc::new(PineconeIndex::new(host, key).with_namespace(config.pinecone.namespace.clone()));
        }
        if config.features.matching {
            tracing::warn!("Pinecone is not configured; using an in-memory mentor index");
        }
    }
    Arc::new(MemoryIndex::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FeatureFlags;
    use crate::llm::{ChatMessage, CompletionOptions};
    use crate::matching::{MatchOptions, MenteeProfile, MentorProfile};

    fn mock_config() -> Config {
        let mut config = Config::default();
        config.dev.mock_responses = true;
        config.features = FeatureFlags {
            chatbot: true,
            matching: true,
            transcription: true,
        };
        config
    }

    #[tokio::test]
    async fn test_default_context_is_in_memory() {
        let ctx = AppContext::new(Arc::new(Config::default())).unwrap();
        assert_eq!(ctx.ledger.backend_name(), "memory");
        assert!(!ctx.chatbot.is_enabled());
        assert!(!ctx.matching.is_enabled());
        assert_eq!(ctx.chat_provider.name(), "groq");
        assert_eq!(ctx.openai.name(), "openai");
    }

    #[tokio::test]
    async fn test_sqlite_context_shares_one_database() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.storage.backend = StorageBackend::Sqlite;
        config.storage.path = dir.path().join("nested").join("ai.db");

        let ctx = AppContext::new(Arc::new(config)).unwrap();
        assert_eq!(ctx.ledger.backend_name(), "sqlite");
        assert_eq!(ctx.cache.stats().await.storage, "sqlite");
        assert!(dir.path().join("nested").join("ai.db").exists());
    }

    #[tokio::test]
    async fn test_mock_context_runs_offline() {
        let ctx = AppContext::new(Arc::new(mock_config())).unwrap();
        assert_eq!(ctx.chat_provider.name(), "mock");

        let completion = ctx
            .chat_provider
            .complete(&[ChatMessage::user("hello")], &CompletionOptions::default())
            .await
            .unwrap();
        assert!(!completion.text.is_empty());

        let mentor = MentorProfile {
            id: "m1".into(),
            full_name: "Nadia".into(),
            zones: vec!["Career".into()],
            is_verified: true,
            is_available: true,
            ..Default::default()
        };
        ctx.matching.index_mentor(&mentor).await.unwrap();

        let profile = MenteeProfile {
            goal: "Move into product management".into(),
            ..Default::default()
        };
        let response = ctx.matching.find_matches(&profile, &MatchOptions::default()).await;
        assert_eq!(response.matches.len(), 1);
        assert_eq!(response.matches[0].mentor_id, "m1");
    }
}
