//! Natural-language mentor search.
//!
//! Hybrid ranking: vector similarity from the index blended with a lexical
//! overlap score between the parsed keywords and the mentor's profile text.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

use crate::budget::BudgetLedger;
use crate::cache::{search_key, ResponseCache};
use crate::index::{MentorCandidate, MentorFilter, SharedIndex};
use crate::llm::{ProviderError, SharedProvider};
use crate::matching::MentorSummary;
use crate::query::{ParsedQuery, QueryParser, SearchFilters};

pub const VECTOR_WEIGHT: f64 = 0.7;
pub const KEYWORD_WEIGHT: f64 = 0.3;

const FALLBACK_MESSAGE: &str = "Advanced search temporarily unavailable. Please try basic filters.";

/// Search request options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchOptions {
    pub top_k: usize,
    pub filters: SearchFilters,
    /// Excluded from the cache key.
    #[serde(skip_serializing)]
    pub user_id: Option<String>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            top_k: 10,
            filters: SearchFilters::default(),
            user_id: None,
        }
    }
}

/// One search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub mentor_id: String,
    pub score: f64,
    pub vector_score: f64,
    pub keyword_score: f64,
    pub mentor: MentorSummary,
}

/// Search outcome. `fallback` marks a degraded empty result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub results: Vec<SearchHit>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parsed_query: Option<ParsedQuery>,
    pub cached: bool,
    pub fallback: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl SearchResponse {
    fn fallback() -> Self {
        tracing::warn!("Using fallback search");
        Self {
            fallback: true,
            message: Some(FALLBACK_MESSAGE.to_string()),
            ..Default::default()
        }
    }
}

/// Cached form of a search: the hits and the query they came from.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedSearch {
    results: Vec<SearchHit>,
    parsed_query: ParsedQuery,
}

/// Semantic mentor search.
pub struct SemanticSearch {
    enabled: bool,
    parser: Arc<QueryParser>,
    provider: SharedProvider,
    index: SharedIndex,
    cache: Arc<ResponseCache>,
    ledger: Arc<BudgetLedger>,
}

impl SemanticSearch {
    pub fn new(
        enabled: bool,
        parser: Arc<QueryParser>,
        provider: SharedProvider,
        index: SharedIndex,
        cache: Arc<ResponseCache>,
        ledger: Arc<BudgetLedger>,
    ) -> Self {
        Self {
            enabled,
            parser,
            provider,
            index,
            cache,
            ledger,
        }
    }

    /// Search mentors for `query`. Never fails; degraded results set `fallback`.
    pub async fn search(&self, query: &str, options: &SearchOptions) -> SearchResponse {
        if !self.enabled {
            return SearchResponse::fallback();
        }

        let key = search_key(query, options);
        if let Some(cached) = self.cache.get::<CachedSearch>(&key).await {
            return SearchResponse {
                results: cached.results,
                parsed_query: Some(cached.parsed_query),
                cached: true,
                ..Default::default()
            };
        }

        if !self.ledger.check_budget("search").await {
            return SearchResponse::fallback();
        }

        tracing::info!(query = %query, "Semantic search");
        let parsed = self.parser.parse(query).await;

        let results = match self.retrieve(&parsed, options).await {
            Ok(results) => results,
            Err(e) => {
                tracing::error!("Semantic search failed: {}", e);
                return SearchResponse::fallback();
            }
        };

        self.cache
            .set(
                &key,
                &CachedSearch {
                    results: results.clone(),
                    parsed_query: parsed.clone(),
                },
            )
            .await;

        SearchResponse {
            results,
            parsed_query: Some(parsed),
            ..Default::default()
        }
    }

    /// Autocomplete suggestions for a partial query.
    pub async fn suggestions(&self, partial: &str, limit: usize) -> Vec<String> {
        if !self.enabled {
            return Vec::new();
        }
        self.parser.suggestions(partial, limit).await
    }

    async fn retrieve(
        &self,
        parsed: &ParsedQuery,
        options: &SearchOptions,
    ) -> Result<Vec<SearchHit>, ProviderError> {
        let top_k = options.top_k.max(1);

        let embedding = self.provider.embed(&parsed.enriched_query).await?;
        self.ledger
            .track_cost(
                "embedding",
                self.provider.cost(&embedding.usage),
                embedding.usage.to_json(),
            )
            .await;

        let filter = MentorFilter::for_search(parsed, &options.filters);
        let candidates = self.index.query(&embedding.vector, top_k * 2, &filter).await?;

        let mut hits = hybrid_rank(&candidates, &parsed.keywords);
        hits.truncate(top_k);
        Ok(hits)
    }
}

/// Blend vector and keyword scores, best first. Ties keep input order.
pub fn hybrid_rank(candidates: &[MentorCandidate], keywords: &[String]) -> Vec<SearchHit> {
    let mut hits: Vec<SearchHit> = candidates
        .iter()
        .map(|c| {
            let keyword_score = keyword_score(keywords, c);
            SearchHit {
                mentor_id: c.mentor_id.clone(),
                score: c.semantic_score * VECTOR_WEIGHT + keyword_score * KEYWORD_WEIGHT,
                vector_score: c.semantic_score,
                keyword_score,
                mentor: MentorSummary::new(&c.mentor_id, &c.metadata),
            }
        })
        .collect();

    hits.sort_by(|a, b| b.score.total_cmp(&a.score));
    hits
}

/// Fraction of keywords whose terms all appear in the mentor's text (0-1).
pub fn keyword_score(keywords: &[String], candidate: &MentorCandidate) -> f64 {
    let keywords: Vec<Vec<String>> = keywords
        .iter()
        .map(|k| tokenize(k))
        .filter(|terms| !terms.is_empty())
        .collect();
    if keywords.is_empty() {
        return 0.0;
    }

    let meta = &candidate.metadata;
    let mut text = String::new();
    for field in [&meta.name, &meta.headline, &meta.bio, &meta.company]
        .into_iter()
        .flatten()
    {
        text.push_str(field);
        text.push(' ');
    }
    text.push_str(&meta.zones.join(" "));
    let vocabulary: HashSet<String> = tokenize(&text).into_iter().collect();

    let matched = keywords
        .iter()
        .filter(|terms| terms.iter().all(|t| vocabulary.contains(t)))
        .count();
    matched as f64 / keywords.len() as f64
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}
