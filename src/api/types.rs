//! Request and response bodies for the HTTP API.

use axum::{http::StatusCode, Json};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::budget::{BudgetStats, ServiceBreakdown};
use crate::cache::CacheStats;
use crate::config::FeatureFlags;
use crate::error::ServiceError;
use crate::llm::ChatMessage;
use crate::matching::RankedMatch;
use crate::query::{ParsedQuery, SearchFilters};
use crate::search::SearchHit;
use crate::session::{SessionData, SessionOutcome};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChatRequest {
    pub message: Option<String>,
    pub user_id: Option<String>,
    pub user_name: Option<String>,
    pub user_role: Option<String>,
    pub language: Option<String>,
    pub history: Vec<ChatMessage>,
    pub current_page: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub success: bool,
    pub message: String,
    pub cached: bool,
    pub cost: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchRequest {
    pub query: Option<String>,
    pub top_k: Option<usize>,
    pub filters: SearchFilters,
    pub user_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponseBody {
    pub success: bool,
    pub results: Vec<SearchHit>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parsed_query: Option<ParsedQuery>,
    pub cached: bool,
    pub fallback: bool,
    pub count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SuggestionsQuery {
    pub q: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct SuggestionsResponse {
    pub success: bool,
    pub suggestions: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MatchRequest {
    pub user_id: Option<String>,
    pub goal: Option<String>,
    pub zone: Option<String>,
    pub experience_level: Option<String>,
    pub current_role: Option<String>,
    pub specific_needs: Option<String>,
    pub preferred_language: Option<String>,
    /// Maximum rate per minute in BDT.
    pub budget: Option<f64>,
    pub top_k: Option<usize>,
    pub include_explanation: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct MatchResponseBody {
    pub success: bool,
    pub matches: Vec<RankedMatch>,
    pub count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionRequest {
    pub audio_url: Option<String>,
    pub session: SessionData,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub success: bool,
    #[serde(flatten)]
    pub outcome: SessionOutcome,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MentorIndexResponse {
    pub success: bool,
    pub mentor_id: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct StatsQuery {
    /// Day for the per-service breakdown; today when absent.
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub success: bool,
    pub stats: BudgetStats,
    pub breakdown: BTreeMap<String, ServiceBreakdown>,
    pub cache: CacheStats,
    pub features: FeatureFlags,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    pub features: FeatureFlags,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

/// Error half of every handler result.
pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            success: false,
            error: message.into(),
        }),
    )
}

pub fn bad_request(message: impl Into<String>) -> ApiError {
    api_error(StatusCode::BAD_REQUEST, message)
}

impl From<ServiceError> for ErrorResponse {
    fn from(e: ServiceError) -> Self {
        Self {
            success: false,
            error: e.to_string(),
        }
    }
}

pub fn service_error(e: ServiceError) -> ApiError {
    let status = StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(e.into()))
}
