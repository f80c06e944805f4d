//! Handlers for the AI endpoints.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{
        sse::{Event, Sse},
        Json,
    },
};
use futures::stream::{Stream, StreamExt};

use super::types::*;
use crate::chat::ChatContext;
use crate::context::AppContext;
use crate::error::{Capability, ServiceError};
use crate::llm::{AudioSource, ChatMessage};
use crate::matching::{MatchOptions, MenteeProfile, MentorProfile};
use crate::search::SearchOptions;

const DEFAULT_SUGGESTIONS: usize = 5;

fn required(value: Option<String>, message: &str) -> Result<String, ApiError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| bad_request(message))
}

fn conversation(req: &mut ChatRequest, message: String) -> (Vec<ChatMessage>, ChatContext) {
    let mut messages = std::mem::take(&mut req.history);
    messages.push(ChatMessage::user(message));
    let context = ChatContext {
        user_id: req.user_id.take(),
        user_name: req.user_name.take(),
        user_role: req.user_role.take(),
        language: req.language.take(),
        current_page: req.current_page.take(),
    };
    (messages, context)
}

/// POST /api/chat
pub(super) async fn chat(
    State(ctx): State<Arc<AppContext>>,
    Json(mut req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let message = required(req.message.take(), "Message is required")?;
    let (messages, context) = conversation(&mut req, message);

    let reply = ctx.chatbot.chat(&messages, &context).await;
    Ok(Json(ChatResponse {
        success: true,
        message: reply.message,
        cached: reply.cached,
        cost: reply.cost,
        latency: reply.latency_ms,
    }))
}

/// POST /api/chat/stream
pub(super) async fn chat_stream(
    State(ctx): State<Arc<AppContext>>,
    Json(mut req): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let message = required(req.message.take(), "Message is required")?;
    let (messages, context) = conversation(&mut req, message);

    let mut deltas = ctx
        .chatbot
        .chat_stream(&messages, &context)
        .await
        .map_err(service_error)?;

    let stream = async_stream::stream! {
        while let Some(item) = deltas.next().await {
            match item {
                Ok(text) => {
                    yield Ok(Event::default().event("delta").data(text));
                }
                Err(e) => {
                    tracing::error!("Chat stream failed: {}", e);
                    yield Ok(Event::default().event("error").data(e.kind.to_string()));
                    break;
                }
            }
        }
        yield Ok(Event::default().event("done").data(""));
    };

    Ok(Sse::new(stream))
}

/// POST /api/search
pub(super) async fn search(
    State(ctx): State<Arc<AppContext>>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponseBody>, ApiError> {
    let query = required(req.query, "Query is required")?;
    let options = SearchOptions {
        top_k: req.top_k.unwrap_or(SearchOptions::default().top_k),
        filters: req.filters,
        user_id: req.user_id,
    };

    let response = ctx.search.search(&query, &options).await;
    Ok(Json(SearchResponseBody {
        success: true,
        count: response.results.len(),
        results: response.results,
        parsed_query: response.parsed_query,
        cached: response.cached,
        fallback: response.fallback,
        message: response.message,
    }))
}

/// GET /api/suggestions?q=&limit=
pub(super) async fn suggestions(
    State(ctx): State<Arc<AppContext>>,
    Query(query): Query<SuggestionsQuery>,
) -> Json<SuggestionsResponse> {
    let partial = query.q.unwrap_or_default();
    let limit = query.limit.unwrap_or(DEFAULT_SUGGESTIONS);
    Json(SuggestionsResponse {
        success: true,
        suggestions: ctx.search.suggestions(&partial, limit).await,
    })
}

/// POST /api/match
pub(super) async fn find_matches(
    State(ctx): State<Arc<AppContext>>,
    Json(req): Json<MatchRequest>,
) -> Result<Json<MatchResponseBody>, ApiError> {
    let goal = required(req.goal, "Goal is required")?;
    let profile = MenteeProfile {
        goal,
        zone: req.zone,
        current_role: req.current_role,
        experience_level: req.experience_level,
        specific_needs: req.specific_needs,
        preferred_language: req.preferred_language,
    };
    let defaults = MatchOptions::default();
    let options = MatchOptions {
        top_k: req.top_k.unwrap_or(defaults.top_k),
        zone: None,
        max_budget: req.budget,
        include_explanation: req.include_explanation.unwrap_or(defaults.include_explanation),
    };

    tracing::debug!(user = ?req.user_id, "Match request");
    let response = ctx.matching.find_matches(&profile, &options).await;
    Ok(Json(MatchResponseBody {
        success: true,
        count: response.matches.len(),
        matches: response.matches,
        warning: response.warning,
    }))
}

/// POST /api/session/process
pub(super) async fn process_session(
    State(ctx): State<Arc<AppContext>>,
    Json(req): Json<SessionRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    let audio_url = required(req.audio_url, "audioUrl is required")?;
    let outcome = ctx
        .sessions
        .process_session(&AudioSource::Url(audio_url), &req.session)
        .await
        .map_err(service_error)?;
    Ok(Json(SessionResponse {
        success: true,
        outcome,
    }))
}

fn matching_enabled(ctx: &AppContext) -> Result<(), ApiError> {
    if ctx.matching.is_enabled() {
        Ok(())
    } else {
        Err(service_error(ServiceError::CapabilityDisabled(Capability::Matching)))
    }
}

/// POST /api/mentors
pub(super) async fn index_mentor(
    State(ctx): State<Arc<AppContext>>,
    Json(mentor): Json<MentorProfile>,
) -> Result<Json<MentorIndexResponse>, ApiError> {
    matching_enabled(&ctx)?;
    if mentor.id.trim().is_empty() {
        return Err(bad_request("Mentor id is required"));
    }
    ctx.matching
        .index_mentor(&mentor)
        .await
        .map_err(|e| service_error(e.into()))?;
    Ok(Json(MentorIndexResponse {
        success: true,
        mentor_id: mentor.id,
    }))
}

/// PUT /api/mentors/:id
pub(super) async fn update_mentor(
    State(ctx): State<Arc<AppContext>>,
    Path(id): Path<String>,
    Json(mut mentor): Json<MentorProfile>,
) -> Result<Json<MentorIndexResponse>, ApiError> {
    matching_enabled(&ctx)?;
    mentor.id = id;
    ctx.matching
        .update_mentor(&mentor)
        .await
        .map_err(|e| service_error(e.into()))?;
    Ok(Json(MentorIndexResponse {
        success: true,
        mentor_id: mentor.id,
    }))
}

/// DELETE /api/mentors/:id
pub(super) async fn remove_mentor(
    State(ctx): State<Arc<AppContext>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    matching_enabled(&ctx)?;
    ctx.matching
        .remove_mentor(&id)
        .await
        .map_err(|e| service_error(e.into()))?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/stats
pub(super) async fn stats(
    State(ctx): State<Arc<AppContext>>,
    Query(query): Query<StatsQuery>,
) -> Json<StatsResponse> {
    Json(StatsResponse {
        success: true,
        stats: ctx.ledger.get_stats().await,
        breakdown: ctx.ledger.cost_breakdown(query.date).await,
        cache: ctx.cache.stats().await,
        features: ctx.config.features,
    })
}

/// GET /api/health
pub(super) async fn health(State(ctx): State<Arc<AppContext>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: ctx.clock.now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        features: ctx.config.features,
    })
}
