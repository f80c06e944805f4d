//! Multi-factor re-ranking of retrieval candidates.

use serde::{Deserialize, Serialize};

use crate::index::{MentorCandidate, MentorMetadata};

pub const SEMANTIC_WEIGHT: f64 = 0.4;
pub const RATING_WEIGHT: f64 = 0.3;
pub const RESPONSE_WEIGHT: f64 = 0.15;
pub const AVAILABILITY_WEIGHT: f64 = 0.1;
pub const COMPLETION_WEIGHT: f64 = 0.05;

/// Used when a mentor has no response-rate history.
pub const DEFAULT_RESPONSE_RATE: f64 = 0.8;
/// Used when a mentor has no completed-session history.
pub const DEFAULT_COMPLETION_RATE: f64 = 0.9;

const MAX_RATING: f64 = 5.0;

/// Weighted contribution of each signal to the final score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub semantic: f64,
    pub rating: f64,
    pub response: f64,
    pub availability: f64,
    pub completion: f64,
}

impl ScoreBreakdown {
    pub fn compute(semantic_score: f64, metadata: &MentorMetadata) -> Self {
        let rating = metadata.rating.unwrap_or(0.0);
        let response = metadata.response_rate.unwrap_or(DEFAULT_RESPONSE_RATE);
        let load = metadata.current_load.unwrap_or(0.0);
        let completion = metadata.completion_rate.unwrap_or(DEFAULT_COMPLETION_RATE);

        Self {
            semantic: semantic_score * SEMANTIC_WEIGHT,
            rating: (rating / MAX_RATING) * RATING_WEIGHT,
            response: response * RESPONSE_WEIGHT,
            availability: (1.0 - load) * AVAILABILITY_WEIGHT,
            completion: completion * COMPLETION_WEIGHT,
        }
    }

    pub fn total(&self) -> f64 {
        self.semantic + self.rating + self.response + self.availability + self.completion
    }
}

/// Display fields of a mentor returned to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MentorSummary {
    pub id: String,
    pub name: Option<String>,
    pub headline: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub zones: Vec<String>,
    pub rate_per_minute: Option<f64>,
    pub rating: Option<f64>,
    pub total_sessions: Option<u64>,
    pub response_rate: Option<f64>,
    pub years_experience: Option<f64>,
    pub company: Option<String>,
    pub is_available_now: bool,
}

impl MentorSummary {
    pub fn new(id: &str, metadata: &MentorMetadata) -> Self {
        Self {
            id: id.to_string(),
            name: metadata.name.clone(),
            headline: metadata.headline.clone(),
            bio: metadata.bio.clone(),
            avatar_url: metadata.avatar_url.clone(),
            zones: metadata.zones.clone(),
            rate_per_minute: metadata.rate_per_minute,
            rating: metadata.rating,
            total_sessions: metadata.total_sessions,
            response_rate: metadata.response_rate,
            years_experience: metadata.years_experience,
            company: metadata.company.clone(),
            is_available_now: metadata.is_available_now,
        }
    }
}

/// A candidate after re-ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedMatch {
    pub mentor_id: String,
    pub final_score: f64,
    pub score_breakdown: ScoreBreakdown,
    pub mentor: MentorSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

/// Score and order candidates, best first.
///
/// Ties keep their input order. The result depends only on the inputs.
pub fn rerank(candidates: &[MentorCandidate]) -> Vec<RankedMatch> {
    let mut ranked: Vec<RankedMatch> = candidates
        .iter()
        .map(|candidate| {
            let breakdown = ScoreBreakdown::compute(candidate.semantic_score, &candidate.metadata);
            RankedMatch {
                mentor_id: candidate.mentor_id.clone(),
                final_score: breakdown.total(),
                score_breakdown: breakdown,
                mentor: MentorSummary::new(&candidate.mentor_id, &candidate.metadata),
                explanation: None,
            }
        })
        .collect();

    ranked.sort_by(|a, b| b.final_score.total_cmp(&a.final_score));
    ranked
}
