//! Mentor matching: embed the mentee profile, retrieve, re-rank, explain.
//!
//! Every failure path returns an empty list with a warning. Callers render
//! the warning and fall back to manual browsing.

mod rerank;

pub use rerank::{
    rerank, MentorSummary, RankedMatch, ScoreBreakdown, AVAILABILITY_WEIGHT, COMPLETION_WEIGHT,
    DEFAULT_COMPLETION_RATE, DEFAULT_RESPONSE_RATE, RATING_WEIGHT, RESPONSE_WEIGHT,
    SEMANTIC_WEIGHT,
};

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::budget::BudgetLedger;
use crate::index::{MentorFilter, MentorMetadata, SharedIndex};
use crate::llm::{ChatMessage, CompletionOptions, ProviderError, SharedProvider};

/// Number of top matches that receive a generated explanation.
pub const EXPLAINED_MATCHES: usize = 3;

/// Candidates retrieved per requested match.
const RETRIEVAL_FACTOR: usize = 3;

const DISABLED_WARNING: &str = "AI matching is currently disabled";
const BUDGET_WARNING: &str = "AI matching is temporarily at capacity";
const UNAVAILABLE_WARNING: &str = "AI matching is temporarily unavailable";

/// What the mentee is looking for.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenteeProfile {
    pub goal: String,
    pub zone: Option<String>,
    pub current_role: Option<String>,
    pub experience_level: Option<String>,
    pub specific_needs: Option<String>,
    pub preferred_language: Option<String>,
}

impl MenteeProfile {
    /// Text embedded for retrieval.
    pub fn query_text(&self) -> String {
        let mut parts = Vec::new();
        if !self.goal.trim().is_empty() {
            parts.push(format!("Goal: {}", self.goal.trim()));
        }
        let optional = [
            ("Zone", &self.zone),
            ("Current role", &self.current_role),
            ("Experience level", &self.experience_level),
            ("Specific needs", &self.specific_needs),
            ("Preferred language", &self.preferred_language),
        ];
        for (label, value) in optional {
            if let Some(value) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
                parts.push(format!("{}: {}", label, value));
            }
        }
        parts.join("\n")
    }

    fn writes_bengali(&self) -> bool {
        self.preferred_language.as_deref() == Some("bn")
    }
}

/// Knobs for a match request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MatchOptions {
    pub top_k: usize,
    pub zone: Option<String>,
    /// Maximum rate per minute in BDT.
    pub max_budget: Option<f64>,
    pub include_explanation: bool,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            top_k: 10,
            zone: None,
            max_budget: None,
            include_explanation: true,
        }
    }
}

/// Ranked matches, or an empty list and the reason.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchResponse {
    pub matches: Vec<RankedMatch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl MatchResponse {
    fn unavailable(warning: &str) -> Self {
        tracing::warn!("Using fallback matching: {}", warning);
        Self {
            matches: Vec::new(),
            warning: Some(warning.to_string()),
        }
    }
}

/// A mentor profile as maintained by the marketplace, for indexing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MentorProfile {
    pub id: String,
    pub full_name: String,
    pub headline: String,
    pub bio: String,
    pub zones: Vec<String>,
    pub skills: Vec<String>,
    pub rate_per_minute: Option<f64>,
    pub average_rating: Option<f64>,
    pub total_sessions: Option<u64>,
    pub response_rate: Option<f64>,
    pub years_experience: Option<f64>,
    pub company: Option<String>,
    pub languages: Vec<String>,
    pub is_available: bool,
    pub is_verified: bool,
    pub is_available_now: bool,
    pub current_load: Option<f64>,
    pub session_completion_rate: Option<f64>,
    pub avatar_url: Option<String>,
}

impl MentorProfile {
    /// Text embedded for the mentor's vector.
    pub fn profile_text(&self) -> String {
        let mut text = format!(
            "{}\n\nBio: {}\n\nSpecializations: {}",
            self.headline,
            self.bio,
            self.zones.join(", ")
        );
        if let Some(years) = self.years_experience {
            match &self.company {
                Some(company) => text.push_str(&format!("\n\nExperience: {} years at {}", years, company)),
                None => text.push_str(&format!("\n\nExperience: {} years", years)),
            }
        }
        if !self.skills.is_empty() {
            text.push_str(&format!("\n\nSkills: {}", self.skills.join(", ")));
        }
        text.trim().to_string()
    }

    /// Index metadata with defaults for a mentor without history.
    pub fn metadata(&self) -> MentorMetadata {
        MentorMetadata {
            name: Some(self.full_name.clone()),
            headline: Some(self.headline.clone()),
            bio: Some(self.bio.clone()),
            company: self.company.clone(),
            avatar_url: self.avatar_url.clone(),
            years_experience: self.years_experience,
            total_sessions: Some(self.total_sessions.unwrap_or(0)),
            rating: Some(self.average_rating.unwrap_or(0.0)),
            response_rate: Some(self.response_rate.unwrap_or(1.0)),
            current_load: Some(self.current_load.unwrap_or(0.0)),
            completion_rate: Some(self.session_completion_rate.unwrap_or(1.0)),
            rate_per_minute: self.rate_per_minute,
            zones: self.zones.clone(),
            languages: if self.languages.is_empty() {
                vec!["en".to_string(), "bn".to_string()]
            } else {
                self.languages.clone()
            },
            is_verified: self.is_verified,
            is_available: self.is_available,
            is_available_now: self.is_available_now,
        }
    }
}

/// Matches mentees with mentors.
pub struct MatchingEngine {
    enabled: bool,
    provider: SharedProvider,
    index: SharedIndex,
    ledger: Arc<BudgetLedger>,
}

impl MatchingEngine {
    pub fn new(
        enabled: bool,
        provider: SharedProvider,
        index: SharedIndex,
        ledger: Arc<BudgetLedger>,
    ) -> Self {
        Self {
            enabled,
            provider,
            index,
            ledger,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Find the best mentors for `profile`.
    pub async fn find_matches(&self, profile: &MenteeProfile, options: &MatchOptions) -> MatchResponse {
        if !self.enabled {
            return MatchResponse::unavailable(DISABLED_WARNING);
        }
        if !self.ledger.check_budget("matching").await {
            return MatchResponse::unavailable(BUDGET_WARNING);
        }

        match self.run_match(profile, options).await {
            Ok(matches) => {
                tracing::info!("Matching returned {} mentors", matches.len());
                MatchResponse {
                    matches,
                    warning: None,
                }
            }
            Err(e) => {
                tracing::error!("Matching failed: {}", e);
                MatchResponse::unavailable(UNAVAILABLE_WARNING)
            }
        }
    }

    async fn run_match(
        &self,
        profile: &MenteeProfile,
        options: &MatchOptions,
    ) -> Result<Vec<RankedMatch>, ProviderError> {
        let top_k = options.top_k.max(1);
        let vector = self.embed("embedding", &profile.query_text()).await?;

        let filter = MentorFilter {
            verified_only: true,
            available_only: true,
            zone: options.zone.clone().or_else(|| profile.zone.clone()),
            max_rate: options.max_budget,
            language: profile.preferred_language.clone(),
        };

        let candidates = self
            .index
            .query(&vector, top_k * RETRIEVAL_FACTOR, &filter)
            .await?;
        tracing::debug!("Retrieved {} candidates for re-ranking", candidates.len());

        let mut ranked = rerank(&candidates);
        if options.include_explanation {
            self.add_match_explanations(&mut ranked, profile).await;
        }
        ranked.truncate(top_k);
        Ok(ranked)
    }

    /// Attach a short explanation to each of the top matches.
    ///
    /// A failed explanation leaves the field unset; ordering never changes.
    pub async fn add_match_explanations(&self, ranked: &mut [RankedMatch], profile: &MenteeProfile) {
        for m in ranked.iter_mut().take(EXPLAINED_MATCHES) {
            match self.generate_explanation(m, profile).await {
                Ok(text) if !text.is_empty() => m.explanation = Some(text),
                Ok(_) => tracing::debug!("Empty explanation for {}", m.mentor_id),
                Err(e) => tracing::warn!("Explanation for {} failed: {}", m.mentor_id, e),
            }
        }
    }

    async fn generate_explanation(
        &self,
        m: &RankedMatch,
        profile: &MenteeProfile,
    ) -> Result<String, ProviderError> {
        let mentor = &m.mentor;
        let name = mentor.name.as_deref().unwrap_or("This mentor");
        let prompt = format!(
            "Explain in 1-2 sentences why {name} is a good match for this mentee.\n\n\
             Mentee Profile:\n- Goal: {goal}\n- Zone: {zone}\n- Experience: {level}\n\n\
             Mentor Profile:\n- Name: {name}\n- Headline: {headline}\n- Zones: {zones}\n\
             - Experience: {years} years\n- Company: {company}\n- Rating: {rating}/5\n\n\
             Be specific and encouraging. Write in {language}.",
            name = name,
            goal = profile.goal,
            zone = profile.zone.as_deref().unwrap_or("any"),
            level = profile.experience_level.as_deref().unwrap_or("unspecified"),
            headline = mentor.headline.as_deref().unwrap_or(""),
            zones = mentor.zones.join(", "),
            years = mentor.years_experience.map(|y| y.to_string()).unwrap_or_else(|| "?".into()),
            company = mentor.company.as_deref().unwrap_or("independent"),
            rating = mentor.rating.unwrap_or(0.0),
            language = if profile.writes_bengali() { "Bengali" } else { "English" },
        );

        let options = CompletionOptions::default()
            .with_temperature(0.7)
            .with_max_tokens(100);
        let completion = self
            .provider
            .complete(&[ChatMessage::user(prompt)], &options)
            .await?;

        self.ledger
            .track_cost(
                "matching-explanation",
                self.provider.cost(&completion.usage),
                completion.usage.to_json(),
            )
            .await;

        Ok(completion.text.trim().to_string())
    }

    /// Embed and upsert a mentor.
    pub async fn index_mentor(&self, mentor: &MentorProfile) -> Result<(), ProviderError> {
        let vector = self.embed("embedding", &mentor.profile_text()).await?;
        self.index.upsert(&mentor.id, vector, &mentor.metadata()).await?;
        tracing::info!("Indexed mentor {}", mentor.id);
        Ok(())
    }

    pub async fn remove_mentor(&self, mentor_id: &str) -> Result<(), ProviderError> {
        self.index.delete(mentor_id).await?;
        tracing::info!("Removed mentor {}", mentor_id);
        Ok(())
    }

    /// Replace a mentor's vector and metadata.
    pub async fn update_mentor(&self, mentor: &MentorProfile) -> Result<(), ProviderError> {
        self.remove_mentor(&mentor.id).await?;
        self.index_mentor(mentor).await
    }

    async fn embed(&self, service: &str, text: &str) -> Result<Vec<f32>, ProviderError> {
        let embedding = self.provider.embed(text).await?;
        self.ledger
            .track_cost(
                service,
                self.provider.cost(&embedding.usage),
                embedding.usage.to_json(),
            )
            .await;
        Ok(embedding.vector)
    }
}
