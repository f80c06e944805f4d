//! Vector index of mentor profiles.
//!
//! The index is the retrieval half of the provider adapter: it turns a query
//! embedding plus a metadata filter into scored [`MentorCandidate`]s.

mod memory;
mod pinecone;

pub use memory::MemoryIndex;
pub use pinecone::PineconeIndex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::llm::ProviderError;

/// Metadata stored next to each mentor vector.
///
/// Field names on the wire follow the index schema (`average_rating`,
/// `session_completion_rate`, ...). Optional business signals fall back to
/// the re-ranking defaults when absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MentorMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headline: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub years_experience: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_sessions: Option<u64>,

    /// Average review score on a 0-5 scale.
    #[serde(rename = "average_rating", default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    /// Fraction of booking requests answered (0-1).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_rate: Option<f64>,
    /// Fraction of capacity already booked (0-1).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_load: Option<f64>,
    /// Fraction of booked sessions that were completed (0-1).
    #[serde(rename = "session_completion_rate", default, skip_serializing_if = "Option::is_none")]
    pub completion_rate: Option<f64>,
    /// Price in BDT per minute.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_per_minute: Option<f64>,

    #[serde(default)]
    pub zones: Vec<String>,
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default)]
    pub is_verified: bool,
    #[serde(default)]
    pub is_available: bool,
    #[serde(default)]
    pub is_available_now: bool,
}

/// A retrieval hit from the vector index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MentorCandidate {
    pub mentor_id: String,
    pub semantic_score: f64,
    pub metadata: MentorMetadata,
}

/// Metadata filter applied to a vector query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MentorFilter {
    pub verified_only: bool,
    pub available_only: bool,
    pub zone: Option<String>,
    pub max_rate: Option<f64>,
    pub language: Option<String>,
}

impl MentorFilter {
    /// Render as a Pinecone metadata filter.
    pub fn to_pinecone(&self) -> serde_json::Value {
        let mut filter = serde_json::Map::new();
        if self.verified_only {
            filter.insert("is_verified".into(), serde_json::json!({ "$eq": true }));
        }
        if self.available_only {
            filter.insert("is_available".into(), serde_json::json!({ "$eq": true }));
        }
        if let Some(zone) = &self.zone {
            filter.insert("zones".into(), serde_json::json!({ "$in": [zone] }));
        }
        if let Some(max_rate) = self.max_rate {
            filter.insert("rate_per_minute".into(), serde_json::json!({ "$lte": max_rate }));
        }
        if let Some(language) = &self.language {
            filter.insert("languages".into(), serde_json::json!({ "$in": [language] }));
        }
        serde_json::Value::Object(filter)
    }

    /// Evaluate the filter against metadata in-process.
    pub fn matches(&self, metadata: &MentorMetadata) -> bool {
        if self.verified_only && !metadata.is_verified {
            return false;
        }
        if self.available_only && !metadata.is_available {
            return false;
        }
        if let Some(zone) = &self.zone {
            if !metadata.zones.iter().any(|z| z == zone) {
                return false;
            }
        }
        if let Some(max_rate) = self.max_rate {
            match metadata.rate_per_minute {
                Some(rate) if rate <= max_rate => {}
                _ => return false,
            }
        }
        if let Some(language) = &self.language {
            if !metadata.languages.iter().any(|l| l == language) {
                return false;
            }
        }
        true
    }
}

/// Trait for vector stores holding mentor embeddings.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Nearest neighbours of `vector` that pass `filter`, best first.
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: &MentorFilter,
    ) -> Result<Vec<MentorCandidate>, ProviderError>;

    /// Insert or replace a mentor vector.
    async fn upsert(
        &self,
        mentor_id: &str,
        vector: Vec<f32>,
        metadata: &MentorMetadata,
    ) -> Result<(), ProviderError>;

    /// Remove a mentor vector.
    async fn delete(&self, mentor_id: &str) -> Result<(), ProviderError>;
}

/// Shared index handle.
pub type SharedIndex = Arc<dyn VectorIndex>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_uses_index_field_names() {
        let json = serde_json::json!({
            "name": "Rahim",
            "average_rating": 4.5,
            "session_completion_rate": 0.95,
            "zones": ["Career"],
            "is_verified": true
        });
        let meta: MentorMetadata = serde_json::from_value(json).unwrap();
        assert_eq!(meta.rating, Some(4.5));
        assert_eq!(meta.completion_rate, Some(0.95));
        assert_eq!(meta.response_rate, None);
        assert!(!meta.is_available);
    }

    #[test]
    fn test_filter_to_pinecone() {
        let filter = MentorFilter {
            verified_only: true,
            available_only: false,
            zone: Some("Finance".into()),
            max_rate: Some(200.0),
            language: Some("bn".into()),
        };
        let json = filter.to_pinecone();
        assert_eq!(json["is_verified"]["$eq"], true);
        assert!(json.get("is_available").is_none());
        assert_eq!(json["zones"]["$in"][0], "Finance");
        assert_eq!(json["rate_per_minute"]["$lte"], 200.0);
        assert_eq!(json["languages"]["$in"][0], "bn");
    }

    #[test]
    fn test_filter_matches() {
        let meta = MentorMetadata {
            zones: vec!["Career".into()],
            languages: vec!["en".into()],
            is_verified: true,
            is_available: true,
            rate_per_minute: Some(150.0),
            ..Default::default()
        };
        let mut filter = MentorFilter {
            verified_only: true,
            available_only: true,
            zone: Some("Career".into()),
            max_rate: Some(150.0),
            language: Some("en".into()),
        };
        assert!(filter.matches(&meta));

        filter.max_rate = Some(100.0);
        assert!(!filter.matches(&meta));

        filter.max_rate = None;
        filter.language = Some("bn".into());
        assert!(!filter.matches(&meta));
    }
}
