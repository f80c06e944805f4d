//! In-process vector index for mock mode and local development.

use async_trait::async_trait;
use std::sync::RwLock;

use super::{MentorCandidate, MentorFilter, MentorMetadata, VectorIndex};
use crate::llm::ProviderError;

struct Entry {
    mentor_id: String,
    vector: Vec<f32>,
    metadata: MentorMetadata,
}

/// Brute-force cosine index held in memory.
#[derive(Default)]
pub struct MemoryIndex {
    entries: RwLock<Vec<Entry>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

fn poisoned() -> ProviderError {
    ProviderError::network("memory", "index lock poisoned")
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: &MentorFilter,
    ) -> Result<Vec<MentorCandidate>, ProviderError> {
        let entries = self.entries.read().map_err(|_| poisoned())?;
        let mut hits: Vec<MentorCandidate> = entries
            .iter()
            .filter(|e| filter.matches(&e.metadata))
            .map(|e| MentorCandidate {
                mentor_id: e.mentor_id.clone(),
                semantic_score: cosine(vector, &e.vector),
                metadata: e.metadata.clone(),
            })
            .collect();
        hits.sort_by(|a, b| b.semantic_score.total_cmp(&a.semantic_score));
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn upsert(
        &self,
        mentor_id: &str,
        vector: Vec<f32>,
        metadata: &MentorMetadata,
    ) -> Result<(), ProviderError> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        match entries.iter_mut().find(|e| e.mentor_id == mentor_id) {
            Some(entry) => {
                entry.vector = vector;
                entry.metadata = metadata.clone();
            }
            None => entries.push(Entry {
                mentor_id: mentor_id.to_string(),
                vector,
                metadata: metadata.clone(),
            }),
        }
        Ok(())
    }

    async fn delete(&self, mentor_id: &str) -> Result<(), ProviderError> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        entries.retain(|e| e.mentor_id != mentor_id);
        Ok(())
    }
}
