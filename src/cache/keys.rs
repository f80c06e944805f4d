//! Cache key derivation.
//!
//! Keys are pure functions of their input so repeated identical requests land
//! on the same entry.

use base64::Engine;
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Length of the encoded-content slice used in chat keys.
const CHAT_KEY_LEN: usize = 50;

/// Phrases that mark a chat message as an FAQ worth caching.
pub const FAQ_TERMS: &[&str] = &[
    "how to",
    "what is",
    "price",
    "payment",
    "bkash",
    "nagad",
    "কিভাবে",
    "কত",
    "দাম",
];

/// Key for a chat reply, built from the latest user message.
pub fn chat_key(content: &str) -> String {
    let encoded = base64::engine::general_purpose::STANDARD.encode(content.as_bytes());
    // base64 output is ASCII, so byte slicing is safe.
    let end = encoded.len().min(CHAT_KEY_LEN);
    format!("chat:{}", &encoded[..end])
}

/// Key for a search result set: the normalized query plus its options.
pub fn search_key<O: Serialize>(query: &str, options: &O) -> String {
    let normalized = normalize_query(query);
    let options = serde_json::to_string(options).unwrap_or_default();

    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    hasher.update([0u8]);
    hasher.update(options.as_bytes());
    format!("search:{}", hex::encode(hasher.finalize()))
}

/// Whether a chat message looks like a frequently asked question.
pub fn is_cacheable_chat(content: &str) -> bool {
    let lower = content.to_lowercase();
    FAQ_TERMS.iter().any(|term| lower.contains(term))
}

fn normalize_query(query: &str) -> String {
    query
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
