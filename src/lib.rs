//! # TrueTalk AI
//!
//! Cost-governed AI backend for the TrueTalk mentorship marketplace.
//!
//! This library provides:
//! - A semantic mentor search and a mentee/mentor matching engine
//! - A support chatbot (English and Bengali)
//! - Session transcription, analysis and follow-up emails
//! - An HTTP API over all of the above
//!
//! ## Request Pipeline
//!
//! ```text
//!   request ──▶ feature flag ──▶ budget check ──▶ cache ──▶ provider
//!                    │                 │             │          │
//!                    ▼                 ▼             ▼          ▼
//!                fallback          fallback       cached    track cost
//! ```
//!
//! Every paid call goes through the [`budget::BudgetLedger`]. When a
//! capability is off, the budget is spent, or a provider fails, callers get
//! a degraded answer instead of an error wherever one makes sense.
//!
//! ## Modules
//! - `budget`: Daily/monthly spend ledger and provider pricing
//! - `cache`: TTL response cache
//! - `llm`: Provider adapter (OpenAI, Groq, mock)
//! - `index`: Vector index of mentor profiles (Pinecone, in-memory)
//! - `query`: Natural-language query understanding
//! - `matching`: Re-ranking engine and match pipeline
//! - `search`: Hybrid semantic search
//! - `chat`: Support chatbot
//! - `session`: Session intelligence
//! - `api`: HTTP surface

pub mod api;
pub mod budget;
pub mod cache;
pub mod chat;
pub mod clock;
pub mod config;
pub mod context;
pub mod error;
pub mod index;
pub mod llm;
pub mod matching;
pub mod query;
pub mod search;
pub mod session;
pub mod storage;

#[cfg(test)]
mod testing;

pub use config::Config;
pub use context::AppContext;
pub use error::{Capability, ServiceError};
