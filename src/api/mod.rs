//! HTTP API for the AI features.
//!
//! Handlers are thin: they validate input, call into the engines held by
//! [`AppContext`](crate::context::AppContext) and shape the JSON the
//! frontend expects. Degraded engine results still answer `200` with
//! `success: true`; only validation, disabled capabilities and provider
//! failures map to error statuses.

mod handlers;
mod routes;
mod types;

pub use routes::{router, serve};
pub use types::*;
