//! Typed provider failures.
//!
//! Every call into an external AI service (completion, embedding,
//! transcription, vector index) fails with a [`ProviderError`]. Adapters never
//! retry on their own.

use std::fmt;
use std::time::Duration;

/// Broad classification of a provider failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// Connection refused, DNS, timeout.
    Network,
    /// HTTP 429.
    RateLimited,
    /// HTTP 5xx.
    ServerError,
    /// HTTP 4xx other than 429 (bad key, bad request).
    ClientError,
    /// The service answered but the body could not be understood.
    Parse,
    /// The provider does not offer this capability.
    Unsupported,
    /// Credentials or endpoint are missing from the configuration.
    NotConfigured,
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Network => "network error",
            Self::RateLimited => "rate limited",
            Self::ServerError => "server error",
            Self::ClientError => "client error",
            Self::Parse => "parse error",
            Self::Unsupported => "unsupported",
            Self::NotConfigured => "not configured",
        };
        write!(f, "{}", s)
    }
}

/// A failed call to an external AI service.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{provider}: {kind}: {message}")]
pub struct ProviderError {
    pub provider: String,
    pub kind: ProviderErrorKind,
    pub message: String,
    /// Server-suggested wait before retrying (from `Retry-After`).
    pub retry_after: Option<Duration>,
}

impl ProviderError {
    pub fn new(provider: impl Into<String>, kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            kind,
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn network(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(provider, ProviderErrorKind::Network, message)
    }

    pub fn parse(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(provider, ProviderErrorKind::Parse, message)
    }

    pub fn unsupported(provider: impl Into<String>, capability: &str) -> Self {
        Self::new(
            provider,
            ProviderErrorKind::Unsupported,
            format!("{} is not supported by this provider", capability),
        )
    }

    pub fn not_configured(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(provider, ProviderErrorKind::NotConfigured, message)
    }

    /// Build an error from a non-success HTTP response.
    pub fn from_status(
        provider: impl Into<String>,
        status: u16,
        body: &str,
        retry_after: Option<Duration>,
    ) -> Self {
        let mut err = Self::new(provider, classify_http_status(status), format!("HTTP {}: {}", status, body));
        err.retry_after = retry_after;
        err
    }

    /// Map a reqwest transport error.
    pub fn from_reqwest(provider: impl Into<String>, e: &reqwest::Error) -> Self {
        let message = if e.is_timeout() {
            format!("Request timeout: {}", e)
        } else if e.is_connect() {
            format!("Connection failed: {}", e)
        } else if e.is_decode() {
            return Self::parse(provider, format!("Failed to decode response: {}", e));
        } else {
            format!("Request failed: {}", e)
        };
        Self::network(provider, message)
    }
}

/// Classify an HTTP status code into an error kind.
pub fn classify_http_status(status: u16) -> ProviderErrorKind {
    match status {
        429 => ProviderErrorKind::RateLimited,
        500..=599 => ProviderErrorKind::ServerError,
        400..=499 => ProviderErrorKind::ClientError,
        _ => ProviderErrorKind::ServerError,
    }
}

/// Parse a `Retry-After` header given in seconds.
pub(crate) fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}
