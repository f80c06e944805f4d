//! Service-level error taxonomy.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::llm::ProviderError;

/// Feature flags gating AI capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Chatbot,
    Matching,
    Transcription,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Chatbot => write!(f, "chatbot"),
            Capability::Matching => write!(f, "matching"),
            Capability::Transcription => write!(f, "transcription"),
        }
    }
}

/// Why a request could not be served normally.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("AI {0} is currently disabled")]
    CapabilityDisabled(Capability),

    #[error("AI budget exhausted for {service}")]
    BudgetExceeded { service: String },

    #[error(transparent)]
    ProviderUnavailable(#[from] ProviderError),

    #[error("{0}")]
    Validation(String),
}

impl ServiceError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn budget(service: impl Into<String>) -> Self {
        Self::BudgetExceeded {
            service: service.into(),
        }
    }

    /// HTTP status for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::CapabilityDisabled(_) | Self::BudgetExceeded { .. } => 503,
            Self::ProviderUnavailable(_) => 502,
            Self::Validation(_) => 400,
        }
    }
}
