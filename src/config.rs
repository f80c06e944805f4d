//! Configuration management.
//!
//! Configuration is read once from environment variables at startup and
//! shared as `Arc<Config>`. Feature flags are plain field reads afterwards.
//!
//! # Environment Variables
//!
//! ## LLM
//! - `LLM_PROVIDER` - `groq` (default) or `openai`
//! - `AI_CHAT_TEMPERATURE` - Chat sampling temperature. Defaults to `0.7`
//! - `AI_CHAT_MAX_TOKENS` - Chat reply length cap. Defaults to `500`
//! - `GROQ_API_KEY`, `GROQ_MODEL`, `GROQ_BASE_URL`
//! - `OPENAI_API_KEY`, `OPENAI_ORGANIZATION_ID`, `OPENAI_MODEL_CHAT`,
//!   `OPENAI_MODEL_EMBEDDINGS`, `OPENAI_MODEL_TRANSCRIPTION`, `OPENAI_BASE_URL`
//!
//! ## Vector index
//! - `PINECONE_API_KEY`, `PINECONE_INDEX_HOST`, `PINECONE_NAMESPACE`
//!
//! ## Features (all default to `false`)
//! - `AI_CHATBOT_ENABLED`, `AI_MATCHING_ENABLED`, `AI_TRANSCRIPTION_ENABLED`
//!
//! ## Costs
//! - `AI_DAILY_BUDGET_USD` (50), `AI_MONTHLY_BUDGET_USD` (1500),
//!   `AI_COST_ALERT_THRESHOLD` (0.8), `AI_USD_TO_BDT_RATE` (110)
//!
//! ## Cache and storage
//! - `AI_CACHE_ENABLED`, `AI_CACHE_TTL_SECONDS` (3600)
//! - `AI_STORAGE_BACKEND` - `memory` (default) or `sqlite`
//! - `AI_STORAGE_PATH` - sqlite file. Defaults to `./data/truetalk-ai.db`
//!
//! ## Monitoring and development
//! - `AI_LOGGING_ENABLED`, `AI_LOG_LEVEL` (info)
//! - `AI_DEV_MODE`, `AI_MOCK_RESPONSES`, `AI_SKIP_COST_CHECKS`
//!
//! ## Server
//! - `HOST` (127.0.0.1), `PORT` (3000)

use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::budget::BudgetLimits;

/// Which backend serves chat completions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    Groq,
    OpenAi,
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            LlmProvider::Groq => "groq",
            LlmProvider::OpenAi => "openai",
        }
    }
}

impl FromStr for LlmProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "groq" => Ok(LlmProvider::Groq),
            "openai" => Ok(LlmProvider::OpenAi),
            other => Err(format!("unknown LLM provider: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub temperature: f64,
    pub max_tokens: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub organization_id: Option<String>,
    pub chat_model: String,
    pub embedding_model: String,
    pub transcription_model: String,
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroqConfig {
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PineconeConfig {
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub index_host: Option<String>,
    pub namespace: Option<String>,
}

/// Capability switches.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeatureFlags {
    pub chatbot: bool,
    pub matching: bool,
    pub transcription: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostConfig {
    pub daily_budget_usd: f64,
    pub monthly_budget_usd: f64,
    pub alert_threshold: f64,
    pub usd_to_bdt_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub enabled: bool,
    pub ttl_seconds: u64,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

/// Where ledger counters and cache entries live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Sqlite,
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "memory" => Ok(StorageBackend::Memory),
            "sqlite" => Ok(StorageBackend::Sqlite),
            other => Err(format!("unknown storage backend: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    pub logging: bool,
    pub log_level: String,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DevConfig {
    pub dev_mode: bool,
    pub mock_responses: bool,
    pub skip_cost_checks: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Immutable service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub llm: LlmConfig,
    pub openai: OpenAiConfig,
    pub groq: GroqConfig,
    pub pinecone: PineconeConfig,
    pub features: FeatureFlags,
    pub costs: CostConfig,
    pub cache: CacheConfig,
    pub storage: StorageConfig,
    pub monitoring: MonitoringConfig,
    pub dev: DevConfig,
    pub server: ServerConfig,
    /// Values that were rejected while loading, reported once logging is up.
    #[serde(skip)]
    pub load_warnings: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            llm: LlmConfig {
                provider: LlmProvider::Groq,
                temperature: 0.7,
                max_tokens: 500,
            },
            openai: OpenAiConfig {
                api_key: None,
                organization_id: None,
                chat_model: "gpt-4o-mini".to_string(),
                embedding_model: "text-embedding-3-small".to_string(),
                transcription_model: "whisper-1".to_string(),
                base_url: None,
            },
            groq: GroqConfig {
                api_key: None,
                model: "llama-3.3-70b-versatile".to_string(),
                base_url: None,
            },
            pinecone: PineconeConfig::default(),
            features: FeatureFlags::default(),
            costs: CostConfig {
                daily_budget_usd: 50.0,
                monthly_budget_usd: 1500.0,
                alert_threshold: 0.8,
                usd_to_bdt_rate: 110.0,
            },
            cache: CacheConfig {
                enabled: false,
                ttl_seconds: 3600,
            },
            storage: StorageConfig {
                backend: StorageBackend::Memory,
                path: PathBuf::from("./data/truetalk-ai.db"),
            },
            monitoring: MonitoringConfig {
                logging: false,
                log_level: "info".to_string(),
            },
            dev: DevConfig::default(),
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 3000,
            },
            load_warnings: Vec::new(),
        }
    }
}

/// Typed reads over a variable lookup, falling back to defaults.
struct Env<F> {
    lookup: F,
    warnings: RefCell<Vec<String>>,
}

impl<F: Fn(&str) -> Option<String>> Env<F> {
    /// Non-empty trimmed value.
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn string_or(&self, name: &str, default: &str) -> String {
        self.string(name).unwrap_or_else(|| default.to_string())
    }

    fn flag(&self, name: &str) -> bool {
        self.string(name)
            .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
            .unwrap_or(false)
    }

    fn parse_or<T: FromStr>(&self, name: &str, default: T) -> T
    where
        T::Err: std::fmt::Display,
    {
        match self.string(name) {
            Some(raw) => match raw.parse::<T>() {
                Ok(value) => value,
                Err(e) => {
                    self.warn(format!("Invalid {}={:?} ({}), using default", name, raw, e));
                    default
                }
            },
            None => default,
        }
    }

    fn warn(&self, message: String) {
        self.warnings.borrow_mut().push(message);
    }

    /// Finite non-negative number.
    fn amount_or(&self, name: &str, default: f64) -> f64 {
        let value = self.parse_or(name, default);
        if value.is_finite() && value >= 0.0 {
            value
        } else {
            self.warn(format!(
                "Invalid {}={} (must be a non-negative number), using default",
                name, value
            ));
            default
        }
    }
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable lookup.
    pub fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Self {
        let env = Env {
            lookup,
            warnings: RefCell::new(Vec::new()),
        };
        let defaults = Self::default();

        let llm = LlmConfig {
            provider: env.parse_or("LLM_PROVIDER", defaults.llm.provider),
            temperature: env.amount_or("AI_CHAT_TEMPERATURE", defaults.llm.temperature),
            max_tokens: env.parse_or("AI_CHAT_MAX_TOKENS", defaults.llm.max_tokens),
        };

        let openai = OpenAiConfig {
            api_key: env.string("OPENAI_API_KEY"),
            organization_id: env.string("OPENAI_ORGANIZATION_ID"),
            chat_model: env.string_or("OPENAI_MODEL_CHAT", &defaults.openai.chat_model),
            embedding_model: env.string_or("OPENAI_MODEL_EMBEDDINGS", &defaults.openai.embedding_model),
            transcription_model: env
                .string_or("OPENAI_MODEL_TRANSCRIPTION", &defaults.openai.transcription_model),
            base_url: env.string("OPENAI_BASE_URL"),
        };

        let groq = GroqConfig {
            api_key: env.string("GROQ_API_KEY"),
            model: env.string_or("GROQ_MODEL", &defaults.groq.model),
            base_url: env.string("GROQ_BASE_URL"),
        };

        let pinecone = PineconeConfig {
            api_key: env.string("PINECONE_API_KEY"),
            index_host: env.string("PINECONE_INDEX_HOST"),
            namespace: env.string("PINECONE_NAMESPACE"),
        };

        let features = FeatureFlags {
            chatbot: env.flag("AI_CHATBOT_ENABLED"),
            matching: env.flag("AI_MATCHING_ENABLED"),
            transcription: env.flag("AI_TRANSCRIPTION_ENABLED"),
        };

        let costs = CostConfig {
            daily_budget_usd: env.amount_or("AI_DAILY_BUDGET_USD", defaults.costs.daily_budget_usd),
            monthly_budget_usd: env.amount_or("AI_MONTHLY_BUDGET_USD", defaults.costs.monthly_budget_usd),
            alert_threshold: env.amount_or("AI_COST_ALERT_THRESHOLD", defaults.costs.alert_threshold),
            usd_to_bdt_rate: env.amount_or("AI_USD_TO_BDT_RATE", defaults.costs.usd_to_bdt_rate),
        };

        let cache = CacheConfig {
            enabled: env.flag("AI_CACHE_ENABLED"),
            ttl_seconds: env.parse_or("AI_CACHE_TTL_SECONDS", defaults.cache.ttl_seconds),
        };

        let storage = StorageConfig {
            backend: env.parse_or("AI_STORAGE_BACKEND", defaults.storage.backend),
            path: env
                .string("AI_STORAGE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.storage.path),
        };

        let monitoring = MonitoringConfig {
            logging: env.flag("AI_LOGGING_ENABLED"),
            log_level: env.string_or("AI_LOG_LEVEL", &defaults.monitoring.log_level),
        };

        let dev = DevConfig {
            dev_mode: env.flag("AI_DEV_MODE"),
            mock_responses: env.flag("AI_MOCK_RESPONSES"),
            skip_cost_checks: env.flag("AI_SKIP_COST_CHECKS"),
        };

        let server = ServerConfig {
            host: env.string_or("HOST", &defaults.server.host),
            port: env.parse_or("PORT", defaults.server.port),
        };

        Self {
            llm,
            openai,
            groq,
            pinecone,
            features,
            costs,
            cache,
            storage,
            monitoring,
            dev,
            server,
            load_warnings: env.warnings.into_inner(),
        }
    }

    /// Check that every enabled capability has the credentials it needs.
    pub fn validate(&self) -> anyhow::Result<()> {
        let mut errors: Vec<String> = Vec::new();

        if !self.dev.mock_responses {
            match self.llm.provider {
                LlmProvider::Groq if self.groq.api_key.is_none() => {
                    errors.push("GROQ_API_KEY is required when LLM_PROVIDER=groq".to_string());
                }
                LlmProvider::OpenAi if self.openai.api_key.is_none() => {
                    errors.push("OPENAI_API_KEY is required when LLM_PROVIDER=openai".to_string());
                }
                _ => {}
            }

            if self.features.matching {
                if self.pinecone.api_key.is_none() {
                    errors.push("PINECONE_API_KEY is required when AI_MATCHING_ENABLED is true".to_string());
                }
                if self.pinecone.index_host.is_none() {
                    errors.push("PINECONE_INDEX_HOST is required when AI_MATCHING_ENABLED is true".to_string());
                }
            }
        }

        let base_urls = [
            ("OPENAI_BASE_URL", &self.openai.base_url),
            ("GROQ_BASE_URL", &self.groq.base_url),
        ];
        for (name, value) in base_urls {
            if let Some(raw) = value {
                if let Err(e) = url::Url::parse(raw) {
                    errors.push(format!("{} is not a valid URL ({}): {}", name, e, raw));
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            anyhow::bail!("AI configuration errors:\n{}", errors.join("\n"))
        }
    }

    /// Budget limits for the ledger.
    pub fn budget_limits(&self) -> BudgetLimits {
        BudgetLimits {
            daily_usd: self.costs.daily_budget_usd,
            monthly_usd: self.costs.monthly_budget_usd,
            alert_threshold: self.costs.alert_threshold,
            skip_checks: self.dev.skip_cost_checks,
        }
    }

    /// Address the HTTP server binds to.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults_are_disabled_and_in_memory() {
        let config = config_from(&[]);
        assert_eq!(config.llm.provider, LlmProvider::Groq);
        assert_eq!(config.features, FeatureFlags::default());
        assert!(!config.cache.enabled);
        assert_eq!(config.cache.ttl_seconds, 3600);
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.costs.daily_budget_usd, 50.0);
        assert_eq!(config.costs.monthly_budget_usd, 1500.0);
        assert_eq!(config.costs.usd_to_bdt_rate, 110.0);
        assert_eq!(config.groq.model, "llama-3.3-70b-versatile");
        assert_eq!(config.openai.embedding_model, "text-embedding-3-small");
        assert_eq!(config.server.port, 3000);
    }

    #[test]
    fn test_reads_values() {
        let config = config_from(&[
            ("LLM_PROVIDER", "OpenAI"),
            ("OPENAI_API_KEY", "sk-test"),
            ("AI_CHATBOT_ENABLED", "true"),
            ("AI_MATCHING_ENABLED", "false"),
            ("AI_DAILY_BUDGET_USD", "10.5"),
            ("AI_CACHE_ENABLED", "true"),
            ("AI_CACHE_TTL_SECONDS", "60"),
            ("AI_STORAGE_BACKEND", "sqlite"),
            ("AI_STORAGE_PATH", "/tmp/ai.db"),
            ("AI_SKIP_COST_CHECKS", "true"),
            ("PORT", "8080"),
        ]);
        assert_eq!(config.llm.provider, LlmProvider::OpenAi);
        assert_eq!(config.openai.api_key.as_deref(), Some("sk-test"));
        assert!(config.features.chatbot);
        assert!(!config.features.matching);
        assert_eq!(config.costs.daily_budget_usd, 10.5);
        assert_eq!(config.cache.ttl(), Duration::from_secs(60));
        assert_eq!(config.storage.backend, StorageBackend::Sqlite);
        assert_eq!(config.storage.path, PathBuf::from("/tmp/ai.db"));
        assert!(config.budget_limits().skip_checks);
        assert_eq!(config.bind_addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = config_from(&[
            ("AI_DAILY_BUDGET_USD", "lots"),
            ("AI_MONTHLY_BUDGET_USD", "-5"),
            ("PORT", "99999"),
            ("LLM_PROVIDER", "anthropic"),
            ("AI_CHATBOT_ENABLED", "yes please"),
            ("GROQ_API_KEY", "   "),
        ]);
        assert_eq!(config.costs.daily_budget_usd, 50.0);
        assert_eq!(config.costs.monthly_budget_usd, 1500.0);
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.llm.provider, LlmProvider::Groq);
        assert!(!config.features.chatbot);
        assert!(config.groq.api_key.is_none());

        assert_eq!(config.load_warnings.len(), 4);
        assert!(config.load_warnings[0].contains("LLM_PROVIDER"));
        assert!(config.load_warnings.iter().any(|w| w.contains("AI_MONTHLY_BUDGET_USD")));
        assert!(config_from(&[]).load_warnings.is_empty());
    }

    #[test]
    fn test_validate_requires_provider_key() {
        let err = config_from(&[]).validate().unwrap_err();
        assert!(err.to_string().contains("GROQ_API_KEY"));

        assert!(config_from(&[("GROQ_API_KEY", "gsk")]).validate().is_ok());
        assert!(config_from(&[("AI_MOCK_RESPONSES", "true")]).validate().is_ok());

        let err = config_from(&[("LLM_PROVIDER", "openai"), ("GROQ_API_KEY", "gsk")])
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }

    #[test]
    fn test_validate_requires_pinecone_for_matching() {
        let err = config_from(&[("GROQ_API_KEY", "gsk"), ("AI_MATCHING_ENABLED", "true")])
            .validate()
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("PINECONE_API_KEY"));
        assert!(message.contains("PINECONE_INDEX_HOST"));

        let ok = config_from(&[
            ("GROQ_API_KEY", "gsk"),
            ("AI_MATCHING_ENABLED", "true"),
            ("PINECONE_API_KEY", "pc"),
            ("PINECONE_INDEX_HOST", "mentors-abc.svc.pinecone.io"),
        ]);
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_base_url() {
        let err = config_from(&[("AI_MOCK_RESPONSES", "true"), ("GROQ_BASE_URL", "not a url")])
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("GROQ_BASE_URL"));

        let ok = config_from(&[("AI_MOCK_RESPONSES", "true"), ("OPENAI_BASE_URL", "http://localhost:8080/v1")]);
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn test_serialized_config_hides_keys() {
        let config = config_from(&[("OPENAI_API_KEY", "sk-secret")]);
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("sk-secret"));
    }
}
