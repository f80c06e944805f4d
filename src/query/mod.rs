//! Query understanding: free text to a structured mentor query.
//!
//! A single JSON-mode completion extracts intent, zone, keywords and an
//! enriched retrieval string. Anything the model gets wrong degrades to
//! [`ParsedQuery::fallback`], never to an error.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::budget::BudgetLedger;
use crate::index::MentorFilter;
use crate::llm::{extract_json, ChatMessage, CompletionOptions, SharedProvider};

/// Mentorship service zones offered on the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Zone {
    Career,
    #[serde(rename = "Data/AI")]
    DataAi,
    #[serde(rename = "Study Abroad")]
    StudyAbroad,
    Business,
    Design,
    Finance,
    Marketing,
    Engineering,
    Healthcare,
    Legal,
    #[serde(rename = "Personal Development")]
    PersonalDevelopment,
}

impl Zone {
    pub const ALL: [Zone; 11] = [
        Zone::Career,
        Zone::DataAi,
        Zone::StudyAbroad,
        Zone::Business,
        Zone::Design,
        Zone::Finance,
        Zone::Marketing,
        Zone::Engineering,
        Zone::Healthcare,
        Zone::Legal,
        Zone::PersonalDevelopment,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Zone::Career => "Career",
            Zone::DataAi => "Data/AI",
            Zone::StudyAbroad => "Study Abroad",
            Zone::Business => "Business",
            Zone::Design => "Design",
            Zone::Finance => "Finance",
            Zone::Marketing => "Marketing",
            Zone::Engineering => "Engineering",
            Zone::Healthcare => "Healthcare",
            Zone::Legal => "Legal",
            Zone::PersonalDevelopment => "Personal Development",
        }
    }

    /// Lenient match on a zone name. Case, spacing and separators are ignored.
    pub fn parse(value: &str) -> Option<Zone> {
        let squashed: String = value
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect::<String>()
            .to_lowercase();
        match squashed.as_str() {
            "career" | "careerguidance" => Some(Zone::Career),
            "dataai" | "data" | "ai" | "datascience" => Some(Zone::DataAi),
            "studyabroad" => Some(Zone::StudyAbroad),
            "business" | "businessstrategy" => Some(Zone::Business),
            "design" | "designux" | "ux" => Some(Zone::Design),
            "finance" => Some(Zone::Finance),
            "marketing" => Some(Zone::Marketing),
            "engineering" => Some(Zone::Engineering),
            "healthcare" => Some(Zone::Healthcare),
            "legal" => Some(Zone::Legal),
            "personaldevelopment" => Some(Zone::PersonalDevelopment),
            _ => None,
        }
    }

    /// Comma-separated labels for prompts.
    pub fn prompt_list() -> String {
        Zone::ALL.iter().map(Zone::label).collect::<Vec<_>>().join(", ")
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Seniority the mentee asked for or has.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExperienceLevel {
    Beginner,
    MidLevel,
    Senior,
    Expert,
}

impl ExperienceLevel {
    pub fn label(&self) -> &'static str {
        match self {
            ExperienceLevel::Beginner => "beginner",
            ExperienceLevel::MidLevel => "mid-level",
            ExperienceLevel::Senior => "senior",
            ExperienceLevel::Expert => "expert",
        }
    }

    pub fn parse(value: &str) -> Option<ExperienceLevel> {
        let normalized = value.trim().to_lowercase().replace([' ', '_'], "-");
        match normalized.as_str() {
            "beginner" | "entry-level" | "entry" | "junior" | "fresher" => {
                Some(ExperienceLevel::Beginner)
            }
            "mid-level" | "mid" | "midlevel" | "intermediate" => Some(ExperienceLevel::MidLevel),
            "senior" => Some(ExperienceLevel::Senior),
            "expert" | "advanced" => Some(ExperienceLevel::Expert),
            _ => None,
        }
    }
}

impl fmt::Display for ExperienceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Structured form of a free-text mentor query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedQuery {
    pub intent: String,
    pub zone: Option<Zone>,
    pub keywords: Vec<String>,
    pub experience_level: Option<ExperienceLevel>,
    pub specific_requirements: Vec<String>,
    /// Text fed to the embedding model.
    pub enriched_query: String,
}

impl ParsedQuery {
    /// Minimal query used whenever extraction fails.
    pub fn fallback(text: &str) -> Self {
        Self {
            intent: String::new(),
            zone: None,
            keywords: Vec::new(),
            experience_level: None,
            specific_requirements: Vec::new(),
            enriched_query: text.to_string(),
        }
    }

    /// Interpret the model's JSON. `None` when it is unusable.
    fn from_model_output(text: &str) -> Option<Self> {
        let raw: RawParsedQuery = match serde_json::from_str(extract_json(text)) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!("Query parser returned invalid JSON: {}", e);
                return None;
            }
        };

        let enriched_query = raw.enriched_query.unwrap_or_default().trim().to_string();
        if enriched_query.is_empty() {
            tracing::warn!("Query parser returned no enriched query");
            return None;
        }

        Some(Self {
            intent: raw.intent.unwrap_or_default(),
            zone: raw.zone.as_deref().and_then(Zone::parse),
            keywords: clean_list(raw.keywords),
            experience_level: raw.experience_level.as_deref().and_then(ExperienceLevel::parse),
            specific_requirements: clean_list(raw.specific_requirements),
            enriched_query,
        })
    }
}

/// Model output before validation. Every field is optional.
#[derive(Debug, Default, Deserialize)]
struct RawParsedQuery {
    #[serde(default)]
    intent: Option<String>,
    #[serde(default)]
    zone: Option<String>,
    #[serde(default)]
    keywords: Option<Vec<String>>,
    #[serde(default, alias = "experienceLevel")]
    experience_level: Option<String>,
    #[serde(default, alias = "specificRequirements")]
    specific_requirements: Option<Vec<String>>,
    #[serde(default, rename = "enrichedQuery", alias = "enriched_query")]
    enriched_query: Option<String>,
}

fn clean_list(items: Option<Vec<String>>) -> Vec<String> {
    items
        .unwrap_or_default()
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Caller-supplied search filters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchFilters {
    pub zone: Option<String>,
    /// Maximum rate per minute in BDT.
    pub max_budget: Option<f64>,
    pub language: Option<String>,
}

impl MentorFilter {
    /// Filter for a search: verified mentors, explicit filters first, then
    /// the zone the parser detected.
    pub fn for_search(parsed: &ParsedQuery, filters: &SearchFilters) -> Self {
        let zone = filters
            .zone
            .clone()
            .or_else(|| parsed.zone.map(|z| z.label().to_string()));
        Self {
            verified_only: true,
            available_only: false,
            zone,
            max_rate: filters.max_budget,
            language: filters.language.clone(),
        }
    }
}

const PARSE_PROMPT: &str = r#"Parse this mentor search query and extract structured information.

Query: "{query}"

Extract the following as JSON:
{
  "intent": "What the user is trying to achieve (1 sentence)",
  "zone": "Which mentorship zone? ({zones}, or null)",
  "keywords": ["important", "keywords", "to", "search"],
  "experience_level": "Experience level mentioned (beginner/mid-level/senior/expert or null)",
  "specific_requirements": ["any", "specific", "requirements"],
  "enrichedQuery": "Expanded version of the query with synonyms and related terms"
}

Examples:

Query: "someone who can help me get into Stanford"
{
  "intent": "Looking for study abroad guidance for Stanford admission",
  "zone": "Study Abroad",
  "keywords": ["Stanford", "admission", "university", "application"],
  "experience_level": null,
  "specific_requirements": ["Stanford", "top university"],
  "enrichedQuery": "Study abroad mentor with experience in Stanford admission, top university applications, Ivy League, competitive admissions, application strategy"
}

Query: "আমার startup এর জন্য business strategy mentor দরকার"
{
  "intent": "Need business strategy guidance for a startup",
  "zone": "Business",
  "keywords": ["startup", "business strategy", "entrepreneur"],
  "experience_level": null,
  "specific_requirements": ["startup experience"],
  "enrichedQuery": "Business strategy mentor with startup experience, entrepreneurship, business planning, growth strategy, startup scaling"
}"#;

const SUGGESTIONS_PROMPT: &str = r#"Generate {limit} autocomplete suggestions for this partial search query in a mentorship platform:

Partial query: "{query}"

Available zones: {zones}

Return as a JSON object of the form {"suggestions": ["suggestion 1", "suggestion 2", ...]}

Make suggestions natural and helpful."#;

/// Turns free text into [`ParsedQuery`] and autocomplete suggestions.
pub struct QueryParser {
    provider: SharedProvider,
    ledger: Arc<BudgetLedger>,
}

impl QueryParser {
    pub fn new(provider: SharedProvider, ledger: Arc<BudgetLedger>) -> Self {
        Self { provider, ledger }
    }

    /// Parse a query. Never fails; unusable model output yields the fallback.
    pub async fn parse(&self, text: &str) -> ParsedQuery {
        let text = text.trim();
        if text.is_empty() {
            return ParsedQuery::fallback(text);
        }

        let prompt = PARSE_PROMPT
            .replace("{query}", text)
            .replace("{zones}", &Zone::prompt_list());
        let options = CompletionOptions::default().with_temperature(0.1).json();

        let completion = match self
            .provider
            .complete(&[ChatMessage::user(prompt)], &options)
            .await
        {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!("Query parsing failed, using raw query: {}", e);
                return ParsedQuery::fallback(text);
            }
        };

        self.ledger
            .track_cost(
                "query-parsing",
                self.provider.cost(&completion.usage),
                completion.usage.to_json(),
            )
            .await;

        match ParsedQuery::from_model_output(&completion.text) {
            Some(parsed) => {
                tracing::debug!(zone = ?parsed.zone, keywords = parsed.keywords.len(), "Parsed query");
                parsed
            }
            None => ParsedQuery::fallback(text),
        }
    }

    /// Autocomplete suggestions for a partial query.
    ///
    /// Inputs shorter than two characters, denied budget and provider failures
    /// all yield an empty list.
    pub async fn suggestions(&self, partial: &str, limit: usize) -> Vec<String> {
        let partial = partial.trim();
        if partial.chars().count() < 2 || limit == 0 {
            return Vec::new();
        }
        if !self.ledger.check_budget("autocomplete").await {
            return Vec::new();
        }

        let prompt = SUGGESTIONS_PROMPT
            .replace("{limit}", &limit.to_string())
            .replace("{query}", partial)
            .replace("{zones}", &Zone::prompt_list());
        let options = CompletionOptions::default()
            .with_temperature(0.7)
            .with_max_tokens(150)
            .json();

        let completion = match self
            .provider
            .complete(&[ChatMessage::user(prompt)], &options)
            .await
        {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!("Suggestion request failed: {}", e);
                return Vec::new();
            }
        };

        self.ledger
            .track_cost(
                "autocomplete",
                self.provider.cost(&completion.usage),
                completion.usage.to_json(),
            )
            .await;

        parse_suggestions(&completion.text, limit)
    }
}

fn parse_suggestions(text: &str, limit: usize) -> Vec<String> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Reply {
        Wrapped { suggestions: Vec<String> },
        Bare(Vec<String>),
    }

    let items = match serde_json::from_str::<Reply>(extract_json(text)) {
        Ok(Reply::Wrapped { suggestions }) | Ok(Reply::Bare(suggestions)) => suggestions,
        Err(e) => {
            tracing::warn!("Unreadable suggestions: {}", e);
            return Vec::new();
        }
    };

    clean_list(Some(items)).into_iter().take(limit).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ledger, ManualClock, StubProvider};
    use std::sync::atomic::Ordering;

    fn parser(provider: Arc<StubProvider>) -> (QueryParser, Arc<BudgetLedger>) {
        let ledger = ledger(Arc::new(ManualClock::at(2026, 3, 14)));
        (QueryParser::new(provider, ledger.clone()), ledger)
    }

    #[test]
    fn test_zone_parse_is_lenient() {
        assert_eq!(Zone::parse("Data/AI"), Some(Zone::DataAi));
        assert_eq!(Zone::parse("study abroad"), Some(Zone::StudyAbroad));
        assert_eq!(Zone::parse("PERSONAL_DEVELOPMENT"), Some(Zone::PersonalDevelopment));
        assert_eq!(Zone::parse("null"), None);
        assert_eq!(Zone::parse("Astrology"), None);
    }

    #[test]
    fn test_zone_serializes_as_label() {
        assert_eq!(serde_json::to_value(Zone::DataAi).unwrap(), "Data/AI");
        assert_eq!(Zone::ALL.len(), 11);
    }

    #[test]
    fn test_experience_level_parse() {
        assert_eq!(ExperienceLevel::parse("Mid Level"), Some(ExperienceLevel::MidLevel));
        assert_eq!(ExperienceLevel::parse("senior"), Some(ExperienceLevel::Senior));
        assert_eq!(ExperienceLevel::parse("guru"), None);
        assert_eq!(
            serde_json::to_value(ExperienceLevel::MidLevel).unwrap(),
            "mid-level"
        );
    }

    #[tokio::test]
    async fn test_parse_reads_model_json() {
        let provider = Arc::new(StubProvider::new());
        provider.push_reply(
            r#"{"intent":"Get into Stanford","zone":"Study Abroad","keywords":["Stanford"," admission "],
                "experience_level":"Beginner","specific_requirements":[],
                "enrichedQuery":"Study abroad mentor Stanford admission"}"#,
        );
        let (parser, ledger) = parser(provider.clone());

        let parsed = parser.parse("help me get into Stanford").await;
        assert_eq!(parsed.zone, Some(Zone::StudyAbroad));
        assert_eq!(parsed.keywords, vec!["Stanford", "admission"]);
        assert_eq!(parsed.experience_level, Some(ExperienceLevel::Beginner));
        assert_eq!(parsed.enriched_query, "Study abroad mentor Stanford admission");

        let breakdown = ledger.cost_breakdown(None).await;
        assert_eq!(breakdown["query-parsing"].count, 1);
    }

    #[tokio::test]
    async fn test_parse_unknown_enums_become_none() {
        let provider = Arc::new(StubProvider::new());
        provider.push_reply(
            r#"{"intent":"x","zone":"Astrology","keywords":[],"experience_level":"wizard","enrichedQuery":"stars"}"#,
        );
        let (parser, _) = parser(provider);

        let parsed = parser.parse("astrology mentor").await;
        assert_eq!(parsed.zone, None);
        assert_eq!(parsed.experience_level, None);
        assert_eq!(parsed.enriched_query, "stars");
    }

    #[tokio::test]
    async fn test_parse_falls_back_on_bad_output() {
        let provider = Arc::new(StubProvider::new());
        provider.push_reply("I think you want a finance mentor!");
        provider.push_reply(r#"{"intent":"x","enrichedQuery":"   "}"#);
        provider.push_failure();
        let (parser, _) = parser(provider.clone());

        for _ in 0..3 {
            let parsed = parser.parse("finance mentor").await;
            assert_eq!(parsed, ParsedQuery::fallback("finance mentor"));
        }
        assert_eq!(provider.complete_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_parse_empty_query_skips_provider() {
        let provider = Arc::new(StubProvider::new());
        let (parser, _) = parser(provider.clone());
        assert_eq!(parser.parse("   ").await.enriched_query, "");
        assert_eq!(provider.total_calls(), 0);
    }

    #[test]
    fn test_filter_for_search() {
        let mut parsed = ParsedQuery::fallback("q");
        parsed.zone = Some(Zone::Finance);

        let filter = MentorFilter::for_search(&parsed, &SearchFilters::default());
        assert!(filter.verified_only);
        assert_eq!(filter.zone.as_deref(), Some("Finance"));

        let explicit = SearchFilters {
            zone: Some("Legal".into()),
            max_budget: Some(150.0),
            language: Some("bn".into()),
        };
        let filter = MentorFilter::for_search(&parsed, &explicit);
        assert_eq!(filter.zone.as_deref(), Some("Legal"));
        assert_eq!(filter.max_rate, Some(150.0));
        assert_eq!(filter.language.as_deref(), Some("bn"));
    }

    #[tokio::test]
    async fn test_suggestions() {
        let provider = Arc::new(StubProvider::new());
        provider.push_reply(r#"{"suggestions":["data science mentor","data engineer","", "data analyst"]}"#);
        let (parser, _) = parser(provider.clone());

        assert!(parser.suggestions("d", 5).await.is_empty());
        assert_eq!(provider.total_calls(), 0);

        let suggestions = parser.suggestions("data", 2).await;
        assert_eq!(suggestions, vec!["data science mentor", "data engineer"]);
    }

    #[test]
    fn test_parse_suggestions_accepts_bare_array() {
        assert_eq!(parse_suggestions(r#"["a","b"]"#, 5), vec!["a", "b"]);
        assert!(parse_suggestions("nope", 5).is_empty());
    }
}
