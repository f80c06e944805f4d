//! Session intelligence: transcribe a recorded session, extract insights and
//! draft follow-up emails for both participants.

use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::sync::Arc;

use crate::budget::BudgetLedger;
use crate::error::{Capability, ServiceError};
use crate::llm::{extract_json, AudioSource, ChatMessage, CompletionOptions, ProviderError, SharedProvider, Transcription};

const ANALYST_PROMPT: &str =
    "You are an expert at analyzing mentorship sessions and extracting valuable insights.";

const MINIMAL_NOTE: &str =
    "Full transcription unavailable due to budget constraints. Upgrade to access AI-powered session insights.";

/// Session metadata supplied by the booking system.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionData {
    pub id: String,
    pub zone: String,
    pub duration_minutes: u32,
    pub mentor_name: String,
    pub mentee_name: String,
    /// `bn` for Bengali emails, English otherwise.
    pub language: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionItem {
    pub description: String,
    pub assignee: String,
    pub priority: String,
    pub deadline: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotableQuote {
    pub quote: String,
    pub speaker: String,
    pub significance: String,
}

/// Structured analysis of a session transcript.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionInsights {
    pub summary: String,
    pub key_topics: Vec<String>,
    pub action_items: Vec<ActionItem>,
    pub notable_quotes: Vec<NotableQuote>,
    pub resources_mentioned: Vec<String>,
    pub follow_up_topics: Vec<String>,
    pub mentee_goals: Vec<String>,
    pub mentor_advice: Vec<String>,
    pub session_quality_score: f64,
    pub engagement_level: String,
    pub recommended_next_steps: Vec<String>,
}

/// Follow-up emails as HTML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowUpEmails {
    pub mentee: String,
    pub mentor: String,
}

/// Result of processing a session.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SessionOutcome {
    Processed {
        transcript: Transcription,
        insights: SessionInsights,
        emails: FollowUpEmails,
    },
    /// Budget did not allow transcription.
    Minimal { summary: String, note: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Recipient {
    Mentee,
    Mentor,
}

/// Processes recorded mentorship sessions.
pub struct SessionIntelligence {
    enabled: bool,
    provider: SharedProvider,
    ledger: Arc<BudgetLedger>,
}

impl SessionIntelligence {
    pub fn new(enabled: bool, provider: SharedProvider, ledger: Arc<BudgetLedger>) -> Self {
        Self {
            enabled,
            provider,
            ledger,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Transcribe, analyze and draft emails for one session.
    pub async fn process_session(
        &self,
        audio: &AudioSource,
        session: &SessionData,
    ) -> Result<SessionOutcome, ServiceError> {
        if !self.enabled {
            return Err(ServiceError::CapabilityDisabled(Capability::Transcription));
        }
        if !self.ledger.check_budget("transcription").await {
            tracing::warn!("Budget exhausted, returning minimal summary for session {}", session.id);
            return Ok(SessionOutcome::Minimal {
                summary: format!(
                    "{} mentorship session between {} and {}.",
                    session.zone, session.mentor_name, session.mentee_name
                ),
                note: MINIMAL_NOTE.to_string(),
            });
        }

        tracing::info!("Processing session {}", session.id);

        let transcript = self.transcribe(audio).await?;
        let insights = self.analyze(&transcript, session).await?;
        let emails = FollowUpEmails {
            mentee: self.follow_up_email(&insights, session, Recipient::Mentee).await?,
            mentor: self.follow_up_email(&insights, session, Recipient::Mentor).await?,
        };

        tracing::info!(
            session_id = %session.id,
            topics = insights.key_topics.len(),
            action_items = insights.action_items.len(),
            "Session processed"
        );

        Ok(SessionOutcome::Processed {
            transcript,
            insights,
            emails,
        })
    }

    async fn transcribe(&self, audio: &AudioSource) -> Result<Transcription, ProviderError> {
        let transcript = self.provider.transcribe(audio).await?;
        let usage = transcript.usage;
        self.ledger
            .track_cost(
                "transcription",
                self.provider.cost(&usage),
                serde_json::json!({
                    "duration_minutes": transcript.duration_seconds / 60.0,
                    "language": transcript.language,
                }),
            )
            .await;
        Ok(transcript)
    }

    async fn analyze(
        &self,
        transcript: &Transcription,
        session: &SessionData,
    ) -> Result<SessionInsights, ProviderError> {
        let messages = [
            ChatMessage::system(ANALYST_PROMPT),
            ChatMessage::user(analysis_prompt(transcript, session)),
        ];
        let options = CompletionOptions::default().with_temperature(0.3).json();
        let completion = self.provider.complete(&messages, &options).await?;

        self.ledger
            .track_cost(
                "session-analysis",
                self.provider.cost(&completion.usage),
                completion.usage.to_json(),
            )
            .await;

        serde_json::from_str(extract_json(&completion.text)).map_err(|e| {
            ProviderError::parse(
                self.provider.name(),
                format!("Session analysis was not valid JSON: {}", e),
            )
        })
    }

    async fn follow_up_email(
        &self,
        insights: &SessionInsights,
        session: &SessionData,
        recipient: Recipient,
    ) -> Result<String, ProviderError> {
        let (recipient_label, other_label, other_name, closing) = match recipient {
            Recipient::Mentee => ("mentee", "Mentor", &session.mentor_name, "booking another session"),
            Recipient::Mentor => ("mentor", "Mentee", &session.mentee_name, "staying available"),
        };
        let action_items = insights
            .action_items
            .iter()
            .map(|item| format!("- {}", item.description))
            .collect::<Vec<_>>()
            .join("\n");

        let prompt = format!(
            "Create a follow-up email for the {recipient_label} after this mentorship session.\n\n\
             **Session Details:**\n- Zone: {zone}\n- Duration: {duration} minutes\n- {other_label}: {other_name}\n\n\
             **Session Summary:**\n{summary}\n\n\
             **Key Topics:**\n{topics}\n\n\
             **Action Items:**\n{action_items}\n\n\
             **Create an email that:**\n\
             1. Thanks them for the session\n\
             2. Highlights 1-2 key takeaways\n\
             3. Lists their specific action items (if any)\n\
             4. Recommends next steps\n\
             5. Encourages {closing}\n\n\
             Keep it concise (under 250 words), warm, and encouraging.\n\
             Write in {language}.\n\
             Format as clean HTML for email.",
            zone = session.zone,
            duration = session.duration_minutes,
            summary = insights.summary,
            topics = insights.key_topics.join(", "),
            language = language_name(session.language.as_deref()),
        );

        let options = CompletionOptions::default()
            .with_temperature(0.7)
            .with_max_tokens(500);
        let completion = self
            .provider
            .complete(&[ChatMessage::user(prompt)], &options)
            .await?;

        self.ledger
            .track_cost(
                "email-generation",
                self.provider.cost(&completion.usage),
                completion.usage.to_json(),
            )
            .await;

        Ok(completion.text)
    }
}

fn language_name(code: Option<&str>) -> &'static str {
    if code == Some("bn") {
        "Bengali"
    } else {
        "English"
    }
}

fn analysis_prompt(transcript: &Transcription, session: &SessionData) -> String {
    format!(
        r#"Analyze this mentorship session transcript and provide comprehensive insights.

**Session Details:**
- Zone: {zone}
- Duration: {duration} minutes
- Mentor: {mentor}
- Mentee: {mentee}

**Transcript:**
{text}

**Generate the following in JSON format:**

{{
  "summary": "3-sentence executive summary of the session",
  "key_topics": ["topic1", "topic2", "topic3"],
  "action_items": [
    {{
      "description": "Action item description",
      "assignee": "mentee/mentor",
      "priority": "high/medium/low",
      "deadline": "suggested deadline if mentioned, or null"
    }}
  ],
  "notable_quotes": [
    {{
      "quote": "Exact quote from transcript",
      "speaker": "mentor/mentee",
      "significance": "Why this quote is important"
    }}
  ],
  "resources_mentioned": ["resource1", "resource2"],
  "follow_up_topics": ["topic1", "topic2"],
  "mentee_goals": ["goal1", "goal2"],
  "mentor_advice": ["key advice 1", "key advice 2"],
  "session_quality_score": 0-10,
  "engagement_level": "high/medium/low",
  "recommended_next_steps": ["step1", "step2"]
}}

**Guidelines:**
- Be specific and actionable
- Extract verbatim quotes for notable_quotes
- Identify concrete action items with deadlines
- Suggest realistic follow-up topics
- Write in the same language as the transcript ({language})"#,
        zone = session.zone,
        duration = session.duration_minutes,
        mentor = session.mentor_name,
        mentee = session.mentee_name,
        text = transcript.text,
        language = language_name(transcript.language.as_deref()),
    )
}

/// Render insights as markdown for the session page.
pub fn format_insights_for_display(insights: &SessionInsights) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Session Summary\n\n{}\n", insights.summary);

    let _ = writeln!(out, "## Key Topics Discussed");
    push_bullets(&mut out, &insights.key_topics);

    let _ = writeln!(out, "\n## Action Items");
    for item in &insights.action_items {
        let _ = writeln!(out, "- [ ] {} ({} priority)", item.description, item.priority);
        let _ = writeln!(out, "  - Assignee: {}", item.assignee);
        if let Some(deadline) = item.deadline.as_deref().filter(|d| !d.is_empty()) {
            let _ = writeln!(out, "  - Deadline: {}", deadline);
        }
    }

    let _ = writeln!(out, "\n## Notable Quotes");
    for q in &insights.notable_quotes {
        let _ = writeln!(out, "> \"{}\"\n> - {}\n\n*{}*\n", q.quote, q.speaker, q.significance);
    }

    let _ = writeln!(out, "## Resources Mentioned");
    push_bullets(&mut out, &insights.resources_mentioned);

    let _ = writeln!(out, "\n## Recommended Next Steps");
    push_bullets(&mut out, &insights.recommended_next_steps);

    let _ = writeln!(out, "\n## Follow-up Topics for Future Sessions");
    push_bullets(&mut out, &insights.follow_up_topics);

    let _ = writeln!(
        out,
        "\n---\n\n**Session Quality Score:** {}/10\n**Engagement Level:** {}",
        insights.session_quality_score, insights.engagement_level
    );

    out.trim().to_string()
}

fn push_bullets(out: &mut String, items: &[String]) {
    for item in items {
        let _ = writeln!(out, "- {}", item);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{TranscriptSegment, Usage};
    use crate::testing::{exhausted_ledger, ledger, ManualClock, StubProvider};

    const INSIGHTS: &str = r#"{
        "summary": "Discussed a move into data science.",
        "key_topics": ["SQL", "portfolio"],
        "action_items": [{"description": "Finish SQL course", "assignee": "mentee", "priority": "high", "deadline": null}],
        "notable_quotes": [{"quote": "Ship small projects", "speaker": "mentor", "significance": "Core advice"}],
        "resources_mentioned": ["Kaggle"],
        "follow_up_topics": ["interviews"],
        "mentee_goals": ["Get a DS job"],
        "mentor_advice": ["Build a portfolio"],
        "session_quality_score": 8,
        "engagement_level": "high",
        "recommended_next_steps": ["Publish one notebook"]
    }"#;

    fn transcription() -> Transcription {
        Transcription {
            text: "Let's talk about SQL.".into(),
            segments: vec![TranscriptSegment {
                start: 0.0,
                end: 4.0,
                text: "Let's talk about SQL.".into(),
            }],
            language: Some("en".into()),
            duration_seconds: 1800.0,
            usage: Usage::audio(1800.0),
        }
    }

    fn session() -> SessionData {
        SessionData {
            id: "s1".into(),
            zone: "Data/AI".into(),
            duration_minutes: 30,
            mentor_name: "Nadia".into(),
            mentee_name: "Arif".into(),
            language: None,
        }
    }

    fn audio() -> AudioSource {
        AudioSource::Bytes {
            file_name: "session.mp3".into(),
            data: vec![0u8; 16],
        }
    }

    #[tokio::test]
    async fn test_process_session_end_to_end() {
        let provider = Arc::new(
            StubProvider::new()
                .with_transcription(transcription())
                .with_default_reply("<p>Thanks!</p>"),
        );
        provider.push_reply(INSIGHTS);
        let ledger = ledger(Arc::new(ManualClock::at(2026, 3, 14)));
        let si = SessionIntelligence::new(true, provider, ledger.clone());

        let outcome = si.process_session(&audio(), &session()).await.unwrap();
        let SessionOutcome::Processed { transcript, insights, emails } = outcome else {
            panic!("expected processed outcome");
        };
        assert_eq!(transcript.segments.len(), 1);
        assert_eq!(insights.key_topics, vec!["SQL", "portfolio"]);
        assert_eq!(insights.session_quality_score, 8.0);
        assert_eq!(emails.mentee, "<p>Thanks!</p>");

        let breakdown = ledger.cost_breakdown(None).await;
        assert!((breakdown["transcription"].total_cost - 0.18).abs() < 1e-9);
        assert_eq!(breakdown["session-analysis"].count, 1);
        assert_eq!(breakdown["email-generation"].count, 2);
    }

    #[tokio::test]
    async fn test_disabled_is_an_error() {
        let provider = Arc::new(StubProvider::new());
        let ledger = ledger(Arc::new(ManualClock::at(2026, 3, 14)));
        let si = SessionIntelligence::new(false, provider.clone(), ledger);

        let err = si.process_session(&audio(), &session()).await.unwrap_err();
        assert!(matches!(err, ServiceError::CapabilityDisabled(Capability::Transcription)));
        assert_eq!(provider.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_budget_denied_returns_minimal_summary() {
        let provider = Arc::new(StubProvider::new());
        let ledger = exhausted_ledger(Arc::new(ManualClock::at(2026, 3, 14)));
        let si = SessionIntelligence::new(true, provider.clone(), ledger);

        match si.process_session(&audio(), &session()).await.unwrap() {
            SessionOutcome::Minimal { summary, note } => {
                assert_eq!(summary, "Data/AI mentorship session between Nadia and Arif.");
                assert_eq!(note, MINIMAL_NOTE);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(provider.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_invalid_analysis_is_a_provider_error() {
        let provider = Arc::new(StubProvider::new().with_transcription(transcription()));
        provider.push_reply("not json at all");
        let ledger = ledger(Arc::new(ManualClock::at(2026, 3, 14)));
        let si = SessionIntelligence::new(true, provider, ledger);

        let err = si.process_session(&audio(), &session()).await.unwrap_err();
        assert_eq!(err.status_code(), 502);
    }

    #[test]
    fn test_format_insights_for_display() {
        let insights: SessionInsights = serde_json::from_str(INSIGHTS).unwrap();
        let text = format_insights_for_display(&insights);
        assert!(text.starts_with("# Session Summary"));
        assert!(text.contains("- [ ] Finish SQL course (high priority)"));
        assert!(!text.contains("Deadline"));
        assert!(text.contains("> \"Ship small projects\""));
        assert!(text.ends_with("**Engagement Level:** high"));
    }
}
