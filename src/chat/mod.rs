//! Support chatbot for mentees and mentors, in English and Bengali.

use futures::stream::BoxStream;
use futures::StreamExt;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use crate::budget::BudgetLedger;
use crate::cache::{chat_key, is_cacheable_chat, ResponseCache};
use crate::error::{Capability, ServiceError};
use crate::llm::{ChatMessage, CompletionOptions, ProviderError, Role, SharedProvider, Usage};

pub const FALLBACK_MESSAGE: &str =
    "I'm currently unavailable. Please contact support at support@truetalk.app or call +880-XXX-XXXX.";
pub const CAPACITY_MESSAGE: &str =
    "Our AI assistant is temporarily at capacity. Please try again in a few minutes or contact human support.";
pub const APOLOGY_MESSAGE: &str =
    "I'm having trouble responding right now. Please try again or contact support if the issue persists.";

const SYSTEM_PROMPT: &str = r#"You are TrueTalk's AI assistant for Bangladesh's first mentorship marketplace.

**About TrueTalk:**
- Connect mentees with verified industry experts
- Pay-per-minute pricing: ৳50-500/minute
- 11 service zones: Career, Data/AI, Study Abroad, Business, Design, Finance, Marketing, Engineering, Healthcare, Legal, Personal Development
- Payment methods: bKash, Nagad, Credit/Debit Cards
- Available 24/7 via video calls

**Your Role:**
- Help users find the right mentors
- Explain how to book and pay for sessions
- Troubleshoot common issues
- Answer questions about pricing and features
- Guide through onboarding process

**Communication Style:**
- Respond in the user's language (Bengali or English)
- Be warm, helpful, and concise
- Use emojis sparingly for friendliness
- If you don't know something, say so and offer to connect them with human support
- Keep responses under 150 words unless detailed explanation is needed

**Important Guidelines:**
- Never make up mentor names or availability
- Always suggest browsing mentors on the platform
- For technical issues, escalate to human support
- For payment issues with bKash/Nagad, provide step-by-step help
- Encourage users to complete their profile for better matching"#;

fn bengali_script() -> Option<&'static Regex> {
    static BENGALI: OnceLock<Option<Regex>> = OnceLock::new();
    BENGALI
        .get_or_init(|| Regex::new(r"[\x{0980}-\x{09FF}]").ok())
        .as_ref()
}

/// Conversation language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Language {
    #[default]
    #[serde(rename = "en")]
    English,
    #[serde(rename = "bn")]
    Bengali,
}

impl Language {
    pub fn code(&self) -> &'static str {
        match self {
            Language::English => "en",
            Language::Bengali => "bn",
        }
    }

    /// `"bn"` selects Bengali; anything else is English.
    pub fn from_code(code: &str) -> Self {
        if code.trim().eq_ignore_ascii_case("bn") {
            Language::Bengali
        } else {
            Language::English
        }
    }
}

/// Bengali if the text contains any Bengali script.
pub fn detect_language(text: &str) -> Language {
    let bengali = match bengali_script() {
        Some(re) => re.is_match(text),
        None => text.chars().any(|c| ('\u{0980}'..='\u{09FF}').contains(&c)),
    };
    if bengali {
        Language::Bengali
    } else {
        Language::English
    }
}

/// Canned answers that need no model call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum QuickTopic {
    Greeting,
    HowToBook,
    Pricing,
    Zones,
}

pub fn quick_response(topic: QuickTopic, language: Language) -> &'static str {
    match (language, topic) {
        (Language::English, QuickTopic::Greeting) => {
            "Hi! 👋 Welcome to TrueTalk. I'm here to help you find the perfect mentor. What can I help you with today?"
        }
        (Language::English, QuickTopic::HowToBook) => {
            "To book a session:\n1. Browse mentors by zone or search\n2. Click on a mentor profile\n3. Check their availability\n4. Select a time slot\n5. Pay via bKash, Nagad, or card\n6. Join the video call at the scheduled time!"
        }
        (Language::English, QuickTopic::Pricing) => {
            "TrueTalk uses pay-per-minute pricing. Rates range from ৳50-500/minute depending on the mentor's expertise. Most mentors charge ৳100-200/minute. You can see each mentor's rate on their profile."
        }
        (Language::English, QuickTopic::Zones) => {
            "We have 11 mentorship zones:\n• Career Guidance 💼\n• Data & AI 🤖\n• Study Abroad ✈️\n• Business Strategy 📊\n• Design & UX 🎨\n• Finance 💰\n• Marketing 📢\n• Engineering ⚙️\n• Healthcare 🏥\n• Legal ⚖️\n• Personal Development 🧠"
        }
        (Language::Bengali, QuickTopic::Greeting) => {
            "হাই! 👋 TrueTalk এ স্বাগতম। আমি আপনাকে সঠিক মেন্টর খুঁজে দিতে সাহায্য করব। আজ আপনাকে কীভাবে সাহায্য করতে পারি?"
        }
        (Language::Bengali, QuickTopic::HowToBook) => {
            "সেশন বুক করতে:\n১. জোন অনুযায়ী মেন্টর ব্রাউজ করুন\n২. মেন্টর প্রোফাইলে ক্লিক করুন\n৩. সময় দেখুন\n৪. একটি স্লট সিলেক্ট করুন\n৫. bKash, Nagad বা কার্ড দিয়ে পেমেন্ট করুন\n৬. নির্ধারিত সময়ে ভিডিও কলে যোগ দিন!"
        }
        (Language::Bengali, QuickTopic::Pricing) => {
            "TrueTalk পে-পার-মিনিট প্রাইসিং ব্যবহার করে। মেন্টরের দক্ষতা অনুযায়ী রেট ৳৫০-৫০০/মিনিট হয়। বেশিরভাগ মেন্টর ৳১০০-২০০/মিনিট চার্জ করেন।"
        }
        (Language::Bengali, QuickTopic::Zones) => {
            "আমাদের ১১টি মেন্টরশিপ জোন আছে:\n• ক্যারিয়ার গাইডেন্স 💼\n• ডেটা ও AI 🤖\n• স্টাডি এব্রোড ✈️\n• বিজনেস স্ট্র্যাটেজি 📊\n• ডিজাইন ও UX 🎨\n• ফাইন্যান্স 💰\n• মার্কেটিং 📢\n• ইঞ্জিনিয়ারিং ⚙️\n• হেলথকেয়ার 🏥\n• লিগ্যাল ⚖️\n• পার্সোনাল ডেভেলপমেন্ট 🧠"
        }
    }
}

/// Who is chatting and from where.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatContext {
    pub user_id: Option<String>,
    pub user_name: Option<String>,
    /// `mentee` or `mentor`.
    pub user_role: Option<String>,
    pub language: Option<String>,
    pub current_page: Option<String>,
}

impl ChatContext {
    fn system_message(&self) -> Option<ChatMessage> {
        let mut lines = Vec::new();
        if let Some(name) = &self.user_name {
            lines.push(format!("User name: {}", name));
        }
        if let Some(role) = &self.user_role {
            lines.push(format!("User role: {} (mentee/mentor)", role));
        }
        if let Some(language) = &self.language {
            lines.push(format!("Preferred language: {}", language));
        }
        if let Some(page) = &self.current_page {
            lines.push(format!("Current page: {}", page));
        }
        if lines.is_empty() {
            None
        } else {
            Some(ChatMessage::system(format!("User context:\n{}", lines.join("\n"))))
        }
    }

    fn user_tag(&self) -> String {
        self.user_id.clone().unwrap_or_else(|| "anonymous".to_string())
    }
}

/// Reply to a chat turn. Degraded replies carry a fixed message and zero cost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReply {
    pub message: String,
    pub cached: bool,
    pub cost: f64,
    #[serde(rename = "latency", skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ChatReply {
    fn fixed(message: &str) -> Self {
        Self {
            message: message.to_string(),
            cached: false,
            cost: 0.0,
            latency_ms: None,
            usage: None,
            error: None,
        }
    }

    fn failed(error: String) -> Self {
        Self {
            error: Some(error),
            ..Self::fixed(APOLOGY_MESSAGE)
        }
    }
}

/// Sampling settings for chat replies.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChatSettings {
    pub temperature: f64,
    pub max_tokens: u64,
    /// Emit a structured log line per interaction.
    pub log_interactions: bool,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 500,
            log_interactions: false,
        }
    }
}

/// The support chatbot.
pub struct Chatbot {
    enabled: bool,
    provider: SharedProvider,
    ledger: Arc<BudgetLedger>,
    cache: Arc<ResponseCache>,
    settings: ChatSettings,
}

impl Chatbot {
    pub fn new(
        enabled: bool,
        provider: SharedProvider,
        ledger: Arc<BudgetLedger>,
        cache: Arc<ResponseCache>,
        settings: ChatSettings,
    ) -> Self {
        tracing::info!("Chatbot using provider {}", provider.name());
        Self {
            enabled,
            provider,
            ledger,
            cache,
            settings,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Answer the latest message in `messages`.
    pub async fn chat(&self, messages: &[ChatMessage], context: &ChatContext) -> ChatReply {
        if !self.enabled {
            return ChatReply::fixed(FALLBACK_MESSAGE);
        }
        if !self.ledger.check_budget("chat").await {
            return ChatReply::fixed(CAPACITY_MESSAGE);
        }

        let Some(last) = last_user_message(messages) else {
            return ChatReply::failed("no user message".to_string());
        };

        let key = chat_key(last);
        if let Some(message) = self.cache.get::<String>(&key).await {
            return ChatReply {
                message,
                cached: true,
                ..ChatReply::fixed("")
            };
        }

        let request = self.build_request(messages, context);
        let options = self.options(context);

        let started = Instant::now();
        let completion = match self.provider.complete(&request, &options).await {
            Ok(c) => c,
            Err(e) => {
                tracing::error!("Chatbot error: {}", e);
                return ChatReply::failed(e.kind.to_string());
            }
        };
        let latency_ms = started.elapsed().as_millis() as u64;

        let cost = self.provider.cost(&completion.usage);
        self.ledger
            .track_cost("chatbot", cost, completion.usage.to_json())
            .await;

        if is_cacheable_chat(last) {
            self.cache.set(&key, &completion.text).await;
        }

        if self.settings.log_interactions {
            tracing::info!(
                target: "truetalk_ai::chat",
                user_id = %context.user_tag(),
                language = detect_language(last).code(),
                message_count = messages.len(),
                cost,
                latency_ms,
                response_length = completion.text.chars().count(),
                "chat interaction"
            );
        }

        ChatReply {
            message: completion.text,
            cached: false,
            cost,
            latency_ms: Some(latency_ms),
            usage: Some(completion.usage),
            error: None,
        }
    }

    /// Stream the reply as text deltas.
    ///
    /// Cost is estimated from prompt and output length and recorded when the
    /// stream finishes. The stream ends at the first provider error, and a
    /// stream that fails or is dropped early records nothing.
    pub async fn chat_stream(
        &self,
        messages: &[ChatMessage],
        context: &ChatContext,
    ) -> Result<BoxStream<'static, Result<String, ProviderError>>, ServiceError> {
        if !self.enabled {
            return Err(ServiceError::CapabilityDisabled(Capability::Chatbot));
        }
        if !self.ledger.check_budget("chat").await {
            return Err(ServiceError::budget("chat"));
        }
        if last_user_message(messages).is_none() {
            return Err(ServiceError::validation("Message is required"));
        }

        let request = self.build_request(messages, context);
        let prompt_tokens = estimate_tokens(request.iter().map(|m| m.content.as_str()));
        let mut inner = self
            .provider
            .complete_stream(&request, &self.options(context))
            .await?;

        let ledger = Arc::clone(&self.ledger);
        let provider = Arc::clone(&self.provider);
        let stream = async_stream::stream! {
            let mut output = String::new();
            let mut failed = false;
            while let Some(item) = inner.next().await {
                match &item {
                    Ok(chunk) => output.push_str(chunk),
                    Err(e) => {
                        tracing::warn!("Chat stream from {} failed: {}", provider.name(), e);
                        failed = true;
                    }
                }
                yield item;
                if failed {
                    break;
                }
            }
            if !failed {
                let usage = Usage::tokens(prompt_tokens, estimate_tokens([output.as_str()]));
                ledger.track_cost("chatbot", provider.cost(&usage), usage.to_json()).await;
            }
        };
        Ok(Box::pin(stream))
    }

    fn build_request(&self, messages: &[ChatMessage], context: &ChatContext) -> Vec<ChatMessage> {
        let mut request = Vec::with_capacity(messages.len() + 2);
        request.push(ChatMessage::system(SYSTEM_PROMPT));
        request.extend(context.system_message());
        request.extend(messages.iter().cloned());
        request
    }

    fn options(&self, context: &ChatContext) -> CompletionOptions {
        CompletionOptions {
            user: Some(context.user_tag()),
            ..CompletionOptions::default()
                .with_temperature(self.settings.temperature)
                .with_max_tokens(self.settings.max_tokens)
        }
    }
}

fn last_user_message(messages: &[ChatMessage]) -> Option<&str> {
    messages
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.as_str())
        .filter(|c| !c.trim().is_empty())
}

/// Rough token count: one token per four characters.
fn estimate_tokens<'a>(texts: impl IntoIterator<Item = &'a str>) -> u64 {
    let chars: usize = texts.into_iter().map(|t| t.chars().count()).sum();
    chars.div_ceil(4) as u64
}
