//! AI-generated reflections over journal records.
//!
//! Every request goes through the [`TimeBoxedCache`], so each insight is
//! generated at most once per eight hour window. Requests that reach the
//! collaborator are counted per day.

mod openai;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Days;
use thiserror::Error;

use crate::cache::{Clock, TimeBoxedCache};
use crate::db::RecordFilter;
use crate::kv::TieredStorage;
use crate::models::{average, EntryType, Record, RecordId, TrendSeries, METRIC_MAX};
use crate::services::LocalStore;

pub use openai::{OpenAiCollaborator, DEFAULT_AI_BASE_URL, DEFAULT_AI_MODEL};

const USAGE_PREFIX: &str = "ai_requests:";
const WEEK_DAYS: u32 = 7;
pub const DEFAULT_PREDICTION_DAYS: u32 = 7;
pub const DEFAULT_TREND_DAYS: u32 = 30;
const ASK_CONTEXT_ENTRIES: usize = 10;
const HIGHLIGHT_ENTRIES: usize = 3;
const HIGHLIGHT_CHARS: usize = 100;

const COMPANION_PERSONA: &str = "You are a gentle, supportive AI companion for people with chronic illness and mental health challenges. Always be kind, non-judgmental, and encouraging.";
const INSIGHT_PERSONA: &str = "You are a supportive mental health companion. Provide gentle, non-clinical insights and encouragement. Never diagnose or give medical advice.";
const REFLECTION_PERSONA: &str = "You are a compassionate weekly reflection companion. Highlight progress, resilience, and provide gentle encouragement.";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AiError {
    #[error("AI features are disabled: no API key configured")]
    Disabled,

    #[error("AI request failed: {0}")]
    Request(String),

    #[error("AI service error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid AI response: {0}")]
    InvalidResponse(String),

    #[error("No journal entries to reflect on yet")]
    NoEntries,

    #[error("Could not read journal entries: {0}")]
    Storage(String),
}

impl From<crate::Error> for AiError {
    fn from(error: crate::Error) -> Self {
        Self::Storage(error.to_string())
    }
}

/// One chat-style request
#[derive(Debug, Clone, PartialEq)]
pub struct AiPrompt {
    pub system: String,
    pub user: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Language model that turns a prompt into text
#[async_trait]
pub trait AiCollaborator: Send + Sync {
    async fn request(&self, prompt: &AiPrompt) -> Result<String, AiError>;
}

/// Cached, metered access to the AI collaborator.
#[derive(Clone)]
pub struct InsightService {
    store: LocalStore,
    cache: TimeBoxedCache,
    storage: Arc<TieredStorage>,
    clock: Arc<dyn Clock>,
    ai: Option<Arc<dyn AiCollaborator>>,
}

impl InsightService {
    pub fn new(
        store: LocalStore,
        cache: TimeBoxedCache,
        storage: Arc<TieredStorage>,
        clock: Arc<dyn Clock>,
        ai: Option<Arc<dyn AiCollaborator>>,
    ) -> Self {
        Self {
            store,
            cache,
            storage,
            clock,
            ai,
        }
    }

    pub const fn is_enabled(&self) -> bool {
        self.ai.is_some()
    }

    fn usage_key(&self) -> String {
        format!("{USAGE_PREFIX}{}", self.clock.today().format("%Y-%m-%d"))
    }

    /// AI requests made today (cache hits excluded).
    pub async fn usage_today(&self) -> u32 {
        self.storage
            .get_item(&self.usage_key())
            .await
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(0)
    }

    async fn count_request(&self) {
        let used = self.usage_today().await.saturating_add(1);
        self.storage
            .set_item(&self.usage_key(), &used.to_string())
            .await;
    }

    async fn call_ai(&self, prompt: &AiPrompt) -> Result<String, AiError> {
        let ai = self.ai.as_ref().ok_or(AiError::Disabled)?;
        self.count_request().await;
        ai.request(prompt).await
    }

    async fn cached(&self, operation: &str, prompt: AiPrompt) -> Result<String, AiError> {
        if self.ai.is_none() {
            return Err(AiError::Disabled);
        }
        self.cache
            .get_or_compute(operation, || self.call_ai(&prompt))
            .await
    }

    /// Insights and encouragement for the newest entry.
    pub async fn daily_insight(&self) -> Result<String, AiError> {
        let latest = self
            .store
            .list(&RecordFilter::default().limit(1))
            .await?
            .into_iter()
            .next()
            .ok_or(AiError::NoEntries)?;

        let prompt = AiPrompt {
            system: INSIGHT_PERSONA.to_string(),
            user: format!(
                "Based on this journal entry from someone managing chronic illness and mental health challenges, \
                 please provide gentle insights and encouragement. Focus on patterns worth acknowledging, \
                 gentle self-care suggestions, validation of their experiences, and hope for tomorrow.\n\n\
                 Entry details:\n{}\n\nPlease provide supportive insights (3-4 sentences):",
                entry_context(&latest)
            ),
            max_tokens: 200,
            temperature: 0.8,
        };
        self.cached("daily_insight", prompt).await
    }

    /// A short, caring summary of one entry.
    pub async fn entry_summary(&self, id: &RecordId) -> Result<String, AiError> {
        let record = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| AiError::Storage(format!("record {id} not found")))?;

        let prompt = AiPrompt {
            system: COMPANION_PERSONA.to_string(),
            user: format!(
                "Please provide a gentle, supportive summary of this journal entry. Acknowledge their \
                 feelings, highlight positive moments, and keep the tone warm and non-judgmental.\n\n\
                 Entry details:\n{}\n\nPlease provide a brief, caring summary (2-3 sentences):",
                entry_context(&record)
            ),
            max_tokens: 150,
            temperature: 0.7,
        };
        self.cached(&format!("summary:{id}"), prompt).await
    }

    /// Reflection over the last seven days of entries.
    pub async fn weekly_reflection(&self) -> Result<String, AiError> {
        let records = self.recent_window(WEEK_DAYS).await?;
        if records.is_empty() {
            return Err(AiError::NoEntries);
        }

        let prompt = AiPrompt {
            system: REFLECTION_PERSONA.to_string(),
            user: format!(
                "Based on a week of journal entries from someone managing chronic illness and mental health, \
                 please provide a gentle weekly reflection covering overall patterns in mood, energy and \
                 symptoms, progress and positive moments, strength and resilience, and encouragement for \
                 the week ahead.\n\nWeekly summary:\n{}\n\n\
                 Please provide a caring weekly reflection (4-5 sentences):",
                weekly_context(&records)
            ),
            max_tokens: 250,
            temperature: 0.7,
        };
        self.cached("weekly_reflection", prompt).await
    }

    /// Entries dated within the last `days` days, today included.
    async fn recent_window(&self, days: u32) -> crate::Result<Vec<Record>> {
        let today = self.clock.today();
        let from = today.checked_sub_days(Days::new(u64::from(days.max(1) - 1)));
        self.store
            .list(&RecordFilter::default().between(from, Some(today)))
            .await
    }

    /// Metric series over the last `days` days. Computed locally; never
    /// calls the AI collaborator.
    pub async fn trends(&self, days: u32) -> crate::Result<TrendSeries> {
        let records = self.recent_window(days).await?;
        Ok(TrendSeries::from_records(days.max(1), &records))
    }

    /// Gentle look ahead based on patterns in the last `days` days.
    pub async fn predictive_insights(&self, days: u32) -> Result<String, AiError> {
        let days = days.max(1);
        let mut records = self.recent_window(days).await?;
        if records.is_empty() {
            return Err(AiError::NoEntries);
        }
        records.reverse();

        let context = records
            .iter()
            .map(|record| format!("Date: {}\n{}", record.date, entry_context(record)))
            .collect::<Vec<_>>()
            .join("\n\n");
        let prompt = AiPrompt {
            system: INSIGHT_PERSONA.to_string(),
            user: format!(
                "Based on these journal entries from the last {days} days, oldest first, gently point out \
                 patterns that may carry into the coming days, such as how sleep or pain tends to affect \
                 mood and energy. Suggest one or two kind ways to prepare. Do not make medical \
                 predictions.\n\n{context}\n\nPlease provide supportive, forward-looking insights \
                 (3-4 sentences):"
            ),
            max_tokens: 250,
            temperature: 0.7,
        };
        self.cached(&format!("predictions:{days}"), prompt).await
    }

    /// Free-form question answered against recent entries, cached under
    /// `operation` for the day.
    pub async fn ask(&self, operation: &str, question: &str) -> Result<String, AiError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(AiError::Request("question cannot be empty".to_string()));
        }

        let records = self
            .store
            .list(&RecordFilter::default().limit(ASK_CONTEXT_ENTRIES))
            .await?;
        let context = if records.is_empty() {
            "No journal entries yet.".to_string()
        } else {
            records
                .iter()
                .map(|record| format!("Date: {}\n{}", record.date, entry_context(record)))
                .collect::<Vec<_>>()
                .join("\n\n")
        };

        let prompt = AiPrompt {
            system: INSIGHT_PERSONA.to_string(),
            user: format!("Recent journal entries:\n{context}\n\nQuestion: {question}"),
            max_tokens: 250,
            temperature: 0.7,
        };
        self.cached(&format!("ask:{operation}"), prompt).await
    }
}

/// Prompt context for a single entry.
pub fn entry_context(record: &Record) -> String {
    let mut parts = Vec::new();
    let entry_type = match record.entry_type {
        EntryType::Morning => "Morning",
        EntryType::Evening => "Evening",
    };
    parts.push(format!("Entry Type: {entry_type}"));

    let texts: [(&str, &Option<String>); 3] = match record.entry_type {
        EntryType::Morning => [
            ("Morning feeling", &record.morning_feeling),
            ("Hopes for today", &record.morning_hopes),
            ("Morning symptoms", &record.morning_symptoms),
        ],
        EntryType::Evening => [
            ("Day review", &record.evening_day_review),
            ("Gratitude", &record.evening_gratitude),
            ("Evening symptoms", &record.evening_symptoms),
        ],
    };
    for (label, text) in texts {
        if let Some(text) = text {
            parts.push(format!("{label}: {text}"));
        }
    }

    let ratings: Vec<String> = record
        .metrics()
        .into_iter()
        .filter_map(|(name, value)| value.map(|value| (name, value)))
        .map(|(name, value)| {
            let mut label = name.to_string();
            label[..1].make_ascii_uppercase();
            format!("{label}: {value}/{METRIC_MAX}")
        })
        .collect();
    if !ratings.is_empty() {
        parts.push(format!("Ratings: {}", ratings.join(", ")));
    }

    if let Some(quality) = record.sleep_quality {
        parts.push(format!("Sleep quality: {quality}"));
    }
    if let Some(notes) = &record.additional_notes {
        parts.push(format!("Additional notes: {notes}"));
    }

    parts.join("\n")
}

/// Prompt context for a set of entries, newest first.
pub fn weekly_context(records: &[Record]) -> String {
    let mut parts = vec![format!("Number of entries this week: {}", records.len())];

    let averages = [
        ("mood", average(records.iter().map(|record| record.mood))),
        ("energy", average(records.iter().map(|record| record.energy))),
        ("pain", average(records.iter().map(|record| record.pain))),
    ];
    for (name, value) in averages {
        if let Some(value) = value {
            parts.push(format!("Average {name}: {value:.1}/{METRIC_MAX}"));
        }
    }

    let highlights: Vec<String> = records
        .iter()
        .take(HIGHLIGHT_ENTRIES)
        .filter_map(|record| {
            if let Some(gratitude) = &record.evening_gratitude {
                Some(format!("Gratitude: {}", excerpt(gratitude)))
            } else {
                record
                    .morning_hopes
                    .as_ref()
                    .map(|hopes| format!("Hope: {}", excerpt(hopes)))
            }
        })
        .collect();
    if !highlights.is_empty() {
        parts.push("Key moments:".to_string());
        parts.extend(highlights);
    }

    parts.join("\n")
}

fn excerpt(text: &str) -> String {
    if text.chars().count() <= HIGHLIGHT_CHARS {
        return text.to_string();
    }
    let mut short: String = text.chars().take(HIGHLIGHT_CHARS).collect();
    short.push_str("...");
    short
}
