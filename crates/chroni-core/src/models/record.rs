//! Journal record model

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::error::Error;

/// Upper bound (inclusive) for every numeric metric scale.
pub const METRIC_MAX: u8 = 10;

/// A unique identifier for a record.
///
/// Locally created ids are UUID v7 strings, so they sort by creation time.
/// Ids that arrive from a remote collaborator are kept verbatim; numeric
/// ids are read as their decimal text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl<'de> Deserialize<'de> for RecordId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum WireId {
            Text(String),
            Number(i64),
        }

        Ok(match WireId::deserialize(deserializer)? {
            WireId::Text(text) => Self(text),
            WireId::Number(number) => Self(number.to_string()),
        })
    }
}

impl RecordId {
    /// Create a new unique, time-sortable record ID
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the id carries any usable content
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RecordId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidInput("record id cannot be empty".into()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for RecordId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Which daily check-in a record belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    Morning,
    Evening,
}

impl EntryType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Morning => "morning",
            Self::Evening => "evening",
        }
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "morning" => Ok(Self::Morning),
            "evening" => Ok(Self::Evening),
            other => Err(Error::InvalidInput(format!("unknown entry type '{other}'"))),
        }
    }
}

/// Qualitative sleep rating, best first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SleepQuality {
    Excellent,
    Good,
    Fair,
    Poor,
    VeryPoor,
}

impl SleepQuality {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Excellent => "excellent",
            Self::Good => "good",
            Self::Fair => "fair",
            Self::Poor => "poor",
            Self::VeryPoor => "very_poor",
        }
    }
}

impl fmt::Display for SleepQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SleepQuality {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "excellent" => Ok(Self::Excellent),
            "good" => Ok(Self::Good),
            "fair" => Ok(Self::Fair),
            "poor" => Ok(Self::Poor),
            "very_poor" => Ok(Self::VeryPoor),
            other => Err(Error::InvalidInput(format!(
                "unknown sleep quality '{other}'"
            ))),
        }
    }
}

/// One journal entry.
///
/// Field names on the wire follow the journal backend's entry schema, so a
/// serialized record can be posted as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Unique identifier
    pub id: RecordId,
    /// Morning or evening check-in
    pub entry_type: EntryType,
    /// Calendar day the entry describes
    pub date: NaiveDate,

    #[serde(default, rename = "mood_overall")]
    pub mood: Option<u8>,
    #[serde(default, rename = "energy_level")]
    pub energy: Option<u8>,
    #[serde(default, rename = "anxiety_level")]
    pub anxiety: Option<u8>,
    #[serde(default, rename = "pain_level")]
    pub pain: Option<u8>,
    #[serde(default, rename = "fatigue_level")]
    pub fatigue: Option<u8>,
    #[serde(default)]
    pub sleep_quality: Option<SleepQuality>,

    #[serde(default)]
    pub morning_feeling: Option<String>,
    #[serde(default)]
    pub morning_hopes: Option<String>,
    #[serde(default)]
    pub morning_symptoms: Option<String>,
    #[serde(default)]
    pub evening_day_review: Option<String>,
    #[serde(default)]
    pub evening_gratitude: Option<String>,
    #[serde(default)]
    pub evening_symptoms: Option<String>,
    #[serde(default)]
    pub additional_notes: Option<String>,

    /// Creation instant (Unix ms)
    #[serde(deserialize_with = "wire_timestamp")]
    pub timestamp: i64,
    /// True once a remote collaborator confirmed the record
    #[serde(default)]
    pub synced: bool,
    /// Account the record belongs to, once one exists
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
}

impl Record {
    /// Create an empty, unsynced record for the given check-in and day
    #[must_use]
    pub fn new(entry_type: EntryType, date: NaiveDate) -> Self {
        Self {
            id: RecordId::new(),
            entry_type,
            date,
            mood: None,
            energy: None,
            anxiety: None,
            pain: None,
            fatigue: None,
            sleep_quality: None,
            morning_feeling: None,
            morning_hopes: None,
            morning_symptoms: None,
            evening_day_review: None,
            evening_gratitude: None,
            evening_symptoms: None,
            additional_notes: None,
            timestamp: chrono::Utc::now().timestamp_millis(),
            synced: false,
            owner_id: None,
        }
    }

    /// Replace the generated id
    #[must_use]
    pub fn with_id(mut self, id: impl Into<RecordId>) -> Self {
        self.id = id.into();
        self
    }

    /// Check id and metric bounds
    pub fn validate(&self) -> Result<(), Error> {
        if self.id.is_blank() {
            return Err(Error::InvalidInput("record id cannot be empty".into()));
        }

        for (name, value) in self.metrics() {
            if let Some(value) = value {
                if value > METRIC_MAX {
                    return Err(Error::InvalidInput(format!(
                        "{name} must be between 0 and {METRIC_MAX}, got {value}"
                    )));
                }
            }
        }

        Ok(())
    }

    /// Metric name/value pairs in display order
    #[must_use]
    pub const fn metrics(&self) -> [(&'static str, Option<u8>); 5] {
        [
            ("mood", self.mood),
            ("energy", self.energy),
            ("anxiety", self.anxiety),
            ("pain", self.pain),
            ("fatigue", self.fatigue),
        ]
    }

    /// True when both records carry the same journal content, ignoring the
    /// local sync bookkeeping.
    #[must_use]
    pub fn same_content(&self, other: &Self) -> bool {
        let mut left = self.clone();
        let mut right = other.clone();
        left.synced = false;
        right.synced = false;
        left == right
    }

    /// Like [`same_content`](Self::same_content), but also ignores the owner,
    /// which the store fills in from the existing row when a write omits it.
    #[must_use]
    pub fn same_entry(&self, other: &Self) -> bool {
        let owners_agree = match (&self.owner_id, &other.owner_id) {
            (Some(left), Some(right)) => left == right,
            _ => true,
        };
        owners_agree
            && self.same_content(&Self {
                owner_id: self.owner_id.clone(),
                ..other.clone()
            })
    }
}

/// Accepts Unix milliseconds or an ISO-8601 datetime. Datetimes without an
/// offset are taken as UTC.
fn wire_timestamp<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum WireTimestamp {
        Millis(i64),
        Text(String),
    }

    match WireTimestamp::deserialize(deserializer)? {
        WireTimestamp::Millis(millis) => Ok(millis),
        WireTimestamp::Text(text) => parse_datetime_millis(&text)
            .ok_or_else(|| D::Error::custom(format!("unrecognized timestamp '{text}'"))),
    }
}

fn parse_datetime_millis(text: &str) -> Option<i64> {
    let text = text.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.timestamp_millis());
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .map(|naive| naive.and_utc().timestamp_millis())
}
