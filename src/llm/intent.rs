//! Structured intent extracted from an utterance
//!
//! Model output is decoded leniently: local models drift on field types
//! (numbers as strings, `null` for absent keys, `"todo"` vs `"task"`), so
//! every field goes through a permissive conversion. The one thing that is
//! never guessed is the kind.

use crate::core::error::{AssistError, Result};
use crate::llm::fallback;
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Default task priority on the 1 (high) to 9 (low) scale
pub const DEFAULT_TASK_PRIORITY: u8 = 5;

/// What the utterance asks to create
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentKind {
    /// Timed appointment (VEVENT)
    Event,
    /// Discrete to-do item (VTODO)
    Task,
}

impl IntentKind {
    /// Recognise the labels a model may emit for the kind
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "event" | "vevent" | "appointment" => Some(Self::Event),
            "todo" | "vtodo" | "task" | "to-do" => Some(Self::Task),
            _ => None,
        }
    }

    /// Summary used when none was extracted
    pub fn default_summary(self) -> &'static str {
        match self {
            Self::Event => "Event",
            Self::Task => "Task",
        }
    }
}

impl fmt::Display for IntentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Event => f.write_str("event"),
            Self::Task => f.write_str("task"),
        }
    }
}

/// Where a parsed intent came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParseSource {
    Model,
    Fallback,
}

impl fmt::Display for ParseSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Model => f.write_str("model"),
            Self::Fallback => f.write_str("heuristics"),
        }
    }
}

/// Parsed intent from a natural language utterance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedIntent {
    pub kind: IntentKind,
    /// Never empty
    pub summary: String,
    /// Event day
    pub date: Option<NaiveDate>,
    /// Event start, minute precision
    pub time: Option<NaiveTime>,
    /// Event length such as `2h` or `30m`
    pub duration: Option<String>,
    /// Task due day
    pub due_date: Option<NaiveDate>,
    /// 1 (high) to 9 (low)
    pub priority: Option<u8>,
    /// Reminder offset such as `1h` or `1d`
    pub alarm: Option<String>,
    pub location: Option<String>,
}

impl ParsedIntent {
    /// Bare intent with the kind's default summary
    pub fn new(kind: IntentKind, summary: impl Into<String>) -> Self {
        let summary = summary.into();
        let summary = if summary.trim().is_empty() {
            kind.default_summary().to_string()
        } else {
            summary.trim().to_string()
        };

        Self {
            kind,
            summary,
            date: None,
            time: None,
            duration: None,
            due_date: None,
            priority: None,
            alarm: None,
            location: None,
        }
    }

    /// Build an intent from a decoded model response
    ///
    /// A non-object value is an extraction failure (the caller falls back);
    /// an object with a missing or unrecognised kind is surfaced as
    /// [`AssistError::UnknownIntentKind`].
    pub fn from_model_json(value: Value) -> Result<Self> {
        if !value.is_object() {
            return Err(AssistError::ExtractionFailure(format!(
                "expected a JSON object, got {}",
                value
            )));
        }

        let raw: RawIntent = serde_json::from_value(value)
            .map_err(|e| AssistError::ExtractionFailure(e.to_string()))?;
        let label = raw.kind.as_ref().and_then(text).unwrap_or_default();
        let kind = IntentKind::from_label(&label)
            .ok_or_else(|| AssistError::UnknownIntentKind(label.clone()))?;

        let mut intent = Self::new(kind, raw.summary.as_ref().and_then(text).unwrap_or_default());
        intent.date = raw.date.as_ref().and_then(date);
        intent.time = raw.time.as_ref().and_then(clock);
        intent.duration = raw.duration.as_ref().and_then(text);
        intent.due_date = raw.due_date.as_ref().and_then(date);
        intent.priority = raw.priority.as_ref().and_then(priority);
        intent.alarm = raw.alarm.as_ref().and_then(text);
        intent.location = raw.location.as_ref().and_then(text);

        Ok(intent)
    }
}

/// Wire form of a model response, every field optional and untyped
#[derive(Debug, Default, Deserialize)]
struct RawIntent {
    #[serde(rename = "type", alias = "kind")]
    kind: Option<Value>,
    summary: Option<Value>,
    date: Option<Value>,
    time: Option<Value>,
    duration: Option<Value>,
    due_date: Option<Value>,
    priority: Option<Value>,
    alarm: Option<Value>,
    location: Option<Value>,
}

fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn date(value: &Value) -> Option<NaiveDate> {
    let raw = text(value)?;
    let parsed = NaiveDate::parse_from_str(&raw, "%Y-%m-%d").ok();
    if parsed.is_none() {
        tracing::debug!(value = %raw, "Ignoring non-ISO date from model");
    }
    parsed
}

fn clock(value: &Value) -> Option<NaiveTime> {
    let raw = text(value)?;
    NaiveTime::parse_from_str(&raw, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(&raw, "%H:%M:%S"))
        .ok()
        .or_else(|| fallback::extract_time(&raw))
}

/// Coerce to 1..=9; zero or garbage means "no priority"
fn priority(value: &Value) -> Option<u8> {
    let number = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    let rounded = number.round();
    if !rounded.is_finite() || rounded < 1.0 {
        return None;
    }
    Some(rounded.min(9.0) as u8)
}
