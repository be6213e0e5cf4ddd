//! Parse natural language utterances into structured intents
//!
//! The language model does the extraction when it is reachable. Whatever
//! goes wrong on that path (unreachable service, HTTP error, prose instead
//! of JSON) is absorbed here by switching to the heuristic parser, so the
//! only error a caller can see is an intent whose kind cannot be trusted.

use crate::core::error::{AssistError, Result};
use crate::llm::client::OllamaClient;
use crate::llm::fallback::fallback_parse;
use crate::llm::intent::{ParseSource, ParsedIntent};
use chrono::{Datelike, Duration, NaiveDate, Weekday};

/// A parsed intent and how it was obtained
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseOutcome {
    pub intent: ParsedIntent,
    pub source: ParseSource,
}

/// Structured parser bound to one model
#[derive(Debug, Clone)]
pub struct IntentParser {
    client: Option<OllamaClient>,
    model: String,
}

impl IntentParser {
    pub fn new(client: OllamaClient, model: impl Into<String>) -> Self {
        Self {
            client: Some(client),
            model: model.into(),
        }
    }

    /// Parser with no model behind it; every parse uses heuristics
    pub fn offline() -> Self {
        Self {
            client: None,
            model: String::new(),
        }
    }

    pub fn model(&self) -> Option<&str> {
        self.client.as_ref().map(|_| self.model.as_str())
    }

    /// Parse `text`, resolving relative dates against `today`
    ///
    /// # Errors
    /// Only [`AssistError::UnknownIntentKind`], when the model produced a
    /// JSON object without a usable kind.
    pub async fn parse(&self, text: &str, today: NaiveDate) -> Result<ParseOutcome> {
        let Some(client) = &self.client else {
            tracing::debug!("No language model configured, using heuristics");
            return Ok(fallback(text, today));
        };

        let prompt = build_prompt(text, today);
        let response = match client.generate(&prompt, &self.model).await {
            Ok(response) => response,
            Err(e) => {
                // An erroring backend is not trusted for partial output either
                tracing::warn!(error = %e, "Language model failed, using heuristics");
                return Ok(fallback(text, today));
            }
        };

        match decode_response(&response) {
            Ok(intent) => Ok(ParseOutcome {
                intent,
                source: ParseSource::Model,
            }),
            Err(e) if e.is_recoverable() => {
                tracing::warn!(error = %e, "Unusable model output, using heuristics");
                Ok(fallback(text, today))
            }
            Err(e) => Err(e),
        }
    }
}

fn fallback(text: &str, today: NaiveDate) -> ParseOutcome {
    ParseOutcome {
        intent: fallback_parse(text, today),
        source: ParseSource::Fallback,
    }
}

/// Decode a model response: whole body first, then the first embedded object
///
/// A body that is valid JSON but not an object (an array wrapping the
/// intent, say) still goes through the embedded search.
pub fn decode_response(response: &str) -> Result<ParsedIntent> {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(response.trim()) {
        if value.is_object() {
            return ParsedIntent::from_model_json(value);
        }
    }

    let embedded = extract_json(response).ok_or_else(|| {
        AssistError::ExtractionFailure(format!("no JSON object in {:?}", preview(response)))
    })?;

    let value: serde_json::Value = serde_json::from_str(embedded)
        .map_err(|e| AssistError::ExtractionFailure(format!("embedded object: {}", e)))?;
    ParsedIntent::from_model_json(value)
}

/// First balanced `{...}` in `response`, skipping braces inside strings
fn extract_json(response: &str) -> Option<&str> {
    let start = response.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in response[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&response[start..=start + offset]);
                }
            }
            _ => {}
        }
    }

    None
}

fn preview(text: &str) -> String {
    crate::core::error::truncate_message(text, 80)
}

fn next_weekday(today: NaiveDate, target: Weekday) -> NaiveDate {
    let current = today.weekday().num_days_from_monday() as i64;
    let wanted = target.num_days_from_monday() as i64;
    let mut ahead = (wanted - current).rem_euclid(7);
    if ahead == 0 {
        ahead = 7;
    }
    today + Duration::days(ahead)
}

/// Extraction prompt with today's date and worked examples relative to it
pub fn build_prompt(text: &str, today: NaiveDate) -> String {
    let fmt = |d: NaiveDate| d.format("%Y-%m-%d").to_string();
    let tomorrow = fmt(today + Duration::days(1));
    let after_tomorrow = fmt(today + Duration::days(2));
    let monday = fmt(next_weekday(today, Weekday::Mon));
    let friday = fmt(next_weekday(today, Weekday::Fri));
    let escaped = text.replace('"', "\\\"");

    format!(
        r#"You are an assistant that extracts structured data from natural language in order to build calendar events or tasks.

Today: {today}

Text: "{escaped}"

Return a JSON object with the keys below:
- "type": "event" (appointment, meeting) or "todo" (task)
- "summary": short description
- "date": YYYY-MM-DD (resolve relative expressions such as "tomorrow")
- "time": HH:MM (24h clock, optional)
- "duration": e.g. "1h", "30m", "2h30m" (optional)
- "due_date": YYYY-MM-DD for tasks (optional)
- "priority": value 1 (high) to 9 (low) when provided or implied
- "alarm": reminder such as "1h", "30m", "1d" (optional)
- "location": location or address when the text contains one

Examples:
"Dentist appointment tomorrow at 14h" -> {{"type": "event", "summary": "Dentist appointment", "date": "{tomorrow}", "time": "14:00", "location": "Dental clinic"}}
"Team meeting Monday 10h for two hours" -> {{"type": "event", "summary": "Team meeting", "date": "{monday}", "time": "10:00", "duration": "2h"}}
"Buy bread" -> {{"type": "todo", "summary": "Buy bread", "priority": 5}}
"Finish the report by Friday" -> {{"type": "todo", "summary": "Finish the report", "due_date": "{friday}", "priority": 3}}
"Call Marie the day after tomorrow" -> {{"type": "todo", "summary": "Call Marie", "due_date": "{after_tomorrow}", "priority": 5}}

Return JSON only."#,
        today = fmt(today),
    )
}
