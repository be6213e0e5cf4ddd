//! Heuristic intent extraction
//!
//! Used whenever the language model is absent, errors, or answers with
//! something that is not JSON. Everything here is total: any string,
//! including the empty one, yields a well-formed [`ParsedIntent`].
//!
//! Keyword lists cover English and French.

use crate::llm::intent::{IntentKind, ParsedIntent, DEFAULT_TASK_PRIORITY};
use chrono::{Duration, NaiveDate, NaiveTime};
use regex::Regex;
use std::ops::Range;
use std::sync::OnceLock;

/// Words (after folding) that mark an actionable to-do
const TASK_KEYWORDS: &[&str] = &[
    "buy", "do", "finish", "call", "send", "task", "todo", "to do", "acheter", "faire", "finir",
    "appeler", "envoyer", "tache", "taches",
];

/// Relative day phrases and their offset from today, longest first
const RELATIVE_DAYS: &[(&str, i64)] = &[
    ("day after tomorrow", 2),
    ("apres demain", 2),
    ("tomorrow", 1),
    ("demain", 1),
    ("today", 0),
    ("tonight", 0),
    ("aujourd'hui", 0),
    ("aujourdhui", 0),
];

/// Locative prepositions, padded so they only match whole words
///
/// Matched on lowercased but unfolded text: `à` must not collide with the
/// English article.
const LOCATION_MARKERS: &[&str] = &[
    " at ", " to ", " in ", " on ", " à ", " au ", " chez ", " en ", " sur ",
];

/// Parse an utterance without the language model
pub fn fallback_parse(text: &str, today: NaiveDate) -> ParsedIntent {
    let normalized = normalize(text);
    let phrases = phrase_index(&normalized);

    let is_task = TASK_KEYWORDS.iter().any(|kw| contains_phrase(&phrases, kw));
    let kind = if is_task {
        IntentKind::Task
    } else {
        IntentKind::Event
    };

    let mut intent = ParsedIntent::new(kind, text);

    let day = relative_day(&phrases).map(|offset| today + Duration::days(offset));
    match kind {
        IntentKind::Task => {
            intent.priority = Some(DEFAULT_TASK_PRIORITY);
            intent.due_date = day;
        }
        IntentKind::Event => intent.date = day,
    }

    intent.time = extract_time(text);
    intent.location = extract_location(text);

    tracing::debug!(
        kind = %intent.kind,
        date = ?intent.date.or(intent.due_date),
        time = ?intent.time,
        location = ?intent.location,
        "Heuristic parse"
    );

    intent
}

/// Lowercase and strip diacritics, one output char per input char
pub fn normalize(text: &str) -> String {
    text.chars().map(fold_char).collect()
}

fn fold_char(c: char) -> char {
    let lower = c.to_lowercase().next().unwrap_or(c);
    match lower {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => 'a',
        'ç' => 'c',
        'è' | 'é' | 'ê' | 'ë' => 'e',
        'ì' | 'í' | 'î' | 'ï' => 'i',
        'ñ' => 'n',
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' => 'o',
        'ù' | 'ú' | 'û' | 'ü' => 'u',
        'ý' | 'ÿ' => 'y',
        '\u{2018}' | '\u{2019}' => '\'',
        other => other,
    }
}

/// Space separated words padded with spaces, for whole-phrase lookups
fn phrase_index(normalized: &str) -> String {
    let words: Vec<&str> = normalized
        .split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .filter(|w| !w.is_empty())
        .collect();
    format!(" {} ", words.join(" "))
}

fn contains_phrase(index: &str, phrase: &str) -> bool {
    index.contains(&format!(" {} ", phrase))
}

fn relative_day(index: &str) -> Option<i64> {
    RELATIVE_DAYS
        .iter()
        .find(|(phrase, _)| contains_phrase(index, phrase))
        .map(|&(_, offset)| offset)
}

const MERIDIEM_PATTERN: &str = r"(?i)\b(\d{1,2})(?::(\d{2}))?\s*(am|pm)\b";
const CLOCK_PATTERN: &str = r"(?i)\b(\d{1,2})[h:](\d{2})?\b";

fn meridiem_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(MERIDIEM_PATTERN).expect("MERIDIEM_PATTERN should compile - this is a bug")
    })
}

fn clock_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(CLOCK_PATTERN).expect("CLOCK_PATTERN should compile - this is a bug")
    })
}

/// Clock time in `text`: `14h`, `14h30`, `14:30`, `2pm`, `2:30 pm`
pub fn extract_time(text: &str) -> Option<NaiveTime> {
    find_time(text).map(|(time, _)| time)
}

fn find_time(text: &str) -> Option<(NaiveTime, Range<usize>)> {
    if let Some(caps) = meridiem_pattern().captures(text) {
        let hour: u32 = caps.get(1)?.as_str().parse().ok()?;
        let minute: u32 = caps.get(2).map_or(Some(0), |m| m.as_str().parse().ok())?;
        let pm = caps.get(3)?.as_str().eq_ignore_ascii_case("pm");
        if (1..=12).contains(&hour) {
            let hour = match (hour, pm) {
                (12, false) => 0,
                (12, true) => 12,
                (h, true) => h + 12,
                (h, false) => h,
            };
            if let Some(time) = NaiveTime::from_hms_opt(hour, minute, 0) {
                return Some((time, caps.get(0)?.range()));
            }
        }
    }

    let caps = clock_pattern().captures(text)?;
    let hour: u32 = caps.get(1)?.as_str().parse().ok()?;
    let minute: u32 = caps.get(2).map_or(Some(0), |m| m.as_str().parse().ok())?;
    let time = NaiveTime::from_hms_opt(hour, minute, 0)?;
    Some((time, caps.get(0)?.range()))
}

/// Text after the earliest locative marker, minus time and day words
///
/// Only the first marker is considered; if nothing useful follows it the
/// utterance has no location.
pub fn extract_location(text: &str) -> Option<String> {
    let original: Vec<char> = text.chars().collect();
    let lowered: Vec<char> = original
        .iter()
        .map(|c| c.to_lowercase().next().unwrap_or(*c))
        .collect();

    let (start, marker_len) = LOCATION_MARKERS
        .iter()
        .filter_map(|marker| {
            let needle: Vec<char> = marker.chars().collect();
            lowered
                .windows(needle.len())
                .position(|window| window == needle.as_slice())
                .map(|pos| (pos, needle.len()))
        })
        .min_by_key(|&(pos, _)| pos)?;

    let candidate: String = original[start + marker_len..].iter().collect();
    clean_location(&candidate)
}

fn clean_location(candidate: &str) -> Option<String> {
    let mut stripped = candidate.to_string();
    while let Some((_, span)) = find_time(&stripped) {
        stripped.replace_range(span, " ");
    }

    let words: Vec<&str> = stripped.split_whitespace().collect();
    let folded: Vec<String> = words
        .iter()
        .map(|w| normalize(w).trim_matches(|c: char| !c.is_alphanumeric() && c != '\'').to_string())
        .collect();

    let mut kept = Vec::with_capacity(words.len());
    let mut i = 0;
    while i < words.len() {
        let rest = &folded[i..];
        if rest.len() >= 3 && rest[0] == "day" && rest[1] == "after" && rest[2] == "tomorrow" {
            i += 3;
            continue;
        }
        if rest.len() >= 2 && rest[0] == "apres" && rest[1] == "demain" {
            i += 2;
            continue;
        }
        let word = rest[0].as_str();
        if word == "apres-demain" || RELATIVE_DAYS.iter().any(|(phrase, _)| *phrase == word) {
            i += 1;
            continue;
        }
        kept.push((words[i], word));
        i += 1;
    }

    let is_marker = |w: &str| LOCATION_MARKERS.iter().any(|m| normalize(m.trim()) == w);
    while kept.first().is_some_and(|(_, f)| is_marker(*f)) {
        kept.remove(0);
    }
    while kept.last().is_some_and(|(_, f)| is_marker(*f)) {
        kept.pop();
    }

    let location = kept
        .iter()
        .map(|(w, _)| *w)
        .collect::<Vec<_>>()
        .join(" ");
    let location = location.trim_matches(|c: char| c.is_whitespace() || c == ',' || c == '.');

    if location.is_empty() {
        None
    } else {
        Some(location.to_string())
    }
}
