//! Integration tests for the offline intent pipeline
//!
//! Heuristic parse followed by the operation mapper, the path every
//! utterance takes when no language model is reachable.

use chrono::{NaiveDate, NaiveTime};
use plann_assist::command::operation::{to_operation, AttributeValue, OpVerb, ATTR_PRIORITY};
use plann_assist::llm::{fallback_parse, IntentKind, IntentParser, ParseSource};
use proptest::prelude::*;

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 10, 22).unwrap()
}

// ============================================================================
// End-to-end heuristic scenarios
// ============================================================================

#[test]
fn test_buy_bread_becomes_task() {
    let intent = fallback_parse("Buy bread", today());
    assert_eq!(intent.kind, IntentKind::Task);
    assert_eq!(intent.summary, "Buy bread");
    assert_eq!(intent.priority, Some(5));

    let op = to_operation(&intent);
    assert_eq!(op.op, OpVerb::Add);
    assert_eq!(op.kind, IntentKind::Task);
    assert_eq!(op.timespec, None);
    assert_eq!(op.summary, "Buy bread");
    assert_eq!(op.attributes.len(), 1);
    assert_eq!(op.attributes.get(ATTR_PRIORITY), Some(&AttributeValue::Integer(5)));
}

#[test]
fn test_meeting_tomorrow_at_14h() {
    let intent = fallback_parse("Meeting tomorrow at 14h", today());
    assert_eq!(intent.kind, IntentKind::Event);
    assert_eq!(intent.date, NaiveDate::from_ymd_opt(2025, 10, 23));
    assert_eq!(intent.time, NaiveTime::from_hms_opt(14, 0, 0));
    assert_eq!(intent.location, None);

    let op = to_operation(&intent);
    assert_eq!(op.timespec.as_deref(), Some("2025-10-23T14:00+1h"));
}

#[test]
fn test_french_task_with_due_date() {
    let intent = fallback_parse("Acheter du pain demain", today());
    assert_eq!(intent.kind, IntentKind::Task);
    assert_eq!(intent.due_date, NaiveDate::from_ymd_opt(2025, 10, 23));
    assert_eq!(intent.date, None);

    let op = to_operation(&intent);
    assert_eq!(op.timespec, None);
    assert_eq!(op.text("due"), Some("2025-10-23"));
}

#[test]
fn test_event_location_survives_to_operation() {
    let intent = fallback_parse("Dentist tomorrow 14h30 chez le dentiste Martin", today());
    let op = to_operation(&intent);
    assert_eq!(op.kind, IntentKind::Event);
    assert_eq!(op.timespec.as_deref(), Some("2025-10-23T14:30+1h"));
    assert_eq!(op.text("location"), Some("le dentiste Martin"));
}

#[tokio::test]
async fn test_offline_parser_reports_heuristics() {
    let outcome = IntentParser::offline()
        .parse("Call the plumber", today())
        .await
        .unwrap();
    assert_eq!(outcome.source, ParseSource::Fallback);
    assert_eq!(outcome.intent.kind, IntentKind::Task);
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn prop_fallback_is_total(text in ".{0,80}") {
        let intent = fallback_parse(&text, today());
        prop_assert!(!intent.summary.trim().is_empty());
        if let Some(priority) = intent.priority {
            prop_assert!((1..=9).contains(&priority));
        }
    }

    #[test]
    fn prop_timespec_follows_kind(text in "[a-zA-Z0-9 :]{0,60}") {
        let op = to_operation(&fallback_parse(&text, today()));
        match op.kind {
            IntentKind::Task => prop_assert!(op.timespec.is_none()),
            IntentKind::Event => prop_assert!(op.timespec.is_some()),
        }
    }

    #[test]
    fn prop_mapper_is_pure(text in "[a-zA-Z0-9 :]{0,60}") {
        let intent = fallback_parse(&text, today());
        prop_assert_eq!(to_operation(&intent), to_operation(&intent));
    }
}
