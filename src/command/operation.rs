//! Operation descriptors - the protocol-agnostic "add this" instruction

use crate::llm::intent::{IntentKind, ParsedIntent};
use serde::Serialize;
use std::collections::BTreeMap;

/// Reminder offset, both kinds
pub const ATTR_ALARM: &str = "alarm";
/// Event location
pub const ATTR_LOCATION: &str = "location";
/// Task due date
pub const ATTR_DUE: &str = "due";
/// Task priority, 1..=9
pub const ATTR_PRIORITY: &str = "priority";

/// Event length when none was given
pub const DEFAULT_EVENT_DURATION: &str = "1h";

/// Verb of an operation; creation is the only one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OpVerb {
    Add,
}

/// Value of one auxiliary attribute
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Text(String),
    Integer(u8),
}

impl AttributeValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Integer(_) => None,
        }
    }

    pub fn as_integer(&self) -> Option<u8> {
        match self {
            Self::Integer(n) => Some(*n),
            Self::Text(_) => None,
        }
    }
}

/// Fully resolved instruction to create one event or task
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationDescriptor {
    pub op: OpVerb,
    pub kind: IntentKind,
    /// Set for events, always `None` for tasks
    pub timespec: Option<String>,
    pub summary: String,
    pub attributes: BTreeMap<&'static str, AttributeValue>,
}

impl OperationDescriptor {
    pub fn text(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(AttributeValue::as_text)
    }

    pub fn priority(&self) -> Option<u8> {
        self.attributes
            .get(ATTR_PRIORITY)
            .and_then(AttributeValue::as_integer)
    }
}

/// Map a parsed intent onto an operation. Pure and total.
pub fn to_operation(intent: &ParsedIntent) -> OperationDescriptor {
    let mut attributes = BTreeMap::new();

    let timespec = match intent.kind {
        IntentKind::Event => {
            if let Some(alarm) = &intent.alarm {
                attributes.insert(ATTR_ALARM, AttributeValue::Text(alarm.clone()));
            }
            if let Some(location) = &intent.location {
                attributes.insert(ATTR_LOCATION, AttributeValue::Text(location.clone()));
            }
            Some(event_timespec(intent))
        }
        IntentKind::Task => {
            if let Some(due) = intent.due_date {
                attributes.insert(ATTR_DUE, AttributeValue::Text(due.format("%Y-%m-%d").to_string()));
            }
            if let Some(priority) = intent.priority {
                attributes.insert(ATTR_PRIORITY, AttributeValue::Integer(priority));
            }
            if let Some(alarm) = &intent.alarm {
                attributes.insert(ATTR_ALARM, AttributeValue::Text(alarm.clone()));
            }
            None
        }
    };

    OperationDescriptor {
        op: OpVerb::Add,
        kind: intent.kind,
        timespec,
        summary: intent.summary.clone(),
        attributes,
    }
}

/// `DATE` for all-day, `DATETHH:MM+DURATION` when timed, `today` otherwise
fn event_timespec(intent: &ParsedIntent) -> String {
    match (intent.date, intent.time) {
        (Some(date), Some(time)) => format!(
            "{}T{}+{}",
            date.format("%Y-%m-%d"),
            time.format("%H:%M"),
            intent.duration.as_deref().unwrap_or(DEFAULT_EVENT_DURATION)
        ),
        (Some(date), None) => date.format("%Y-%m-%d").to_string(),
        (None, _) => "today".to_string(),
    }
}
