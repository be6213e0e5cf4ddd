//! Progress messages sent from background work to the consumer loop

use crate::core::types::TaskId;
use crate::llm::intent::{IntentKind, ParseSource};
use std::fmt;

/// One step of a submission's lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress {
    Submitted { text: String },
    Parsing,
    Parsed {
        kind: IntentKind,
        summary: String,
        source: ParseSource,
    },
    Dispatching { targets: usize },
    Completed {
        kind: IntentKind,
        summary: String,
        calendar_url: String,
    },
    Failed { error: String },
}

impl Progress {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Progress::Completed { .. } | Progress::Failed { .. })
    }
}

/// Immutable message on the notification queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub task: TaskId,
    pub progress: Progress,
}

impl Notification {
    pub fn new(task: TaskId, progress: Progress) -> Self {
        Self { task, progress }
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.progress {
            Progress::Submitted { text } => write!(f, "Input: {}", text),
            Progress::Parsing => f.write_str("Parsing..."),
            Progress::Parsed {
                kind,
                summary,
                source,
            } => write!(f, "Understood {} \"{}\" (via {})", kind, summary, source),
            Progress::Dispatching { targets } => {
                write!(f, "Writing ({} candidate calendar(s))", targets)
            }
            Progress::Completed { kind, summary, .. } => write!(f, "Added {}: {}", kind, summary),
            Progress::Failed { error } => write!(f, "Error: {}", error),
        }
    }
}
