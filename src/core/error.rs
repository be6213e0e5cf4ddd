use crate::llm::intent::IntentKind;
use thiserror::Error;

/// Default for `AssistConfig::max_error_chars`.
pub const MAX_ERROR_CHARS: usize = 300;

#[derive(Error, Debug)]
pub enum AssistError {
    #[error("Language model unreachable: {0}")]
    BackendUnreachable(String),

    #[error("Language model returned HTTP {status}: {body}")]
    BackendError { status: u16, body: String },

    #[error("Could not extract JSON from model output: {0}")]
    ExtractionFailure(String),

    #[error("Unknown intent kind: {0:?}")]
    UnknownIntentKind(String),

    #[error("No calendar accepts {0}s")]
    NoCompatibleCalendar(IntentKind),

    #[error("Calendar write failed: {0}")]
    WriteFailure(String),

    #[error("Calendar discovery failed: {0}")]
    Discovery(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
}

impl AssistError {
    /// Failures the parser absorbs by switching to the heuristic fallback.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AssistError::BackendUnreachable(_)
                | AssistError::BackendError { .. }
                | AssistError::ExtractionFailure(_)
        )
    }
}

/// Truncate on a char boundary, marking the cut with an ellipsis.
pub fn truncate_message(message: &str, max_chars: usize) -> String {
    if message.chars().count() <= max_chars {
        return message.to_string();
    }
    let mut out: String = message.chars().take(max_chars.saturating_sub(1)).collect();
    out.push('…');
    out
}

pub type Result<T> = std::result::Result<T, AssistError>;
