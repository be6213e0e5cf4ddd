//! Command execution - routes an operation to its calendars and writes it

use crate::calendar::backend::CalendarBackend;
use crate::calendar::registry::CalendarRegistry;
use crate::command::operation::OperationDescriptor;
use crate::core::error::{AssistError, Result};
use crate::llm::intent::IntentKind;

/// Executes operations against the registered calendars
pub struct CommandExecutor;

impl CommandExecutor {
    /// Pick targets for the operation's kind and hand the write to the backend
    ///
    /// Backend errors other than a missing calendar are reported as
    /// [`AssistError::WriteFailure`].
    pub fn execute(
        registry: &CalendarRegistry,
        backend: &dyn CalendarBackend,
        op: &OperationDescriptor,
    ) -> Result<ExecutionResult> {
        let targets = registry.targets_for(op.kind)?;

        backend.write(targets, op).map_err(|e| match e {
            AssistError::WriteFailure(_) | AssistError::NoCompatibleCalendar(_) => e,
            other => AssistError::WriteFailure(other.to_string()),
        })?;

        Ok(ExecutionResult {
            kind: op.kind,
            summary: op.summary.clone(),
            calendar_url: targets[0].url().to_string(),
            candidates: targets.len(),
        })
    }
}

/// Result of a successful write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub kind: IntentKind,
    pub summary: String,
    /// First target, where single-target backends write
    pub calendar_url: String,
    /// Size of the group the targets came from
    pub candidates: usize,
}
