//! Command pipeline
//!
//! Converts a ParsedIntent into a calendar write:
//! ParsedIntent -> to_operation -> OperationDescriptor -> CommandExecutor -> CalendarBackend

pub mod executor;
pub mod operation;

pub use executor::{CommandExecutor, ExecutionResult};
pub use operation::{to_operation, AttributeValue, OpVerb, OperationDescriptor};
