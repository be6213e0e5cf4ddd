//! Collaborator traits for calendar discovery and writes

use crate::calendar::registry::CalendarHandle;
use crate::command::operation::OperationDescriptor;
use crate::core::config::SectionConfig;
use crate::core::error::Result;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// One discovered calendar collection
pub trait CalendarCollection: Send + Sync + fmt::Debug {
    /// Resolved collection URL, if the server exposed one
    fn url(&self) -> Option<String>;

    /// Advertised component types such as `VEVENT` or `VTODO`
    ///
    /// Failing to read them is treated by the registry as "none declared".
    fn supported_components(&self) -> Result<Vec<String>>;

    /// Downcast hook for backends that need their own collection type back
    fn as_any(&self) -> &dyn Any;
}

/// External calendar service
///
/// Calls block; the dispatcher runs them on the blocking pool.
pub trait CalendarBackend: Send + Sync {
    /// Collections reachable through one settings section
    ///
    /// With `raise_errors` false, failures are logged and yield an empty list.
    fn discover(
        &self,
        section: &SectionConfig,
        raise_errors: bool,
    ) -> Result<Vec<Arc<dyn CalendarCollection>>>;

    /// Create the event or task described by `op` in `targets`
    fn write(&self, targets: &[CalendarHandle], op: &OperationDescriptor) -> Result<()>;
}
