//! Calendar collections: collaborator contract, classification, plann driver
//!
//! The wire protocol lives behind [`CalendarBackend`]; the core only needs
//! discovery, capability metadata and a write call.

pub mod backend;
pub mod plann;
pub mod registry;

pub use backend::{CalendarBackend, CalendarCollection};
pub use plann::PlannCli;
pub use registry::{CalendarHandle, CalendarRegistry};
