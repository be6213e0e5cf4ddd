//! Plann Assist - natural language quick-add for calendar events and tasks

pub mod calendar;
pub mod command;
pub mod core;
pub mod dispatch;
pub mod llm;
