//! Language model integration
//!
//! Client -> prompt -> JSON extraction, with a heuristic parser behind it
//! for when the model is unavailable or unreliable.

pub mod client;
pub mod fallback;
pub mod intent;
pub mod parser;

pub use client::OllamaClient;
pub use fallback::fallback_parse;
pub use intent::{IntentKind, ParseSource, ParsedIntent};
pub use parser::{IntentParser, ParseOutcome};
