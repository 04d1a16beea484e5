//! The matching engine: per-symbol book multiplexing, submission
//! validation, write-ahead journaling, fill routing, and event
//! publication.

mod engine;
mod error;

pub use engine::{MatchingEngine, SubmitOutcome, SubmitRequest};
pub use error::EngineError;
