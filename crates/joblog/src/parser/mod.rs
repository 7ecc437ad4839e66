//! Template-driven text-to-entity parsing.

pub mod engine;
pub mod pattern_cache;

pub use engine::{term_pattern, ParseError, ParseOutcome, ParsingEngine};
pub use pattern_cache::PatternCache;
