//! # LLM Output Parser
//!
//! Recovers structured data from model responses without another model call.
//!
//! | Function | Use Case |
//! |--------|----------|
//! | [`extract`] | JSON mapping from fenced, bare or truncated output |
//! | [`parse_score`] | 0–10 grade from a prose review |
//! | [`clean_text`] | Prose without think blocks or chat boilerplate |
//! | [`split_sections`] | Titled sections of a prose review |
//!
//! ## Shared Utilities
//!
//! | Function | Purpose |
//! |----------|---------|
//! | [`strip_think_tags`] | Remove `<think>` blocks from text |
//! | [`repair_truncated`] | Bracket-balance JSON cut off by a token limit |

pub mod error;
pub mod extract;
pub mod repair;
pub mod score;
pub mod sections;

pub use error::ParseError;
pub use extract::{extract, strip_think_tags, ExtractionOutcome};
pub use repair::repair_truncated;
pub use score::parse_score;
pub use sections::{clean_text, split_sections, Section};
