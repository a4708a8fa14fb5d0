//! Error types for LLM output parsers.

/// Errors returned by output parsers.
///
/// The structured extractor never surfaces these directly; it folds them into
/// [`ExtractionOutcome::Failed`](crate::output_parser::ExtractionOutcome::Failed)
/// as the failure reason.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    /// The LLM response was empty or whitespace-only.
    #[error("empty LLM response")]
    EmptyResponse,

    /// The candidate text is not valid JSON, even after repair.
    #[error("invalid JSON: {reason}")]
    InvalidJson {
        /// The serde error message from the last parse attempt.
        reason: String,
    },

    /// Valid JSON, but not an object.
    #[error("expected a JSON object, found {found}")]
    NotAnObject {
        /// JSON type that was found instead.
        found: &'static str,
    },

    /// No score found, or the score was outside 0..=10.
    #[error("no valid score found in response")]
    NoScore,
}

/// Return at most `max_chars` characters of `s`, on a char boundary.
pub(crate) fn prefix_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
