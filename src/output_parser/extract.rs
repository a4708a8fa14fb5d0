//! Structured output extraction: fenced or bare JSON, with truncation repair.
//!
//! [`extract`] is the only entry point stages use. It never fails; callers
//! match on [`ExtractionOutcome`] and fall back to a stage's empty report
//! when nothing could be recovered.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::output_parser::error::{prefix_chars, ParseError};
use crate::output_parser::repair::{repair_truncated, TRUNCATION_NOTE};

/// Opening marker of a JSON code fence.
const JSON_FENCE: &str = "```json";
const FENCE: &str = "```";

/// How many characters of the raw response a failure keeps.
pub const FAILED_PREFIX_CHARS: usize = 500;

/// Result of one extraction attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionOutcome {
    /// The candidate parsed as-is.
    Parsed(Map<String, Value>),
    /// The candidate parsed after truncation repair.
    Repaired(Map<String, Value>, &'static str),
    /// Nothing recoverable.
    Failed {
        /// First 500 characters of the raw response.
        raw_prefix: String,
        reason: String,
    },
}

impl ExtractionOutcome {
    /// The recovered mapping, if any.
    pub fn map(&self) -> Option<&Map<String, Value>> {
        match self {
            ExtractionOutcome::Parsed(map) | ExtractionOutcome::Repaired(map, _) => Some(map),
            ExtractionOutcome::Failed { .. } => None,
        }
    }

    pub fn is_repaired(&self) -> bool {
        matches!(self, ExtractionOutcome::Repaired(..))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ExtractionOutcome::Failed { .. })
    }

    /// Decode into a typed report.
    ///
    /// Reports are `#[serde(default)]`, so missing fields take their defaults.
    /// A failed outcome, or a mapping whose fields have the wrong types,
    /// yields `T::default()`.
    pub fn into_report<T: DeserializeOwned + Default>(self) -> T {
        match self {
            ExtractionOutcome::Parsed(map) | ExtractionOutcome::Repaired(map, _) => {
                serde_json::from_value(Value::Object(map)).unwrap_or_else(|e| {
                    warn!(error = %e, "report fields did not match the expected shape");
                    T::default()
                })
            }
            ExtractionOutcome::Failed { .. } => T::default(),
        }
    }
}

/// Where the JSON candidate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateSource {
    /// Interior of a closed ```json fence.
    Fenced,
    /// Everything after an unclosed ```json fence (truncated response).
    UnclosedFence,
    /// The whole response.
    Bare,
}

/// Strip all `<think>...</think>` and `<thinking>...</thinking>` blocks from text.
///
/// An unclosed block strips everything after its opening tag.
///
/// # Examples
///
/// ```
/// use content_pipeline::output_parser::strip_think_tags;
///
/// assert_eq!(strip_think_tags("<think>reasoning</think>result"), "result");
/// assert_eq!(strip_think_tags("<think>no closing tag"), "");
/// ```
pub fn strip_think_tags(text: &str) -> String {
    let result = strip_tag_variant(text, "<think>", "</think>");
    strip_tag_variant(&result, "<thinking>", "</thinking>")
}

fn strip_tag_variant(text: &str, open: &str, close: &str) -> String {
    let mut result = text.to_string();
    while let Some(start) = result.find(open) {
        if let Some(end_offset) = result[start..].find(close) {
            let end = start + end_offset + close.len();
            result = format!("{}{}", &result[..start], &result[end..]);
        } else {
            result.truncate(start);
            break;
        }
    }
    result
}

/// Pick the JSON candidate out of a response.
///
/// # Examples
///
/// ```
/// use content_pipeline::output_parser::extract::{locate_candidate, CandidateSource};
///
/// let (c, src) = locate_candidate("Here:\n```json\n{\"a\": 1}\n```\nDone.");
/// assert_eq!((c, src), ("{\"a\": 1}", CandidateSource::Fenced));
///
/// let (c, src) = locate_candidate("```json\n{\"a\": [1,");
/// assert_eq!((c, src), ("{\"a\": [1,", CandidateSource::UnclosedFence));
/// ```
pub fn locate_candidate(text: &str) -> (&str, CandidateSource) {
    if let Some(start) = find_ignore_ascii_case(text, JSON_FENCE) {
        let interior = &text[start + JSON_FENCE.len()..];
        return match interior.find(FENCE) {
            Some(end) => (interior[..end].trim(), CandidateSource::Fenced),
            None => (interior.trim(), CandidateSource::UnclosedFence),
        };
    }
    (text.trim(), CandidateSource::Bare)
}

fn find_ignore_ascii_case(haystack: &str, needle: &str) -> Option<usize> {
    haystack
        .to_ascii_lowercase()
        .find(&needle.to_ascii_lowercase())
}

fn parse_object(candidate: &str) -> Result<Map<String, Value>, ParseError> {
    let value: Value = serde_json::from_str(candidate).map_err(|e| ParseError::InvalidJson {
        reason: e.to_string(),
    })?;
    match value {
        Value::Object(map) => Ok(map),
        Value::Array(_) => Err(ParseError::NotAnObject { found: "array" }),
        Value::String(_) => Err(ParseError::NotAnObject { found: "string" }),
        Value::Number(_) => Err(ParseError::NotAnObject { found: "number" }),
        Value::Bool(_) => Err(ParseError::NotAnObject { found: "boolean" }),
        Value::Null => Err(ParseError::NotAnObject { found: "null" }),
    }
}

/// Recover a JSON mapping from a raw model response.
///
/// Never panics and never returns an error; see [`ExtractionOutcome`].
///
/// # Examples
///
/// ```
/// use content_pipeline::output_parser::{extract, ExtractionOutcome};
/// use serde_json::json;
///
/// let outcome = extract("```json\n{\"a\": [1,2,");
/// let expected = json!({"a": [1, 2]});
/// assert_eq!(outcome, ExtractionOutcome::Repaired(
///     expected.as_object().unwrap().clone(),
///     "truncation-repaired",
/// ));
/// ```
pub fn extract(raw: &str) -> ExtractionOutcome {
    let cleaned = strip_think_tags(raw);
    let (candidate, source) = locate_candidate(&cleaned);

    if source == CandidateSource::UnclosedFence {
        debug!("json fence not closed, using fallback candidate");
    }

    if candidate.is_empty() {
        return failed(raw, ParseError::EmptyResponse);
    }

    let first_error = match parse_object(candidate) {
        Ok(map) => return ExtractionOutcome::Parsed(map),
        Err(e) => e,
    };

    // Repair only helps truncated JSON; an object of the wrong type stays wrong.
    if let ParseError::NotAnObject { .. } = first_error {
        return failed(raw, first_error);
    }

    let repaired = repair_truncated(candidate);
    match parse_object(&repaired) {
        Ok(map) => {
            debug!(?source, "json recovered by truncation repair");
            ExtractionOutcome::Repaired(map, TRUNCATION_NOTE)
        }
        Err(e) => {
            warn!(?source, first_error = %first_error, "json extraction failed");
            failed(raw, e)
        }
    }
}

fn failed(raw: &str, reason: ParseError) -> ExtractionOutcome {
    ExtractionOutcome::Failed {
        raw_prefix: prefix_chars(raw, FAILED_PREFIX_CHARS).to_string(),
        reason: reason.to_string(),
    }
}
