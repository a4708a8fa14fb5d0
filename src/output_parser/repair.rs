//! Truncation repair for JSON cut off by a token limit.
//!
//! The algorithm is deliberately small and fully deterministic:
//!
//! 1. Find the last `},`, `],` or `",` in the candidate. If one exists (past
//!    position 0), cut the candidate just after its closing character,
//!    dropping the incomplete final element.
//! 2. Drop trailing whitespace and any dangling comma.
//! 3. Count unmatched `{` and `[` (plain character counts, clamped at zero)
//!    and append that many `]` followed by `}`.
//!
//! The output is not validated here; the caller re-parses it.

use std::iter::repeat;

/// Note attached to a [`Repaired`](crate::output_parser::ExtractionOutcome::Repaired) outcome.
pub const TRUNCATION_NOTE: &str = "truncation-repaired";

/// Separators that mark the end of a complete element.
const ELEMENT_SEPARATORS: [&str; 3] = ["},", "],", "\","];

/// Produce a bracket-balanced candidate from truncated JSON text.
///
/// # Examples
///
/// ```
/// use content_pipeline::output_parser::repair::repair_truncated;
///
/// assert_eq!(repair_truncated(r#"{"a": [1,2,"#), r#"{"a": [1,2]}"#);
/// assert_eq!(
///     repair_truncated(r#"{"items": [{"x": 1}, {"x": 2"#),
///     r#"{"items": [{"x": 1}]}"#
/// );
/// ```
pub fn repair_truncated(candidate: &str) -> String {
    let mut cut = candidate;
    if let Some(idx) = last_separator(candidate) {
        if idx > 0 {
            cut = &candidate[..idx + 1];
        }
    }

    let cut = cut.trim_end().trim_end_matches(',').trim_end();
    let (braces, brackets) = unbalanced(cut);

    let mut repaired = String::with_capacity(cut.len() + braces + brackets);
    repaired.push_str(cut);
    repaired.extend(repeat(']').take(brackets));
    repaired.extend(repeat('}').take(braces));
    repaired
}

/// Byte index of the separator nearest the end of `s`.
fn last_separator(s: &str) -> Option<usize> {
    ELEMENT_SEPARATORS
        .iter()
        .filter_map(|sep| s.rfind(sep))
        .max()
}

/// Unmatched `{` and `[` counts. Surplus closers count as zero, never negative.
fn unbalanced(s: &str) -> (usize, usize) {
    let mut braces: i64 = 0;
    let mut brackets: i64 = 0;
    for ch in s.chars() {
        match ch {
            '{' => braces += 1,
            '}' => braces -= 1,
            '[' => brackets += 1,
            ']' => brackets -= 1,
            _ => {}
        }
    }
    (braces.max(0) as usize, brackets.max(0) as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn parses(s: &str) -> Option<Value> {
        serde_json::from_str(s).ok()
    }

    #[test]
    fn test_mid_array_without_separator() {
        let repaired = repair_truncated(r#"{"a": [1,2,"#);
        assert_eq!(parses(&repaired), Some(json!({"a": [1, 2]})));
    }

    #[test]
    fn test_drops_incomplete_last_object() {
        let repaired = repair_truncated(r#"{"angles": [{"name": "a"}, {"name": "unfini"#);
        assert_eq!(parses(&repaired), Some(json!({"angles": [{"name": "a"}]})));
    }

    #[test]
    fn test_nested_cut_can_misorder_closers() {
        // Closers are appended brackets-first, so a cut inside an object
        // nested in an array yields invalid JSON and the caller reports failure.
        let repaired = repair_truncated(r#"{"angles": [{"name": "a", "hook": "unfini"#);
        assert_eq!(repaired, r#"{"angles": [{"name": "a"]}}"#);
        assert!(parses(&repaired).is_none());
    }

    #[test]
    fn test_cuts_after_string_separator() {
        let repaired = repair_truncated(r#"{"title": "x", "author": "Jan Kowal"#);
        assert_eq!(parses(&repaired), Some(json!({"title": "x"})));
    }

    #[test]
    fn test_cuts_after_array_separator() {
        let repaired = repair_truncated(r#"{"a": [1], "b": [2], "c": {"d": 4"#);
        assert_eq!(parses(&repaired), Some(json!({"a": [1], "b": [2]})));
    }

    #[test]
    fn test_surplus_closers_clamped() {
        // More closers than openers: nothing is appended.
        assert_eq!(repair_truncated("}}]"), "}}]");
        assert_eq!(unbalanced("}}}{"), (0, 0));
        assert_eq!(unbalanced("]]["), (0, 0));
    }

    #[test]
    fn test_separator_at_start_is_ignored() {
        // A separator at index 0 does not truncate.
        assert_eq!(repair_truncated("},"), "}");
    }

    #[test]
    fn test_complete_input_unchanged() {
        assert_eq!(repair_truncated(r#"{"a": 1}"#), r#"{"a": 1}"#);
    }

    #[test]
    fn test_closers_brackets_then_braces() {
        assert_eq!(repair_truncated(r#"{"a": {"b": [1"#), r#"{"a": {"b": [1]}}"#);
    }

    #[test]
    fn test_every_prefix_never_panics() {
        let full = r#"{"hooks": ["one", "two"], "nested": {"list": [{"k": "v"}, {"k": "w"}]}, "n": 3}"#;
        for (idx, _) in full.char_indices().skip(1) {
            let repaired = repair_truncated(&full[..idx]);
            if let Some(Value::Object(map)) = parses(&repaired) {
                // Whatever survives is a subset of the original keys.
                for key in map.keys() {
                    assert!(["hooks", "nested", "n"].contains(&key.as_str()), "{}", key);
                }
            }
        }
    }
}
