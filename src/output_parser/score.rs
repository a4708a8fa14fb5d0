//! Score extraction for text-based review stages.
//!
//! Reviewers answer in prose and grade on a ten-point scale somewhere in the
//! text (`"Overall: 7/10"`, `"Score: 6.5"`). [`parse_score`] finds that grade.

use crate::output_parser::error::ParseError;
use crate::output_parser::extract::strip_think_tags;

/// Upper bound of the review scale.
pub const SCALE_MAX: f64 = 10.0;

/// Extract a 0–10 score from a review.
///
/// Strategies, in order:
/// 1. Fraction over ten: `"7/10"`, `"8.5 / 10"` (first match wins)
/// 2. Labeled: `"Score: 7"`, `"Rating: 7"`, `"Ocena: 7"`
///
/// # Examples
///
/// ```
/// use content_pipeline::output_parser::parse_score;
///
/// assert_eq!(parse_score("Voice consistency: 7/10. Good.").unwrap(), 7.0);
/// assert_eq!(parse_score("Score: 8.5").unwrap(), 8.5);
/// assert!(parse_score("No grade here.").is_err());
/// ```
pub fn parse_score(response: &str) -> Result<f64, ParseError> {
    let cleaned = strip_think_tags(response);
    let cleaned = cleaned.trim();

    if cleaned.is_empty() {
        return Err(ParseError::EmptyResponse);
    }

    if let Some(score) = fraction_over_ten(cleaned) {
        return Ok(score);
    }

    let lower = cleaned.to_lowercase();
    for label in ["score:", "rating:", "ocena:"] {
        if let Some(pos) = lower.find(label) {
            let after = &lower[pos + label.len()..];
            if let Some(first) = find_all_numbers(after).first() {
                if let Ok(val) = first.parse::<f64>() {
                    if (0.0..=SCALE_MAX).contains(&val) {
                        return Ok(val);
                    }
                }
            }
        }
    }

    Err(ParseError::NoScore)
}

/// First `N/10` (whitespace allowed around the slash) with `0 <= N <= 10`.
fn fraction_over_ten(text: &str) -> Option<f64> {
    let chars: Vec<char> = text.chars().collect();
    for (i, &c) in chars.iter().enumerate() {
        if c != '/' {
            continue;
        }

        // Denominator must be exactly "10".
        let mut j = i + 1;
        while j < chars.len() && chars[j] == ' ' {
            j += 1;
        }
        let denominator: String = chars[j..].iter().take_while(|c| c.is_ascii_digit()).collect();
        if denominator != "10" {
            continue;
        }

        let mut end = i;
        while end > 0 && chars[end - 1] == ' ' {
            end -= 1;
        }
        let mut start = end;
        while start > 0 && (chars[start - 1].is_ascii_digit() || chars[start - 1] == '.') {
            start -= 1;
        }
        if start == end {
            continue;
        }
        let numerator: String = chars[start..end].iter().collect();
        if let Ok(val) = numerator.trim_start_matches('.').parse::<f64>() {
            if (0.0..=SCALE_MAX).contains(&val) {
                return Some(val);
            }
        }
    }
    None
}

/// Find all number-like substrings (digits with an optional decimal part).
fn find_all_numbers(text: &str) -> Vec<String> {
    let mut numbers = Vec::new();
    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();
    let mut i = 0;

    while i < len {
        if chars[i].is_ascii_digit() {
            let start = i;
            while i < len && chars[i].is_ascii_digit() {
                i += 1;
            }
            if i < len && chars[i] == '.' && i + 1 < len && chars[i + 1].is_ascii_digit() {
                i += 1;
                while i < len && chars[i].is_ascii_digit() {
                    i += 1;
                }
            }
            numbers.push(chars[start..i].iter().collect());
            continue;
        }
        i += 1;
    }

    numbers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fraction_variants() {
        assert_eq!(parse_score("7/10").unwrap(), 7.0);
        assert_eq!(parse_score("Hook strength 8.5 / 10").unwrap(), 8.5);
        assert_eq!(parse_score("**Overall: 6/10**").unwrap(), 6.0);
    }

    #[test]
    fn test_first_fraction_wins() {
        assert_eq!(parse_score("Opening 4/10, closing 9/10").unwrap(), 4.0);
    }

    #[test]
    fn test_other_denominators_ignored() {
        assert_eq!(parse_score("3/5 of readers, overall 7/10").unwrap(), 7.0);
        assert!(parse_score("published 12/100").is_err());
    }

    #[test]
    fn test_out_of_range_rejected() {
        assert!(parse_score("15/10").is_err());
        assert!(parse_score("Score: 42").is_err());
    }

    #[test]
    fn test_labeled() {
        assert_eq!(parse_score("Rating: 9, strong").unwrap(), 9.0);
        assert_eq!(parse_score("Ocena: 5").unwrap(), 5.0);
    }

    #[test]
    fn test_empty() {
        assert_eq!(parse_score("  "), Err(ParseError::EmptyResponse));
        assert_eq!(parse_score("<think>7/10</think>"), Err(ParseError::EmptyResponse));
    }

    #[test]
    fn test_find_all_numbers() {
        assert_eq!(find_all_numbers("a 1 b 2.5 c 3."), vec!["1", "2.5", "3"]);
    }
}
