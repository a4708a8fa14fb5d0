//! Decoding for reviewers that answer in prose.

use crate::output_parser::{clean_text, parse_score, split_sections};
use crate::reports::ReviewReport;

/// Turn a prose review into a [`ReviewReport`].
///
/// An empty answer yields the empty report; a review without a grade has
/// no `score`.
pub fn decode(raw: &str) -> ReviewReport {
    let Ok(content) = clean_text(raw) else {
        return ReviewReport::default();
    };
    let sections = split_sections(&content);
    ReviewReport {
        score: parse_score(&content).ok(),
        issues_count: sections.iter().map(|s| s.item_count()).sum(),
        sections,
        content,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sections_and_score() {
        let report = decode(
            "Here is my review:\n## Opening\n1. starts with a date\n2. no tension\n\nVERDICT:\nRating: 4",
        );
        assert_eq!(report.score, Some(4.0));
        assert_eq!(report.sections.len(), 2);
        assert_eq!(report.sections[0].title, "Opening");
        assert_eq!(report.issues_count, 2);
    }

    #[test]
    fn test_ungraded_review() {
        let report = decode("The voice is consistent throughout.");
        assert_eq!(report.score, None);
        assert_eq!(report.issues_count, 0);
        assert_eq!(report.content, "The voice is consistent throughout.");
    }

    #[test]
    fn test_empty_answer() {
        assert_eq!(decode("<think>...</think>  "), ReviewReport::default());
    }
}
