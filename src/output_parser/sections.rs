//! Text-section parsing for reviewers that answer in prose.
//!
//! [`clean_text`] strips think blocks and chat boilerplate;
//! [`split_sections`] cuts the result into titled sections on markdown
//! headings, bold-only lines, and upper-case lines ending in a colon.

use serde::{Deserialize, Serialize};

use crate::output_parser::error::ParseError;
use crate::output_parser::extract::strip_think_tags;

/// Common boilerplate prefixes that LLMs add to responses.
const SIMPLE_PREFIXES: &[&str] = &[
    "Sure! ",
    "Sure, ",
    "Of course! ",
    "Of course, ",
    "Certainly! ",
    "Certainly, ",
];

/// Prefixes that consume up to the next newline or colon.
const LINE_PREFIXES: &[&str] = &["Here's ", "Here is "];

/// One titled block of a prose review.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Section {
    pub title: String,
    pub body: String,
}

impl Section {
    /// Number of bullet or numbered lines in the body.
    pub fn item_count(&self) -> usize {
        self.body.lines().filter(|l| is_list_item(l)).count()
    }
}

/// Clean an LLM response for use as plain text.
///
/// # Examples
///
/// ```
/// use content_pipeline::output_parser::clean_text;
///
/// assert_eq!(clean_text("Sure! The opening is weak.").unwrap(), "The opening is weak.");
/// ```
pub fn clean_text(response: &str) -> Result<String, ParseError> {
    let stripped = strip_think_tags(response);
    let cleaned = stripped.trim();

    if cleaned.is_empty() {
        return Err(ParseError::EmptyResponse);
    }

    let mut text = cleaned;
    for prefix in SIMPLE_PREFIXES {
        if let Some(rest) = text.strip_prefix(prefix) {
            text = rest;
            break;
        }
    }

    if text == cleaned {
        for prefix in LINE_PREFIXES {
            if let Some(rest) = text.strip_prefix(prefix) {
                if let Some(pos) = rest.find('\n') {
                    text = rest[pos + 1..].trim_start();
                    break;
                } else if let Some(pos) = rest.find(':') {
                    text = rest[pos + 1..].trim_start();
                    break;
                }
            }
        }
    }

    let result = text.trim();
    if result.is_empty() {
        return Err(ParseError::EmptyResponse);
    }
    Ok(result.to_string())
}

/// Split prose into titled sections.
///
/// Text before the first heading becomes a section with an empty title.
/// Sections with neither title nor body are dropped.
///
/// # Examples
///
/// ```
/// use content_pipeline::output_parser::split_sections;
///
/// let sections = split_sections("## Verdict\nSolid.\n\nISSUES:\n- too long\n- vague CTA");
/// assert_eq!(sections.len(), 2);
/// assert_eq!(sections[0].title, "Verdict");
/// assert_eq!(sections[1].title, "ISSUES");
/// assert_eq!(sections[1].item_count(), 2);
/// ```
pub fn split_sections(text: &str) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut current = Section::default();

    for line in text.lines() {
        if let Some(title) = heading_title(line) {
            push_section(&mut sections, current);
            current = Section {
                title,
                body: String::new(),
            };
        } else {
            if !current.body.is_empty() {
                current.body.push('\n');
            }
            current.body.push_str(line);
        }
    }
    push_section(&mut sections, current);
    sections
}

fn push_section(sections: &mut Vec<Section>, mut section: Section) {
    section.body = section.body.trim().to_string();
    if !section.title.is_empty() || !section.body.is_empty() {
        sections.push(section);
    }
}

fn heading_title(line: &str) -> Option<String> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }

    if trimmed.starts_with('#') {
        let title = trimmed.trim_start_matches('#').trim();
        return (!title.is_empty()).then(|| title.to_string());
    }

    if trimmed.len() > 4 && trimmed.starts_with("**") && trimmed.ends_with("**") {
        let title = trimmed.trim_matches('*').trim().trim_end_matches(':').trim();
        return (!title.is_empty()).then(|| title.to_string());
    }

    if let Some(title) = trimmed.strip_suffix(':') {
        let has_letters = title.chars().any(|c| c.is_alphabetic());
        let all_upper = title
            .chars()
            .filter(|c| c.is_alphabetic())
            .all(|c| c.is_uppercase());
        if has_letters && all_upper && !is_list_item(trimmed) {
            return Some(title.trim().to_string());
        }
    }

    None
}

fn is_list_item(line: &str) -> bool {
    let t = line.trim_start();
    if t.starts_with("- ") || t.starts_with("* ") || t.starts_with("• ") {
        return true;
    }
    let digits = t.chars().take_while(|c| c.is_ascii_digit()).count();
    digits > 0 && matches!(t[digits..].chars().next(), Some('.') | Some(')'))
}
