//! Persisting finished runs.
//!
//! [`FileSink`] lays results out by day:
//!
//! ```text
//! <root>/2026-03-14/exploration_093012.json
//! <root>/2026-03-14/exploration_093012.md
//! ```
//!
//! The JSON file is the serialized [`WorkflowResult`]; the Markdown file is a
//! reading view with the brief, the terminal headline and the errors.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Local};
use tracing::info;

use crate::brief::Brief;
use crate::context::WorkflowResult;
use crate::error::Result;
use crate::registry::WorkflowMode;
use crate::reports::{DevelopmentReport, ExplorationReport, PolishReport, Report};

/// Where a result ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedResult {
    pub json_path: PathBuf,
    pub markdown_path: PathBuf,
}

/// Destination for finished results.
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn persist(&self, result: &WorkflowResult) -> Result<SavedResult>;
}

/// Writes results as JSON plus Markdown under a root directory.
#[derive(Debug, Clone)]
pub struct FileSink {
    root: PathBuf,
}

impl FileSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Persist `result` as if written at `at`.
    pub async fn persist_at(&self, result: &WorkflowResult, at: DateTime<Local>) -> Result<SavedResult> {
        let dir = self.root.join(at.format("%Y-%m-%d").to_string());
        tokio::fs::create_dir_all(&dir).await?;

        let stem = format!("{}_{}", result.mode.as_str(), at.format("%H%M%S"));
        let json_path = dir.join(format!("{}.json", stem));
        let markdown_path = dir.join(format!("{}.md", stem));

        let json = serde_json::to_string_pretty(result)?;
        tokio::fs::write(&json_path, json).await?;
        tokio::fs::write(&markdown_path, render_markdown(result, at)).await?;

        info!(path = %json_path.display(), success = result.success, "result saved");
        Ok(SavedResult {
            json_path,
            markdown_path,
        })
    }
}

#[async_trait]
impl ResultSink for FileSink {
    async fn persist(&self, result: &WorkflowResult) -> Result<SavedResult> {
        self.persist_at(result, Local::now()).await
    }
}

/// Markdown reading view of a result.
pub fn render_markdown(result: &WorkflowResult, at: DateTime<Local>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# {} report", capitalize(result.mode.as_str()));
    let _ = writeln!(out);
    let _ = writeln!(out, "- Date: {}", at.format("%Y-%m-%d %H:%M"));
    let _ = writeln!(out, "- Status: {}", if result.success { "success" } else { "failed" });
    let _ = writeln!(out, "- Duration: {:.1}s", result.total_duration_seconds);

    if let Some(headline) = headline(result) {
        let _ = writeln!(out, "\n## Headline\n\n{}", headline);
    }

    let brief = Brief::from_value(result.section("brief"));
    let lists = [
        ("Top hooks", &brief.top_hooks),
        ("Key insights", &brief.key_insights),
        ("Warnings", &brief.warnings),
        ("Local context", &brief.local_contexts),
    ];
    if !brief.is_empty() {
        let _ = writeln!(out, "\n## Brief");
        for (label, items) in lists {
            if items.is_empty() {
                continue;
            }
            let _ = writeln!(out, "\n### {}\n", label);
            for item in items {
                let _ = writeln!(out, "- {}", item);
            }
        }
        if !brief.ready_to_use.is_empty() {
            let _ = writeln!(out, "\n### Ready to use\n");
            for item in &brief.ready_to_use {
                let _ = writeln!(out, "- **{}**: {}", item.kind, item.text);
            }
        }
    }

    if !result.errors.is_empty() {
        let _ = writeln!(out, "\n## Errors\n");
        for error in &result.errors {
            let _ = writeln!(out, "- {}", error);
        }
    }
    out
}

/// One line summarizing the terminal stage's verdict.
fn headline(result: &WorkflowResult) -> Option<String> {
    let section = result.terminal_section()?;
    let line = match result.mode {
        WorkflowMode::Exploration => {
            let pick = ExplorationReport::from_value(Some(section)).recommended_angle;
            labelled(&pick.name, &pick.hook)
        }
        WorkflowMode::Development => {
            let pick = DevelopmentReport::from_value(Some(section)).recommended_variant;
            labelled(&pick.name, &pick.hook)
        }
        WorkflowMode::Polish => {
            let report = PolishReport::from_value(Some(section));
            if report.status.is_empty() {
                String::new()
            } else {
                format!("{} ({}/10)", report.status, report.score)
            }
        }
    };
    (!line.is_empty()).then_some(line)
}

fn labelled(name: &str, hook: &str) -> String {
    match (name.is_empty(), hook.is_empty()) {
        (_, true) => name.to_string(),
        (true, false) => format!("> {}", hook),
        (false, false) => format!("**{}**\n\n> {}", name, hook),
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
