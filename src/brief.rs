//! Two-phase map-reduce brief.
//!
//! **Map**: each non-empty stage report is serialized, cut to
//! [`MAP_INPUT_CAP`] characters and compressed by a cheap model into a
//! [`CompactExtraction`] of at most three items per category. Map calls run
//! as a bounded-concurrency fan-out; a failed call yields an empty
//! extraction for that stage and never aborts the brief.
//!
//! **Reduce**: the non-empty extractions are rendered into one compact
//! document and synthesized by a stronger model into a [`Brief`]. Caps are
//! enforced in code after parsing, whatever the model returns.
//!
//! The reduce call's input is bounded by `stages × cap` regardless of how
//! verbose the stage reports are.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info_span, warn, Instrument};

use crate::backend::ChatMessage;
use crate::config::ModelRoster;
use crate::events::{emit, Event, EventHandler};
use crate::gateway::{ModelGateway, UsageMeter};
use crate::output_parser::error::prefix_chars;
use crate::reports::lenient::{string, strings};
use crate::reports::Report;
use crate::stages::decode;

/// Characters of a serialized report sent to the map model.
pub const MAP_INPUT_CAP: usize = 2500;

/// Appended to a report cut at [`MAP_INPUT_CAP`].
pub const TRUNCATION_MARKER: &str = "\n...[truncated]";

/// Per-category item limit for extractions and the brief.
pub const CATEGORY_CAP: usize = 3;

const MAP_TEMPERATURE: f64 = 0.3;
const MAP_MAX_TOKENS: u32 = 800;
const REDUCE_TEMPERATURE: f64 = 0.5;
const REDUCE_MAX_TOKENS: u32 = 1500;

const MAP_SYSTEM_PROMPT: &str = r#"# BRIEF EXTRACTOR

Pick the top items from one analyst's output.

Rules:
- At most 3 items per category
- Keep literal quotes and proposals where possible
- Add no interpretation of your own
- If the output is empty or broken, return empty lists

Answer with one JSON object in a ```json block:
{"agent": "", "topHooks": [], "topInsights": [], "topProposals": [], "warnings": [], "local": []}"#;

const REDUCE_SYSTEM_PROMPT: &str = r#"# BRIEF SYNTHESIZER

You receive compressed outputs of several analysts. Build ONE brief with the best elements, ready to use in a post.

Rules:
1. No numeric scoring or grading language (no "7/10", no "good", no "average")
2. Prefer literal quotes and ready phrases over paraphrase
3. At most 3 hooks, 3 insights, 3 warnings and 3 local-context items
4. Keep it short enough to scan in seconds

Answer with one JSON object in a ```json block:
{"topHooks": [], "keyInsights": [], "readyToUse": [{"type": "conversion|analogy|quote|phrase", "text": ""}], "warnings": [], "localContexts": []}"#;

/// One stage's report compressed by the map phase.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CompactExtraction {
    /// Stage the items came from.
    pub agent: String,
    #[serde(deserialize_with = "strings")]
    pub top_hooks: Vec<String>,
    #[serde(deserialize_with = "strings")]
    pub top_insights: Vec<String>,
    #[serde(deserialize_with = "strings")]
    pub top_proposals: Vec<String>,
    #[serde(deserialize_with = "strings")]
    pub warnings: Vec<String>,
    /// Items tied to the audience's local context.
    #[serde(deserialize_with = "strings")]
    pub local: Vec<String>,
}

impl CompactExtraction {
    /// An extraction with no items, attributed to `agent`.
    pub fn empty(agent: impl Into<String>) -> Self {
        Self {
            agent: agent.into(),
            ..Default::default()
        }
    }

    fn categories(&self) -> [(&'static str, &Vec<String>); 5] {
        [
            ("Hooks", &self.top_hooks),
            ("Insights", &self.top_insights),
            ("Proposals", &self.top_proposals),
            ("Warnings", &self.warnings),
            ("Local context", &self.local),
        ]
    }

    /// Whether every category is empty.
    pub fn is_empty(&self) -> bool {
        self.categories().iter().all(|(_, items)| items.is_empty())
    }

    /// `### agent` followed by one line per non-empty category.
    pub fn render(&self) -> String {
        let mut out = format!("### {}\n", self.agent);
        for (label, items) in self.categories() {
            if !items.is_empty() {
                let list = serde_json::to_string(items).unwrap_or_default();
                out.push_str(&format!("{}: {}\n", label, list));
            }
        }
        out
    }
}

impl Report for CompactExtraction {
    fn normalize(&mut self) {
        for list in [
            &mut self.top_hooks,
            &mut self.top_insights,
            &mut self.top_proposals,
            &mut self.warnings,
            &mut self.local,
        ] {
            list.retain(|s| !s.trim().is_empty());
            list.truncate(CATEGORY_CAP);
        }
    }
}

/// A ready-to-paste element: conversion, analogy, quote or phrase.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadyItem {
    #[serde(rename = "type", deserialize_with = "string")]
    pub kind: String,
    #[serde(deserialize_with = "string")]
    pub text: String,
}

/// The condensed, actionable result of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Brief {
    #[serde(deserialize_with = "strings")]
    pub top_hooks: Vec<String>,
    #[serde(deserialize_with = "strings")]
    pub key_insights: Vec<String>,
    pub ready_to_use: Vec<ReadyItem>,
    #[serde(deserialize_with = "strings")]
    pub warnings: Vec<String>,
    #[serde(deserialize_with = "strings")]
    pub local_contexts: Vec<String>,
}

impl Brief {
    pub fn is_empty(&self) -> bool {
        self.top_hooks.is_empty()
            && self.key_insights.is_empty()
            && self.ready_to_use.is_empty()
            && self.warnings.is_empty()
            && self.local_contexts.is_empty()
    }
}

impl Report for Brief {
    fn normalize(&mut self) {
        for list in [
            &mut self.top_hooks,
            &mut self.key_insights,
            &mut self.warnings,
            &mut self.local_contexts,
        ] {
            list.retain(|s| !s.trim().is_empty());
            list.truncate(CATEGORY_CAP);
        }
        self.ready_to_use.retain(|item| !item.text.trim().is_empty());
    }
}

/// Cut `text` to [`MAP_INPUT_CAP`] characters, marking the cut.
///
/// ```
/// use content_pipeline::brief::{truncate_for_map, MAP_INPUT_CAP, TRUNCATION_MARKER};
///
/// let long = "x".repeat(MAP_INPUT_CAP + 10);
/// let cut = truncate_for_map(&long);
/// assert!(cut.ends_with(TRUNCATION_MARKER));
/// assert_eq!(truncate_for_map("short"), "short");
/// ```
pub fn truncate_for_map(text: &str) -> String {
    if text.chars().count() <= MAP_INPUT_CAP {
        return text.to_string();
    }
    format!("{}{}", prefix_chars(text, MAP_INPUT_CAP), TRUNCATION_MARKER)
}

/// The compact document fed to the reduce call.
pub fn compact_document(extractions: &[CompactExtraction]) -> String {
    let mut doc = String::from("## ANALYST EXTRACTS\n\n");
    for extraction in extractions.iter().filter(|e| !e.is_empty()) {
        doc.push_str(&extraction.render());
        doc.push('\n');
    }
    doc
}

/// Map-reduce aggregator over a shared gateway.
pub struct BriefAggregator {
    gateway: Arc<ModelGateway>,
    map_model: String,
    reduce_model: String,
    concurrency: usize,
    event_handler: Option<Arc<dyn EventHandler>>,
}

impl BriefAggregator {
    /// Map on `roster.extraction`, reduce on `roster.synthesis`.
    pub fn new(gateway: Arc<ModelGateway>, roster: &ModelRoster) -> Self {
        Self {
            gateway,
            map_model: roster.extraction.clone(),
            reduce_model: roster.synthesis.clone(),
            concurrency: 4,
            event_handler: None,
        }
    }

    /// Maximum concurrent map calls (at least one).
    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }

    pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.event_handler = Some(handler);
        self
    }

    /// Map phase for one stage: compress its serialized report.
    pub async fn extract(&self, stage: &str, output: &str) -> CompactExtraction {
        self.extract_metered(stage, output, None).await
    }

    async fn extract_metered(&self, stage: &str, output: &str, meter: Option<&UsageMeter>) -> CompactExtraction {
        let messages = vec![
            ChatMessage::system(MAP_SYSTEM_PROMPT),
            ChatMessage::user(format!(
                "AGENT: {}\n\nOUTPUT:\n{}",
                stage,
                truncate_for_map(output)
            )),
        ];
        let response = self
            .gateway
            .complete_metered(messages, &self.map_model, MAP_TEMPERATURE, MAP_MAX_TOKENS, meter)
            .await;

        if let Some(error) = response.error_message {
            warn!(stage, error = error.as_str(), "brief map call failed");
            return CompactExtraction::empty(stage);
        }

        let mut extraction: CompactExtraction =
            decode(&format!("brief:{}", stage), &response.text, &self.event_handler);
        extraction.agent = stage.to_string();
        extraction
    }

    /// Reduce phase: synthesize the brief from map-phase extractions.
    ///
    /// Skips the model call when every extraction is empty.
    pub async fn synthesize(&self, extractions: &[CompactExtraction]) -> Brief {
        self.synthesize_metered(extractions, None).await
    }

    async fn synthesize_metered(&self, extractions: &[CompactExtraction], meter: Option<&UsageMeter>) -> Brief {
        let non_empty = extractions.iter().filter(|e| !e.is_empty()).count();
        emit(
            &self.event_handler,
            Event::BriefPhase {
                phase: "reduce",
                items: non_empty,
            },
        );
        if non_empty == 0 {
            debug!("no extractions to synthesize");
            return Brief::default();
        }

        let messages = vec![
            ChatMessage::system(REDUCE_SYSTEM_PROMPT),
            ChatMessage::user(format!(
                "{}\nBuild the BRIEF from the best elements.",
                compact_document(extractions)
            )),
        ];
        let response = self
            .gateway
            .complete_metered(messages, &self.reduce_model, REDUCE_TEMPERATURE, REDUCE_MAX_TOKENS, meter)
            .await;

        if let Some(error) = response.error_message {
            warn!(error = error.as_str(), "brief reduce call failed");
            return Brief::default();
        }
        decode("brief", &response.text, &self.event_handler)
    }

    /// Run both phases over `(stage name, report)` pairs, in order.
    pub async fn aggregate(&self, reports: &[(String, Value)]) -> Brief {
        self.aggregate_metered(reports, None).await
    }

    /// [`aggregate`](Self::aggregate), recording every call on `meter`.
    pub async fn aggregate_metered(&self, reports: &[(String, Value)], meter: Option<&UsageMeter>) -> Brief {
        let span = info_span!("brief", reports = reports.len());
        async {
            emit(
                &self.event_handler,
                Event::BriefPhase {
                    phase: "map",
                    items: reports.len(),
                },
            );

            let extractions: Vec<CompactExtraction> = stream::iter(reports.iter().map(|(name, report)| {
                let text = serde_json::to_string_pretty(report).unwrap_or_else(|_| report.to_string());
                async move { self.extract_metered(name, &text, meter).await }
            }))
            .buffered(self.concurrency)
            .collect()
            .await;

            self.synthesize_metered(&extractions, meter).await
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MockBackend, MockReply};
    use serde_json::json;

    fn aggregator(mock: Arc<MockBackend>) -> BriefAggregator {
        let gateway = ModelGateway::builder().backend(mock).build().unwrap();
        BriefAggregator::new(Arc::new(gateway), &ModelRoster::default()).with_concurrency(1)
    }

    fn reports(n: usize) -> Vec<(String, Value)> {
        (0..n)
            .map(|i| (format!("stage{}", i), json!({"items": [format!("fact {}", i)]})))
            .collect()
    }

    #[test]
    fn test_truncate_counts_chars() {
        let text = "ż".repeat(MAP_INPUT_CAP + 1);
        let cut = truncate_for_map(&text);
        assert_eq!(cut.chars().count(), MAP_INPUT_CAP + TRUNCATION_MARKER.chars().count());
        assert_eq!(truncate_for_map(&"a".repeat(MAP_INPUT_CAP)).len(), MAP_INPUT_CAP);
    }

    #[test]
    fn test_compact_document_format() {
        let doc = compact_document(&[
            CompactExtraction {
                agent: "sourceAnalyst".into(),
                top_hooks: vec!["h1".into()],
                warnings: vec!["w1".into()],
                ..Default::default()
            },
            CompactExtraction::empty("comedian"),
        ]);
        assert!(doc.contains("### sourceAnalyst\nHooks: [\"h1\"]\nWarnings: [\"w1\"]\n"));
        assert!(!doc.contains("comedian"));
    }

    #[tokio::test]
    async fn test_brief_caps_enforced() {
        let mock = Arc::new(
            MockBackend::fixed(r#"{"topHooks": ["a"], "topInsights": ["b"]}"#).on(
                "# BRIEF SYNTHESIZER",
                MockReply::text(
                    r#"```json
{"topHooks": ["1","2","3","4","5"], "keyInsights": ["1","2","3","4"],
 "readyToUse": [{"type": "quote", "text": "q"}],
 "warnings": ["1","2","3","4"], "localContexts": ["1","2","3","4","5","6"]}
```"#,
                ),
            ),
        );
        let brief = aggregator(mock).aggregate(&reports(2)).await;
        assert_eq!(brief.top_hooks.len(), 3);
        assert_eq!(brief.key_insights.len(), 3);
        assert_eq!(brief.warnings.len(), 3);
        assert_eq!(brief.local_contexts.len(), 3);
        assert_eq!(brief.ready_to_use[0].kind, "quote");
    }

    #[tokio::test]
    async fn test_map_failure_is_per_item() {
        let mock = Arc::new(
            MockBackend::new(vec![
                r#"{"topHooks": ["kept"]}"#.to_string(),
                "not json at all".to_string(),
            ])
            .on("# BRIEF SYNTHESIZER", MockReply::text(r#"{"topHooks": ["kept"]}"#)),
        );
        let agg = aggregator(mock.clone());
        let first = agg.extract("a", "{}").await;
        let second = agg.extract("b", "{}").await;
        assert_eq!(first.top_hooks, vec!["kept"]);
        assert_eq!(second, CompactExtraction::empty("b"));

        let brief = agg.synthesize(&[first, second]).await;
        assert_eq!(brief.top_hooks, vec!["kept"]);
        let reduce_input = &mock.requests()[2].messages[1].content;
        assert!(reduce_input.contains("### a"));
        assert!(!reduce_input.contains("### b"));
    }

    #[tokio::test]
    async fn test_map_transport_failure_yields_empty() {
        let mock = Arc::new(MockBackend::fixed("{}").on("# BRIEF EXTRACTOR", MockReply::failure(500)));
        let extraction = aggregator(mock).extract("tension", "{}").await;
        assert_eq!(extraction, CompactExtraction::empty("tension"));
    }

    #[tokio::test]
    async fn test_reduce_skipped_when_all_empty() {
        let mock = Arc::new(MockBackend::fixed(r#"{"topHooks": []}"#));
        let brief = aggregator(mock.clone()).aggregate(&reports(3)).await;
        assert_eq!(brief, Brief::default());
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn test_map_order_preserved_under_concurrency() {
        let mock = Arc::new(MockBackend::fixed(r#"{"topInsights": ["i"]}"#).on(
            "# BRIEF SYNTHESIZER",
            MockReply::text("{}"),
        ));
        let gateway = ModelGateway::builder().backend(mock.clone()).build().unwrap();
        let agg = BriefAggregator::new(Arc::new(gateway), &ModelRoster::default()).with_concurrency(4);
        agg.aggregate(&reports(5)).await;
        let requests = mock.requests();
        let reduce_input = &requests.last().unwrap().messages[1].content;
        let positions: Vec<usize> = (0..5)
            .map(|i| reduce_input.find(&format!("### stage{}\n", i)).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }
}
