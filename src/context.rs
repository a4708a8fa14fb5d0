//! Run-scoped state: the stage report context and the workflow result.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::registry::{StageKey, WorkflowMode};
use crate::reports::{is_empty_value, Report};

/// Stage key → report, in insertion (execution) order.
///
/// Owned by one run. A failed or skipped stage is stored as its canonical
/// empty report, never as `null`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineContext {
    entries: Vec<(StageKey, Value)>,
}

impl PipelineContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a stage's report.
    pub fn insert(&mut self, key: StageKey, report: Value) {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = report,
            None => self.entries.push((key, report)),
        }
    }

    pub fn get(&self, key: StageKey) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    pub fn contains(&self, key: StageKey) -> bool {
        self.get(key).is_some()
    }

    /// Typed view of a stage's report; the empty report when absent.
    pub fn report<T: Report>(&self, key: StageKey) -> T {
        T::from_value(self.get(key))
    }

    pub fn keys(&self) -> impl Iterator<Item = StageKey> + '_ {
        self.entries.iter().map(|(k, _)| *k)
    }

    pub fn iter(&self) -> impl Iterator<Item = (StageKey, &Value)> {
        self.entries.iter().map(|(k, v)| (*k, v))
    }

    /// Entries that carry information, in execution order.
    pub fn non_empty(&self) -> impl Iterator<Item = (StageKey, &Value)> {
        self.iter().filter(|(_, v)| !is_empty_value(v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All reports as a JSON object keyed by stage key.
    pub fn to_map(&self) -> Map<String, Value> {
        self.entries
            .iter()
            .map(|(k, v)| (k.as_str().to_string(), v.clone()))
            .collect()
    }
}

/// Outcome of one `run`, optionally extended by `generate_draft`.
///
/// Starts successful; only a validation error, a mandatory stage failure or
/// cancellation flips `success`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowResult {
    pub mode: WorkflowMode,
    pub success: bool,
    pub report: Option<Value>,
    pub draft: Option<Value>,
    pub errors: Vec<String>,
    pub total_duration_seconds: f64,
    /// Reports collected during the run, kept for diagnostics.
    #[serde(skip)]
    pub context: PipelineContext,
}

impl WorkflowResult {
    pub fn new(mode: WorkflowMode) -> Self {
        Self {
            mode,
            success: true,
            report: None,
            draft: None,
            errors: Vec::new(),
            total_duration_seconds: 0.0,
            context: PipelineContext::new(),
        }
    }

    /// Record a non-fatal error.
    pub fn record_error(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
    }

    /// Record a fatal error and mark the run unsuccessful.
    pub fn abort(&mut self, error: impl Into<String>) {
        self.success = false;
        self.record_error(error);
    }

    /// A named section of the report, if present.
    pub fn section(&self, name: &str) -> Option<&Value> {
        self.report.as_ref().and_then(|r| r.get(name))
    }

    /// The terminal stage's section for this result's mode.
    pub fn terminal_section(&self) -> Option<&Value> {
        self.section(self.mode.report_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reports::ResonanceReport;
    use serde_json::json;

    #[test]
    fn test_insert_keeps_order_and_replaces() {
        let mut ctx = PipelineContext::new();
        ctx.insert(StageKey::Extractor, json!({"a": 1}));
        ctx.insert(StageKey::SourceAnalyst, json!({}));
        ctx.insert(StageKey::Extractor, json!({"a": 2}));
        assert_eq!(
            ctx.keys().collect::<Vec<_>>(),
            vec![StageKey::Extractor, StageKey::SourceAnalyst]
        );
        assert_eq!(ctx.get(StageKey::Extractor), Some(&json!({"a": 2})));
        assert_eq!(ctx.non_empty().count(), 1);
    }

    #[test]
    fn test_typed_report_defaults_when_missing() {
        let ctx = PipelineContext::new();
        let r: ResonanceReport = ctx.report(StageKey::ResonanceHunter);
        assert_eq!(r, ResonanceReport::default());
    }

    #[test]
    fn test_result_shape() {
        let mut result = WorkflowResult::new(WorkflowMode::Polish);
        result.context.insert(StageKey::Extractor, json!({"x": 1}));
        result.record_error("sourceAnalyst: boom");
        let v = serde_json::to_value(&result).unwrap();
        assert_eq!(v["mode"], "polish");
        assert_eq!(v["success"], true);
        assert!(v["report"].is_null());
        assert_eq!(v["errors"], json!(["sourceAnalyst: boom"]));
        assert!(v.get("totalDurationSeconds").is_some());
        assert!(v.get("context").is_none());

        result.abort("extractor: down");
        assert!(!result.success);
        assert_eq!(result.errors.len(), 2);
    }
}
