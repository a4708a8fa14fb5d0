//! Typed per-stage reports.
//!
//! Every report is `#[serde(default)]` and its `Default` is the canonical
//! empty report: lists are `[]`, strings `""`, numbers `0`, flags `false`.
//! Nothing serializes to `null`, so a downstream stage can read any field of
//! a failed or skipped upstream stage.
//!
//! Reports travel through the pipeline context as `serde_json::Value`;
//! [`Report`] is the bridge between the typed and untyped forms.

pub mod analysis;
pub mod drafts;
pub(crate) mod lenient;
pub mod terminal;

pub use analysis::*;
pub use drafts::*;
pub use terminal::*;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// Behaviour shared by every report type.
pub trait Report: Serialize + DeserializeOwned + Default {
    /// Enforce shape limits after decoding model output.
    fn normalize(&mut self) {}

    /// The report as a JSON value.
    fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| Value::Object(Default::default()))
    }

    /// Decode a context entry, falling back to the empty report.
    fn from_value(value: Option<&Value>) -> Self {
        value
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default()
    }
}

/// Whether a JSON value carries no information.
///
/// Objects are empty when every field is; `0`, `false`, `""`, `[]` and
/// `null` are empty.
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.values().all(is_empty_value),
    }
}

/// Keep at most `max` items.
pub(crate) fn cap<T>(items: &mut Vec<T>, max: usize) {
    items.truncate(max);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Collect paths of `null`s and non-empty lists.
    fn violations(value: &Value, path: String, out: &mut Vec<String>) {
        match value {
            Value::Null => out.push(format!("{} is null", path)),
            Value::Array(items) if !items.is_empty() => out.push(format!("{} is non-empty", path)),
            Value::Object(map) => {
                for (k, v) in map {
                    violations(v, format!("{}.{}", path, k), out);
                }
            }
            _ => {}
        }
    }

    fn assert_canonical_empty<T: Report>(name: &str) {
        let value = T::default().to_value();
        assert!(value.is_object(), "{} is not an object", name);
        let mut out = Vec::new();
        violations(&value, name.to_string(), &mut out);
        assert!(out.is_empty(), "{:?}", out);
        assert!(is_empty_value(&value), "{} default is not empty", name);
    }

    #[test]
    fn test_every_report_has_canonical_empty() {
        assert_canonical_empty::<ExtractedData>("extracted");
        assert_canonical_empty::<ResonanceReport>("resonance");
        assert_canonical_empty::<SourceAnalysisReport>("sourceAnalysis");
        assert_canonical_empty::<AnthropologyReport>("anthropology");
        assert_canonical_empty::<LocalContextReport>("localContext");
        assert_canonical_empty::<PopcultureReport>("popculture");
        assert_canonical_empty::<StoryReport>("story");
        assert_canonical_empty::<TensionReport>("tension");
        assert_canonical_empty::<DepthReport>("depth");
        assert_canonical_empty::<HumorReport>("humor");
        assert_canonical_empty::<EngagementReport>("engagement");
        assert_canonical_empty::<CritiqueReport>("critique");
        assert_canonical_empty::<ReviewReport>("review");
        assert_canonical_empty::<ExplorationReport>("exploration");
        assert_canonical_empty::<DevelopmentReport>("development");
        assert_canonical_empty::<PolishReport>("polish");
        assert_canonical_empty::<LinkedInPost>("linkedin");
        assert_canonical_empty::<FacebookPost>("facebook");
        assert_canonical_empty::<MicroblogPost>("microblog");
        assert_canonical_empty::<VideoScript>("video");
    }

    #[test]
    fn test_is_empty_value() {
        assert!(is_empty_value(&json!({"a": [], "b": {"c": ""}, "d": 0})));
        assert!(!is_empty_value(&json!({"a": ["x"]})));
        assert!(!is_empty_value(&json!({"score": 7})));
    }

    #[test]
    fn test_from_value_tolerates_missing_and_bad_input() {
        let ok = ResonanceReport::from_value(Some(&json!({"top3Recommendations": ["a"]})));
        assert_eq!(ok.top3_recommendations, vec!["a".to_string()]);
        assert_eq!(ResonanceReport::from_value(None), ResonanceReport::default());
        assert_eq!(
            ResonanceReport::from_value(Some(&json!("garbage"))),
            ResonanceReport::default()
        );
    }
}
