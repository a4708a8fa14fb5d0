//! Reports of the analytical, enhancement and review stages.

use serde::{Deserialize, Serialize};

use super::lenient::{flag, number, string, strings};
use super::{cap, Report};
use crate::output_parser::Section;

/// Bibliographic data of the source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SourceInfo {
    #[serde(deserialize_with = "string")]
    pub title: String,
    #[serde(deserialize_with = "string")]
    pub author: String,
    #[serde(deserialize_with = "string")]
    pub date: String,
    #[serde(deserialize_with = "string")]
    pub link: String,
    /// Study, article, report, interview...
    #[serde(rename = "type", deserialize_with = "string")]
    pub kind: String,
    #[serde(deserialize_with = "strings")]
    pub key_facts: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Quote {
    #[serde(deserialize_with = "string")]
    pub text: String,
    #[serde(deserialize_with = "string")]
    pub author: String,
    #[serde(deserialize_with = "string")]
    pub context: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NumberFact {
    #[serde(deserialize_with = "string")]
    pub value: String,
    #[serde(deserialize_with = "string")]
    pub context: String,
}

/// The user's own notes, seeded from the direction in Development mode.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UserNotes {
    #[serde(deserialize_with = "string")]
    pub content: String,
    #[serde(deserialize_with = "string")]
    pub direction: String,
    #[serde(deserialize_with = "string")]
    pub priority: String,
}

/// Output of the mandatory extraction stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExtractedData {
    pub source: SourceInfo,
    pub quotes: Vec<Quote>,
    pub numbers: Vec<NumberFact>,
    #[serde(deserialize_with = "strings")]
    pub conclusions: Vec<String>,
    pub user_notes: UserNotes,
}

impl Report for ExtractedData {}

/// A fact matched against a known audience trigger.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ResonanceMatch {
    #[serde(deserialize_with = "string")]
    pub filter: String,
    #[serde(deserialize_with = "string")]
    pub element: String,
    #[serde(deserialize_with = "string")]
    pub why: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ResonanceReport {
    #[serde(deserialize_with = "string")]
    pub user_direction_assessment: String,
    pub base_filter_matches: Vec<ResonanceMatch>,
    #[serde(deserialize_with = "strings")]
    pub contextual_matches: Vec<String>,
    #[serde(deserialize_with = "strings")]
    pub unexpected_suggestions: Vec<String>,
    #[serde(deserialize_with = "strings")]
    pub top3_recommendations: Vec<String>,
}

impl Report for ResonanceReport {
    fn normalize(&mut self) {
        cap(&mut self.top3_recommendations, 3);
    }
}

/// How far the source can be trusted, and what it does not say.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SourceAnalysisReport {
    /// 0–10.
    #[serde(deserialize_with = "number")]
    pub confidence_level: f64,
    #[serde(deserialize_with = "string")]
    pub confidence_verdict: String,
    #[serde(deserialize_with = "string")]
    pub methodology: String,
    #[serde(deserialize_with = "string")]
    pub results: String,
    #[serde(deserialize_with = "strings")]
    pub limitations: Vec<String>,
    #[serde(deserialize_with = "string")]
    pub layman_summary: String,
    #[serde(deserialize_with = "strings")]
    pub key_numbers_explained: Vec<String>,
    #[serde(deserialize_with = "strings")]
    pub safe_claims: Vec<String>,
    #[serde(deserialize_with = "strings")]
    pub risky_claims: Vec<String>,
}

impl Report for SourceAnalysisReport {}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AnthropologyReport {
    #[serde(deserialize_with = "strings")]
    pub ethnography: Vec<String>,
    #[serde(deserialize_with = "strings")]
    pub sociology: Vec<String>,
    #[serde(deserialize_with = "strings")]
    pub psychology: Vec<String>,
    /// Real people and communities worth quoting or tagging.
    #[serde(deserialize_with = "strings")]
    pub people: Vec<String>,
    #[serde(deserialize_with = "strings")]
    pub top3_quotes: Vec<String>,
}

impl Report for AnthropologyReport {
    fn normalize(&mut self) {
        cap(&mut self.top3_quotes, 3);
    }
}

/// The source translated to the target market.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LocalContextReport {
    /// Currency, units and institutions converted to local equivalents.
    #[serde(deserialize_with = "strings")]
    pub conversions: Vec<String>,
    #[serde(deserialize_with = "strings")]
    pub local_topics: Vec<String>,
    #[serde(deserialize_with = "strings")]
    pub where_to_find_voices: Vec<String>,
    #[serde(deserialize_with = "strings")]
    pub local_numbers: Vec<String>,
    #[serde(deserialize_with = "strings")]
    pub top3: Vec<String>,
}

impl Report for LocalContextReport {
    fn normalize(&mut self) {
        cap(&mut self.top3, 3);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PopcultureReport {
    #[serde(deserialize_with = "strings")]
    pub films_series: Vec<String>,
    #[serde(deserialize_with = "strings")]
    pub sport: Vec<String>,
    #[serde(deserialize_with = "strings")]
    pub everyday: Vec<String>,
    #[serde(deserialize_with = "strings")]
    pub memes: Vec<String>,
    #[serde(deserialize_with = "strings")]
    pub literature: Vec<String>,
    #[serde(deserialize_with = "strings")]
    pub top3: Vec<String>,
}

impl Report for PopcultureReport {
    fn normalize(&mut self) {
        cap(&mut self.top3, 3);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StoryReport {
    /// 0–10.
    #[serde(deserialize_with = "number")]
    pub narrative_potential: f64,
    #[serde(deserialize_with = "strings")]
    pub characters: Vec<String>,
    #[serde(deserialize_with = "string")]
    pub conflict: String,
    #[serde(deserialize_with = "string")]
    pub transformation_arc: String,
    #[serde(deserialize_with = "string")]
    pub story_based_post: String,
    #[serde(deserialize_with = "strings")]
    pub missing_elements: Vec<String>,
    #[serde(deserialize_with = "strings")]
    pub alternative_angles: Vec<String>,
}

impl Report for StoryReport {}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TensionReport {
    #[serde(deserialize_with = "string")]
    pub verdict: String,
    #[serde(deserialize_with = "number")]
    pub surprise_level: f64,
    #[serde(deserialize_with = "number")]
    pub paradox_level: f64,
    #[serde(deserialize_with = "number")]
    pub total_tension: f64,
    #[serde(deserialize_with = "string")]
    pub structure_diagnosis: String,
    #[serde(deserialize_with = "strings")]
    pub cliches: Vec<String>,
    #[serde(deserialize_with = "strings")]
    pub available_paradoxes: Vec<String>,
    #[serde(deserialize_with = "strings")]
    pub contrast_structures: Vec<String>,
    #[serde(deserialize_with = "string")]
    pub transformed_version: String,
    #[serde(deserialize_with = "strings")]
    pub paradox_endings: Vec<String>,
}

impl Report for TensionReport {}

/// Output of the context shifter: is there a second layer under the facts?
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DepthReport {
    #[serde(deserialize_with = "string")]
    pub verdict: String,
    #[serde(deserialize_with = "number")]
    pub depth_level: f64,
    #[serde(deserialize_with = "flag")]
    pub has_second_layer: bool,
    #[serde(deserialize_with = "string")]
    pub current_layer: String,
    #[serde(deserialize_with = "strings")]
    pub rituals_absurds: Vec<String>,
    #[serde(deserialize_with = "strings")]
    pub cognitive_biases: Vec<String>,
    #[serde(deserialize_with = "strings")]
    pub analogies: Vec<String>,
    #[serde(deserialize_with = "string")]
    pub observer_perspective: String,
    #[serde(deserialize_with = "strings")]
    pub depth_suggestions: Vec<String>,
}

impl Report for DepthReport {}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HumorReport {
    #[serde(deserialize_with = "number")]
    pub humor_potential: f64,
    /// How much humor to dial in, 0–10.
    #[serde(deserialize_with = "number")]
    pub recommended_dial: f64,
    #[serde(deserialize_with = "strings")]
    pub humor_opportunities: Vec<String>,
    #[serde(deserialize_with = "strings")]
    pub self_deprecation_moments: Vec<String>,
    #[serde(deserialize_with = "strings")]
    pub rewrite_options: Vec<String>,
    #[serde(deserialize_with = "strings")]
    pub humor_warnings: Vec<String>,
}

impl Report for HumorReport {}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngagementReport {
    #[serde(deserialize_with = "number")]
    pub engagement_potential: f64,
    #[serde(deserialize_with = "strings")]
    pub existing_hooks: Vec<String>,
    #[serde(deserialize_with = "strings")]
    pub missing_elements: Vec<String>,
    #[serde(deserialize_with = "strings")]
    pub boosters: Vec<String>,
    #[serde(deserialize_with = "strings")]
    pub cta_options: Vec<String>,
    #[serde(deserialize_with = "strings")]
    pub relatable_moments: Vec<String>,
}

impl Report for EngagementReport {}

/// Devil's advocate critique of the argument.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CritiqueReport {
    #[serde(deserialize_with = "number")]
    pub argument_strength: f64,
    #[serde(deserialize_with = "strings")]
    pub red_flags: Vec<String>,
    #[serde(deserialize_with = "strings")]
    pub counterarguments: Vec<String>,
    #[serde(deserialize_with = "strings")]
    pub unaddressed_objections: Vec<String>,
    #[serde(deserialize_with = "strings")]
    pub uncomfortable_questions: Vec<String>,
    #[serde(deserialize_with = "strings")]
    pub missing_perspectives: Vec<String>,
    #[serde(deserialize_with = "strings")]
    pub strengthening_suggestions: Vec<String>,
    #[serde(deserialize_with = "string")]
    pub verdict: String,
}

impl Report for CritiqueReport {}

/// Prose review from a text-based reviewer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ReviewReport {
    pub content: String,
    /// 0–10 when the reviewer graded the text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    pub sections: Vec<Section>,
    /// Bullet and numbered items across all sections.
    pub issues_count: usize,
}

impl Report for ReviewReport {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extracted_data_wire_names() {
        let data = ExtractedData {
            source: SourceInfo {
                kind: "study".into(),
                key_facts: vec!["n=1200".into()],
                ..Default::default()
            },
            ..Default::default()
        };
        let v = data.to_value();
        assert_eq!(v["source"]["type"], "study");
        assert_eq!(v["source"]["keyFacts"], json!(["n=1200"]));
        assert_eq!(v["userNotes"]["priority"], "");
    }

    #[test]
    fn test_tolerant_decoding() {
        let report: SourceAnalysisReport = serde_json::from_value(json!({
            "confidenceLevel": "6/10",
            "limitations": "small sample",
            "safeClaims": [{"text": "effect exists"}],
            "unknownField": true
        }))
        .unwrap();
        assert_eq!(report.confidence_level, 6.0);
        assert_eq!(report.limitations, vec!["small sample"]);
        assert_eq!(report.safe_claims, vec!["effect exists"]);
    }

    #[test]
    fn test_top3_caps() {
        let mut r = ResonanceReport {
            top3_recommendations: vec!["a".into(), "b".into(), "c".into(), "d".into()],
            ..Default::default()
        };
        r.normalize();
        assert_eq!(r.top3_recommendations.len(), 3);
    }

    #[test]
    fn test_review_score_omitted_when_absent() {
        let v = ReviewReport::default().to_value();
        assert!(v.get("score").is_none());
        let graded = ReviewReport {
            score: Some(7.0),
            ..Default::default()
        };
        assert_eq!(graded.to_value()["score"], 7.0);
    }
}
