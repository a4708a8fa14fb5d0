//! Reports of the three terminal stages.

use serde::{Deserialize, Serialize};

use super::lenient::{number, string, strings};
use super::{cap, Report};

/// Upper bound on exploration angles.
pub const MAX_ANGLES: usize = 7;

/// One candidate angle for a post.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Angle {
    #[serde(deserialize_with = "string")]
    pub name: String,
    #[serde(deserialize_with = "string")]
    pub description: String,
    #[serde(deserialize_with = "string")]
    pub hook: String,
    #[serde(deserialize_with = "string")]
    pub audience: String,
    /// 0–10.
    #[serde(deserialize_with = "number")]
    pub strength: f64,
}

/// The terminal stage's pick among its own candidates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RecommendedPick {
    #[serde(deserialize_with = "string")]
    pub name: String,
    #[serde(deserialize_with = "string")]
    pub hook: String,
    #[serde(deserialize_with = "string")]
    pub reason: String,
}

impl RecommendedPick {
    /// Fill missing name and hook from a candidate.
    fn fill_from(&mut self, name: &str, hook: &str) {
        if self.name.trim().is_empty() {
            self.name = name.to_string();
        }
        if self.hook.trim().is_empty() {
            let source = if hook.trim().is_empty() { name } else { hook };
            self.hook = source.to_string();
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExplorationReport {
    pub possible_angles: Vec<Angle>,
    #[serde(deserialize_with = "strings")]
    pub tension_points: Vec<String>,
    #[serde(deserialize_with = "strings")]
    pub local_context: Vec<String>,
    #[serde(deserialize_with = "strings")]
    pub questions_worth_asking: Vec<String>,
    #[serde(deserialize_with = "strings")]
    pub traps_to_avoid: Vec<String>,
    pub recommended_angle: RecommendedPick,
}

impl ExplorationReport {
    /// The angle with the highest strength; the first one wins ties.
    pub fn strongest_angle(&self) -> Option<&Angle> {
        self.possible_angles
            .iter()
            .fold(None, |best: Option<&Angle>, a| match best {
                Some(b) if b.strength >= a.strength => Some(b),
                _ => Some(a),
            })
    }
}

impl Report for ExplorationReport {
    fn normalize(&mut self) {
        cap(&mut self.possible_angles, MAX_ANGLES);
        if self.recommended_angle.hook.trim().is_empty() {
            if let Some(angle) = self.strongest_angle().cloned() {
                self.recommended_angle.fill_from(&angle.name, &angle.hook);
            }
        }
    }
}

/// One way to develop the user's direction into a post.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Variant {
    #[serde(deserialize_with = "string")]
    pub name: String,
    #[serde(deserialize_with = "string")]
    pub description: String,
    #[serde(deserialize_with = "string")]
    pub hook: String,
    #[serde(deserialize_with = "string")]
    pub structure: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DevelopmentReport {
    #[serde(deserialize_with = "string")]
    pub user_direction_assessment: String,
    pub development_variants: Vec<Variant>,
    #[serde(deserialize_with = "strings")]
    pub hook_proposals: Vec<String>,
    #[serde(deserialize_with = "strings")]
    pub what_to_strengthen: Vec<String>,
    #[serde(deserialize_with = "strings")]
    pub what_to_skip: Vec<String>,
    #[serde(deserialize_with = "strings")]
    pub counterarguments: Vec<String>,
    pub recommended_variant: RecommendedPick,
}

impl Report for DevelopmentReport {
    fn normalize(&mut self) {
        if self.recommended_variant.hook.trim().is_empty() {
            if let Some(first) = self.development_variants.first().cloned() {
                self.recommended_variant.fill_from(&first.name, &first.hook);
            } else if let Some(hook) = self.hook_proposals.first().cloned() {
                self.recommended_variant.fill_from("", &hook);
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Issue {
    #[serde(deserialize_with = "string")]
    pub location: String,
    #[serde(deserialize_with = "string")]
    pub problem: String,
    #[serde(deserialize_with = "string")]
    pub suggestion: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Correction {
    #[serde(deserialize_with = "string")]
    pub original: String,
    #[serde(deserialize_with = "string")]
    pub corrected: String,
    #[serde(deserialize_with = "string")]
    pub reason: String,
}

/// Quality controller verdict on a finished text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PolishReport {
    /// 0–10.
    #[serde(deserialize_with = "number")]
    pub score: f64,
    /// `ready`, `needs work` or `rewrite`.
    #[serde(deserialize_with = "string")]
    pub status: String,
    #[serde(deserialize_with = "strings")]
    pub strengths: Vec<String>,
    pub issues: Vec<Issue>,
    pub inline_corrections: Vec<Correction>,
    #[serde(deserialize_with = "string")]
    pub improved_version: String,
    #[serde(deserialize_with = "strings")]
    pub hook_alternatives: Vec<String>,
}

impl PolishReport {
    fn status_for(score: f64) -> &'static str {
        if score >= 8.0 {
            "ready"
        } else if score >= 5.0 {
            "needs work"
        } else {
            "rewrite"
        }
    }
}

impl Report for PolishReport {
    fn normalize(&mut self) {
        self.score = self.score.clamp(0.0, 10.0);
        if self.status.trim().is_empty() && self.score > 0.0 {
            self.status = Self::status_for(self.score).to_string();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn angle(name: &str, hook: &str, strength: f64) -> Angle {
        Angle {
            name: name.into(),
            hook: hook.into(),
            strength,
            ..Default::default()
        }
    }

    #[test]
    fn test_angles_capped() {
        let mut report = ExplorationReport {
            possible_angles: (0..10).map(|i| angle(&format!("a{}", i), "h", 5.0)).collect(),
            ..Default::default()
        };
        report.normalize();
        assert_eq!(report.possible_angles.len(), MAX_ANGLES);
    }

    #[test]
    fn test_missing_hook_filled_from_strongest() {
        let mut report = ExplorationReport {
            possible_angles: vec![
                angle("weak", "meh", 3.0),
                angle("strong", "You pay for this twice", 9.0),
                angle("tied", "later", 9.0),
            ],
            recommended_angle: RecommendedPick {
                reason: "most surprising".into(),
                ..Default::default()
            },
            ..Default::default()
        };
        report.normalize();
        assert_eq!(report.recommended_angle.name, "strong");
        assert_eq!(report.recommended_angle.hook, "You pay for this twice");
        assert_eq!(report.recommended_angle.reason, "most surprising");
    }

    #[test]
    fn test_model_hook_kept() {
        let mut report: ExplorationReport = serde_json::from_value(json!({
            "possibleAngles": [{"name": "x", "hook": "other", "strength": "8/10"}],
            "recommendedAngle": {"name": "x", "hook": "mine"}
        }))
        .unwrap();
        report.normalize();
        assert_eq!(report.recommended_angle.hook, "mine");
        assert_eq!(report.possible_angles[0].strength, 8.0);
    }

    #[test]
    fn test_variant_fallback() {
        let mut report = DevelopmentReport {
            development_variants: vec![Variant {
                name: "contrarian".into(),
                hook: "Nobody tells you this".into(),
                ..Default::default()
            }],
            ..Default::default()
        };
        report.normalize();
        assert_eq!(report.recommended_variant.hook, "Nobody tells you this");
    }

    #[test]
    fn test_polish_status_and_clamp() {
        let mut report = PolishReport {
            score: 12.0,
            ..Default::default()
        };
        report.normalize();
        assert_eq!(report.score, 10.0);
        assert_eq!(report.status, "ready");

        let mut middling = PolishReport {
            score: 6.0,
            status: "".into(),
            ..Default::default()
        };
        middling.normalize();
        assert_eq!(middling.status, "needs work");

        let mut empty = PolishReport::default();
        empty.normalize();
        assert_eq!(empty, PolishReport::default());
    }

    #[test]
    fn test_non_finite_numbers_never_serialize_as_null() {
        let polish = PolishReport::from_value(Some(&json!({"score": "NaN", "improvedVersion": "x"})));
        let value = polish.to_value();
        assert_eq!(value["score"], 0.0);
        assert_eq!(value["improvedVersion"], "x");

        let mut exploration = ExplorationReport::from_value(Some(&json!({
            "possibleAngles": [{"name": "a", "hook": "h", "strength": "inf"}]
        })));
        exploration.normalize();
        let value = exploration.to_value();
        assert_eq!(value["possibleAngles"][0]["strength"], 0.0);
        assert_eq!(value["recommendedAngle"]["hook"], "h");
    }
}
