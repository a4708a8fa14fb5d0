//! Workflow modes, stage keys and the static stage catalog.
//!
//! The catalog order is the execution order: within a mode, mandatory stages
//! run first, then the optional stages in catalog order, then the mode's
//! terminal stage. Stages only read reports of stages that ran before them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::PipelineError;

/// One of the three fixed pipelines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowMode {
    /// Find angles in a source the user has no take on yet.
    Exploration,
    /// Develop the user's own direction into variants.
    Development,
    /// Score and rewrite an existing draft.
    Polish,
}

impl WorkflowMode {
    pub const ALL: [WorkflowMode; 3] = [
        WorkflowMode::Exploration,
        WorkflowMode::Development,
        WorkflowMode::Polish,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowMode::Exploration => "exploration",
            WorkflowMode::Development => "development",
            WorkflowMode::Polish => "polish",
        }
    }

    /// The stage that closes this mode's pipeline.
    pub fn terminal_stage(&self) -> StageKey {
        match self {
            WorkflowMode::Exploration => StageKey::ExplorationAgent,
            WorkflowMode::Development => StageKey::DevelopmentAgent,
            WorkflowMode::Polish => StageKey::QualityController,
        }
    }

    /// Report section holding the terminal stage's output.
    pub fn report_key(&self) -> &'static str {
        match self {
            WorkflowMode::Exploration => "explorationReport",
            WorkflowMode::Development => "developmentReport",
            WorkflowMode::Polish => "polishReport",
        }
    }

    /// Whether `run` requires a non-empty user direction.
    pub fn requires_direction(&self) -> bool {
        matches!(self, WorkflowMode::Development)
    }
}

impl fmt::Display for WorkflowMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkflowMode {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        WorkflowMode::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| PipelineError::Validation(format!("unknown workflow mode '{}'", s)))
    }
}

/// Grouping used by selection menus and the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageCategory {
    Analytical,
    Review,
    Enhancement,
}

/// Every stage the executor can dispatch, terminal stages included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StageKey {
    Extractor,
    ResonanceHunter,
    SourceAnalyst,
    Anthropologist,
    LocalContextualizer,
    PopcultureCurator,
    StoryExcavator,
    TensionArchitect,
    ContextShifter,
    Comedian,
    Engagement,
    DevilsAdvocate,
    VoiceGuardian,
    OpeningSniper,
    VulnerabilityScanner,
    ExplorationAgent,
    DevelopmentAgent,
    QualityController,
}

impl StageKey {
    pub const ALL: [StageKey; 18] = [
        StageKey::Extractor,
        StageKey::ResonanceHunter,
        StageKey::SourceAnalyst,
        StageKey::Anthropologist,
        StageKey::LocalContextualizer,
        StageKey::PopcultureCurator,
        StageKey::StoryExcavator,
        StageKey::TensionArchitect,
        StageKey::ContextShifter,
        StageKey::Comedian,
        StageKey::Engagement,
        StageKey::DevilsAdvocate,
        StageKey::VoiceGuardian,
        StageKey::OpeningSniper,
        StageKey::VulnerabilityScanner,
        StageKey::ExplorationAgent,
        StageKey::DevelopmentAgent,
        StageKey::QualityController,
    ];

    /// Wire key, used in the context, the report and `errors`.
    pub fn as_str(&self) -> &'static str {
        match self {
            StageKey::Extractor => "extractor",
            StageKey::ResonanceHunter => "resonanceHunter",
            StageKey::SourceAnalyst => "sourceAnalyst",
            StageKey::Anthropologist => "anthropologist",
            StageKey::LocalContextualizer => "localContextualizer",
            StageKey::PopcultureCurator => "popcultureCurator",
            StageKey::StoryExcavator => "storyExcavator",
            StageKey::TensionArchitect => "tensionArchitect",
            StageKey::ContextShifter => "contextShifter",
            StageKey::Comedian => "comedian",
            StageKey::Engagement => "engagement",
            StageKey::DevilsAdvocate => "devilsAdvocate",
            StageKey::VoiceGuardian => "voiceGuardian",
            StageKey::OpeningSniper => "openingSniper",
            StageKey::VulnerabilityScanner => "vulnerabilityScanner",
            StageKey::ExplorationAgent => "explorationAgent",
            StageKey::DevelopmentAgent => "developmentAgent",
            StageKey::QualityController => "qualityController",
        }
    }

    /// Heading that opens the stage's system prompt.
    pub fn title(&self) -> &'static str {
        match self {
            StageKey::Extractor => "FACT EXTRACTOR",
            StageKey::ResonanceHunter => "RESONANCE HUNTER",
            StageKey::SourceAnalyst => "SOURCE ANALYST",
            StageKey::Anthropologist => "ANTHROPOLOGIST",
            StageKey::LocalContextualizer => "LOCAL CONTEXTUALIZER",
            StageKey::PopcultureCurator => "POPCULTURE CURATOR",
            StageKey::StoryExcavator => "STORY EXCAVATOR",
            StageKey::TensionArchitect => "TENSION ARCHITECT",
            StageKey::ContextShifter => "CONTEXT SHIFTER",
            StageKey::Comedian => "COMEDIAN",
            StageKey::Engagement => "ENGAGEMENT OPTIMIZER",
            StageKey::DevilsAdvocate => "DEVIL'S ADVOCATE",
            StageKey::VoiceGuardian => "VOICE GUARDIAN",
            StageKey::OpeningSniper => "OPENING SNIPER",
            StageKey::VulnerabilityScanner => "VULNERABILITY SCANNER",
            StageKey::ExplorationAgent => "EXPLORATION STRATEGIST",
            StageKey::DevelopmentAgent => "DEVELOPMENT STRATEGIST",
            StageKey::QualityController => "QUALITY CONTROLLER",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StageKey::ExplorationAgent | StageKey::DevelopmentAgent | StageKey::QualityController
        )
    }

    /// Catalog entry; `None` for terminal stages.
    pub fn descriptor(&self) -> Option<&'static StageDescriptor> {
        CATALOG.iter().find(|d| d.key == *self)
    }
}

impl fmt::Display for StageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageKey {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StageKey::ALL
            .into_iter()
            .find(|k| k.as_str() == s.trim())
            .ok_or_else(|| PipelineError::Validation(format!("unknown stage key '{}'", s)))
    }
}

/// Static metadata for a selectable or mandatory stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageDescriptor {
    pub key: StageKey,
    pub category: StageCategory,
    pub available_in: &'static [WorkflowMode],
    pub default_in: &'static [WorkflowMode],
    pub mandatory: bool,
}

impl StageDescriptor {
    pub fn is_available(&self, mode: WorkflowMode) -> bool {
        self.available_in.contains(&mode)
    }

    pub fn is_default(&self, mode: WorkflowMode) -> bool {
        self.default_in.contains(&mode)
    }
}

use self::WorkflowMode::{Development as D, Exploration as E, Polish as P};

const ALL_MODES: &[WorkflowMode] = &[E, D, P];
const ED: &[WorkflowMode] = &[E, D];
const ONLY_D: &[WorkflowMode] = &[D];
const ONLY_P: &[WorkflowMode] = &[P];
const NONE: &[WorkflowMode] = &[];

const fn stage(
    key: StageKey,
    category: StageCategory,
    available_in: &'static [WorkflowMode],
    default_in: &'static [WorkflowMode],
    mandatory: bool,
) -> StageDescriptor {
    StageDescriptor {
        key,
        category,
        available_in,
        default_in,
        mandatory,
    }
}

/// Every non-terminal stage, in execution order.
pub static CATALOG: [StageDescriptor; 15] = [
    stage(StageKey::Extractor, StageCategory::Analytical, ALL_MODES, ALL_MODES, true),
    stage(StageKey::ResonanceHunter, StageCategory::Analytical, ED, ED, true),
    stage(StageKey::SourceAnalyst, StageCategory::Analytical, ALL_MODES, ED, false),
    stage(StageKey::Anthropologist, StageCategory::Analytical, ALL_MODES, ALL_MODES, false),
    stage(StageKey::LocalContextualizer, StageCategory::Analytical, ALL_MODES, ALL_MODES, false),
    stage(StageKey::PopcultureCurator, StageCategory::Analytical, ALL_MODES, ED, false),
    stage(StageKey::StoryExcavator, StageCategory::Analytical, ALL_MODES, ONLY_D, false),
    stage(StageKey::TensionArchitect, StageCategory::Analytical, ALL_MODES, ONLY_D, false),
    stage(StageKey::ContextShifter, StageCategory::Analytical, ALL_MODES, NONE, false),
    stage(StageKey::Comedian, StageCategory::Enhancement, ALL_MODES, NONE, false),
    stage(StageKey::Engagement, StageCategory::Enhancement, ALL_MODES, NONE, false),
    stage(StageKey::DevilsAdvocate, StageCategory::Review, ALL_MODES, ONLY_D, false),
    stage(StageKey::VoiceGuardian, StageCategory::Review, ONLY_P, ONLY_P, false),
    stage(StageKey::OpeningSniper, StageCategory::Review, ONLY_P, ONLY_P, false),
    stage(StageKey::VulnerabilityScanner, StageCategory::Review, ONLY_P, NONE, false),
];

/// Optional stages selectable in `mode`, in execution order.
pub fn available_in(mode: WorkflowMode) -> Vec<StageKey> {
    CATALOG
        .iter()
        .filter(|d| !d.mandatory && d.is_available(mode))
        .map(|d| d.key)
        .collect()
}

/// Optional stages active in `mode` when the caller selects nothing.
pub fn default_in(mode: WorkflowMode) -> Vec<StageKey> {
    CATALOG
        .iter()
        .filter(|d| !d.mandatory && d.is_default(mode))
        .map(|d| d.key)
        .collect()
}

/// Stages that always run in `mode`, in execution order.
pub fn mandatory_stages(mode: WorkflowMode) -> Vec<StageKey> {
    CATALOG
        .iter()
        .filter(|d| d.mandatory && d.is_available(mode))
        .map(|d| d.key)
        .collect()
}

/// The resolved stage sequence for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagePlan {
    pub mode: WorkflowMode,
    pub mandatory: Vec<StageKey>,
    /// Every optional stage available in the mode, with whether it runs.
    pub optional: Vec<(StageKey, bool)>,
    pub terminal: StageKey,
}

impl StagePlan {
    /// Resolve `selected` against the mode's catalog.
    ///
    /// `None` activates the mode's defaults. Keys that are unknown, mandatory,
    /// terminal or unavailable in the mode are ignored.
    pub fn resolve(mode: WorkflowMode, selected: Option<&[String]>) -> Self {
        let active: Vec<StageKey> = match selected {
            None => default_in(mode),
            Some(keys) => {
                let available = available_in(mode);
                keys.iter()
                    .filter_map(|k| k.parse::<StageKey>().ok())
                    .filter(|k| available.contains(k))
                    .collect()
            }
        };

        StagePlan {
            mode,
            mandatory: mandatory_stages(mode),
            optional: available_in(mode)
                .into_iter()
                .map(|k| (k, active.contains(&k)))
                .collect(),
            terminal: mode.terminal_stage(),
        }
    }

    /// Active optional stage keys, in execution order.
    pub fn active(&self) -> Vec<StageKey> {
        self.optional
            .iter()
            .filter(|(_, on)| *on)
            .map(|(k, _)| *k)
            .collect()
    }

    /// Every stage that will execute, terminal last.
    pub fn executed(&self) -> Vec<StageKey> {
        let mut keys = self.mandatory.clone();
        keys.extend(self.active());
        keys.push(self.terminal);
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_subset_of_available() {
        for d in CATALOG.iter() {
            for mode in d.default_in {
                assert!(d.available_in.contains(mode), "{} default but unavailable in {}", d.key, mode);
            }
        }
    }

    #[test]
    fn test_keys_round_trip_and_unique() {
        for key in StageKey::ALL {
            assert_eq!(key.as_str().parse::<StageKey>().unwrap(), key);
            let json = serde_json::to_value(key).unwrap();
            assert_eq!(json, key.as_str());
        }
        let mut titles: Vec<_> = StageKey::ALL.iter().map(|k| k.title()).collect();
        titles.sort();
        titles.dedup();
        assert_eq!(titles.len(), StageKey::ALL.len());
    }

    #[test]
    fn test_terminal_stages_not_in_catalog() {
        for mode in WorkflowMode::ALL {
            assert!(mode.terminal_stage().is_terminal());
            assert!(mode.terminal_stage().descriptor().is_none());
        }
    }

    #[test]
    fn test_mandatory_per_mode() {
        assert_eq!(
            mandatory_stages(WorkflowMode::Exploration),
            vec![StageKey::Extractor, StageKey::ResonanceHunter]
        );
        assert_eq!(mandatory_stages(WorkflowMode::Polish), vec![StageKey::Extractor]);
    }

    #[test]
    fn test_polish_only_reviewers() {
        let exploration = available_in(WorkflowMode::Exploration);
        assert!(!exploration.contains(&StageKey::VoiceGuardian));
        let polish = available_in(WorkflowMode::Polish);
        assert!(polish.contains(&StageKey::VoiceGuardian));
        assert!(polish.contains(&StageKey::VulnerabilityScanner));
        assert_eq!(
            default_in(WorkflowMode::Polish),
            vec![
                StageKey::Anthropologist,
                StageKey::LocalContextualizer,
                StageKey::VoiceGuardian,
                StageKey::OpeningSniper
            ]
        );
    }

    #[test]
    fn test_resolve_defaults() {
        let plan = StagePlan::resolve(WorkflowMode::Development, None);
        assert_eq!(plan.active(), default_in(WorkflowMode::Development));
        assert_eq!(plan.terminal, StageKey::DevelopmentAgent);
        assert_eq!(plan.executed().first(), Some(&StageKey::Extractor));
        assert_eq!(plan.executed().last(), Some(&StageKey::DevelopmentAgent));
    }

    #[test]
    fn test_resolve_ignores_foreign_keys() {
        let selected = vec![
            "voiceGuardian".to_string(),
            "nonsense".to_string(),
            "extractor".to_string(),
            "explorationAgent".to_string(),
        ];
        let plan = StagePlan::resolve(WorkflowMode::Exploration, Some(selected.as_slice()));
        let empty = StagePlan::resolve(WorkflowMode::Exploration, Some(&[] as &[String]));
        assert_eq!(plan, empty);
        assert!(plan.active().is_empty());
    }

    #[test]
    fn test_resolve_keeps_catalog_order() {
        let selected = vec!["devilsAdvocate".to_string(), "sourceAnalyst".to_string()];
        let plan = StagePlan::resolve(WorkflowMode::Exploration, Some(selected.as_slice()));
        assert_eq!(plan.active(), vec![StageKey::SourceAnalyst, StageKey::DevilsAdvocate]);
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("Polish".parse::<WorkflowMode>().unwrap(), WorkflowMode::Polish);
        assert!("drafting".parse::<WorkflowMode>().is_err());
        assert_eq!(WorkflowMode::Exploration.report_key(), "explorationReport");
    }
}
