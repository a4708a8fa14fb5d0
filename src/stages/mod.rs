//! Stage execution.
//!
//! The stage set is closed, so dispatch is a single `match` over
//! [`StageKey`] in [`run_stage`] rather than a trait object per stage.
//! Each stage builds its prompt from the source and upstream reports,
//! calls the gateway, and decodes the answer into its typed report.
//!
//! A gateway sentinel is a stage error. Unrecoverable JSON is not: the stage
//! degrades to its canonical empty report.

pub mod prompts;
pub mod review;

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::context::PipelineContext;
use crate::error::{PipelineError, Result};
use crate::events::{emit, Event, EventHandler};
use crate::gateway::{ModelGateway, UsageMeter};
use crate::output_parser::{extract, ExtractionOutcome};
use crate::registry::{StageKey, WorkflowMode};
use crate::reports::*;

/// What a stage reads.
#[derive(Debug, Clone, Copy)]
pub struct StageInput<'a> {
    pub mode: WorkflowMode,
    pub source_text: &'a str,
    /// Non-empty only in Development.
    pub user_direction: Option<&'a str>,
    pub audience_locale: &'a str,
    /// Reports of the stages that already ran.
    pub context: &'a PipelineContext,
    /// Run-scoped usage, recorded alongside the gateway's totals.
    pub usage: Option<&'a UsageMeter>,
}

/// Generation parameters of one stage call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageParams {
    pub temperature: f64,
    pub max_tokens: u32,
}

const fn p(temperature: f64, max_tokens: u32) -> StageParams {
    StageParams {
        temperature,
        max_tokens,
    }
}

/// Per-stage temperature and token limit.
pub fn params(key: StageKey) -> StageParams {
    match key {
        StageKey::Extractor => p(0.3, 3000),
        StageKey::SourceAnalyst => p(0.3, 4000),
        StageKey::Anthropologist | StageKey::LocalContextualizer => p(0.7, 4000),
        StageKey::PopcultureCurator => p(0.8, 4000),
        StageKey::Comedian => p(0.8, 3000),
        StageKey::ResonanceHunter
        | StageKey::StoryExcavator
        | StageKey::TensionArchitect
        | StageKey::ContextShifter
        | StageKey::Engagement
        | StageKey::DevilsAdvocate => p(0.7, 3000),
        StageKey::VoiceGuardian | StageKey::OpeningSniper | StageKey::VulnerabilityScanner => {
            p(0.5, 2500)
        }
        StageKey::ExplorationAgent => p(0.8, 4000),
        StageKey::DevelopmentAgent => p(0.7, 4000),
        StageKey::QualityController => p(0.4, 4000),
    }
}

/// The stage's canonical empty report.
pub fn empty_report(key: StageKey) -> Value {
    match key {
        StageKey::Extractor => ExtractedData::default().to_value(),
        StageKey::ResonanceHunter => ResonanceReport::default().to_value(),
        StageKey::SourceAnalyst => SourceAnalysisReport::default().to_value(),
        StageKey::Anthropologist => AnthropologyReport::default().to_value(),
        StageKey::LocalContextualizer => LocalContextReport::default().to_value(),
        StageKey::PopcultureCurator => PopcultureReport::default().to_value(),
        StageKey::StoryExcavator => StoryReport::default().to_value(),
        StageKey::TensionArchitect => TensionReport::default().to_value(),
        StageKey::ContextShifter => DepthReport::default().to_value(),
        StageKey::Comedian => HumorReport::default().to_value(),
        StageKey::Engagement => EngagementReport::default().to_value(),
        StageKey::DevilsAdvocate => CritiqueReport::default().to_value(),
        StageKey::VoiceGuardian | StageKey::OpeningSniper | StageKey::VulnerabilityScanner => {
            ReviewReport::default().to_value()
        }
        StageKey::ExplorationAgent => ExplorationReport::default().to_value(),
        StageKey::DevelopmentAgent => DevelopmentReport::default().to_value(),
        StageKey::QualityController => PolishReport::default().to_value(),
    }
}

/// Decode JSON output into `T`, reporting repair and failure.
pub(crate) fn decode<T: Report>(
    stage: &str,
    raw: &str,
    events: &Option<Arc<dyn EventHandler>>,
) -> T {
    let outcome = extract(raw);
    match &outcome {
        ExtractionOutcome::Parsed(_) => {}
        ExtractionOutcome::Repaired(_, note) => {
            warn!(stage, note, "stage output recovered by truncation repair");
            emit(
                events,
                Event::ExtractionRepaired {
                    stage: stage.to_string(),
                },
            );
        }
        ExtractionOutcome::Failed { raw_prefix, reason } => {
            warn!(stage, reason = reason.as_str(), raw_prefix = raw_prefix.as_str(), "no JSON in stage output");
            emit(
                events,
                Event::ExtractionFailed {
                    stage: stage.to_string(),
                    reason: reason.clone(),
                },
            );
        }
    }
    let mut report: T = outcome.into_report();
    report.normalize();
    report
}

fn structured<T: Report>(key: StageKey, raw: &str, events: &Option<Arc<dyn EventHandler>>) -> Value {
    decode::<T>(key.as_str(), raw, events).to_value()
}

/// Run one stage against `gateway` on model `model_key`.
///
/// Returns the stage's report as JSON. Fails only when the gateway gave up
/// (sentinel response) or the run was cancelled.
pub async fn run_stage(
    key: StageKey,
    input: &StageInput<'_>,
    gateway: &ModelGateway,
    model_key: &str,
    events: &Option<Arc<dyn EventHandler>>,
) -> Result<Value> {
    gateway.check_cancelled()?;

    let StageParams {
        temperature,
        max_tokens,
    } = params(key);
    let response = gateway
        .complete_metered(
            prompts::messages(key, input),
            model_key,
            temperature,
            max_tokens,
            input.usage,
        )
        .await;

    if let Some(message) = response.error_message {
        gateway.check_cancelled()?;
        return Err(PipelineError::StageFailed {
            stage: key.as_str().to_string(),
            message,
        });
    }
    debug!(stage = key.as_str(), chars = response.text.len(), "stage answered");

    let raw = response.text.as_str();
    let report = match key {
        StageKey::Extractor => {
            let mut data = decode::<ExtractedData>(key.as_str(), raw, events);
            if input.mode.requires_direction() {
                seed_user_notes(&mut data, input.user_direction);
            }
            data.to_value()
        }
        StageKey::ResonanceHunter => structured::<ResonanceReport>(key, raw, events),
        StageKey::SourceAnalyst => structured::<SourceAnalysisReport>(key, raw, events),
        StageKey::Anthropologist => structured::<AnthropologyReport>(key, raw, events),
        StageKey::LocalContextualizer => structured::<LocalContextReport>(key, raw, events),
        StageKey::PopcultureCurator => structured::<PopcultureReport>(key, raw, events),
        StageKey::StoryExcavator => structured::<StoryReport>(key, raw, events),
        StageKey::TensionArchitect => structured::<TensionReport>(key, raw, events),
        StageKey::ContextShifter => structured::<DepthReport>(key, raw, events),
        StageKey::Comedian => structured::<HumorReport>(key, raw, events),
        StageKey::Engagement => structured::<EngagementReport>(key, raw, events),
        StageKey::DevilsAdvocate => structured::<CritiqueReport>(key, raw, events),
        StageKey::VoiceGuardian | StageKey::OpeningSniper | StageKey::VulnerabilityScanner => {
            review::decode(raw).to_value()
        }
        StageKey::ExplorationAgent => structured::<ExplorationReport>(key, raw, events),
        StageKey::DevelopmentAgent => structured::<DevelopmentReport>(key, raw, events),
        StageKey::QualityController => structured::<PolishReport>(key, raw, events),
    };
    Ok(report)
}

/// The user's direction always survives extraction as a high-priority note.
fn seed_user_notes(data: &mut ExtractedData, direction: Option<&str>) {
    let Some(direction) = direction.map(str::trim).filter(|d| !d.is_empty()) else {
        return;
    };
    let notes = &mut data.user_notes;
    if notes.content.trim().is_empty() {
        notes.content = direction.to_string();
    }
    notes.direction = direction.to_string();
    notes.priority = "high".to_string();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MockBackend, MockReply};
    use crate::events::FnEventHandler;
    use serde_json::json;
    use std::sync::Mutex;

    fn gateway(mock: MockBackend) -> ModelGateway {
        ModelGateway::builder().backend(Arc::new(mock)).build().unwrap()
    }

    fn input<'a>(mode: WorkflowMode, ctx: &'a PipelineContext, direction: Option<&'a str>) -> StageInput<'a> {
        StageInput {
            mode,
            source_text: "Commuters lose 40 minutes a day.",
            user_direction: direction,
            audience_locale: "Poland",
            context: ctx,
            usage: None,
        }
    }

    #[test]
    fn test_empty_reports_match_types() {
        assert_eq!(empty_report(StageKey::ContextShifter)["hasSecondLayer"], false);
        assert!(empty_report(StageKey::VoiceGuardian).get("score").is_none());
        assert_eq!(empty_report(StageKey::ExplorationAgent)["possibleAngles"], json!([]));
    }

    #[tokio::test]
    async fn test_stage_decodes_typed_report() {
        let gw = gateway(MockBackend::fixed(
            "```json\n{\"confidenceLevel\": \"7/10\", \"limitations\": [\"n=12\"]}\n```",
        ));
        let ctx = PipelineContext::new();
        let report = run_stage(
            StageKey::SourceAnalyst,
            &input(WorkflowMode::Exploration, &ctx, None),
            &gw,
            "gemini-3-flash",
            &None,
        )
        .await
        .unwrap();
        assert_eq!(report["confidenceLevel"], 7.0);
        assert_eq!(report["limitations"], json!(["n=12"]));
        assert_eq!(report["riskyClaims"], json!([]));
    }

    #[tokio::test]
    async fn test_sentinel_is_stage_error() {
        let gw = gateway(MockBackend::fixed("{}").on("# COMEDIAN", MockReply::failure(503)));
        let ctx = PipelineContext::new();
        let err = run_stage(
            StageKey::Comedian,
            &input(WorkflowMode::Exploration, &ctx, None),
            &gw,
            "gemini-3-flash",
            &None,
        )
        .await
        .unwrap_err();
        match err {
            PipelineError::StageFailed { stage, message } => {
                assert_eq!(stage, "comedian");
                assert!(message.contains("503"), "{}", message);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unparseable_output_degrades_to_empty() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let handler: Option<Arc<dyn EventHandler>> = Some(Arc::new(FnEventHandler(move |e| {
            sink.lock().unwrap().push(e);
        })));
        let gw = gateway(MockBackend::fixed("I cannot help with that."));
        let ctx = PipelineContext::new();
        let report = run_stage(
            StageKey::Engagement,
            &input(WorkflowMode::Exploration, &ctx, None),
            &gw,
            "gemini-3-flash",
            &handler,
        )
        .await
        .unwrap();
        assert_eq!(report, empty_report(StageKey::Engagement));
        assert!(seen
            .lock()
            .unwrap()
            .iter()
            .any(|e| matches!(e, Event::ExtractionFailed { stage, .. } if stage == "engagement")));
    }

    #[tokio::test]
    async fn test_development_extractor_seeds_direction() {
        let gw = gateway(MockBackend::fixed("{\"conclusions\": [\"c\"]}"));
        let ctx = PipelineContext::new();
        let report = run_stage(
            StageKey::Extractor,
            &input(WorkflowMode::Development, &ctx, Some("remote work wins")),
            &gw,
            "gemini-3-flash",
            &None,
        )
        .await
        .unwrap();
        assert_eq!(report["userNotes"]["direction"], "remote work wins");
        assert_eq!(report["userNotes"]["priority"], "high");
        assert_eq!(report["conclusions"], json!(["c"]));
    }

    #[tokio::test]
    async fn test_review_stage_is_text_based() {
        let gw = gateway(MockBackend::fixed(
            "## Corporate phrases\n- drop \"leverage\"\n- drop \"synergy\"\n\nScore: 6/10",
        ));
        let ctx = PipelineContext::new();
        let report = run_stage(
            StageKey::VoiceGuardian,
            &input(WorkflowMode::Polish, &ctx, None),
            &gw,
            "gemini-3-flash",
            &None,
        )
        .await
        .unwrap();
        assert_eq!(report["score"], 6.0);
        assert_eq!(report["issuesCount"], 2);
    }

    #[tokio::test]
    async fn test_cancelled_before_call() {
        let flag = Arc::new(std::sync::atomic::AtomicBool::new(true));
        let mock = Arc::new(MockBackend::fixed("{}"));
        let gw = ModelGateway::builder()
            .backend(mock.clone())
            .cancellation(flag)
            .build()
            .unwrap();
        let ctx = PipelineContext::new();
        let err = run_stage(
            StageKey::Extractor,
            &input(WorkflowMode::Exploration, &ctx, None),
            &gw,
            "gemini-3-flash",
            &None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled));
        assert_eq!(mock.call_count(), 0);
    }
}
