//! The workflow executor.
//!
//! [`PipelineExecutor::run`] turns one source text into one
//! [`WorkflowResult`]. It resolves the stage plan for the mode, runs the
//! mandatory stages, then the selected optional stages, then the mode's
//! terminal stage, all strictly in order, and finally builds the brief.
//!
//! Every stage call is isolated:
//!
//! | Failure | Effect |
//! |---------|--------|
//! | optional stage | `"<stage>: <message>"` recorded, empty report stored, run continues |
//! | terminal stage | same as an optional stage |
//! | mandatory stage | run aborted, `success = false`, `report = null` |
//! | validation | nothing runs, `"validation: <message>"` recorded |
//! | cancellation | run aborted with `"cancelled"` |
//!
//! Nothing below the executor propagates past it; `run` never fails.
//!
//! # Example
//!
//! ```
//! use content_pipeline::backend::MockBackend;
//! use content_pipeline::config::ModelRoster;
//! use content_pipeline::executor::PipelineExecutor;
//! use content_pipeline::gateway::ModelGateway;
//! use content_pipeline::registry::WorkflowMode;
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let gateway = ModelGateway::builder()
//!     .backend(Arc::new(MockBackend::fixed("{}")))
//!     .build()
//!     .unwrap();
//! let executor = PipelineExecutor::new(Arc::new(gateway), ModelRoster::default());
//!
//! let result = executor
//!     .run(WorkflowMode::Exploration, "Commuters lose 40 minutes a day.", None, None)
//!     .await;
//! assert!(result.success);
//! assert!(result.terminal_section().is_some());
//! # });
//! ```

use std::sync::Arc;
use std::time::Instant;

use serde_json::{json, Map, Value};
use tracing::{debug, info, info_span, warn, Instrument};

use crate::brief::BriefAggregator;
use crate::config::{ModelRoster, PipelineConfig};
use crate::context::{PipelineContext, WorkflowResult};
use crate::draft::{self, DraftFormat, DraftPackage, DraftTarget, PlatformGroup, PlatformVariant};
use crate::error::{PipelineError, Result};
use crate::events::{emit, Event, EventHandler};
use crate::gateway::{ModelGateway, UsageMeter};
use crate::registry::{StageKey, StagePlan, WorkflowMode};
use crate::reports::Report;
use crate::stages::{self, empty_report, StageInput};

/// Error recorded when a run is cancelled.
pub const CANCELLED: &str = "cancelled";

/// Where a run is.
///
/// `Init → RunningMandatory → RunningOptional(i) → Aggregating → Done`,
/// with `Aborted` reachable only from `RunningMandatory` or on cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Init,
    RunningMandatory,
    /// Index of the optional stage being considered.
    RunningOptional(usize),
    Aggregating,
    Done,
    Aborted,
}

impl RunPhase {
    /// Whether `self → next` is a legal step.
    pub fn can_advance_to(&self, next: RunPhase) -> bool {
        use RunPhase::*;
        match (*self, next) {
            (Init, RunningMandatory) | (Init, Aborted) => true,
            (RunningMandatory, RunningOptional(_)) | (RunningMandatory, Aborted) => true,
            (RunningOptional(i), RunningOptional(j)) => j >= i,
            (RunningOptional(_), Aggregating) | (RunningOptional(_), Aborted) => true,
            (Aggregating, Done) | (Aggregating, Aborted) => true,
            _ => false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunPhase::Done | RunPhase::Aborted)
    }

    fn advance(&mut self, next: RunPhase) {
        if !self.can_advance_to(next) {
            warn!(from = ?self, to = ?next, "unexpected run phase transition");
        }
        debug!(from = ?self, to = ?next, "run phase");
        *self = next;
    }
}

/// Executes workflows against a shared [`ModelGateway`].
pub struct PipelineExecutor {
    gateway: Arc<ModelGateway>,
    roster: ModelRoster,
    audience_locale: String,
    aggregator: BriefAggregator,
    event_handler: Option<Arc<dyn EventHandler>>,
}

impl PipelineExecutor {
    /// Executor with the default brief aggregator for `roster`.
    pub fn new(gateway: Arc<ModelGateway>, roster: ModelRoster) -> Self {
        let aggregator = BriefAggregator::new(gateway.clone(), &roster);
        Self {
            gateway,
            roster,
            audience_locale: "Poland".to_string(),
            aggregator,
            event_handler: None,
        }
    }

    /// Executor over an OpenRouter gateway built from `config`.
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        let gateway = Arc::new(ModelGateway::from_config(config)?);
        let aggregator =
            BriefAggregator::new(gateway.clone(), &config.roster).with_concurrency(config.map_concurrency);
        Ok(Self::new(gateway, config.roster.clone())
            .with_aggregator(aggregator)
            .with_audience_locale(config.audience_locale.clone()))
    }

    /// Observe this executor's runs. The handler is shared with the aggregator.
    pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.aggregator = self.aggregator.with_event_handler(handler.clone());
        self.event_handler = Some(handler);
        self
    }

    pub fn with_aggregator(mut self, aggregator: BriefAggregator) -> Self {
        self.aggregator = match self.event_handler.clone() {
            Some(handler) => aggregator.with_event_handler(handler),
            None => aggregator,
        };
        self
    }

    /// Market the stages write for. Default: `Poland`.
    pub fn with_audience_locale(mut self, locale: impl Into<String>) -> Self {
        self.audience_locale = locale.into();
        self
    }

    pub fn gateway(&self) -> &Arc<ModelGateway> {
        &self.gateway
    }

    pub fn roster(&self) -> &ModelRoster {
        &self.roster
    }

    /// Run `mode` over `source_text`.
    ///
    /// `user_direction` is required in Development and ignored otherwise.
    /// `selected` lists optional stage keys to activate; `None` means the
    /// mode's defaults, and keys not available in the mode are ignored.
    pub async fn run(
        &self,
        mode: WorkflowMode,
        source_text: &str,
        user_direction: Option<&str>,
        selected: Option<&[String]>,
    ) -> WorkflowResult {
        let mut result = WorkflowResult::new(mode);

        let direction = user_direction.map(str::trim).filter(|d| !d.is_empty());
        if let Err(e) = validate(mode, source_text, direction) {
            warn!(%mode, error = %e, "run rejected");
            result.abort(format!("validation: {}", e));
            emit(
                &self.event_handler,
                Event::RunEnd {
                    success: false,
                    error_count: result.errors.len(),
                },
            );
            return result;
        }
        let direction = if mode.requires_direction() { direction } else { None };

        let plan = StagePlan::resolve(mode, selected);
        let span = info_span!("run", %mode, stages = plan.executed().len());
        self.execute_plan(&plan, source_text, direction, result)
            .instrument(span)
            .await
    }

    async fn execute_plan(
        &self,
        plan: &StagePlan,
        source_text: &str,
        direction: Option<&str>,
        mut result: WorkflowResult,
    ) -> WorkflowResult {
        let started = Instant::now();
        let meter = UsageMeter::new();
        let mut phase = RunPhase::Init;
        let mut ctx = PipelineContext::new();

        emit(
            &self.event_handler,
            Event::RunStart {
                mode: plan.mode,
                planned: plan.executed().iter().map(|k| k.to_string()).collect(),
            },
        );
        info!(planned = ?plan.executed(), "run started");

        phase.advance(RunPhase::RunningMandatory);
        for &key in &plan.mandatory {
            if let Err(e) = self.execute_stage(key, true, plan.mode, source_text, direction, &mut ctx, &meter).await {
                result.abort(error_entry(key, &e));
                phase.advance(RunPhase::Aborted);
                return self.finish(result, ctx, started);
            }
        }

        for (i, &(key, active)) in plan.optional.iter().enumerate() {
            phase.advance(RunPhase::RunningOptional(i));
            if !active {
                ctx.insert(key, empty_report(key));
                emit(&self.event_handler, Event::StageSkipped { stage: key.to_string() });
                continue;
            }
            if let Err(e) = self.execute_stage(key, false, plan.mode, source_text, direction, &mut ctx, &meter).await {
                if matches!(e, PipelineError::Cancelled) {
                    result.abort(CANCELLED);
                    phase.advance(RunPhase::Aborted);
                    return self.finish(result, ctx, started);
                }
                result.record_error(error_entry(key, &e));
                ctx.insert(key, empty_report(key));
            }
        }

        if plan.optional.is_empty() {
            phase.advance(RunPhase::RunningOptional(0));
        }

        let terminal = plan.terminal;
        if let Err(e) = self.execute_stage(terminal, false, plan.mode, source_text, direction, &mut ctx, &meter).await {
            if matches!(e, PipelineError::Cancelled) {
                result.abort(CANCELLED);
                phase.advance(RunPhase::Aborted);
                return self.finish(result, ctx, started);
            }
            result.record_error(error_entry(terminal, &e));
            ctx.insert(terminal, empty_report(terminal));
        }

        phase.advance(RunPhase::Aggregating);
        let inputs: Vec<(String, Value)> = ctx
            .non_empty()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        let brief = self.aggregator.aggregate_metered(&inputs, Some(&meter)).await;

        if self.gateway.is_cancelled() {
            result.abort(CANCELLED);
            phase.advance(RunPhase::Aborted);
            return self.finish(result, ctx, started);
        }

        let usage = meter.snapshot();
        let mut report = Map::new();
        report.insert("type".into(), json!(plan.mode.as_str()));
        for (key, value) in ctx.iter() {
            let name = if key == terminal {
                plan.mode.report_key()
            } else {
                key.as_str()
            };
            report.insert(name.to_string(), value.clone());
        }
        report.insert("brief".into(), brief.to_value());
        report.insert("userDirection".into(), json!(direction.unwrap_or_default()));
        report.insert(
            "selectedStages".into(),
            json!(plan.active().iter().map(|k| k.as_str()).collect::<Vec<_>>()),
        );
        report.insert("rawSourceText".into(), json!(source_text));
        report.insert("usage".into(), serde_json::to_value(usage).unwrap_or_default());
        result.report = Some(Value::Object(report));

        phase.advance(RunPhase::Done);
        self.finish(result, ctx, started)
    }

    async fn execute_stage(
        &self,
        key: StageKey,
        mandatory: bool,
        mode: WorkflowMode,
        source_text: &str,
        direction: Option<&str>,
        ctx: &mut PipelineContext,
        meter: &UsageMeter,
    ) -> Result<()> {
        emit(
            &self.event_handler,
            Event::StageStart {
                stage: key.to_string(),
                mandatory,
            },
        );
        let started = Instant::now();

        let input = StageInput {
            mode,
            source_text,
            user_direction: direction,
            audience_locale: &self.audience_locale,
            context: ctx,
            usage: Some(meter),
        };
        let outcome = stages::run_stage(key, &input, &self.gateway, &self.roster.primary, &self.event_handler)
            .instrument(info_span!("stage", stage = key.as_str()))
            .await;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        emit(
            &self.event_handler,
            Event::StageEnd {
                stage: key.to_string(),
                ok: outcome.is_ok(),
                elapsed_ms,
            },
        );

        match outcome {
            Ok(report) => {
                debug!(stage = key.as_str(), elapsed_ms, "stage finished");
                ctx.insert(key, report);
                Ok(())
            }
            Err(e) => {
                warn!(stage = key.as_str(), mandatory, error = %e, "stage failed");
                Err(e)
            }
        }
    }

    fn finish(&self, mut result: WorkflowResult, ctx: PipelineContext, started: Instant) -> WorkflowResult {
        result.context = ctx;
        result.total_duration_seconds = started.elapsed().as_secs_f64();
        info!(
            success = result.success,
            errors = result.errors.len(),
            seconds = result.total_duration_seconds,
            "run finished"
        );
        emit(
            &self.event_handler,
            Event::RunEnd {
                success: result.success,
                error_count: result.errors.len(),
            },
        );
        result
    }

    /// Write a platform draft from a finished result's report.
    ///
    /// Analysis is not re-run, so a failed draft can be retried alone.
    /// Without a report, or on any failure, an error is appended and
    /// `draft` is left as it was.
    pub async fn generate_draft(
        &self,
        mut result: WorkflowResult,
        group: PlatformGroup,
        format: Option<DraftFormat>,
        variant: Option<PlatformVariant>,
    ) -> WorkflowResult {
        let Some(report) = result.report.as_ref() else {
            result.record_error("draft generation failed: result has no report");
            return result;
        };
        let target = match DraftTarget::resolve(group, format, variant) {
            Ok(target) => target,
            Err(e) => {
                result.record_error(format!("draft generation failed: {}", e));
                return result;
            }
        };

        let started = Instant::now();
        let package = DraftPackage::from_report(report);
        let params = group.params();
        let response = self
            .gateway
            .complete(
                draft::messages(&target, &package, &self.audience_locale),
                &self.roster.primary,
                params.temperature,
                params.max_tokens,
            )
            .instrument(info_span!("draft", platform = group.as_str()))
            .await;

        if let Some(message) = response.error_message {
            warn!(platform = group.as_str(), error = message.as_str(), "draft generation failed");
            result.record_error(format!("draft generation failed: {}", message));
            return result;
        }

        let elapsed = started.elapsed().as_secs_f64();
        let mut draft = draft::decode_draft(&target, &response.text, &self.event_handler);
        if let Value::Object(map) = &mut draft {
            map.insert("platform".into(), json!(group.as_str()));
            map.insert("format".into(), json!(target.format.as_str()));
            if let Some(variant) = target.variant {
                map.insert("variant".into(), json!(variant.as_str()));
            }
            map.insert("durationSeconds".into(), json!(elapsed));
        }
        result.draft = Some(draft);
        result.total_duration_seconds += elapsed;
        result
    }
}

impl std::fmt::Debug for PipelineExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineExecutor")
            .field("gateway", &self.gateway)
            .field("roster", &self.roster)
            .field("audience_locale", &self.audience_locale)
            .field("has_event_handler", &self.event_handler.is_some())
            .finish()
    }
}

fn validate(mode: WorkflowMode, source_text: &str, direction: Option<&str>) -> Result<()> {
    if source_text.trim().is_empty() {
        return Err(PipelineError::Validation("source text is empty".into()));
    }
    if mode.requires_direction() && direction.is_none() {
        return Err(PipelineError::Validation(format!(
            "{} mode requires a user direction",
            mode
        )));
    }
    Ok(())
}

/// `"<stage>: <message>"`, or `"cancelled"`.
fn error_entry(key: StageKey, error: &PipelineError) -> String {
    match error {
        PipelineError::Cancelled => CANCELLED.to_string(),
        PipelineError::StageFailed { message, .. } => format!("{}: {}", key, message),
        other => format!("{}: {}", key, other),
    }
}
