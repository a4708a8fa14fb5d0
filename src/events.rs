//! Event system for run lifecycle and progress hooks.
//!
//! Provides an optional, non-intrusive way to observe a pipeline run. The
//! executor emits events when the run starts, when each stage starts, ends or
//! is skipped, when extraction needed repair, and when the brief phases run.
//! Implement [`EventHandler`] and hand it to
//! [`PipelineExecutor::with_event_handler`](crate::executor::PipelineExecutor::with_event_handler)
//! for progress bars, audit logs, or UI updates.

use std::sync::Arc;

use crate::registry::WorkflowMode;

/// Events emitted during a pipeline run.
#[derive(Debug, Clone)]
pub enum Event {
    /// A run passed validation and is about to dispatch its first stage.
    RunStart {
        mode: WorkflowMode,
        /// Keys of every stage that will execute, in order.
        planned: Vec<String>,
    },
    /// A stage has started executing.
    StageStart {
        stage: String,
        mandatory: bool,
    },
    /// A stage has finished executing.
    StageEnd {
        stage: String,
        /// Whether the stage completed without raising.
        ok: bool,
        elapsed_ms: u64,
    },
    /// An available optional stage was not selected for this run.
    StageSkipped { stage: String },
    /// The stage's JSON was recovered by truncation repair.
    ExtractionRepaired { stage: String },
    /// No JSON could be recovered; the stage fell back to its empty report.
    ExtractionFailed { stage: String, reason: String },
    /// A transport-level retry due to a provider error.
    TransportRetry {
        /// Model key being called.
        model: String,
        /// The retry attempt number (1-indexed).
        attempt: u32,
        /// Delay before this retry attempt in milliseconds.
        delay_ms: u64,
        reason: String,
    },
    /// A brief aggregation phase has started.
    BriefPhase {
        /// `"map"` or `"reduce"`.
        phase: &'static str,
        /// Reports (map) or non-empty extractions (reduce) involved.
        items: usize,
    },
    /// The run has finished.
    RunEnd { success: bool, error_count: usize },
}

/// Handler for run lifecycle events.
///
/// This is entirely optional -- runs work without an event handler.
///
/// # Example
///
/// ```
/// use content_pipeline::events::{Event, EventHandler};
///
/// struct PrintHandler;
///
/// impl EventHandler for PrintHandler {
///     fn on_event(&self, event: Event) {
///         match event {
///             Event::StageStart { stage, .. } => println!("[start] {}", stage),
///             Event::StageEnd { stage, ok, .. } => println!("[end] {} ok={}", stage, ok),
///             _ => {}
///         }
///     }
/// }
/// ```
pub trait EventHandler: Send + Sync {
    /// Called when the run emits an event.
    fn on_event(&self, event: Event);
}

/// Emit an event if a handler is present. No-op otherwise.
pub(crate) fn emit(handler: &Option<Arc<dyn EventHandler>>, event: Event) {
    if let Some(ref h) = handler {
        h.on_event(event);
    }
}

/// An [`EventHandler`] backed by a closure.
///
/// # Example
///
/// ```
/// use content_pipeline::events::{Event, FnEventHandler};
/// use std::sync::Arc;
///
/// let handler = Arc::new(FnEventHandler(|event: Event| {
///     if let Event::StageSkipped { stage } = event {
///         println!("skipped {}", stage);
///     }
/// }));
/// ```
pub struct FnEventHandler<F: Fn(Event) + Send + Sync>(pub F);

impl<F: Fn(Event) + Send + Sync> EventHandler for FnEventHandler<F> {
    fn on_event(&self, event: Event) {
        (self.0)(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_emit_without_handler_is_noop() {
        emit(&None, Event::StageSkipped { stage: "comedian".into() });
    }

    #[test]
    fn test_fn_handler_receives_events() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let handler: Option<Arc<dyn EventHandler>> =
            Some(Arc::new(FnEventHandler(move |event: Event| {
                if let Event::StageEnd { stage, ok, .. } = event {
                    sink.lock().unwrap().push((stage, ok));
                }
            })));

        emit(
            &handler,
            Event::StageEnd {
                stage: "extractor".into(),
                ok: true,
                elapsed_ms: 3,
            },
        );
        emit(&handler, Event::RunEnd { success: true, error_count: 0 });

        assert_eq!(*seen.lock().unwrap(), vec![("extractor".to_string(), true)]);
    }
}
