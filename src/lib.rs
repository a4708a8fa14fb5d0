//! # Content Pipeline
//!
//! Staged LLM analysis that turns one long-form source text into a compact
//! decision brief and, on request, a platform-ready draft.
//!
//! A run picks one of three fixed workflows ([`WorkflowMode`]), executes its
//! stages one after another over a shared [`ModelGateway`], and condenses
//! every stage report into a [`Brief`] with a map-reduce pass. Model output
//! is never trusted to be well-formed: JSON is recovered from fences, prose
//! and token-limit truncation, and anything unrecoverable degrades to the
//! stage's empty report.
//!
//! ## Core Concepts
//!
//! - **[`PipelineExecutor`]** runs a workflow and never fails; problems land
//!   in [`WorkflowResult::errors`].
//! - **[`ModelGateway`]** is the single door to the model provider: retries,
//!   cost accounting, cancellation and the error sentinel.
//! - **[`output_parser`]** recovers JSON, scores and sections from messy
//!   model text.
//! - **[`BriefAggregator`]** runs the two-phase brief synthesis.
//! - **[`Backend`](backend::Backend)** abstracts the provider; use
//!   [`MockBackend`] in tests.
//!
//! ## Quick Start
//!
//! ```
//! use content_pipeline::{MockBackend, ModelGateway, ModelRoster, PipelineExecutor, WorkflowMode};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = Arc::new(MockBackend::fixed(r#"{"topHooks": ["Cycling wins"]}"#));
//!     let gateway = Arc::new(ModelGateway::builder().backend(backend).build()?);
//!     let executor = PipelineExecutor::new(gateway, ModelRoster::default());
//!
//!     let result = executor
//!         .run(WorkflowMode::Exploration, "Your article here.", None, None)
//!         .await;
//!     assert!(result.success);
//!     println!("{}", serde_json::to_string_pretty(&result)?);
//!     Ok(())
//! }
//! ```
//!
//! Against a real provider, load a [`PipelineConfig`] and use
//! [`PipelineExecutor::from_config`]:
//!
//! ```no_run
//! use content_pipeline::{PipelineConfig, PipelineExecutor, PlatformGroup, WorkflowMode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PipelineConfig::from_file("pipeline.toml")?.with_env_lookup(|k| std::env::var(k).ok())?;
//!     let executor = PipelineExecutor::from_config(&config)?;
//!
//!     let result = executor
//!         .run(WorkflowMode::Development, "Your article.", Some("cars are overrated"), None)
//!         .await;
//!     let result = executor
//!         .generate_draft(result, PlatformGroup::LinkedIn, None, None)
//!         .await;
//!     println!("{:?}", result.draft);
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod brief;
pub mod config;
pub mod context;
pub mod draft;
pub mod error;
pub mod events;
pub mod executor;
pub mod gateway;
pub mod output_parser;
pub mod registry;
pub mod reports;
pub mod sink;
pub mod source;
pub mod stages;

pub use backend::{BackoffConfig, MockBackend, MockReply, OpenRouterBackend};
pub use brief::{Brief, BriefAggregator, CompactExtraction};
pub use config::{ModelRoster, ModelSpec, PipelineConfig};
pub use context::{PipelineContext, WorkflowResult};
pub use draft::{DraftFormat, PlatformGroup, PlatformVariant};
pub use error::{PipelineError, Result};
pub use events::{Event, EventHandler, FnEventHandler};
pub use executor::{PipelineExecutor, RunPhase};
pub use gateway::{GatewayResponse, ModelGateway, UsageLedger, UsageMeter};
pub use registry::{StageKey, StagePlan, WorkflowMode};
pub use reports::Report;
pub use sink::{FileSink, ResultSink};
pub use source::{FileMeta, FileReader};
