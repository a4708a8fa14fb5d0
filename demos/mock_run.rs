use std::sync::Arc;

use content_pipeline::{
    Event, FileSink, FnEventHandler, MockBackend, MockReply, ModelGateway, ModelRoster,
    PipelineExecutor, PlatformGroup, ResultSink, WorkflowMode,
};
use tracing_subscriber::EnvFilter;

const ARTICLE: &str = "A 2024 study followed 1,200 commuters for a year. Those who switched \
    to cycling reported 40 minutes more free time per week, lower stress, and spent 30% less \
    on transport. Most said the hardest part was the first two weeks.";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Canned answers keyed on each prompt's heading; everything else gets "{}".
    let backend = MockBackend::fixed("{}")
        .on(
            "# FACT EXTRACTOR",
            MockReply::text(r#"{"conclusions": ["cyclists gain 40 minutes a week"]}"#),
        )
        // Cut off mid-object, as a token limit would.
        .on(
            "# EXPLORATION STRATEGIST",
            MockReply::text(
                "```json\n{\"possibleAngles\": [{\"name\": \"Time audit\", \"hook\": \"Your car costs you a workday a month\", \"strength\": 9}, {\"name\": \"Money\", \"hook\": \"30% back",
            ),
        )
        .on("# BRIEF EXTRACTOR", MockReply::text(r#"{"topHooks": ["40 minutes a week"]}"#))
        .on(
            "# BRIEF SYNTHESIZER",
            MockReply::text(r#"{"topHooks": ["Your car costs you a workday a month"], "warnings": ["small sample"]}"#),
        )
        .on(
            "# LINKEDIN WRITER",
            MockReply::text(r##"{"hook": "I sold my car.", "body": "Here is what happened.", "cta": "Would you?", "hashtags": ["#commute"]}"##),
        )
        .with_usage(1200, 300);

    let gateway = Arc::new(ModelGateway::builder().backend(Arc::new(backend)).build()?);
    let executor = PipelineExecutor::new(gateway, ModelRoster::default()).with_event_handler(Arc::new(
        FnEventHandler(|event: Event| match event {
            Event::StageEnd { stage, ok, elapsed_ms } => {
                println!("  {:<22} {} ({} ms)", stage, if ok { "ok" } else { "FAILED" }, elapsed_ms)
            }
            Event::ExtractionRepaired { stage } => println!("  {:<22} repaired truncated JSON", stage),
            _ => {}
        }),
    ));

    let selected = vec!["sourceAnalyst".to_string(), "anthropologist".to_string()];
    let result = executor
        .run(WorkflowMode::Exploration, ARTICLE, None, Some(selected.as_slice()))
        .await;
    let result = executor
        .generate_draft(result, PlatformGroup::LinkedIn, None, None)
        .await;

    println!("\nsuccess: {}  errors: {:?}", result.success, result.errors);
    if let Some(brief) = result.section("brief") {
        println!("brief: {}", serde_json::to_string_pretty(brief)?);
    }
    if let Some(draft) = &result.draft {
        println!("draft:\n{}", draft["fullPost"].as_str().unwrap_or_default());
    }

    let out = std::env::temp_dir().join("content-pipeline-demo");
    let saved = FileSink::new(&out).persist(&result).await?;
    println!("\nsaved to {}", saved.json_path.display());
    Ok(())
}
