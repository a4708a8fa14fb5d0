//! The single entry point for model calls.
//!
//! [`ModelGateway`] carries the HTTP client, backend, endpoint, price table,
//! retry policy, cancellation handle and optional event handler. It is
//! constructed once and shared by every stage of a run (and by the brief
//! aggregator's concurrent map calls).
//!
//! [`ModelGateway::complete`] never fails: once retries are exhausted it
//! returns a response whose text is an `[ERROR ...]` sentinel and whose
//! `error_message` is set. Callers branch on
//! [`GatewayResponse::is_error`]; [`is_error_sentinel`] is for code that
//! only holds the text.
//!
//! The gateway's own ledger totals every call it has made. A run that
//! shares the gateway with other runs counts its own calls with a
//! [`UsageMeter`] passed to [`ModelGateway::complete_metered`].

use crate::backend::{with_backoff, Backend, BackoffConfig, ChatMessage, LlmRequest, OpenRouterBackend};
use crate::config::{default_models, ModelSpec, PipelineConfig, DEFAULT_BASE_URL};
use crate::error::Result;
use crate::events::{emit, Event, EventHandler};
use crate::PipelineError;
use reqwest::Client;
use serde::Serialize;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Prefix shared by every sentinel response.
pub const ERROR_SENTINEL_PREFIX: &str = "[ERROR";

/// Whether `text` is a gateway failure sentinel rather than model output.
///
/// ```
/// use content_pipeline::gateway::is_error_sentinel;
///
/// assert!(is_error_sentinel("[ERROR after 4 attempts: HTTP 503: busy]"));
/// assert!(!is_error_sentinel("{\"ok\": true}"));
/// ```
pub fn is_error_sentinel(text: &str) -> bool {
    text.trim_start().starts_with(ERROR_SENTINEL_PREFIX)
}

/// Result of one gateway call, successful or not.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayResponse {
    /// Model text, or the sentinel when the call failed.
    pub text: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub elapsed_seconds: f64,
    pub cost_usd: f64,
    /// Set exactly when `text` is a sentinel.
    pub error_message: Option<String>,
}

impl GatewayResponse {
    fn failure(message: String, elapsed: Duration) -> Self {
        Self {
            text: format!("{} {}]", ERROR_SENTINEL_PREFIX, message),
            input_tokens: 0,
            output_tokens: 0,
            elapsed_seconds: elapsed.as_secs_f64(),
            cost_usd: 0.0,
            error_message: Some(message),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error_message.is_some()
    }
}

/// Running totals of calls, tokens and spend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageLedger {
    pub calls: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_usd: f64,
}

impl UsageLedger {
    /// Totals accumulated after `earlier` was taken.
    pub fn since(&self, earlier: &UsageLedger) -> UsageLedger {
        UsageLedger {
            calls: self.calls.saturating_sub(earlier.calls),
            input_tokens: self.input_tokens.saturating_sub(earlier.input_tokens),
            output_tokens: self.output_tokens.saturating_sub(earlier.output_tokens),
            cost_usd: (self.cost_usd - earlier.cost_usd).max(0.0),
        }
    }

    pub fn record(&mut self, response: &GatewayResponse) {
        self.calls += 1;
        self.input_tokens += response.input_tokens;
        self.output_tokens += response.output_tokens;
        self.cost_usd += response.cost_usd;
    }
}

/// A [`UsageLedger`] shared by the calls of one unit of work.
#[derive(Debug, Default)]
pub struct UsageMeter(Mutex<UsageLedger>);

impl UsageMeter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, response: &GatewayResponse) {
        if let Ok(mut ledger) = self.0.lock() {
            ledger.record(response);
        }
    }

    /// Totals so far.
    pub fn snapshot(&self) -> UsageLedger {
        self.0.lock().map(|l| *l).unwrap_or_default()
    }
}

/// Shared model gateway.
///
/// # Example
///
/// ```
/// use content_pipeline::gateway::ModelGateway;
/// use content_pipeline::backend::MockBackend;
/// use std::sync::Arc;
///
/// let gateway = ModelGateway::builder()
///     .backend(Arc::new(MockBackend::fixed("{}")))
///     .build()
///     .unwrap();
/// assert!(gateway.model("gemini-3-flash").is_some());
/// ```
pub struct ModelGateway {
    client: Client,
    base_url: String,
    backend: Arc<dyn Backend>,
    backoff: BackoffConfig,
    models: Vec<ModelSpec>,
    cancellation: Option<Arc<AtomicBool>>,
    event_handler: Option<Arc<dyn EventHandler>>,
    ledger: UsageMeter,
}

impl ModelGateway {
    /// Create a new builder.
    pub fn builder() -> ModelGatewayBuilder {
        ModelGatewayBuilder {
            client: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            backend: None,
            backoff: None,
            models: default_models(),
            cancellation: None,
            event_handler: None,
            timeout: None,
        }
    }

    /// Gateway talking to OpenRouter with the config's key, timeout,
    /// retry count and price table.
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        config.validate()?;
        let mut backend = OpenRouterBackend::new().with_app_title("content-pipeline");
        if let Some(ref key) = config.api_key {
            backend = backend.with_api_key(key.clone());
        }
        ModelGateway::builder()
            .base_url(config.base_url.clone())
            .backend(Arc::new(backend))
            .backoff(config.backoff())
            .models(config.models.clone())
            .timeout(config.timeout())
            .build()
    }

    /// Look up a model by key.
    pub fn model(&self, key: &str) -> Option<&ModelSpec> {
        self.models.iter().find(|m| m.key == key)
    }

    /// Check whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(|c| c.load(Ordering::Relaxed))
    }

    /// Return an error if cancellation has been requested.
    pub fn check_cancelled(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        Ok(())
    }

    /// Totals across every call made through this gateway.
    pub fn usage(&self) -> UsageLedger {
        self.ledger.snapshot()
    }

    /// Send `messages` to the model registered under `model_key`.
    ///
    /// Transient provider errors are retried per the backoff policy. This
    /// never returns an error; failures come back as a sentinel response.
    pub async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        model_key: &str,
        temperature: f64,
        max_tokens: u32,
    ) -> GatewayResponse {
        self.complete_metered(messages, model_key, temperature, max_tokens, None)
            .await
    }

    /// [`complete`](Self::complete), also recording the call on `meter`.
    pub async fn complete_metered(
        &self,
        messages: Vec<ChatMessage>,
        model_key: &str,
        temperature: f64,
        max_tokens: u32,
        meter: Option<&UsageMeter>,
    ) -> GatewayResponse {
        let started = Instant::now();

        let Some(spec) = self.model(model_key) else {
            warn!(model = model_key, "unknown model key");
            return GatewayResponse::failure(
                format!("unknown model key '{}'", model_key),
                started.elapsed(),
            );
        };

        let request = LlmRequest {
            model: spec.id.clone(),
            messages,
            temperature,
            max_tokens,
            json_mode: false,
        };

        let mut attempts: u32 = 1;
        let handler = &self.event_handler;
        let mut on_retry = |attempt: u32, delay: Duration, reason: &str| {
            attempts = attempt + 1;
            warn!(model = model_key, attempt, delay_ms = delay.as_millis() as u64, reason, "retrying model call");
            emit(
                handler,
                Event::TransportRetry {
                    model: model_key.to_string(),
                    attempt,
                    delay_ms: delay.as_millis() as u64,
                    reason: reason.to_string(),
                },
            );
        };

        let outcome = with_backoff(
            &self.backend,
            &self.client,
            &self.base_url,
            &request,
            &self.backoff,
            self.cancellation.as_deref(),
            Some(&mut on_retry),
        )
        .await;

        let response = match outcome {
            Ok(resp) => {
                let usage = resp.usage;
                GatewayResponse {
                    text: resp.text,
                    input_tokens: usage.input_tokens,
                    output_tokens: usage.output_tokens,
                    elapsed_seconds: started.elapsed().as_secs_f64(),
                    cost_usd: spec.cost(usage.input_tokens, usage.output_tokens),
                    error_message: None,
                }
            }
            Err(PipelineError::Cancelled) => {
                GatewayResponse::failure("cancelled".to_string(), started.elapsed())
            }
            Err(e) => {
                warn!(model = model_key, attempts, error = %e, "model call failed");
                GatewayResponse::failure(
                    format!("after {} attempts: {}", attempts, e),
                    started.elapsed(),
                )
            }
        };

        debug!(
            model = model_key,
            backend = self.backend.name(),
            input_tokens = response.input_tokens,
            output_tokens = response.output_tokens,
            cost_usd = response.cost_usd,
            "model call finished"
        );

        self.ledger.record(&response);
        if let Some(meter) = meter {
            meter.record(&response);
        }
        response
    }
}

impl std::fmt::Debug for ModelGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelGateway")
            .field("base_url", &self.base_url)
            .field("backend", &self.backend.name())
            .field("backoff", &self.backoff)
            .field("models", &self.models.len())
            .field("has_cancellation", &self.cancellation.is_some())
            .field("has_event_handler", &self.event_handler.is_some())
            .finish()
    }
}

/// Builder for [`ModelGateway`].
pub struct ModelGatewayBuilder {
    client: Option<Client>,
    base_url: String,
    backend: Option<Arc<dyn Backend>>,
    backoff: Option<BackoffConfig>,
    models: Vec<ModelSpec>,
    cancellation: Option<Arc<AtomicBool>>,
    event_handler: Option<Arc<dyn EventHandler>>,
    timeout: Option<Duration>,
}

impl ModelGatewayBuilder {
    /// Set the HTTP client. If not set, a default client is created.
    pub fn client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the LLM backend. Default: unauthenticated [`OpenRouterBackend`].
    pub fn backend(mut self, backend: Arc<dyn Backend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Set the transport retry configuration. Default: [`BackoffConfig::none()`].
    pub fn backoff(mut self, config: BackoffConfig) -> Self {
        self.backoff = Some(config);
        self
    }

    /// Replace the price table.
    pub fn models(mut self, models: Vec<ModelSpec>) -> Self {
        self.models = models;
        self
    }

    /// Set the cancellation flag.
    pub fn cancellation(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancellation = Some(cancel);
        self
    }

    pub fn event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.event_handler = Some(handler);
        self
    }

    /// Set the request timeout. Default: 120 seconds.
    ///
    /// Ignored when a custom `Client` is provided via `.client()`.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build the gateway.
    pub fn build(self) -> Result<ModelGateway> {
        let client = match self.client {
            Some(client) => client,
            None => Client::builder()
                .timeout(self.timeout.unwrap_or(Duration::from_secs(120)))
                .build()?,
        };
        Ok(ModelGateway {
            client,
            base_url: self.base_url.trim_end_matches('/').to_string(),
            backend: self
                .backend
                .unwrap_or_else(|| Arc::new(OpenRouterBackend::new())),
            backoff: self.backoff.unwrap_or_else(BackoffConfig::none),
            models: self.models,
            cancellation: self.cancellation,
            event_handler: self.event_handler,
            ledger: UsageMeter::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::backoff::JitterStrategy;
    use crate::backend::{MockBackend, MockReply};
    use crate::events::FnEventHandler;

    fn messages() -> Vec<ChatMessage> {
        vec![ChatMessage::system("# TEST"), ChatMessage::user("hello")]
    }

    fn gateway(mock: MockBackend) -> ModelGateway {
        ModelGateway::builder()
            .backend(Arc::new(mock))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_complete_accounts_cost() {
        let gw = gateway(MockBackend::fixed("hi").with_usage(2000, 1000));
        let resp = gw.complete(messages(), "gemini-3-flash", 0.3, 800).await;

        assert_eq!(resp.text, "hi");
        assert!(!resp.is_error());
        assert_eq!(resp.input_tokens, 2000);
        assert!((resp.cost_usd - 0.004).abs() < 1e-12);

        let usage = gw.usage();
        assert_eq!(usage.calls, 1);
        assert_eq!(usage.output_tokens, 1000);
    }

    #[tokio::test]
    async fn test_meter_counts_only_its_calls() {
        let gw = gateway(MockBackend::fixed("hi").with_usage(1000, 0));
        let meter = UsageMeter::new();
        gw.complete(messages(), "gemini-3-flash", 0.3, 800).await;
        gw.complete_metered(messages(), "gemini-3-flash", 0.3, 800, Some(&meter))
            .await;

        assert_eq!(gw.usage().calls, 2);
        let own = meter.snapshot();
        assert_eq!(own.calls, 1);
        assert_eq!(own.input_tokens, 1000);
        assert!((own.cost_usd - 0.0005).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_failure_flag_matches_sentinel_text() {
        let gw = gateway(MockBackend::fixed("x").on("# TEST", MockReply::failure(500)));
        let failed = gw.complete(messages(), "gpt-5.1", 0.3, 10).await;
        assert!(failed.is_error());
        assert!(is_error_sentinel(&failed.text));

        let ok = gateway(MockBackend::fixed("[fine]")).complete(messages(), "gpt-5.1", 0.3, 10).await;
        assert!(!ok.is_error());
        assert!(!is_error_sentinel(&ok.text));
    }

    #[tokio::test]
    async fn test_complete_sends_provider_id() {
        let mock = Arc::new(MockBackend::fixed("hi"));
        let gw = ModelGateway::builder().backend(mock.clone()).build().unwrap();
        gw.complete(messages(), "gemini-3-pro", 0.5, 100).await;
        assert_eq!(mock.requests()[0].model, "google/gemini-3-pro-preview");
    }

    #[tokio::test]
    async fn test_unknown_model_returns_sentinel() {
        let gw = gateway(MockBackend::fixed("hi"));
        let resp = gw.complete(messages(), "nope", 0.3, 10).await;
        assert!(is_error_sentinel(&resp.text));
        assert!(resp.error_message.unwrap().contains("nope"));
    }

    #[tokio::test]
    async fn test_exhaustion_returns_sentinel_with_attempts() {
        let retried = Arc::new(Mutex::new(0u32));
        let counter = retried.clone();
        let gw = ModelGateway::builder()
            .backend(Arc::new(MockBackend::fixed("x").on("# TEST", MockReply::failure(503))))
            .backoff(BackoffConfig {
                max_retries: 2,
                initial_delay: Duration::from_millis(1),
                jitter: JitterStrategy::None,
                ..BackoffConfig::standard()
            })
            .event_handler(Arc::new(FnEventHandler(move |event: Event| {
                if let Event::TransportRetry { .. } = event {
                    *counter.lock().unwrap() += 1;
                }
            })))
            .build()
            .unwrap();

        let resp = gw.complete(messages(), "gpt-5.1", 0.3, 10).await;
        assert!(is_error_sentinel(&resp.text));
        assert!(resp.text.starts_with("[ERROR after 3 attempts"), "{}", resp.text);
        assert_eq!(resp.cost_usd, 0.0);
        assert_eq!(*retried.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_non_retryable_fails_after_one_attempt() {
        let gw = gateway(MockBackend::fixed("x").on("# TEST", MockReply::failure(400)));
        let resp = gw.complete(messages(), "gpt-5.1", 0.3, 10).await;
        assert!(resp.text.starts_with("[ERROR after 1 attempts"), "{}", resp.text);
    }

    #[tokio::test]
    async fn test_cancelled_gateway() {
        let flag = Arc::new(AtomicBool::new(true));
        let gw = ModelGateway::builder()
            .backend(Arc::new(MockBackend::fixed("x")))
            .cancellation(flag)
            .build()
            .unwrap();
        assert!(gw.check_cancelled().is_err());
        let resp = gw.complete(messages(), "gpt-5.1", 0.3, 10).await;
        assert_eq!(resp.error_message.as_deref(), Some("cancelled"));
    }

    #[test]
    fn test_ledger_since() {
        let before = UsageLedger {
            calls: 2,
            input_tokens: 10,
            output_tokens: 5,
            cost_usd: 0.5,
        };
        let after = UsageLedger {
            calls: 5,
            input_tokens: 40,
            output_tokens: 9,
            cost_usd: 1.25,
        };
        let delta = after.since(&before);
        assert_eq!(delta.calls, 3);
        assert_eq!(delta.input_tokens, 30);
        assert!((delta.cost_usd - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_from_config() {
        let cfg = PipelineConfig {
            api_key: Some("sk-or-abc".into()),
            ..Default::default()
        };
        let gw = ModelGateway::from_config(&cfg).unwrap();
        assert_eq!(gw.base_url, DEFAULT_BASE_URL);
        assert_eq!(gw.backoff.max_retries, 3);
    }
}
