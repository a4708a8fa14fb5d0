//! Mock backend for testing without a live LLM.
//!
//! [`MockBackend`] returns pre-configured responses in order, and can route
//! specific requests to specific replies by matching a marker in the system
//! prompt. Every stage prompt starts with `# <STAGE TITLE>`, so tests can
//! script one stage without scripting the rest.
//!
//! # Example
//!
//! ```
//! use content_pipeline::backend::{MockBackend, MockReply};
//!
//! let mock = MockBackend::fixed("{}")
//!     .on("# SOURCE ANALYST", MockReply::text(r#"{"confidenceLevel": 7}"#))
//!     .on("# DEVIL'S ADVOCATE", MockReply::failure(500));
//! ```

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::Client;

use super::{Backend, LlmRequest, LlmResponse, TokenUsage};
use crate::error::Result;
use crate::PipelineError;

/// What a routed request gets back.
#[derive(Debug, Clone)]
pub enum MockReply {
    Text(String),
    /// Provider error with the given HTTP status.
    Failure { status: u16, body: String },
}

impl MockReply {
    pub fn text(text: impl Into<String>) -> Self {
        MockReply::Text(text.into())
    }

    pub fn failure(status: u16) -> Self {
        MockReply::Failure {
            status,
            body: "mock failure".to_string(),
        }
    }
}

#[derive(Debug)]
struct Rule {
    marker: String,
    reply: MockReply,
}

/// A test backend that returns canned responses.
///
/// Routing rules are checked first, in insertion order. Unrouted requests
/// cycle through the canned responses.
#[derive(Debug)]
pub struct MockBackend {
    responses: Vec<String>,
    index: AtomicUsize,
    rules: Vec<Rule>,
    failures_left: AtomicU32,
    failure_status: u16,
    usage: TokenUsage,
    calls: AtomicUsize,
    log: Mutex<Vec<LlmRequest>>,
}

impl MockBackend {
    /// Create a mock backend with the given canned responses.
    ///
    /// Responses are returned in order. When exhausted, cycles from the beginning.
    pub fn new(responses: Vec<String>) -> Self {
        assert!(!responses.is_empty(), "MockBackend requires at least one response");
        Self {
            responses,
            index: AtomicUsize::new(0),
            rules: Vec::new(),
            failures_left: AtomicU32::new(0),
            failure_status: 503,
            usage: TokenUsage {
                input_tokens: 100,
                output_tokens: 50,
            },
            calls: AtomicUsize::new(0),
            log: Mutex::new(Vec::new()),
        }
    }

    /// Create a mock that always returns the same response.
    pub fn fixed(response: impl Into<String>) -> Self {
        Self::new(vec![response.into()])
    }

    /// Route requests whose system prompt contains `marker` to `reply`.
    pub fn on(mut self, marker: impl Into<String>, reply: MockReply) -> Self {
        self.rules.push(Rule {
            marker: marker.into(),
            reply,
        });
        self
    }

    /// Fail the first `n` calls with `status` before answering normally.
    pub fn fail_first(mut self, n: u32, status: u16) -> Self {
        self.failures_left = AtomicU32::new(n);
        self.failure_status = status;
        self
    }

    /// Token counts reported on every successful call.
    pub fn with_usage(mut self, input_tokens: u64, output_tokens: u64) -> Self {
        self.usage = TokenUsage {
            input_tokens,
            output_tokens,
        };
        self
    }

    /// Number of `complete` calls received, failures included.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    /// Every request received so far, in arrival order.
    pub fn requests(&self) -> Vec<LlmRequest> {
        self.log.lock().map(|log| log.clone()).unwrap_or_default()
    }

    fn next_response(&self) -> String {
        let idx = self.index.fetch_add(1, Ordering::Relaxed) % self.responses.len();
        self.responses[idx].clone()
    }

    fn take_failure(&self) -> bool {
        self.failures_left
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .is_ok()
    }

    fn reply_for(&self, request: &LlmRequest) -> MockReply {
        let system = request.system_prompt();
        self.rules
            .iter()
            .find(|rule| system.contains(&rule.marker))
            .map(|rule| rule.reply.clone())
            .unwrap_or_else(|| MockReply::Text(self.next_response()))
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn complete(
        &self,
        _client: &Client,
        _base_url: &str,
        request: &LlmRequest,
    ) -> Result<LlmResponse> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut log) = self.log.lock() {
            log.push(request.clone());
        }

        if self.take_failure() {
            return Err(PipelineError::HttpError {
                status: self.failure_status,
                body: "mock transient failure".into(),
                retry_after: None,
            });
        }

        match self.reply_for(request) {
            MockReply::Text(text) => Ok(LlmResponse {
                text,
                status: 200,
                usage: self.usage,
            }),
            MockReply::Failure { status, body } => Err(PipelineError::HttpError {
                status,
                body,
                retry_after: None,
            }),
        }
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ChatMessage;

    fn request(system: &str) -> LlmRequest {
        LlmRequest {
            model: "test".to_string(),
            messages: vec![ChatMessage::system(system), ChatMessage::user("input")],
            temperature: 0.5,
            max_tokens: 100,
            json_mode: false,
        }
    }

    #[tokio::test]
    async fn test_mock_fixed_response() {
        let mock = MockBackend::fixed("Hello!");
        let resp = mock
            .complete(&Client::new(), "http://unused", &request("# A"))
            .await
            .unwrap();
        assert_eq!(resp.text, "Hello!");
        assert_eq!(resp.status, 200);
        assert_eq!(resp.usage.input_tokens, 100);
    }

    #[tokio::test]
    async fn test_mock_cycles_responses() {
        let mock = MockBackend::new(vec!["first".into(), "second".into()]);
        let client = Client::new();
        let r1 = mock.complete(&client, "http://unused", &request("x")).await.unwrap();
        let r2 = mock.complete(&client, "http://unused", &request("x")).await.unwrap();
        let r3 = mock.complete(&client, "http://unused", &request("x")).await.unwrap();
        assert_eq!(r1.text, "first");
        assert_eq!(r2.text, "second");
        assert_eq!(r3.text, "first");
    }

    #[tokio::test]
    async fn test_mock_routes_by_marker() {
        let mock = MockBackend::fixed("default")
            .on("# STORY", MockReply::text("story"))
            .on("# BROKEN", MockReply::failure(500));
        let client = Client::new();

        let routed = mock.complete(&client, "", &request("# STORY EXCAVATOR\n...")).await.unwrap();
        assert_eq!(routed.text, "story");

        let fallback = mock.complete(&client, "", &request("# OTHER")).await.unwrap();
        assert_eq!(fallback.text, "default");

        let err = mock.complete(&client, "", &request("# BROKEN STAGE")).await.unwrap_err();
        assert!(matches!(err, PipelineError::HttpError { status: 500, .. }));
        assert_eq!(mock.call_count(), 3);
        assert_eq!(mock.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_mock_fail_first() {
        let mock = MockBackend::fixed("ok").fail_first(1, 429);
        let client = Client::new();
        assert!(mock.complete(&client, "", &request("x")).await.is_err());
        assert_eq!(mock.complete(&client, "", &request("x")).await.unwrap().text, "ok");
    }
}
