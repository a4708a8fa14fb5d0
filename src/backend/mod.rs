//! Backend trait and normalized request/response types.
//!
//! The [`Backend`] trait abstracts over LLM providers, translating between
//! normalized [`LlmRequest`]/[`LlmResponse`] types and provider-specific
//! HTTP APIs. Built-in implementations: [`OpenRouterBackend`] for any
//! OpenAI-compatible endpoint and [`MockBackend`] for tests.
//!
//! ## Architecture
//!
//! ```text
//! ModelGateway ──► LlmRequest ──► with_backoff() ──► Backend::complete() ──► LlmResponse
//!                                                         │
//!                                              ┌──────────┴──────────┐
//!                                       OpenRouterBackend        MockBackend
//!                                       /chat/completions        canned / routed
//! ```

pub mod backoff;
pub mod mock;
pub mod openrouter;

pub use backoff::BackoffConfig;
pub use mock::{MockBackend, MockReply};
pub use openrouter::OpenRouterBackend;

use crate::error::Result;
use crate::PipelineError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Type alias for the callback invoked before each transport retry.
///
/// Arguments: `(attempt_number, delay_before_retry, reason_for_retry)`.
pub type RetryCallback<'a> = Option<&'a mut (dyn FnMut(u32, Duration, &str) + Send)>;

/// A provider-agnostic LLM request.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    /// Provider model identifier (e.g. `"google/gemini-3-flash-preview"`).
    pub model: String,

    /// Role-tagged conversation, system message first.
    pub messages: Vec<ChatMessage>,

    pub temperature: f64,

    pub max_tokens: u32,

    /// Ask the provider for a JSON object response where supported.
    pub json_mode: bool,
}

impl LlmRequest {
    /// Content of the first system message, or `""`.
    pub fn system_prompt(&self) -> &str {
        self.messages
            .iter()
            .find(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .unwrap_or("")
    }
}

/// A single message in a chat conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// The role of the message author.
    pub role: Role,
    /// The message content.
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// The role of a chat message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions.
    System,
    /// User input.
    User,
    /// Assistant (model) response.
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// Token counts reported by the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// A normalized LLM response.
#[derive(Debug)]
pub struct LlmResponse {
    /// The generated text content.
    pub text: String,

    /// HTTP status code (for diagnostics/logging).
    pub status: u16,

    pub usage: TokenUsage,
}

/// Abstraction over LLM providers.
///
/// Implementors translate between the normalized [`LlmRequest`]/[`LlmResponse`]
/// and the provider's HTTP API.
///
/// # Object Safety
///
/// This trait is object-safe and designed to be used as `Arc<dyn Backend>`.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Execute a non-streaming LLM call.
    async fn complete(
        &self,
        client: &Client,
        base_url: &str,
        request: &LlmRequest,
    ) -> Result<LlmResponse>;

    /// Human-readable name for logging and diagnostics.
    fn name(&self) -> &'static str;
}

/// Check whether a [`PipelineError`] is retryable based on the backoff config.
///
/// Retryable conditions:
/// - [`PipelineError::HttpError`] with a status in `config.retryable_statuses`
/// - [`PipelineError::Request`] (connection, timeout and other transport errors)
pub fn is_retryable(error: &PipelineError, config: &BackoffConfig) -> bool {
    match error {
        PipelineError::HttpError { status, .. } => config.retryable_statuses.contains(status),
        PipelineError::Request(_) => true,
        _ => false,
    }
}

/// Pick the wait before retry number `attempt` (1-indexed) given the error
/// that triggered it.
fn retry_delay(last_error: Option<&PipelineError>, attempt: u32, config: &BackoffConfig) -> Duration {
    match last_error {
        Some(PipelineError::HttpError {
            retry_after: Some(ra),
            ..
        }) if config.respect_retry_after => *ra,
        Some(PipelineError::HttpError { status: 429, .. }) => config
            .rate_limit_delay
            .unwrap_or_else(|| config.delay_for_attempt(attempt - 1)),
        _ => config.delay_for_attempt(attempt - 1),
    }
}

fn is_set(cancel: Option<&AtomicBool>) -> bool {
    cancel.is_some_and(|flag| flag.load(Ordering::Relaxed))
}

/// Execute a backend call with transport-level retry and exponential backoff.
///
/// Wraps `Backend::complete()` with automatic retry on transient failures
/// (429, 5xx, connection errors). Rate-limit responses wait for `Retry-After`
/// when present, otherwise for [`BackoffConfig::rate_limit_delay`].
///
/// Returns the first successful response, or the last error if all retries
/// are exhausted.
pub async fn with_backoff(
    backend: &Arc<dyn Backend>,
    client: &Client,
    base_url: &str,
    request: &LlmRequest,
    config: &BackoffConfig,
    cancel: Option<&AtomicBool>,
    mut on_retry: RetryCallback<'_>,
) -> Result<LlmResponse> {
    let mut last_error: Option<PipelineError> = None;

    for attempt in 0..=config.max_retries {
        if is_set(cancel) {
            return Err(PipelineError::Cancelled);
        }

        if attempt > 0 {
            let delay = retry_delay(last_error.as_ref(), attempt, config);
            let reason = last_error
                .as_ref()
                .map(|e| e.to_string())
                .unwrap_or_default();

            if let Some(ref mut cb) = on_retry {
                cb(attempt, delay, &reason);
            }

            tokio::time::sleep(delay).await;

            if is_set(cancel) {
                return Err(PipelineError::Cancelled);
            }
        }

        match backend.complete(client, base_url, request).await {
            Ok(response) => return Ok(response),
            Err(e) => {
                if attempt < config.max_retries && is_retryable(&e, config) {
                    last_error = Some(e);
                    continue;
                }
                return Err(e);
            }
        }
    }

    Err(last_error.unwrap_or(PipelineError::Other(
        "backoff loop exited unexpectedly".into(),
    )))
}
