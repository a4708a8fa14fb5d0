//! Backend for OpenRouter and other OpenAI-compatible chat APIs.
//!
//! Endpoint: `{base_url}/chat/completions`, where `base_url` already carries
//! the version segment (`https://openrouter.ai/api/v1`).

use super::{Backend, LlmRequest, LlmResponse, TokenUsage};
use crate::error::Result;
use crate::PipelineError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

/// Backend for any OpenAI-compatible chat completions API.
///
/// # Example
///
/// ```
/// use content_pipeline::backend::OpenRouterBackend;
///
/// let backend = OpenRouterBackend::new()
///     .with_api_key("sk-or-...")
///     .with_app_title("content-pipeline");
/// assert!(backend.has_api_key());
/// ```
#[derive(Clone, Default)]
pub struct OpenRouterBackend {
    /// Sent as `Authorization: Bearer {key}` when set.
    pub(crate) api_key: Option<String>,
    /// Sent as `X-Title` for attribution on the router's dashboard.
    pub(crate) app_title: Option<String>,
}

impl std::fmt::Debug for OpenRouterBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenRouterBackend")
            .field(
                "api_key",
                &self.api_key.as_ref().map(|k| {
                    if k.len() > 6 {
                        format!("{}***", &k[..6])
                    } else {
                        "***".to_string()
                    }
                }),
            )
            .field("app_title", &self.app_title)
            .finish()
    }
}

impl OpenRouterBackend {
    /// Create a backend without authentication.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the API key for authentication.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_app_title(mut self, title: impl Into<String>) -> Self {
        self.app_title = Some(title.into());
        self
    }

    /// Returns `true` if an API key has been configured.
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Build the request body for `/chat/completions`.
    fn build_body(request: &LlmRequest) -> Value {
        let messages: Vec<Value> = request
            .messages
            .iter()
            .filter(|m| !m.content.is_empty())
            .map(|m| json!({"role": m.role.as_str(), "content": m.content}))
            .collect();

        let mut body = json!({
            "model": request.model,
            "messages": messages,
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
            "stream": false,
        });

        if request.json_mode {
            body["response_format"] = json!({"type": "json_object"});
        }

        body
    }

    /// Parse a `Retry-After` header value as seconds.
    fn parse_retry_after(value: &str) -> Option<std::time::Duration> {
        value
            .trim()
            .parse::<u64>()
            .ok()
            .map(std::time::Duration::from_secs)
    }

    /// Build the reqwest request with appropriate headers.
    fn build_http_request(
        &self,
        client: &Client,
        url: &str,
        body: &Value,
    ) -> reqwest::RequestBuilder {
        let mut req = client.post(url).json(body);

        if let Some(ref key) = self.api_key {
            req = req.header("Authorization", format!("Bearer {}", key));
        }
        if let Some(ref title) = self.app_title {
            req = req.header("X-Title", title.as_str());
        }

        req
    }

    fn extract_usage(json_resp: &Value) -> TokenUsage {
        let usage = json_resp.get("usage");
        let field = |name: &str| {
            usage
                .and_then(|u| u.get(name))
                .and_then(|v| v.as_u64())
                .unwrap_or(0)
        };
        TokenUsage {
            input_tokens: field("prompt_tokens"),
            output_tokens: field("completion_tokens"),
        }
    }

    fn extract_text(json_resp: &Value) -> String {
        json_resp
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string()
    }
}

#[async_trait]
impl Backend for OpenRouterBackend {
    async fn complete(
        &self,
        client: &Client,
        base_url: &str,
        request: &LlmRequest,
    ) -> Result<LlmResponse> {
        let base = base_url.trim_end_matches('/');
        let url = format!("{}/chat/completions", base);
        let body = Self::build_body(request);

        let resp = self.build_http_request(client, &url, &body).send().await?;

        let status = resp.status().as_u16();

        if !resp.status().is_success() {
            let retry_after = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(Self::parse_retry_after);
            let text = resp.text().await.unwrap_or_default();
            return Err(PipelineError::HttpError {
                status,
                body: text,
                retry_after,
            });
        }

        let json_resp: Value = resp.json().await?;

        Ok(LlmResponse {
            text: Self::extract_text(&json_resp),
            status,
            usage: Self::extract_usage(&json_resp),
        })
    }

    fn name(&self) -> &'static str {
        "openrouter"
    }
}
