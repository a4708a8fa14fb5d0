//! Runtime configuration: model price table, model roster, and gateway settings.
//!
//! [`PipelineConfig`] can be built from defaults, a TOML document, or the
//! process environment. Every field has a default, so a TOML file only needs
//! the keys it wants to override:
//!
//! ```
//! use content_pipeline::config::PipelineConfig;
//!
//! let cfg = PipelineConfig::from_toml_str(r#"
//!     timeout_secs = 60
//!
//!     [roster]
//!     primary = "gpt-5.1"
//! "#).unwrap();
//! assert_eq!(cfg.roster.primary, "gpt-5.1");
//! assert_eq!(cfg.roster.extraction, "gemini-3-flash");
//! assert_eq!(cfg.max_retries, 3);
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backend::BackoffConfig;
use crate::error::Result;
use crate::PipelineError;

/// Default OpenRouter endpoint.
pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Pricing and provider id for one selectable model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    /// Short key used throughout the crate (e.g. `"gemini-3-flash"`).
    pub key: String,
    /// Provider-side model identifier sent on the wire.
    pub id: String,
    /// Human-readable name.
    #[serde(default)]
    pub display_name: String,
    /// USD per 1,000 input tokens.
    pub price_in_per_1k: f64,
    /// USD per 1,000 output tokens.
    pub price_out_per_1k: f64,
}

impl ModelSpec {
    fn new(key: &str, id: &str, display_name: &str, price_in: f64, price_out: f64) -> Self {
        Self {
            key: key.to_string(),
            id: id.to_string(),
            display_name: display_name.to_string(),
            price_in_per_1k: price_in,
            price_out_per_1k: price_out,
        }
    }

    /// Cost in USD for a call with the given token counts.
    ///
    /// ```
    /// use content_pipeline::config::default_models;
    ///
    /// let flash = default_models().into_iter().find(|m| m.key == "gemini-3-flash").unwrap();
    /// let cost = flash.cost(2000, 1000);
    /// assert!((cost - 0.004).abs() < 1e-12);
    /// ```
    pub fn cost(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        (input_tokens as f64 / 1000.0) * self.price_in_per_1k
            + (output_tokens as f64 / 1000.0) * self.price_out_per_1k
    }
}

/// The built-in price table.
pub fn default_models() -> Vec<ModelSpec> {
    vec![
        ModelSpec::new(
            "claude-opus-4.5",
            "anthropic/claude-opus-4.5",
            "Claude Opus 4.5",
            0.015,
            0.075,
        ),
        ModelSpec::new("gpt-5.1", "openai/gpt-5.1", "GPT-5.1", 0.01, 0.03),
        ModelSpec::new(
            "gemini-3-pro",
            "google/gemini-3-pro-preview",
            "Gemini 3 Pro",
            0.00125,
            0.005,
        ),
        ModelSpec::new(
            "gemini-3-flash",
            "google/gemini-3-flash-preview",
            "Gemini 3 Flash",
            0.0005,
            0.003,
        ),
    ]
}

/// Which model key serves which role in a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRoster {
    /// Runs every analytical stage, the terminal stage and drafts.
    #[serde(default = "default_primary")]
    pub primary: String,
    /// Cheap model for the brief's per-stage compression.
    #[serde(default = "default_extraction")]
    pub extraction: String,
    /// Stronger model for the brief's synthesis call.
    #[serde(default = "default_primary")]
    pub synthesis: String,
}

fn default_primary() -> String {
    "claude-opus-4.5".to_string()
}

fn default_extraction() -> String {
    "gemini-3-flash".to_string()
}

impl Default for ModelRoster {
    fn default() -> Self {
        Self {
            primary: default_primary(),
            extraction: default_extraction(),
            synthesis: default_primary(),
        }
    }
}

impl ModelRoster {
    /// Use one model for every role.
    pub fn single(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            primary: key.clone(),
            extraction: key.clone(),
            synthesis: key,
        }
    }

    fn keys(&self) -> [&str; 3] {
        [&self.primary, &self.extraction, &self.synthesis]
    }
}

/// Top-level configuration for a [`ModelGateway`](crate::gateway::ModelGateway)
/// and the [`PipelineExecutor`](crate::executor::PipelineExecutor) on top of it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Provider API key. Never serialized.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Transport retries after the first attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default)]
    pub roster: ModelRoster,

    /// Market the local-context stage and the brief target.
    #[serde(default = "default_audience_locale")]
    pub audience_locale: String,

    /// Maximum concurrent calls during the brief's map phase.
    #[serde(default = "default_map_concurrency")]
    pub map_concurrency: usize,

    #[serde(default = "default_models")]
    pub models: Vec<ModelSpec>,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_max_retries() -> u32 {
    3
}

fn default_audience_locale() -> String {
    "Poland".to_string()
}

fn default_map_concurrency() -> usize {
    4
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            roster: ModelRoster::default(),
            audience_locale: default_audience_locale(),
            map_concurrency: default_map_concurrency(),
            models: default_models(),
        }
    }
}

impl PipelineConfig {
    /// Parse a TOML document. Missing keys fall back to defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: PipelineConfig = toml::from_str(content)
            .map_err(|e| PipelineError::InvalidConfig(format!("failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    /// Defaults overridden by environment variables.
    ///
    /// Reads `OPENROUTER_API_KEY`, `CONTENT_PIPELINE_BASE_URL`,
    /// `CONTENT_PIPELINE_MODEL`, `CONTENT_PIPELINE_TIMEOUT` and
    /// `CONTENT_PIPELINE_MAX_RETRIES`.
    pub fn from_env() -> Result<Self> {
        Self::default().with_env_lookup(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn with_env_lookup(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(key) = lookup("OPENROUTER_API_KEY").filter(|k| !k.is_empty()) {
            self.api_key = Some(key);
        }
        if let Some(url) = lookup("CONTENT_PIPELINE_BASE_URL") {
            self.base_url = url;
        }
        if let Some(model) = lookup("CONTENT_PIPELINE_MODEL") {
            self.roster.primary = model.clone();
            self.roster.synthesis = model;
        }
        if let Some(raw) = lookup("CONTENT_PIPELINE_TIMEOUT") {
            self.timeout_secs = raw.trim().parse().map_err(|_| {
                PipelineError::InvalidConfig(format!("CONTENT_PIPELINE_TIMEOUT is not a number: {}", raw))
            })?;
        }
        if let Some(raw) = lookup("CONTENT_PIPELINE_MAX_RETRIES") {
            self.max_retries = raw.trim().parse().map_err(|_| {
                PipelineError::InvalidConfig(format!(
                    "CONTENT_PIPELINE_MAX_RETRIES is not a number: {}",
                    raw
                ))
            })?;
        }
        self.validate()?;
        Ok(self)
    }

    /// Check that every roster key is priced and that concurrency is usable.
    pub fn validate(&self) -> Result<()> {
        for key in self.roster.keys() {
            if self.model(key).is_none() {
                return Err(PipelineError::InvalidConfig(format!(
                    "unknown model key '{}'",
                    key
                )));
            }
        }
        if self.map_concurrency == 0 {
            return Err(PipelineError::InvalidConfig(
                "map_concurrency must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Look up a model by key.
    pub fn model(&self, key: &str) -> Option<&ModelSpec> {
        self.models.iter().find(|m| m.key == key)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Provider backoff with this config's retry count.
    pub fn backoff(&self) -> BackoffConfig {
        BackoffConfig {
            max_retries: self.max_retries,
            ..BackoffConfig::provider()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = PipelineConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.timeout(), Duration::from_secs(120));
        assert_eq!(cfg.max_retries, 3);
        assert_eq!(cfg.roster.extraction, "gemini-3-flash");
        assert_eq!(cfg.models.len(), 4);
    }

    #[test]
    fn test_cost_formula() {
        let opus = PipelineConfig::default()
            .model("claude-opus-4.5")
            .cloned()
            .unwrap();
        // 1500 in, 500 out: 1.5 * 0.015 + 0.5 * 0.075
        let cost = opus.cost(1500, 500);
        assert!((cost - 0.06).abs() < 1e-9, "cost was {}", cost);
        assert_eq!(opus.cost(0, 0), 0.0);
    }

    #[test]
    fn test_toml_overrides_and_defaults() {
        let cfg = PipelineConfig::from_toml_str(
            r#"
            max_retries = 1
            map_concurrency = 2

            [roster]
            extraction = "gemini-3-pro"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.max_retries, 1);
        assert_eq!(cfg.map_concurrency, 2);
        assert_eq!(cfg.roster.extraction, "gemini-3-pro");
        assert_eq!(cfg.roster.primary, "claude-opus-4.5");
        assert_eq!(cfg.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn test_toml_unknown_model_rejected() {
        let err = PipelineConfig::from_toml_str(
            r#"
            [roster]
            primary = "no-such-model"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig(_)));
        assert!(err.to_string().contains("no-such-model"));
    }

    #[test]
    fn test_toml_custom_model_table() {
        let cfg = PipelineConfig::from_toml_str(
            r#"
            [roster]
            primary = "local"
            extraction = "local"
            synthesis = "local"

            [[models]]
            key = "local"
            id = "llama3.2:3b"
            price_in_per_1k = 0.0
            price_out_per_1k = 0.0
            "#,
        )
        .unwrap();
        assert_eq!(cfg.models.len(), 1);
        assert_eq!(cfg.model("local").unwrap().id, "llama3.2:3b");
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let cfg = PipelineConfig {
            map_concurrency: 0,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_env_lookup() {
        let vars: HashMap<&str, &str> = [
            ("OPENROUTER_API_KEY", "sk-or-test"),
            ("CONTENT_PIPELINE_MODEL", "gpt-5.1"),
            ("CONTENT_PIPELINE_TIMEOUT", "30"),
        ]
        .into_iter()
        .collect();
        let cfg = PipelineConfig::default()
            .with_env_lookup(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(cfg.api_key.as_deref(), Some("sk-or-test"));
        assert_eq!(cfg.roster.primary, "gpt-5.1");
        assert_eq!(cfg.roster.synthesis, "gpt-5.1");
        assert_eq!(cfg.roster.extraction, "gemini-3-flash");
        assert_eq!(cfg.timeout_secs, 30);
    }

    #[test]
    fn test_env_bad_number() {
        let err = PipelineConfig::default()
            .with_env_lookup(|k| (k == "CONTENT_PIPELINE_MAX_RETRIES").then(|| "many".to_string()))
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig(_)));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.toml");
        std::fs::write(&path, "audience_locale = \"Germany\"\n").unwrap();
        let cfg = PipelineConfig::from_file(&path).unwrap();
        assert_eq!(cfg.audience_locale, "Germany");
    }
}
