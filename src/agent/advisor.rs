//! The advisory capability shared by every role.
//!
//! An [`Advisor`] takes a system prompt and a user prompt and returns text.
//! Concrete providers live in sibling modules.

use crate::agent::ollama::OllamaAdvisor;
use crate::agent::openai::OpenAiAdvisor;
use crate::config::{ModelConfig, Provider};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Errors a provider call can produce.
#[derive(Debug, Error)]
pub enum AdvisorError {
    #[error("request timed out after {0}s")]
    Timeout(u64),

    #[error("cannot connect to {0}")]
    Connect(String),

    #[error("API error {status}: {body}")]
    Http { status: u16, body: String },

    #[error("failed to send request: {0}")]
    Request(String),

    #[error("failed to parse response: {0}")]
    Decode(String),

    #[error("missing API key: set {0}")]
    MissingApiKey(String),
}

impl AdvisorError {
    /// Classify a transport error the same way for every provider.
    pub fn from_transport(e: reqwest::Error, timeout_seconds: u64, endpoint: &str) -> Self {
        if e.is_timeout() {
            AdvisorError::Timeout(timeout_seconds)
        } else if e.is_connect() {
            AdvisorError::Connect(endpoint.to_string())
        } else {
            AdvisorError::Request(e.to_string())
        }
    }
}

/// Black-box text generation: `generate(role_context, input) -> text`.
#[async_trait]
pub trait Advisor: Send + Sync {
    async fn generate(&self, system_prompt: &str, prompt: &str) -> Result<String, AdvisorError>;
}

/// Settings shared by the HTTP providers.
#[derive(Debug, Clone)]
pub struct AdvisorConfig {
    pub endpoint: String,
    pub model_name: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub timeout_seconds: u64,
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434".to_string(),
            model_name: "llama3.2:latest".to_string(),
            temperature: 0.2,
            max_tokens: None,
            timeout_seconds: 300,
        }
    }
}

impl From<&ModelConfig> for AdvisorConfig {
    fn from(model: &ModelConfig) -> Self {
        Self {
            endpoint: model.endpoint().trim_end_matches('/').to_string(),
            model_name: model.name.clone(),
            temperature: model.temperature,
            max_tokens: model.max_tokens,
            timeout_seconds: model.timeout_seconds,
        }
    }
}

impl AdvisorConfig {
    pub(crate) fn http_client(&self) -> Result<reqwest::Client> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.timeout_seconds))
            .build()?;
        Ok(client)
    }
}

/// Build the advisor selected by the model configuration.
pub fn build_advisor(model: &ModelConfig) -> Result<Arc<dyn Advisor>> {
    let config = AdvisorConfig::from(model);
    info!(
        "Using {} model {} at {}",
        model.provider.as_str(),
        config.model_name,
        config.endpoint
    );

    let advisor: Arc<dyn Advisor> = match model.provider {
        Provider::Ollama => Arc::new(OllamaAdvisor::new(config)?),
        Provider::OpenAi => {
            let api_key = model.api_key();
            if api_key.is_none() {
                // Calls will fail individually and be absorbed by the panel
                warn!("{} is not set; every advisory call will fail", model.api_key_env);
            }
            Arc::new(OpenAiAdvisor::new(config, api_key, model.api_key_env.clone())?)
        }
    };

    Ok(advisor)
}

/// Coerce a provider content value to text.
///
/// Strings pass through, `null` becomes empty, arrays of content parts are
/// joined by their `text` fields, anything else is rendered as JSON.
pub fn coerce_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Array(parts) => parts
            .iter()
            .map(|part| match part {
                Value::String(s) => s.clone(),
                other => other
                    .get("text")
                    .map(coerce_text)
                    .unwrap_or_else(|| other.to_string()),
            })
            .collect::<Vec<_>>()
            .join(""),
        other => other.to_string(),
    }
}
