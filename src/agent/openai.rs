//! OpenAI-compatible chat completions provider.

use crate::agent::advisor::{coerce_text, Advisor, AdvisorConfig, AdvisorError};
use crate::agent::ollama::ChatMessage;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Value,
}

/// Advisor backed by any `/chat/completions` endpoint.
pub struct OpenAiAdvisor {
    config: AdvisorConfig,
    http_client: reqwest::Client,
    api_key: Option<String>,
    api_key_env: String,
}

impl OpenAiAdvisor {
    pub fn new(
        config: AdvisorConfig,
        api_key: Option<String>,
        api_key_env: String,
    ) -> Result<Self> {
        let http_client = config.http_client()?;
        Ok(Self {
            config,
            http_client,
            api_key,
            api_key_env,
        })
    }

    fn build_request(&self, system_prompt: &str, prompt: &str) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: self.config.model_name.clone(),
            messages: vec![ChatMessage::system(system_prompt), ChatMessage::user(prompt)],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        }
    }
}

#[async_trait]
impl Advisor for OpenAiAdvisor {
    async fn generate(&self, system_prompt: &str, prompt: &str) -> Result<String, AdvisorError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| AdvisorError::MissingApiKey(self.api_key_env.clone()))?;

        let url = format!("{}/chat/completions", self.config.endpoint);
        let request = self.build_request(system_prompt, prompt);

        debug!("Sending chat completion request ({} prompt chars)", prompt.len());

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                AdvisorError::from_transport(e, self.config.timeout_seconds, &self.config.endpoint)
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AdvisorError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| AdvisorError::Decode(e.to_string()))?;

        Ok(completion
            .choices
            .first()
            .map(|c| coerce_text(&c.message.content))
            .unwrap_or_default())
    }
}
