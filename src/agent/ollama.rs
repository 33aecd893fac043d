//! Ollama chat provider.
//!
//! Sends one non-streaming `/api/chat` request per call with a system and a
//! user message.

use crate::agent::advisor::{coerce_text, Advisor, AdvisorConfig, AdvisorError};
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Message in the chat history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: &str) -> Self {
        Self {
            role: "system".to_string(),
            content: content.to_string(),
        }
    }

    pub fn user(content: &str) -> Self {
        Self {
            role: "user".to_string(),
            content: content.to_string(),
        }
    }
}

/// Ollama chat API request.
#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

/// Ollama chat API response.
#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    #[serde(default)]
    message: Option<ResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Value,
}

/// Advisor backed by a local or remote Ollama server.
pub struct OllamaAdvisor {
    config: AdvisorConfig,
    http_client: reqwest::Client,
}

impl OllamaAdvisor {
    pub fn new(config: AdvisorConfig) -> Result<Self> {
        let http_client = config.http_client()?;
        Ok(Self {
            config,
            http_client,
        })
    }

    fn build_request(&self, system_prompt: &str, prompt: &str) -> OllamaChatRequest {
        OllamaChatRequest {
            model: self.config.model_name.clone(),
            messages: vec![ChatMessage::system(system_prompt), ChatMessage::user(prompt)],
            stream: false,
            options: OllamaOptions {
                temperature: self.config.temperature,
                num_predict: self.config.max_tokens,
            },
        }
    }
}

#[async_trait]
impl Advisor for OllamaAdvisor {
    async fn generate(&self, system_prompt: &str, prompt: &str) -> Result<String, AdvisorError> {
        let url = format!("{}/api/chat", self.config.endpoint);
        let request = self.build_request(system_prompt, prompt);

        debug!("Sending Ollama chat request ({} prompt chars)", prompt.len());

        let response = self
            .http_client
            .post(&url)
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

        let chat_response: OllamaChatResponse = response
            .json()
            .await
            .map_err(|e| AdvisorError::Decode(e.to_string()))?;

        Ok(chat_response
            .message
            .map(|m| coerce_text(&m.content))
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_shape() {
        let advisor = OllamaAdvisor::new(AdvisorConfig {
            max_tokens: Some(512),
            ..AdvisorConfig::default()
        })
        .unwrap();

        let request = advisor.build_request("You are a cardiologist.", "Report: chest pain");
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["model"], "llama3.2:latest");
        assert_eq!(json["stream"], false);
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "Report: chest pain");
        assert_eq!(json["options"]["num_predict"], 512);
    }

    #[test]
    fn test_response_without_message_parses() {
        let parsed: OllamaChatResponse = serde_json::from_str(r#"{"done": true}"#).unwrap();
        assert!(parsed.message.is_none());

        let parsed: OllamaChatResponse =
            serde_json::from_str(r#"{"message": {"role": "assistant", "content": "ok"}}"#).unwrap();
        assert_eq!(coerce_text(&parsed.message.unwrap().content), "ok");
    }

    #[tokio::test]
    async fn test_unreachable_server_is_an_error() {
        let advisor = OllamaAdvisor::new(AdvisorConfig {
            endpoint: "http://127.0.0.1:9".to_string(),
            timeout_seconds: 2,
            ..AdvisorConfig::default()
        })
        .unwrap();

        assert!(advisor.generate("sys", "prompt").await.is_err());
    }
}
