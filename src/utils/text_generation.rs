// src/utils/text_generation.rs
use async_trait::async_trait;
use log::{debug, error, warn};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use crate::models::ServiceError;

const REQUEST_TIMEOUT_SECS: u64 = 60;

// "Given text, return generated text"
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, ServiceError>;
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// Client for an OpenAI-compatible chat completions endpoint.
pub struct HttpTextGenerator {
    http_client: reqwest::Client,
    url: String,
    api_key: Option<String>,
    model: String,
}

impl HttpTextGenerator {
    pub fn new(url: String, api_key: Option<String>, model: String) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|e| {
                error!("Failed to build text generation client, using default: {}", e);
                reqwest::Client::default()
            });

        Self {
            http_client,
            url,
            api_key,
            model,
        }
    }
}

#[async_trait]
impl TextGenerator for HttpTextGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, ServiceError> {
        let body = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
        });

        debug!("Sending {} character prompt to {}", prompt.len(), self.url);

        let mut request = self.http_client.post(&self.url).json(&body);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await.map_err(|e| {
            error!("Text generation request failed: {}", e);
            ServiceError::UpstreamFailure(e.to_string())
        })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            error!("Text generation returned {}: {}", status, detail);
            return Err(ServiceError::UpstreamFailure(format!(
                "text generation returned {}",
                status
            )));
        }

        let completion: ChatCompletionResponse = response.json().await.map_err(|e| {
            error!("Failed to parse text generation response: {}", e);
            ServiceError::UpstreamFailure(e.to_string())
        })?;

        completion
            .choices
            .first()
            .and_then(|choice| choice.message.content.as_deref())
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or_else(|| {
                warn!("Text generation returned no content");
                ServiceError::UpstreamFailure("empty completion".to_string())
            })
    }
}

/// Used when no generation endpoint is configured.
pub struct TemplateTextGenerator;

#[async_trait]
impl TextGenerator for TemplateTextGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, ServiceError> {
        debug!("No text generation endpoint configured, answering from template");

        let context_lines = prompt
            .lines()
            .filter(|line| line.trim_start().starts_with("- "))
            .count();

        Ok(format!(
            "Automatic text generation is not configured for this deployment. \
             The request referenced {} item(s) of context.",
            context_lines
        ))
    }
}
