//! Text generation against a hosted chat-completions endpoint

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{Config, EndpointConfig};
use crate::error::{Error, Result};
use crate::record::{ChatMessage, Role};

/// A capability that turns an ordered message sequence into generated text.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, messages: &[ChatMessage]) -> Result<String>;
}

/// Chat-completion client for an OpenAI-compatible endpoint.
///
/// Works with any provider exposing `/chat/completions`: OpenAI, OpenRouter,
/// Hugging Face inference routers, vLLM, and the like.
pub struct ChatCompletionClient {
    endpoint: EndpointConfig,
    client: reqwest::Client,
    max_tokens: u32,
}

impl ChatCompletionClient {
    /// Create a new generation client from the configured endpoint
    pub fn new(config: &Config, endpoint: EndpointConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            endpoint,
            client,
            max_tokens: config.generation_max_tokens,
        })
    }

    /// Convert assembled messages to the wire format
    fn to_api_messages(messages: &[ChatMessage]) -> Vec<ApiMessage> {
        messages
            .iter()
            .map(|m| ApiMessage {
                role: match m.role {
                    Role::System => "system".into(),
                    Role::User => "user".into(),
                    Role::Assistant => "assistant".into(),
                },
                content: m.content.clone(),
            })
            .collect()
    }
}

#[async_trait]
impl Generator for ChatCompletionClient {
    async fn generate(&self, messages: &[ChatMessage]) -> Result<String> {
        let url = format!("{}/chat/completions", self.endpoint.base_url);

        let body = serde_json::json!({
            "model": self.endpoint.model,
            "messages": Self::to_api_messages(messages),
            "max_tokens": self.max_tokens,
        });

        debug!(
            model = %self.endpoint.model,
            messages = messages.len(),
            "Sending completion request"
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.endpoint.api_key))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), body = %error_body, "Generation endpoint returned error");
            return Err(Error::generation(format!(
                "Generation endpoint returned {}: {}",
                status, error_body
            )));
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| Error::generation(format!("Failed to parse completion response: {}", e)))?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::generation("No choices in response"))?;

        Ok(choice.message.content.trim().to_string())
    }
}

// --- Chat completion API types ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}
