use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::LLMConfig;

/// Retries after the first attempt; total attempts are `MAX_RETRIES + 1`
pub const MAX_RETRIES: u32 = 2;
pub const BASE_DELAY_MS: u64 = 1000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompletionResponse {
    #[serde(default)]
    pub id: String,
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    pub message: ChatMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl CompletionResponse {
    /// Content of the first choice, if the model returned any
    pub fn content(&self) -> Option<&str> {
        self.choices
            .first()
            .map(|c| c.message.content.as_str())
            .filter(|c| !c.is_empty())
    }
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("API key not configured")]
    MissingApiKey,

    /// Non-success status; `message` comes from the error body when present
    #[error("{message}")]
    Api { status: u16, message: String },

    #[error("HTTP request failed: {0}")]
    Network(String),

    #[error("Response decode error: {0}")]
    Decode(String),
}

/// One network exchange with the completion service
#[async_trait]
pub trait CompletionTransport: Send + Sync {
    async fn send(&self, request: &CompletionRequest, api_key: &str) -> Result<CompletionResponse, ClientError>;

    /// Cheap authenticated call used to check a credential
    async fn check_credential(&self, api_key: &str) -> Result<(), ClientError>;
}

/// reqwest transport for OpenAI-compatible endpoints
pub struct HttpTransport {
    client: Client,
    endpoint: String,
    models_endpoint: String,
}

impl HttpTransport {
    pub fn new(endpoint: impl Into<String>, models_endpoint: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
            models_endpoint: models_endpoint.into(),
        }
    }

    pub fn from_config(config: &LLMConfig) -> Self {
        Self::new(config.endpoint.clone(), config.models_endpoint.clone())
    }
}

/// `error.message` from an OpenAI-style error body, if there is one
fn api_error_message(body: &str) -> Option<String> {
    serde_json::from_str::<Value>(body)
        .ok()?
        .get("error")?
        .get("message")?
        .as_str()
        .map(str::to_string)
}

async fn error_from_response(response: reqwest::Response, fallback: fn(u16) -> String) -> ClientError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = api_error_message(&body).unwrap_or_else(|| fallback(status.as_u16()));
    ClientError::Api {
        status: status.as_u16(),
        message,
    }
}

#[async_trait]
impl CompletionTransport for HttpTransport {
    async fn send(&self, request: &CompletionRequest, api_key: &str) -> Result<CompletionResponse, ClientError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| ClientError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(error_from_response(response, |status| format!("API error: {}", status)).await);
        }

        response
            .json::<CompletionResponse>()
            .await
            .map_err(|e| ClientError::Decode(e.to_string()))
    }

    async fn check_credential(&self, api_key: &str) -> Result<(), ClientError> {
        let response = self
            .client
            .get(&self.models_endpoint)
            .header("Authorization", format!("Bearer {}", api_key))
            .send()
            .await
            .map_err(|e| ClientError::Network(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(error_from_response(response, |_| "Invalid API key".to_string()).await)
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            base_delay: Duration::from_millis(BASE_DELAY_MS),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &LLMConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
        }
    }

    /// Linear backoff: base, 2 * base, ...
    fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay * (attempt + 1)
    }
}

#[derive(Clone)]
pub struct LLMClient {
    transport: Arc<dyn CompletionTransport>,
    policy: RetryPolicy,
}

impl LLMClient {
    pub fn new(transport: Arc<dyn CompletionTransport>, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    pub fn from_config(config: &LLMConfig) -> Self {
        Self::new(
            Arc::new(HttpTransport::from_config(config)),
            RetryPolicy::from_config(config),
        )
    }

    /// Send a completion request, retrying transient failures with linear backoff
    pub async fn complete(&self, request: &CompletionRequest, api_key: &str) -> Result<CompletionResponse, ClientError> {
        if api_key.trim().is_empty() {
            return Err(ClientError::MissingApiKey);
        }

        let mut attempt = 0;
        loop {
            match self.transport.send(request, api_key).await {
                Ok(response) => return Ok(response),
                Err(e) if attempt < self.policy.max_retries => {
                    let delay = self.policy.delay_after(attempt);
                    tracing::warn!(
                        "[LLMClient] Request failed ({}), retrying (attempt {}/{}) after {}ms",
                        e,
                        attempt + 2,
                        self.policy.max_retries + 1,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    tracing::error!(
                        "[LLMClient] Request failed after {} attempts: {}",
                        attempt + 1,
                        e
                    );
                    return Err(e);
                }
            }
        }
    }

    /// Check a credential against the models endpoint (single attempt)
    pub async fn validate_api_key(&self, api_key: &str) -> Result<(), ClientError> {
        if api_key.trim().is_empty() {
            return Err(ClientError::MissingApiKey);
        }
        self.transport.check_credential(api_key).await
    }
}
