use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::debug;

pub mod retry;
pub mod types;

pub use retry::{RetryEvent, RetryObserver, RetryPolicy, RetryingInvoker};
use types::*;

use crate::errors::{preview, ProviderError};

/// Trait abstraction over the "submit prompt, receive text" call, enabling test mocking.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<Generation, ProviderError>;
}

/// Client for an OpenAI-compatible `/chat/completions` endpoint.
///
/// A single call per `generate`; retries belong to [`RetryingInvoker`].
pub struct ApiClient {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    temperature: f32,
    max_tokens: usize,
    system_prompt: String,
}

const DEFAULT_SYSTEM_PROMPT: &str =
    "You are an assistant that writes study material. Answer with JSON only, no commentary.";

impl ApiClient {
    pub fn new(config: &crate::config::Config) -> anyhow::Result<Self> {
        use anyhow::Context;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        })
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    fn request_body(&self, prompt: &str) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: vec![
                Message::system(self.system_prompt.clone()),
                Message::user(prompt),
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stream: false,
        }
    }
}

#[async_trait]
impl TextGenerator for ApiClient {
    async fn generate(&self, prompt: &str) -> Result<Generation, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!("Sending generation request to {} ({} prompt chars)", url, prompt.len());

        let mut request = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&self.request_body(prompt));
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(classify_transport_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(status, response).await);
        }

        let body_text = response
            .text()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;
        debug!("Provider response body ({} chars)", body_text.len());

        let chat: ChatResponse = serde_json::from_str(&body_text)
            .map_err(|e| ProviderError::Parse(format!("{} (body: {:?})", e, preview(&body_text))))?;

        if let Some(usage) = chat.usage {
            debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                total_tokens = usage.total_tokens,
                "Provider token usage"
            );
        }

        match chat.first_text() {
            Some(text) if !text.trim().is_empty() => {
                Ok(Generation::new(text).with_usage(chat.usage))
            }
            _ => Err(ProviderError::EmptyCompletion),
        }
    }
}

fn classify_transport_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout
    } else if e.is_connect() || e.is_request() {
        ProviderError::Network(e.to_string())
    } else {
        ProviderError::HttpStatus {
            status: e.status().map(|s| s.as_u16()).unwrap_or(0),
            message: e.to_string(),
        }
    }
}

async fn classify_status(status: StatusCode, response: reqwest::Response) -> ProviderError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after_secs = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        return ProviderError::RateLimit { retry_after_secs };
    }

    let message = response.text().await.unwrap_or_default();
    ProviderError::HttpStatus {
        status: status.as_u16(),
        message: preview(&message),
    }
}
