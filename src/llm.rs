// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Chat completion client for an OpenAI-compatible API

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::{MagicHandError, Result};

/// Something that turns a system + user message into a reply
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, system: &str, user: &str) -> Result<String>;
}

/// HTTP client for `/v1/chat/completions`. Holds the API key, so it is
/// deliberately not `Debug`.
pub struct ChatClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ModelsResponse {
    data: Vec<ModelInfo>,
}

#[derive(Deserialize)]
struct ModelInfo {
    id: String,
}

impl ChatClient {
    /// Create a new client with a per-request timeout
    pub fn new(base_url: &str, api_key: String, model: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .build()
            .map_err(|e| MagicHandError::Config(format!("Failed to create HTTP client: {}", e)))?;

        // Normalize URL
        let base_url = base_url
            .trim_end_matches('/')
            .trim_end_matches("/chat/completions")
            .trim_end_matches("/v1")
            .to_string();

        Ok(Self {
            client,
            base_url,
            api_key,
            model: model.to_string(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Check the API is reachable and the key is accepted
    pub async fn health_check(&self) -> Result<()> {
        let url = format!("{}/v1/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .timeout(Duration::from_secs(10))
            .send()
            .await?;
        check_status(response.status())
    }

    /// List available models
    pub async fn list_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/v1/models", self.base_url);
        let response = self.client.get(&url).bearer_auth(&self.api_key).send().await?;
        check_status(response.status())?;

        let models: ModelsResponse = response.json().await?;
        Ok(models.data.into_iter().map(|m| m.id).collect())
    }
}

#[async_trait]
impl CompletionBackend for ChatClient {
    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let url = format!("{}/v1/chat/completions", self.base_url);

        let request = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage { role: "system", content: system },
                ChatMessage { role: "user", content: user },
            ],
            temperature: 0.0,
            max_tokens: 10,
        };

        debug!("Sending classification request: model={}", self.model);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        check_status(response.status())?;

        let result: ChatResponse = response.json().await?;
        result
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| MagicHandError::MalformedResponse("response had no choices".to_string()))
    }
}

fn check_status(status: StatusCode) -> Result<()> {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(MagicHandError::RemoteClassification(
            "rate limited by upstream (429)".to_string(),
        ));
    }
    if !status.is_success() {
        return Err(MagicHandError::RemoteClassification(format!(
            "API returned status {}",
            status
        )));
    }
    Ok(())
}
