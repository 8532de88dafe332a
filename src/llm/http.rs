//! OpenAI-compatible chat completions over HTTP

use super::{CompletionClient, CompletionRequest, LlmError};
use crate::config::LlmConfig;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Client for any endpoint speaking the chat-completions wire format.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

impl HttpClient {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
            model: model.into(),
            api_key: None,
            temperature: 0.7,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, LlmError> {
        self.client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::Unavailable(format!("failed to build http client: {e}")))?;
        Ok(self)
    }

    /// Build from configuration, reading the API key from the configured
    /// environment variable when it is set.
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let mut client = Self::new(&config.base_url, &config.model)
            .with_timeout(Duration::from_secs(config.timeout_secs))?;
        if let Ok(key) = std::env::var(&config.api_key_env) {
            if !key.trim().is_empty() {
                client = client.with_api_key(key.trim());
            }
        }
        Ok(client)
    }

    fn body<'a>(&'a self, request: &'a CompletionRequest) -> ChatRequest<'a> {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        messages.push(ChatMessage {
            role: "system",
            content: &request.system,
        });
        for message in &request.messages {
            messages.push(ChatMessage {
                role: match message.role {
                    super::Role::User => "user",
                    super::Role::Assistant => "assistant",
                },
                content: &message.content,
            });
        }
        ChatRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
        }
    }
}

#[async_trait]
impl CompletionClient for HttpClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        let mut builder = self.client.post(&self.endpoint).json(&self.body(request));
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_connect() {
                LlmError::Unavailable(format!("cannot reach {}: {e}", self.endpoint))
            } else {
                LlmError::RequestFailed(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| LlmError::InvalidResponse("reply has no message content".to_string()))
    }
}
