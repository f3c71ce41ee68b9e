use anyhow::{Context, Result};
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;

use crate::models::{ChatMessage, GenerationOptions};

/// Body of `POST /api/chat`. Streaming is always off; the browser gets the
/// complete answer in one JSON document.
#[derive(Debug, Clone, Serialize)]
pub struct ChatPayload<'a> {
    pub model: &'a str,
    pub messages: &'a [ChatMessage],
    pub stream: bool,
    pub options: GenerationOptions,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
}

#[derive(Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
}

impl OllamaClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
        }
    }

    /// Returns the server's native response object untouched.
    pub async fn chat(&self, payload: &ChatPayload<'_>) -> Result<Value> {
        let url = format!("{}/api/chat", self.base_url.trim_end_matches('/'));
        tracing::debug!(model = payload.model, messages = payload.messages.len(), "calling ollama chat");

        let response = self
            .client
            .post(url)
            .json(payload)
            .send()
            .await
            .context("failed to call ollama chat endpoint")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!(
                "ollama /api/chat returned {status}: {}",
                normalize_err_body(&body)
            );
        }

        response
            .json::<Value>()
            .await
            .context("failed to decode ollama chat response")
    }
}

fn normalize_err_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "<empty body>".to_string();
    }

    if let Ok(json) = serde_json::from_str::<Value>(trimmed) {
        if let Some(err) = json.get("error").and_then(|v| v.as_str()) {
            return err.to_string();
        }
    }

    trimmed.to_string()
}
