use std::path::Path;

use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;

use crate::config::SpeechConfig;

#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("no speech-to-text endpoint configured (set SPEECH_API_URL)")]
    NotConfigured,
    #[error("failed to read audio file: {0}")]
    Io(#[from] std::io::Error),
    #[error("speech request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("speech service returned {status}: {message}")]
    Status { status: u16, message: String },
}

#[derive(Clone)]
pub struct SpeechClient {
    client: Client,
    config: SpeechConfig,
}

impl SpeechClient {
    pub fn new(config: SpeechConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    /// Sends the whole recording in one request; no chunking, no language hint.
    pub async fn transcribe(&self, audio_path: &Path) -> Result<String, SpeechError> {
        #[derive(Deserialize)]
        struct TranscriptionResp {
            text: String,
        }

        let url = self
            .config
            .api_url
            .as_deref()
            .ok_or(SpeechError::NotConfigured)?;

        let bytes = tokio::fs::read(audio_path).await?;
        let filename = audio_path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("audio")
            .to_string();

        let form = Form::new()
            .part("file", Part::bytes(bytes).file_name(filename))
            .text("model", self.config.model.clone());

        let mut request = self.client.post(url).multipart(form);
        if let Some(api_key) = &self.config.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(SpeechError::Status {
                status,
                message: message.trim().to_string(),
            });
        }

        let body = response.json::<TranscriptionResp>().await?;
        Ok(body.text.trim().to_string())
    }
}
