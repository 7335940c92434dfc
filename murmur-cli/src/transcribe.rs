//! Speech-to-text via an OpenAI-compatible `/v1/audio/transcriptions` endpoint.

use anyhow::{Context, Result};
use async_trait::async_trait;
use murmur_core::{Transcriber, TranscriptionError};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;

use crate::auth;
use crate::config::Config;

pub struct WhisperTranscriber {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    key: String,
    file_name: String,
}

impl WhisperTranscriber {
    pub fn from_config(cfg: &Config, file_name: &str) -> Result<Option<Self>> {
        let Some(key) = auth::load_auth()?.openai_key() else {
            return Ok(None);
        };
        let http = reqwest::Client::builder()
            .timeout(cfg.llm_timeout() * 3)
            .build()
            .context("build http client")?;
        Ok(Some(Self {
            http,
            endpoint: format!(
                "{}/v1/audio/transcriptions",
                cfg.transcription.base_url.trim_end_matches('/')
            ),
            model: cfg.transcription.model.clone(),
            key,
            file_name: file_name.to_string(),
        }))
    }
}

#[derive(Deserialize)]
struct TranscriptionResp {
    text: String,
}

fn service(e: impl std::fmt::Display) -> TranscriptionError {
    TranscriptionError::Service(e.to_string())
}

#[async_trait]
impl Transcriber for WhisperTranscriber {
    async fn transcribe(&self, audio: &[u8]) -> Result<String, TranscriptionError> {
        if audio.is_empty() {
            return Err(TranscriptionError::Empty);
        }
        let part = Part::bytes(audio.to_vec()).file_name(self.file_name.clone());
        let form = Form::new()
            .text("model", self.model.clone())
            .part("file", part);

        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.key)
            .multipart(form)
            .send()
            .await
            .map_err(service)?;

        let status = resp.status();
        if !status.is_success() {
            let txt = resp.text().await.unwrap_or_default();
            return Err(service(format!("{status} {txt}")));
        }
        let out: TranscriptionResp = resp.json().await.map_err(service)?;
        let text = out.text.trim();
        if text.is_empty() {
            return Err(TranscriptionError::Unintelligible);
        }
        Ok(text.to_string())
    }
}
