//! Speech-to-text client.

use crate::engines::SpeechRecognizer;
use crate::error::AgentError;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

/// Maximum audio input size for STT (10 MiB). Prevents OOM from oversized
/// payloads.
const MAX_STT_INPUT_BYTES: usize = 10 * 1024 * 1024;

/// Timeout for one transcription round trip.
const STT_TIMEOUT: Duration = Duration::from_secs(120);

const DEFAULT_MODEL: &str = "gpt-4o-transcribe";

/// Transcription over the OpenAI audio endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiTranscription {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiTranscription {
    pub fn new(api_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(STT_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            base_url: "https://api.openai.com".to_string(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    pub fn from_env() -> Result<Self, AgentError> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| AgentError::MissingCredential("OPENAI_API_KEY"))?;
        let mut transcription = Self::new(api_key);
        if let Ok(base_url) = std::env::var("OPENAI_BASE_URL") {
            transcription.base_url = base_url;
        }
        if let Ok(model) = std::env::var("SCHOLA_STT_MODEL") {
            transcription.model = model;
        }
        Ok(transcription)
    }
}

#[async_trait]
impl SpeechRecognizer for OpenAiTranscription {
    async fn transcribe(&self, audio: &[u8]) -> Result<String, AgentError> {
        if audio.len() > MAX_STT_INPUT_BYTES {
            return Err(AgentError::Stt(format!(
                "audio data exceeds maximum size: {} bytes (limit: {} bytes)",
                audio.len(),
                MAX_STT_INPUT_BYTES
            )));
        }

        let part = reqwest::multipart::Part::bytes(audio.to_vec())
            .file_name("utterance.wav")
            .mime_str("audio/wav")
            .map_err(|e| AgentError::Stt(e.to_string()))?;
        let form = reqwest::multipart::Form::new()
            .text("model", self.model.clone())
            .part("file", part);

        let url = format!(
            "{}/v1/audio/transcriptions",
            self.base_url.trim_end_matches('/')
        );
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?
            .error_for_status()?;

        let body: Value = response.json().await?;
        Ok(body
            .get("text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim()
            .to_string())
    }
}
