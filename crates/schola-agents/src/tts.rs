//! Text-to-speech client.

use crate::engines::SpeechSynthesizer;
use crate::error::AgentError;
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;

/// Maximum text input size for TTS (4 KiB). One guarded sentence never
/// approaches this; the cap bounds a runaway model turn.
const MAX_TTS_INPUT_BYTES: usize = 4 * 1024;

/// Timeout for one synthesis round trip.
const TTS_TIMEOUT: Duration = Duration::from_secs(30);

const DEFAULT_MODEL: &str = "gpt-4o-mini-tts";

/// Speech synthesis over the OpenAI audio endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiSpeech {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiSpeech {
    pub fn new(api_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(TTS_TIMEOUT)
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
        let mut speech = Self::new(api_key);
        if let Ok(base_url) = std::env::var("OPENAI_BASE_URL") {
            speech.base_url = base_url;
        }
        if let Ok(model) = std::env::var("SCHOLA_TTS_MODEL") {
            speech.model = model;
        }
        Ok(speech)
    }
}

#[async_trait]
impl SpeechSynthesizer for OpenAiSpeech {
    async fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<u8>, AgentError> {
        if text.len() > MAX_TTS_INPUT_BYTES {
            return Err(AgentError::Synthesis(format!(
                "text exceeds maximum size: {} bytes (limit: {} bytes)",
                text.len(),
                MAX_TTS_INPUT_BYTES
            )));
        }

        let url = format!("{}/v1/audio/speech", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": self.model,
                "voice": voice,
                "input": text,
                "response_format": "pcm",
            }))
            .send()
            .await?
            .error_for_status()?;

        Ok(response.bytes().await?.to_vec())
    }
}
