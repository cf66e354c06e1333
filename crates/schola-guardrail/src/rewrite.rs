//! Rewriter endpoint client.

use crate::error::GuardrailError;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

/// Spoken when the rewriter itself fails.
pub const FALLBACK_REWRITE: &str =
    "I'm here to help you learn. Let me rephrase that in a better way.";

/// Fixed directive given to the rewriter model.
const REWRITE_SYSTEM_PROMPT: &str = "You are a safe content rewriter for an educational platform.
Rewrite the given text for primary/secondary school children aged 8-16.
Use simple, age-appropriate vocabulary.
Do NOT mention the original problematic content or that it was rewritten.
Keep the educational intent and factual accuracy intact.
Be clear, friendly, and encouraging.
Respond with ONLY the rewritten text — no preamble, no explanation.";

/// Timeout for one rewrite round trip.
const REWRITE_TIMEOUT: Duration = Duration::from_secs(20);

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MODEL: &str = "claude-haiku-4-5-20251001";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_REWRITE_TOKENS: u32 = 512;

/// Boundary seam for the rewriter endpoint.
#[async_trait]
pub trait RewriterApi: Send + Sync {
    async fn rewrite(&self, text: &str) -> Result<String, GuardrailError>;
}

/// Rewriter over the Anthropic messages endpoint.
#[derive(Debug, Clone)]
pub struct AnthropicRewriter {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl AnthropicRewriter {
    pub fn new(api_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REWRITE_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    /// Builds a client from `ANTHROPIC_API_KEY`, with optional
    /// `ANTHROPIC_BASE_URL` and `SCHOLA_REWRITE_MODEL` overrides.
    pub fn from_env() -> Result<Self, GuardrailError> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .map_err(|_| GuardrailError::MissingCredential("ANTHROPIC_API_KEY"))?;
        let mut rewriter = Self::new(api_key);
        if let Ok(base_url) = std::env::var("ANTHROPIC_BASE_URL") {
            rewriter.base_url = base_url;
        }
        if let Ok(model) = std::env::var("SCHOLA_REWRITE_MODEL") {
            rewriter.model = model;
        }
        Ok(rewriter)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl RewriterApi for AnthropicRewriter {
    async fn rewrite(&self, text: &str) -> Result<String, GuardrailError> {
        let url = format!("{}/v1/messages", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&json!({
                "model": self.model,
                "max_tokens": MAX_REWRITE_TOKENS,
                "system": REWRITE_SYSTEM_PROMPT,
                "messages": [{ "role": "user", "content": text }],
            }))
            .send()
            .await?
            .error_for_status()?;

        let body: Value = response.json().await?;
        let rewritten = body
            .get("content")
            .and_then(Value::as_array)
            .and_then(|blocks| blocks.first())
            .and_then(|block| block.get("text"))
            .and_then(Value::as_str)
            .ok_or_else(|| GuardrailError::Rewrite("no text block in response".to_string()))?;

        Ok(rewritten.trim().to_string())
    }
}
