//! Moderation endpoint client.

use crate::error::GuardrailError;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

/// The full category vocabulary checked on every sentence.
///
/// Exactly thirteen categories. Adding or removing one is a contract break
/// with the audit schema and the dashboards; the regression test below pins
/// the set.
pub const MODERATION_CATEGORIES: [&str; 13] = [
    "harassment",
    "harassment/threatening",
    "hate",
    "hate/threatening",
    "sexual",
    "sexual/minors",
    "violence",
    "violence/graphic",
    "self-harm",
    "self-harm/intent",
    "self-harm/instructions",
    "illicit",
    "illicit/violent",
];

/// Timeout for one moderation round trip.
const MODERATION_TIMEOUT: Duration = Duration::from_secs(10);

const DEFAULT_BASE_URL: &str = "https://api.openai.com";
const DEFAULT_MODEL: &str = "omni-moderation-latest";

/// Outcome of a moderation check.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModerationVerdict {
    pub flagged: bool,
    /// Categories the endpoint flagged, in vocabulary order.
    pub categories: Vec<String>,
    /// Maximum per-category score across *all* categories, flagged or not,
    /// so dashboards see true moderation pressure.
    pub peak_score: f64,
}

/// Boundary seam for the moderation endpoint.
#[async_trait]
pub trait ModerationApi: Send + Sync {
    async fn check(&self, text: &str) -> Result<ModerationVerdict, GuardrailError>;
}

/// Moderation over the OpenAI moderations endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiModeration {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiModeration {
    pub fn new(api_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(MODERATION_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    /// Builds a client from `OPENAI_API_KEY`, with optional
    /// `OPENAI_BASE_URL` and `SCHOLA_MODERATION_MODEL` overrides.
    pub fn from_env() -> Result<Self, GuardrailError> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| GuardrailError::MissingCredential("OPENAI_API_KEY"))?;
        let mut moderation = Self::new(api_key);
        if let Ok(base_url) = std::env::var("OPENAI_BASE_URL") {
            moderation.base_url = base_url;
        }
        if let Ok(model) = std::env::var("SCHOLA_MODERATION_MODEL") {
            moderation.model = model;
        }
        Ok(moderation)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl ModerationApi for OpenAiModeration {
    async fn check(&self, text: &str) -> Result<ModerationVerdict, GuardrailError> {
        let url = format!("{}/v1/moderations", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&json!({ "model": self.model, "input": text }))
            .send()
            .await?
            .error_for_status()?;

        let body: Value = response.json().await?;
        let result = body
            .get("results")
            .and_then(Value::as_array)
            .and_then(|results| results.first())
            .ok_or_else(|| GuardrailError::Moderation("empty results array".to_string()))?;

        Ok(parse_moderation_result(result))
    }
}

/// Extracts the verdict from one `results[i]` object.
///
/// Categories absent from the response read as unflagged with score 0.0, so
/// a vocabulary drift on the endpoint side degrades to fail-open rather than
/// a parse error.
fn parse_moderation_result(result: &Value) -> ModerationVerdict {
    let flagged = result
        .get("flagged")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let category_flags = result.get("categories");
    let category_scores = result.get("category_scores");

    let mut categories = Vec::new();
    let mut peak_score = 0.0_f64;
    for category in MODERATION_CATEGORIES {
        let is_flagged = category_flags
            .and_then(|flags| flags.get(category))
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if is_flagged {
            categories.push(category.to_string());
        }
        let score = category_scores
            .and_then(|scores| scores.get(category))
            .and_then(Value::as_f64)
            .unwrap_or(0.0);
        if score > peak_score {
            peak_score = score;
        }
    }

    ModerationVerdict {
        flagged,
        categories,
        peak_score,
    }
}
