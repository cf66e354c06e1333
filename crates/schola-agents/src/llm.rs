//! Language-model inference clients.
//!
//! Two providers cover the agent roster: the orchestrator and the math
//! specialist run on Anthropic models, the history specialist and the
//! degraded English path on OpenAI models. Each agent owns its client,
//! constructed by the agent factory.

use crate::engines::text_stream;
use crate::engines::{LanguageModel, LlmReply, LlmRequest, ToolCallRequest};
use crate::error::AgentError;
use async_trait::async_trait;
use schola_types::ConversationRole;
use serde_json::{json, Value};
use std::time::Duration;

/// Timeout for one inference round trip.
const LLM_TIMEOUT: Duration = Duration::from_secs(60);

const MAX_REPLY_TOKENS: u32 = 1024;
const ANTHROPIC_VERSION: &str = "2023-06-01";

fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(LLM_TIMEOUT)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// Chat client for the Anthropic messages endpoint, with tool use.
#[derive(Debug, Clone)]
pub struct AnthropicChat {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl AnthropicChat {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: http_client(),
            base_url: "https://api.anthropic.com".to_string(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    pub fn from_env(model: impl Into<String>) -> Result<Self, AgentError> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .map_err(|_| AgentError::MissingCredential("ANTHROPIC_API_KEY"))?;
        let mut chat = Self::new(api_key, model);
        if let Ok(base_url) = std::env::var("ANTHROPIC_BASE_URL") {
            chat.base_url = base_url;
        }
        Ok(chat)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl LanguageModel for AnthropicChat {
    async fn respond(&self, request: LlmRequest<'_>) -> Result<LlmReply, AgentError> {
        let messages: Vec<Value> = request
            .chat
            .messages()
            .iter()
            .map(|m| json!({ "role": m.role.as_str(), "content": m.content }))
            .collect();
        let tools: Vec<Value> = request
            .tools
            .iter()
            .map(|t| {
                json!({
                    "name": t.name,
                    "description": t.description,
                    "input_schema": t.parameters,
                })
            })
            .collect();

        let url = format!("{}/v1/messages", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&json!({
                "model": self.model,
                "max_tokens": MAX_REPLY_TOKENS,
                "temperature": request.temperature,
                "system": request.instructions,
                "messages": messages,
                "tools": tools,
            }))
            .send()
            .await?
            .error_for_status()?;

        let body: Value = response.json().await?;
        let blocks = body
            .get("content")
            .and_then(Value::as_array)
            .ok_or_else(|| AgentError::Llm("no content blocks in response".to_string()))?;

        for block in blocks {
            if block.get("type").and_then(Value::as_str) == Some("tool_use") {
                let name = block
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let arguments = block.get("input").cloned().unwrap_or(Value::Null);
                return Ok(LlmReply::ToolCall(ToolCallRequest { name, arguments }));
            }
        }

        let text: String = blocks
            .iter()
            .filter_map(|block| block.get("text").and_then(Value::as_str))
            .collect();
        Ok(LlmReply::Speech(text_stream([text])))
    }
}

/// Chat client for the OpenAI chat-completions endpoint, with tool use.
#[derive(Debug, Clone)]
pub struct OpenAiChat {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiChat {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: http_client(),
            base_url: "https://api.openai.com".to_string(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    pub fn from_env(model: impl Into<String>) -> Result<Self, AgentError> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| AgentError::MissingCredential("OPENAI_API_KEY"))?;
        let mut chat = Self::new(api_key, model);
        if let Ok(base_url) = std::env::var("OPENAI_BASE_URL") {
            chat.base_url = base_url;
        }
        Ok(chat)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl LanguageModel for OpenAiChat {
    async fn respond(&self, request: LlmRequest<'_>) -> Result<LlmReply, AgentError> {
        let mut messages = vec![json!({ "role": "system", "content": request.instructions })];
        for message in request.chat.messages() {
            let role = match message.role {
                ConversationRole::User => "user",
                ConversationRole::Assistant => "assistant",
            };
            messages.push(json!({ "role": role, "content": message.content }));
        }
        let tools: Vec<Value> = request
            .tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    },
                })
            })
            .collect();

        let url = format!(
            "{}/v1/chat/completions",
            self.base_url.trim_end_matches('/')
        );
        let mut payload = json!({
            "model": self.model,
            "temperature": request.temperature,
            "messages": messages,
        });
        if !tools.is_empty() {
            payload["tools"] = Value::Array(tools);
        }

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;

        let body: Value = response.json().await?;
        let message = body
            .get("choices")
            .and_then(Value::as_array)
            .and_then(|choices| choices.first())
            .and_then(|choice| choice.get("message"))
            .ok_or_else(|| AgentError::Llm("no choices in response".to_string()))?;

        if let Some(call) = message
            .get("tool_calls")
            .and_then(Value::as_array)
            .and_then(|calls| calls.first())
        {
            let function = call.get("function").cloned().unwrap_or(Value::Null);
            let name = function
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            // Arguments arrive as a JSON-encoded string.
            let arguments = function
                .get("arguments")
                .and_then(Value::as_str)
                .and_then(|raw| serde_json::from_str(raw).ok())
                .unwrap_or(Value::Null);
            return Ok(LlmReply::ToolCall(ToolCallRequest { name, arguments }));
        }

        let text = message
            .get("content")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        Ok(LlmReply::Speech(text_stream([text])))
    }
}
