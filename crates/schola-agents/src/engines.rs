//! Seams for the external inference and speech engines.
//!
//! Every engine the session drives is a network service behind a trait so
//! the runtime can be exercised end-to-end with scripted fakes.

use crate::error::AgentError;
use async_trait::async_trait;
use schola_types::ConversationRole;
use serde_json::Value;
use tokio::sync::mpsc;

/// Lazily produced text chunks from a language model.
pub type TextStream = mpsc::UnboundedReceiver<String>;

/// Builds a [`TextStream`] from pre-cut chunks.
pub fn text_stream<I>(chunks: I) -> TextStream
where
    I: IntoIterator,
    I::Item: Into<String>,
{
    let (tx, rx) = mpsc::unbounded_channel();
    for chunk in chunks {
        // Receiver is held by the caller; the channel cannot be closed yet.
        let _ = tx.send(chunk.into());
    }
    rx
}

/// One message of conversation context.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: ConversationRole,
    pub content: String,
}

/// Conversation history preserved across in-session handoffs.
#[derive(Debug, Clone, Default)]
pub struct ChatContext {
    messages: Vec<ChatMessage>,
}

impl ChatContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.messages.push(ChatMessage {
            role: ConversationRole::User,
            content: content.into(),
        });
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.messages.push(ChatMessage {
            role: ConversationRole::Assistant,
            content: content.into(),
        });
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Most recent user message, used on activation and routing spans.
    pub fn last_user_message(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == ConversationRole::User)
            .map(|m| m.content.as_str())
    }
}

/// A tool the active agent exposes to its language model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Value,
}

/// A tool invocation decoded from the model's reply.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallRequest {
    pub name: String,
    pub arguments: Value,
}

/// One model turn: either streamed speech text or a single tool call.
pub enum LlmReply {
    Speech(TextStream),
    ToolCall(ToolCallRequest),
}

/// Inference request assembled by the session.
pub struct LlmRequest<'a> {
    pub instructions: &'a str,
    pub chat: &'a ChatContext,
    pub tools: &'a [ToolSpec],
    pub temperature: f32,
}

/// Language-model inference endpoint.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn respond(&self, request: LlmRequest<'_>) -> Result<LlmReply, AgentError>;
}

/// Text-to-speech endpoint. Returns raw audio for one safe sentence.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<u8>, AgentError>;
}

/// Speech-to-text endpoint.
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    async fn transcribe(&self, audio: &[u8]) -> Result<String, AgentError>;
}

/// Voice-activity model handle, loaded at worker prewarm.
pub trait VoiceActivityDetector: Send + Sync {
    /// Whether the PCM frame contains speech.
    fn is_speech(&self, frame: &[i16]) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn text_stream_yields_chunks_in_order() {
        let mut stream = text_stream(["Hello. ", "World!"]);
        assert_eq!(stream.recv().await.as_deref(), Some("Hello. "));
        assert_eq!(stream.recv().await.as_deref(), Some("World!"));
        assert!(stream.recv().await.is_none());
    }

    #[test]
    fn last_user_message_skips_assistant_turns() {
        let mut chat = ChatContext::new();
        chat.push_user("What is seven times eight?");
        chat.push_assistant("56");
        assert_eq!(chat.last_user_message(), Some("What is seven times eight?"));
    }
}
