//! Agent orchestration runtime for the Schola voice tutoring platform.
//!
//! Hosts the text-path agents (orchestrator, math, history, and the
//! degraded English path) inside an [`AgentSession`], with:
//!
//! - sentence-boundary guarded synthesis (no unsafe text reaches TTS),
//! - tuple-style in-session handoffs with preserved chat context and
//!   correct speaker attribution,
//! - out-of-session dispatch of the audio-native English worker with a
//!   timed drain and a close watchdog,
//! - teacher escalation with a monotonic latch.

mod agent;
mod engines;
mod error;
mod guarded;
mod llm;
mod prompts;
mod routing;
mod session;
mod stt;
mod tts;

pub use agent::{AgentFactory, EnvAgentFactory, GuardedAgent};
pub use engines::{
    text_stream, ChatContext, ChatMessage, LanguageModel, LlmReply, LlmRequest, SpeechRecognizer,
    SpeechSynthesizer, TextStream, ToolCallRequest, ToolSpec, VoiceActivityDetector,
};
pub use error::AgentError;
pub use guarded::{SentenceBuffer, SENTENCE_ENDINGS};
pub use llm::{AnthropicChat, OpenAiChat};
pub use prompts::{
    ENGLISH_SYSTEM_PROMPT, HISTORY_SYSTEM_PROMPT, MATH_SYSTEM_PROMPT, ORCHESTRATOR_SYSTEM_PROMPT,
};
pub use routing::{
    EscalationSink, NoopEscalation, RoutingContext, RoutingOutcome, RoutingTool, RoutingToolName,
    CLOSE_WATCHDOG, PIPELINE_DRAIN,
};
pub use session::{
    AgentSession, ConversationItemEvent, SessionConfig, SessionDeps, SessionShared, SessionStats,
    Signals,
};
pub use stt::OpenAiTranscription;
pub use tts::OpenAiSpeech;
