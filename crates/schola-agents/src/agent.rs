//! The guarded agent: uniform abstraction for every text-path agent.
//!
//! Every pipeline agent (orchestrator, math, history, and the degraded
//! English path) is a [`GuardedAgent`]: fixed subject, system instructions,
//! an inference model, a voice selector, and a routing toolset. All of its
//! synthesized text flows through the sentence-boundary safety pipeline in
//! [`crate::guarded`]; no unsafe text reaches text-to-speech.

use crate::engines::{LanguageModel, SpeechSynthesizer, ToolSpec};
use crate::error::AgentError;
use crate::llm::{AnthropicChat, OpenAiChat};
use crate::prompts;
use crate::routing::RoutingToolName;
use schola_types::Subject;
use std::sync::{Arc, Mutex};

/// Pipeline TTS voice shared by the text-path agents.
const PIPELINE_VOICE: &str = "ash";

const ORCHESTRATOR_MODEL: &str = "claude-haiku-4-5-20251001";
const MATH_MODEL: &str = "claude-sonnet-4-6";
const DEFAULT_HISTORY_MODEL: &str = "gpt-5.2";
const ENGLISH_FALLBACK_MODEL: &str = "gpt-4o";

/// One text-path agent.
pub struct GuardedAgent {
    subject: Subject,
    instructions: &'static str,
    temperature: f32,
    voice: String,
    llm: Arc<dyn LanguageModel>,
    tools: Vec<RoutingToolName>,
    /// Optional synthesis engine override; the session's engine otherwise.
    tts_override: Option<Arc<dyn SpeechSynthesizer>>,
    /// Question handed over by a routing decision; consumed on activation.
    pending_question: Mutex<Option<String>>,
}

impl GuardedAgent {
    pub fn new(
        subject: Subject,
        instructions: &'static str,
        temperature: f32,
        llm: Arc<dyn LanguageModel>,
        tools: Vec<RoutingToolName>,
    ) -> Self {
        Self {
            subject,
            instructions,
            temperature,
            voice: PIPELINE_VOICE.to_string(),
            llm,
            tools,
            tts_override: None,
            pending_question: Mutex::new(None),
        }
    }

    pub fn subject(&self) -> Subject {
        self.subject
    }

    pub fn agent_name(&self) -> &'static str {
        self.subject.as_str()
    }

    pub fn instructions(&self) -> &'static str {
        self.instructions
    }

    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    pub fn voice(&self) -> &str {
        &self.voice
    }

    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = voice.into();
        self
    }

    pub fn with_tts_override(mut self, tts: Arc<dyn SpeechSynthesizer>) -> Self {
        self.tts_override = Some(tts);
        self
    }

    pub fn tts_override(&self) -> Option<&Arc<dyn SpeechSynthesizer>> {
        self.tts_override.as_ref()
    }

    pub fn llm(&self) -> &Arc<dyn LanguageModel> {
        &self.llm
    }

    /// Tools this agent's model may call.
    pub fn tool_specs(&self) -> Vec<ToolSpec> {
        self.tools.iter().map(|tool| tool.spec()).collect()
    }

    /// Attaches the question a routing decision handed to this agent.
    pub fn set_pending_question(&self, question: impl Into<String>) {
        *self.pending_question.lock().expect("pending question lock") = Some(question.into());
    }

    /// Consumes the pending question; present at most once per activation.
    pub fn take_pending_question(&self) -> Option<String> {
        self.pending_question
            .lock()
            .expect("pending question lock")
            .take()
    }
}

impl std::fmt::Debug for GuardedAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardedAgent")
            .field("subject", &self.subject)
            .field("temperature", &self.temperature)
            .field("voice", &self.voice)
            .finish()
    }
}

/// Builds agents for routing decisions.
///
/// Routing constructs a fresh agent of the target type on every accepted
/// handoff; the factory seam lets tests hand scripted models to those
/// freshly built agents.
pub trait AgentFactory: Send + Sync {
    fn build(&self, subject: Subject) -> Result<GuardedAgent, AgentError>;
}

/// Factory wiring each agent to its production model from the environment.
///
/// | Agent | Model | Temperature |
/// |-------|-------|-------------|
/// | orchestrator | `claude-haiku-4-5-20251001` | 0.1 (consistent routing) |
/// | math | `claude-sonnet-4-6` | 0.3 (precise steps) |
/// | history | `OPENAI_HISTORY_MODEL` or `gpt-5.2` | default |
/// | english (degraded pipeline path) | `gpt-4o` | default |
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvAgentFactory;

impl AgentFactory for EnvAgentFactory {
    fn build(&self, subject: Subject) -> Result<GuardedAgent, AgentError> {
        match subject {
            Subject::Orchestrator => Ok(GuardedAgent::new(
                subject,
                prompts::ORCHESTRATOR_SYSTEM_PROMPT,
                0.1,
                Arc::new(AnthropicChat::from_env(ORCHESTRATOR_MODEL)?),
                vec![
                    RoutingToolName::RouteToMath,
                    RoutingToolName::RouteToHistory,
                    RoutingToolName::RouteToEnglish,
                    RoutingToolName::EscalateToTeacher,
                ],
            )),
            Subject::Math => Ok(GuardedAgent::new(
                subject,
                prompts::MATH_SYSTEM_PROMPT,
                0.3,
                Arc::new(AnthropicChat::from_env(MATH_MODEL)?),
                vec![
                    RoutingToolName::RouteToHistory,
                    RoutingToolName::RouteToEnglish,
                    RoutingToolName::RouteBackToOrchestrator,
                    RoutingToolName::EscalateToTeacher,
                ],
            )),
            Subject::History => {
                let model = std::env::var("OPENAI_HISTORY_MODEL")
                    .unwrap_or_else(|_| DEFAULT_HISTORY_MODEL.to_string());
                Ok(GuardedAgent::new(
                    subject,
                    prompts::HISTORY_SYSTEM_PROMPT,
                    0.7,
                    Arc::new(OpenAiChat::from_env(model)?),
                    vec![
                        RoutingToolName::RouteToMath,
                        RoutingToolName::RouteToEnglish,
                        RoutingToolName::RouteBackToOrchestrator,
                        RoutingToolName::EscalateToTeacher,
                    ],
                ))
            }
            // Degraded in-session English path used when the realtime
            // dispatch fails. Inherits the guarded sentence pipeline.
            Subject::English => Ok(GuardedAgent::new(
                subject,
                prompts::ENGLISH_SYSTEM_PROMPT,
                0.7,
                Arc::new(OpenAiChat::from_env(ENGLISH_FALLBACK_MODEL)?),
                vec![
                    RoutingToolName::RouteToMath,
                    RoutingToolName::RouteToHistory,
                    RoutingToolName::RouteBackToOrchestrator,
                    RoutingToolName::EscalateToTeacher,
                ],
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::{LlmReply, LlmRequest};
    use async_trait::async_trait;

    struct SilentModel;

    #[async_trait]
    impl LanguageModel for SilentModel {
        async fn respond(&self, _request: LlmRequest<'_>) -> Result<LlmReply, AgentError> {
            Ok(LlmReply::Speech(crate::engines::text_stream::<[&str; 0]>([])))
        }
    }

    #[test]
    fn pending_question_is_consumed_once() {
        let agent = GuardedAgent::new(
            Subject::Math,
            prompts::MATH_SYSTEM_PROMPT,
            0.3,
            Arc::new(SilentModel),
            vec![],
        );
        agent.set_pending_question("seven times eight");
        assert_eq!(agent.take_pending_question().as_deref(), Some("seven times eight"));
        assert!(agent.take_pending_question().is_none());
    }

    #[test]
    fn orchestrator_toolset_excludes_route_back() {
        let agent = GuardedAgent::new(
            Subject::Orchestrator,
            prompts::ORCHESTRATOR_SYSTEM_PROMPT,
            0.1,
            Arc::new(SilentModel),
            vec![
                RoutingToolName::RouteToMath,
                RoutingToolName::RouteToHistory,
                RoutingToolName::RouteToEnglish,
                RoutingToolName::EscalateToTeacher,
            ],
        );
        let names: Vec<&str> = agent.tool_specs().iter().map(|t| t.name).collect();
        assert!(names.contains(&"route_to_math"));
        assert!(!names.contains(&"route_back_to_orchestrator"));
    }
}
