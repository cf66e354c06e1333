//! Shared scripted fakes for session and routing tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use schola_agents::{
    text_stream, AgentError, AgentFactory, EscalationSink, GuardedAgent, LanguageModel, LlmReply,
    LlmRequest, RoutingToolName, SessionConfig, SessionDeps, SpeechSynthesizer, ToolCallRequest,
    ENGLISH_SYSTEM_PROMPT, HISTORY_SYSTEM_PROMPT, MATH_SYSTEM_PROMPT, ORCHESTRATOR_SYSTEM_PROMPT,
};
use schola_agents::AgentSession;
use schola_guardrail::{
    GuardrailError, ModerationApi, ModerationVerdict, RewriterApi, SafetyAudit, SafetyEvent,
    SafetyFilter,
};
use schola_media::{DispatchControl, MediaConfig, MediaControl, MediaError};
use schola_types::{ConversationRole, Speaker, Subject};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

/// One scripted model turn.
pub enum Scripted {
    Say(Vec<&'static str>),
    Tool(&'static str, Value),
}

/// Language model that plays back a fixed script.
pub struct ScriptedLlm {
    replies: Mutex<VecDeque<Scripted>>,
}

impl ScriptedLlm {
    pub fn new(replies: Vec<Scripted>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
        })
    }
}

#[async_trait]
impl LanguageModel for ScriptedLlm {
    async fn respond(&self, _request: LlmRequest<'_>) -> Result<LlmReply, AgentError> {
        match self.replies.lock().unwrap().pop_front() {
            Some(Scripted::Say(chunks)) => Ok(LlmReply::Speech(text_stream(chunks))),
            Some(Scripted::Tool(name, arguments)) => Ok(LlmReply::ToolCall(ToolCallRequest {
                name: name.to_string(),
                arguments,
            })),
            None => Ok(LlmReply::Speech(text_stream(Vec::<String>::new()))),
        }
    }
}

/// Synthesizer that records every safe sentence it was asked to speak.
#[derive(Default)]
pub struct RecordingTts {
    pub spoken: Mutex<Vec<String>>,
}

#[async_trait]
impl SpeechSynthesizer for RecordingTts {
    async fn synthesize(&self, text: &str, _voice: &str) -> Result<Vec<u8>, AgentError> {
        self.spoken.lock().unwrap().push(text.to_string());
        Ok(vec![0u8; 4])
    }
}

/// Moderation that flags any text containing the needle.
pub struct NeedleModeration {
    pub needle: &'static str,
}

#[async_trait]
impl ModerationApi for NeedleModeration {
    async fn check(&self, text: &str) -> Result<ModerationVerdict, GuardrailError> {
        if text.contains(self.needle) {
            Ok(ModerationVerdict {
                flagged: true,
                categories: vec!["harassment".to_string()],
                peak_score: 0.92,
            })
        } else {
            Ok(ModerationVerdict {
                flagged: false,
                categories: vec![],
                peak_score: 0.03,
            })
        }
    }
}

/// Rewriter with a fixed kind-words output.
pub struct KindRewriter;

pub const KIND_REWRITE: &str = "Let's use kind words when we talk to each other.";

#[async_trait]
impl RewriterApi for KindRewriter {
    async fn rewrite(&self, _text: &str) -> Result<String, GuardrailError> {
        Ok(KIND_REWRITE.to_string())
    }
}

/// Audit sink that keeps every event.
#[derive(Default)]
pub struct RecordingAudit {
    pub events: Mutex<Vec<SafetyEvent>>,
}

impl SafetyAudit for RecordingAudit {
    fn record(&self, event: SafetyEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Dispatch fake; records calls and optionally fails them.
#[derive(Default)]
pub struct RecordingDispatch {
    pub fail: bool,
    pub calls: Mutex<Vec<(String, String, String)>>,
}

#[async_trait]
impl DispatchControl for RecordingDispatch {
    async fn dispatch_agent(
        &self,
        agent_name: &str,
        room_name: &str,
        metadata: &str,
    ) -> Result<(), MediaError> {
        self.calls.lock().unwrap().push((
            agent_name.to_string(),
            room_name.to_string(),
            metadata.to_string(),
        ));
        if self.fail {
            Err(MediaError::Dispatch("control service unreachable".to_string()))
        } else {
            Ok(())
        }
    }
}

/// Escalation sink that keeps every notification.
#[derive(Default)]
pub struct RecordingEscalation {
    pub events: Mutex<Vec<(String, String, String)>>,
}

impl EscalationSink for RecordingEscalation {
    fn record(
        &self,
        session_id: &str,
        room_name: &str,
        reason: &str,
        _teacher_token: &str,
        _expires_at: DateTime<Utc>,
    ) {
        self.events.lock().unwrap().push((
            session_id.to_string(),
            room_name.to_string(),
            reason.to_string(),
        ));
    }
}

/// Factory handing scripted models to routing-built agents.
#[derive(Default)]
pub struct ScriptedFactory {
    scripts: Mutex<HashMap<Subject, Arc<ScriptedLlm>>>,
}

impl ScriptedFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(self: &Arc<Self>, subject: Subject, llm: Arc<ScriptedLlm>) -> Arc<Self> {
        self.scripts.lock().unwrap().insert(subject, llm);
        self.clone()
    }
}

impl AgentFactory for ScriptedFactory {
    fn build(&self, subject: Subject) -> Result<GuardedAgent, AgentError> {
        let llm: Arc<dyn LanguageModel> = self
            .scripts
            .lock()
            .unwrap()
            .get(&subject)
            .cloned()
            .map(|llm| llm as Arc<dyn LanguageModel>)
            .unwrap_or_else(|| ScriptedLlm::new(vec![]) as Arc<dyn LanguageModel>);
        Ok(build_agent(subject, llm))
    }
}

/// Builds an agent of the given subject around an arbitrary model.
pub fn build_agent(subject: Subject, llm: Arc<dyn LanguageModel>) -> GuardedAgent {
    let (instructions, temperature, tools) = match subject {
        Subject::Orchestrator => (
            ORCHESTRATOR_SYSTEM_PROMPT,
            0.1,
            vec![
                RoutingToolName::RouteToMath,
                RoutingToolName::RouteToHistory,
                RoutingToolName::RouteToEnglish,
                RoutingToolName::EscalateToTeacher,
            ],
        ),
        Subject::Math => (
            MATH_SYSTEM_PROMPT,
            0.3,
            vec![
                RoutingToolName::RouteToHistory,
                RoutingToolName::RouteToEnglish,
                RoutingToolName::RouteBackToOrchestrator,
                RoutingToolName::EscalateToTeacher,
            ],
        ),
        Subject::History => (
            HISTORY_SYSTEM_PROMPT,
            0.7,
            vec![
                RoutingToolName::RouteToMath,
                RoutingToolName::RouteToEnglish,
                RoutingToolName::RouteBackToOrchestrator,
                RoutingToolName::EscalateToTeacher,
            ],
        ),
        Subject::English => (
            ENGLISH_SYSTEM_PROMPT,
            0.7,
            vec![
                RoutingToolName::RouteToMath,
                RoutingToolName::RouteToHistory,
                RoutingToolName::RouteBackToOrchestrator,
                RoutingToolName::EscalateToTeacher,
            ],
        ),
    };
    GuardedAgent::new(subject, instructions, temperature, llm, tools)
}

/// Bundles the fakes behind a [`SessionDeps`].
pub struct Harness {
    pub tts: Arc<RecordingTts>,
    pub audit: Arc<RecordingAudit>,
    pub dispatch: Arc<RecordingDispatch>,
    pub escalation: Arc<RecordingEscalation>,
    pub factory: Arc<ScriptedFactory>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            tts: Arc::new(RecordingTts::default()),
            audit: Arc::new(RecordingAudit::default()),
            dispatch: Arc::new(RecordingDispatch::default()),
            escalation: Arc::new(RecordingEscalation::default()),
            factory: ScriptedFactory::new(),
        }
    }

    pub fn failing_dispatch(mut self) -> Self {
        self.dispatch = Arc::new(RecordingDispatch {
            fail: true,
            calls: Mutex::new(vec![]),
        });
        self
    }

    /// Assembles [`SessionDeps`] with moderation flagging `needle`.
    pub fn deps(&self, needle: &'static str) -> SessionDeps {
        SessionDeps {
            filter: SafetyFilter::new(
                Arc::new(NeedleModeration { needle }),
                Arc::new(KindRewriter),
                self.audit.clone(),
            ),
            tts: self.tts.clone(),
            dispatch: self.dispatch.clone(),
            media: Arc::new(MediaControl::new(MediaConfig::default())),
            escalation: self.escalation.clone(),
            store: None,
            factory: self.factory.clone(),
            vad: None,
        }
    }

    pub fn config(&self) -> SessionConfig {
        SessionConfig::default()
    }
}

/// Transcript rows observed by the collector.
pub type TranscriptRows = Arc<Mutex<Vec<(Speaker, ConversationRole, String)>>>;

/// Registers an item handler that mirrors the pipeline worker: suppresses
/// skip-counted user items, derives the speaker, and advances the turn.
pub fn attach_transcript_collector(session: &AgentSession) -> TranscriptRows {
    let shared = session.shared();
    let rows: TranscriptRows = Arc::new(Mutex::new(Vec::new()));
    let sink = rows.clone();
    session.signals().on_conversation_item(move |event| {
        let mut state = shared.state();
        if event.role == ConversationRole::User && state.consume_skip() {
            return;
        }
        let speaker = event.speaker.unwrap_or(match event.role {
            ConversationRole::User => Speaker::Student,
            ConversationRole::Assistant => state
                .speaking_agent
                .map(Speaker::from)
                .unwrap_or(Speaker::Orchestrator),
        });
        state.advance_turn();
        sink.lock().unwrap().push((speaker, event.role, event.content.clone()));
    });
    rows
}
