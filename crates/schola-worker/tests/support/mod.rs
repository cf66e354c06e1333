//! Scripted fakes for worker entrypoint tests.

use async_trait::async_trait;
use schola_agents::{
    text_stream, AgentError, AgentFactory, GuardedAgent, LanguageModel, LlmReply, LlmRequest,
    RoutingToolName, SessionDeps, SessionShared, SpeechSynthesizer, ToolCallRequest,
    ENGLISH_SYSTEM_PROMPT, HISTORY_SYSTEM_PROMPT, MATH_SYSTEM_PROMPT, ORCHESTRATOR_SYSTEM_PROMPT,
};
use schola_guardrail::{
    GuardrailError, ModerationApi, ModerationVerdict, RewriterApi, SafetyAudit, SafetyEvent,
    SafetyFilter,
};
use schola_media::{ChannelOutlet, DispatchControl, MediaConfig, MediaControl, MediaError};
use schola_types::Subject;
use schola_worker::realtime::RealtimeModel;
use schola_worker::{JobContext, WorkerError};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::mpsc;

pub enum Scripted {
    Say(Vec<&'static str>),
    Tool(&'static str, Value),
}

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

pub struct SilentTts;

#[async_trait]
impl SpeechSynthesizer for SilentTts {
    async fn synthesize(&self, _text: &str, _voice: &str) -> Result<Vec<u8>, AgentError> {
        Ok(vec![0u8; 4])
    }
}

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
                peak_score: 0.9,
            })
        } else {
            Ok(ModerationVerdict::default())
        }
    }
}

pub struct KindRewriter;

#[async_trait]
impl RewriterApi for KindRewriter {
    async fn rewrite(&self, _text: &str) -> Result<String, GuardrailError> {
        Ok("Let's use kind words when we talk to each other.".to_string())
    }
}

#[derive(Default)]
pub struct RecordingAudit {
    pub events: Mutex<Vec<SafetyEvent>>,
}

impl SafetyAudit for RecordingAudit {
    fn record(&self, event: SafetyEvent) {
        self.events.lock().unwrap().push(event);
    }
}

#[derive(Default)]
pub struct RecordingDispatch {
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
        Ok(())
    }
}

#[derive(Default)]
pub struct ScriptedFactory {
    scripts: Mutex<HashMap<Subject, Arc<ScriptedLlm>>>,
}

impl ScriptedFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(self: &Arc<Self>, subject: Subject, llm: Arc<ScriptedLlm>) {
        self.scripts.lock().unwrap().insert(subject, llm);
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
        let (instructions, tools) = match subject {
            Subject::Orchestrator => (
                ORCHESTRATOR_SYSTEM_PROMPT,
                vec![
                    RoutingToolName::RouteToMath,
                    RoutingToolName::RouteToHistory,
                    RoutingToolName::RouteToEnglish,
                    RoutingToolName::EscalateToTeacher,
                ],
            ),
            Subject::Math => (
                MATH_SYSTEM_PROMPT,
                vec![
                    RoutingToolName::RouteToHistory,
                    RoutingToolName::RouteToEnglish,
                    RoutingToolName::RouteBackToOrchestrator,
                    RoutingToolName::EscalateToTeacher,
                ],
            ),
            Subject::History => (
                HISTORY_SYSTEM_PROMPT,
                vec![
                    RoutingToolName::RouteToMath,
                    RoutingToolName::RouteToEnglish,
                    RoutingToolName::RouteBackToOrchestrator,
                    RoutingToolName::EscalateToTeacher,
                ],
            ),
            Subject::English => (
                ENGLISH_SYSTEM_PROMPT,
                vec![
                    RoutingToolName::RouteToMath,
                    RoutingToolName::RouteToHistory,
                    RoutingToolName::RouteBackToOrchestrator,
                    RoutingToolName::EscalateToTeacher,
                ],
            ),
        };
        Ok(GuardedAgent::new(subject, instructions, 0.3, llm, tools))
    }
}

/// Fakes bundled behind [`SessionDeps`] plus the capture sides.
pub struct WorkerHarness {
    pub factory: Arc<ScriptedFactory>,
    pub audit: Arc<RecordingAudit>,
    pub dispatch: Arc<RecordingDispatch>,
}

impl WorkerHarness {
    pub fn new() -> Self {
        Self {
            factory: ScriptedFactory::new(),
            audit: Arc::new(RecordingAudit::default()),
            dispatch: Arc::new(RecordingDispatch::default()),
        }
    }

    pub fn filter(&self, needle: &'static str) -> SafetyFilter {
        SafetyFilter::new(
            Arc::new(NeedleModeration { needle }),
            Arc::new(KindRewriter),
            self.audit.clone(),
        )
    }

    pub fn session_deps(&self, needle: &'static str) -> SessionDeps {
        SessionDeps {
            filter: self.filter(needle),
            tts: Arc::new(SilentTts),
            dispatch: self.dispatch.clone(),
            media: Arc::new(MediaControl::new(MediaConfig::default())),
            escalation: Arc::new(schola_agents::NoopEscalation),
            store: None,
            factory: self.factory.clone(),
            vad: None,
        }
    }
}

/// Builds a job context with a captured outlet and an utterance feed.
pub fn job_context(
    room: &str,
    student: &str,
    metadata: &str,
) -> (
    JobContext,
    mpsc::UnboundedSender<String>,
    mpsc::UnboundedReceiver<(String, Vec<u8>)>,
) {
    let (outlet, published) = ChannelOutlet::new();
    let (utterance_tx, utterances) = mpsc::unbounded_channel();
    let ctx = JobContext {
        room_name: room.to_string(),
        participants: Arc::new(RwLock::new(vec![student.to_string()])),
        metadata: metadata.to_string(),
        outlet: Arc::new(outlet),
        utterances,
    };
    (ctx, utterance_tx, published)
}

/// Realtime model fake: records calls and lets the test fire items and
/// tool calls as the live model would.
#[derive(Default)]
pub struct FakeRealtimeModel {
    pub started: Mutex<Option<(String, String)>>,
    pub replies: Mutex<Vec<Option<String>>>,
    pub closed: Mutex<bool>,
    shared: Mutex<Option<Arc<SessionShared>>>,
    tool_tx: Mutex<Option<mpsc::UnboundedSender<ToolCallRequest>>>,
}

impl FakeRealtimeModel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fire_item(&self, role: schola_types::ConversationRole, content: &str) {
        let shared = self.shared.lock().unwrap().clone().expect("model started");
        shared
            .signals
            .emit_conversation_item(&schola_agents::ConversationItemEvent {
                role,
                content: content.to_string(),
                speaker: None,
            });
    }

    pub fn fire_tool_call(&self, name: &str, arguments: Value) {
        let tx = self.tool_tx.lock().unwrap().clone().expect("model started");
        let _ = tx.send(ToolCallRequest {
            name: name.to_string(),
            arguments,
        });
    }
}

#[async_trait]
impl RealtimeModel for FakeRealtimeModel {
    async fn start(
        &self,
        instructions: &str,
        voice: &str,
        shared: Arc<SessionShared>,
    ) -> Result<mpsc::UnboundedReceiver<ToolCallRequest>, WorkerError> {
        *self.started.lock().unwrap() = Some((instructions.to_string(), voice.to_string()));
        *self.shared.lock().unwrap() = Some(shared);
        let (tx, rx) = mpsc::unbounded_channel();
        *self.tool_tx.lock().unwrap() = Some(tx);
        Ok(rx)
    }

    async fn generate_reply(&self, user_input: Option<&str>) -> Result<(), WorkerError> {
        self.replies
            .lock()
            .unwrap()
            .push(user_input.map(str::to_string));
        Ok(())
    }

    async fn aclose(&self) {
        *self.closed.lock().unwrap() = true;
    }
}
