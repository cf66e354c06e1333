//! The agent session: one active agent, shared state, and signals.
//!
//! Hosts one conversation per room. The session drives the active agent's
//! language model, routes every synthesized sentence through the guarded
//! pipeline, commits conversation items, and consumes routing handoffs.
//!
//! # Signal contract
//!
//! Handlers registered against [`Signals`] are invoked synchronously and
//! must not block: they are plain `Fn` closures, so awaiting inside one is
//! impossible by construction. A handler that needs I/O spawns its own task.
//!
//! # Handoff ordering
//!
//! A swap handoff first speaks the outgoing agent's transition sentence
//! through the outgoing agent's guarded path (attributed to the outgoing
//! speaker), then activates the incoming agent. The `speaking_agent` value
//! pre-set by the routing controller therefore governs drain-phase and
//! post-activation emissions, never the transition sentence itself.

use crate::agent::{AgentFactory, GuardedAgent};
use crate::engines::{
    ChatContext, LlmReply, LlmRequest, SpeechSynthesizer, TextStream, ToolCallRequest,
    VoiceActivityDetector,
};
use crate::engines::text_stream;
use crate::error::AgentError;
use crate::guarded;
use crate::routing::{EscalationSink, RoutingContext, RoutingOutcome, RoutingTool};
use schola_guardrail::SafetyFilter;
use schola_media::{DispatchControl, MediaControl};
use schola_store::StoreClient;
use schola_telemetry::{truncate_attr, SpanEvent};
use schola_types::{ConversationRole, SessionState, Speaker};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{mpsc, watch};

/// One committed conversation item, delivered to signal handlers.
#[derive(Debug, Clone)]
pub struct ConversationItemEvent {
    pub role: ConversationRole,
    pub content: String,
    /// Set when the runtime pre-attributed the item (the transition sentence
    /// of a handoff, which belongs to the outgoing agent). Handlers derive
    /// the speaker from session state when absent.
    pub speaker: Option<Speaker>,
}

type ItemHandler = Box<dyn Fn(&ConversationItemEvent) + Send + Sync>;
type TranscribedHandler = Box<dyn Fn(&str) + Send + Sync>;
type CloseHandler = Box<dyn Fn() + Send + Sync>;

/// Signal registry. All handlers are synchronous dispatchers.
#[derive(Default)]
pub struct Signals {
    item: Mutex<Vec<ItemHandler>>,
    transcribed: Mutex<Vec<TranscribedHandler>>,
    close: Mutex<Vec<CloseHandler>>,
}

impl Signals {
    /// Registers a handler for committed conversation items.
    pub fn on_conversation_item(&self, handler: impl Fn(&ConversationItemEvent) + Send + Sync + 'static) {
        self.item.lock().expect("signal lock").push(Box::new(handler));
    }

    /// Registers a handler fired when a user utterance is transcribed.
    pub fn on_user_input_transcribed(&self, handler: impl Fn(&str) + Send + Sync + 'static) {
        self.transcribed
            .lock()
            .expect("signal lock")
            .push(Box::new(handler));
    }

    /// Registers a handler fired once on session close.
    pub fn on_close(&self, handler: impl Fn() + Send + Sync + 'static) {
        self.close.lock().expect("signal lock").push(Box::new(handler));
    }

    /// Delivers a committed item to every handler. Invoked by the runtime
    /// (and by host-side adapters such as the realtime model transport).
    pub fn emit_conversation_item(&self, event: &ConversationItemEvent) {
        for handler in self.item.lock().expect("signal lock").iter() {
            handler(event);
        }
    }

    fn fire_transcribed(&self, text: &str) {
        for handler in self.transcribed.lock().expect("signal lock").iter() {
            handler(text);
        }
    }

    fn fire_close(&self) {
        for handler in self.close.lock().expect("signal lock").iter() {
            handler();
        }
    }
}

/// Counters exposed for diagnostics and tests.
#[derive(Debug, Default)]
pub struct SessionStats {
    interrupts: AtomicU32,
}

impl SessionStats {
    pub fn interrupts(&self) -> u32 {
        self.interrupts.load(Ordering::SeqCst)
    }
}

/// State shared between the session, its signal handlers, and the
/// fire-and-forget drain/watchdog tasks.
pub struct SessionShared {
    state: Mutex<SessionState>,
    pub signals: Signals,
    stats: SessionStats,
    closed: watch::Sender<bool>,
}

impl SessionShared {
    fn new(state: SessionState) -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            state: Mutex::new(state),
            signals: Signals::default(),
            stats: SessionStats::default(),
            closed,
        }
    }

    /// Shared state for a session whose audio path lives outside this
    /// runtime (the realtime worker): signals, close synchronization, and
    /// session state without the pipeline driver.
    pub fn detached(state: SessionState) -> Arc<Self> {
        Arc::new(Self::new(state))
    }

    /// Locks the session state. Held only for short reads and mutations.
    pub fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().expect("session state lock")
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// Graceful close: marks the session closed and fires the close signal
    /// exactly once. In-flight synthesis is allowed to finish; this is the
    /// only way a drain may end a session.
    pub fn aclose(&self) {
        if !self.closed.send_replace(true) {
            self.signals.fire_close();
        }
    }

    /// Hard interrupt. Silences in-flight synthesis mid-word, so the drain
    /// path never calls it; counted for diagnostics.
    pub fn interrupt(&self) {
        self.stats.interrupts.fetch_add(1, Ordering::SeqCst);
        tracing::warn!("session interrupt requested");
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Resolves once the session is closed.
    pub async fn wait_closed(&self) {
        let mut rx = self.closed.subscribe();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                break;
            }
        }
    }
}

/// Endpointing tunables for the pipeline audio path.
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    /// Prevents premature cutoff.
    pub min_endpointing_delay: f32,
    /// Caps long pauses.
    pub max_endpointing_delay: f32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            min_endpointing_delay: 0.4,
            max_endpointing_delay: 2.0,
        }
    }
}

/// External collaborators handed to a session at construction.
#[derive(Clone)]
pub struct SessionDeps {
    pub filter: SafetyFilter,
    pub tts: Arc<dyn SpeechSynthesizer>,
    pub dispatch: Arc<dyn DispatchControl>,
    pub media: Arc<MediaControl>,
    pub escalation: Arc<dyn EscalationSink>,
    pub store: Option<Arc<StoreClient>>,
    pub factory: Arc<dyn AgentFactory>,
    pub vad: Option<Arc<dyn VoiceActivityDetector>>,
}

enum Drive {
    Done,
    Swapped,
}

/// One live conversation.
pub struct AgentSession {
    shared: Arc<SessionShared>,
    deps: SessionDeps,
    config: SessionConfig,
    chat: ChatContext,
    active: GuardedAgent,
    audio_tx: mpsc::UnboundedSender<Vec<u8>>,
}

impl AgentSession {
    /// Builds a session around an initial agent. Returns the session and
    /// the receiving half of its audio path.
    pub fn new(
        state: SessionState,
        agent: GuardedAgent,
        deps: SessionDeps,
        config: SessionConfig,
    ) -> (Self, mpsc::UnboundedReceiver<Vec<u8>>) {
        let (audio_tx, audio_rx) = mpsc::unbounded_channel();
        let session = Self {
            shared: Arc::new(SessionShared::new(state)),
            deps,
            config,
            chat: ChatContext::new(),
            active: agent,
            audio_tx,
        };
        (session, audio_rx)
    }

    pub fn shared(&self) -> Arc<SessionShared> {
        self.shared.clone()
    }

    pub fn signals(&self) -> &Signals {
        &self.shared.signals
    }

    pub fn config(&self) -> SessionConfig {
        self.config
    }

    pub fn chat(&self) -> &ChatContext {
        &self.chat
    }

    /// The currently active agent's subject.
    pub fn active_subject(&self) -> schola_types::Subject {
        self.active.subject()
    }

    /// Starts the session by activating the initial agent (the orchestrator
    /// greets the student).
    pub async fn start(&mut self) -> Result<(), AgentError> {
        self.run_activation().await
    }

    /// Feeds one committed student utterance through the active agent.
    pub async fn handle_user_utterance(&mut self, text: &str) -> Result<(), AgentError> {
        if self.shared.is_closed() {
            return Err(AgentError::SessionClosed);
        }
        self.shared.signals.fire_transcribed(text);
        self.chat.push_user(text);
        self.commit_item(ConversationRole::User, text, None);

        match self.drive_once(None).await? {
            Drive::Done => Ok(()),
            Drive::Swapped => self.run_activation().await,
        }
    }

    /// Graceful close.
    pub fn aclose(&self) {
        self.shared.aclose();
    }

    /// Activation loop: emit the activation span, consume any pending
    /// question, and drive the model. A tool call that swaps agents
    /// re-enters the loop for the incoming agent.
    async fn run_activation(&mut self) -> Result<(), AgentError> {
        loop {
            self.emit_activation_span();
            let pending = self.active.take_pending_question();
            match self.drive_once(pending).await? {
                Drive::Done => return Ok(()),
                Drive::Swapped => continue,
            }
        }
    }

    /// One model turn. `user_input` conditions the model on a handed-over
    /// question by committing a synthetic user item (which the item handler
    /// suppresses via the skip counter).
    async fn drive_once(&mut self, user_input: Option<String>) -> Result<Drive, AgentError> {
        if let Some(question) = &user_input {
            self.chat.push_user(question);
            self.commit_item(ConversationRole::User, question, None);
        }

        let tools = self.active.tool_specs();
        let reply = {
            let request = LlmRequest {
                instructions: self.active.instructions(),
                chat: &self.chat,
                tools: &tools,
                temperature: self.active.temperature(),
            };
            self.active.llm().respond(request).await?
        };

        match reply {
            LlmReply::Speech(stream) => {
                let spoken = self.speak_stream(stream).await?;
                if !spoken.is_empty() {
                    self.chat.push_assistant(&spoken);
                    self.commit_item(ConversationRole::Assistant, &spoken, None);
                }
                Ok(Drive::Done)
            }
            LlmReply::ToolCall(call) => self.dispatch_tool(call).await,
        }
    }

    /// Single dispatch step over the typed routing table.
    async fn dispatch_tool(&mut self, call: ToolCallRequest) -> Result<Drive, AgentError> {
        let outgoing = self.active.subject();
        let tool = RoutingTool::parse(&call)?;
        let outcome = {
            let ctx = RoutingContext {
                from_agent: outgoing,
                shared: &self.shared,
                deps: &self.deps,
                history_length: self.chat.len(),
                last_user_message: self.chat.last_user_message().unwrap_or("").to_string(),
            };
            tool.execute(&ctx).await?
        };

        match outcome {
            RoutingOutcome::Swap { agent, transition } => {
                // The outgoing agent speaks the transition before the swap;
                // the item carries the outgoing speaker explicitly.
                let spoken = self.speak_text(&transition).await?;
                self.chat.push_assistant(&spoken);
                self.commit_item(
                    ConversationRole::Assistant,
                    &spoken,
                    Some(Speaker::from(outgoing)),
                );
                self.active = agent;
                Ok(Drive::Swapped)
            }
            RoutingOutcome::Spoken(text) => {
                let spoken = self.speak_text(&text).await?;
                self.chat.push_assistant(&spoken);
                self.commit_item(
                    ConversationRole::Assistant,
                    &spoken,
                    Some(Speaker::from(outgoing)),
                );
                Ok(Drive::Done)
            }
            RoutingOutcome::Stay => Ok(Drive::Done),
        }
    }

    fn emit_activation_span(&self) {
        let (session_id, user_id) = {
            let state = self.shared.state();
            (state.session_id.to_string(), state.student_identity.clone())
        };
        let last_user_message = self.chat.last_user_message().unwrap_or("");
        tracing::info!(
            agent = self.active.agent_name(),
            history_length = self.chat.len(),
            last_user_message = %truncate_attr(last_user_message),
            "agent activated"
        );
        SpanEvent::AgentActivated {
            agent: self.active.subject(),
            session_id,
            user_id,
            history_length: self.chat.len(),
            last_user_message: last_user_message.to_string(),
        }
        .emit();
    }

    fn commit_item(&self, role: ConversationRole, content: &str, speaker: Option<Speaker>) {
        let event = ConversationItemEvent {
            role,
            content: content.to_string(),
            speaker,
        };
        self.shared.signals.emit_conversation_item(&event);
    }

    async fn speak_text(&self, text: &str) -> Result<String, AgentError> {
        self.speak_stream(text_stream([text.to_string()])).await
    }

    async fn speak_stream(&self, stream: TextStream) -> Result<String, AgentError> {
        let session_id = self.shared.state().session_id.to_string();
        let tts = self
            .active
            .tts_override()
            .cloned()
            .unwrap_or_else(|| self.deps.tts.clone());
        guarded::speak_guarded(
            &self.deps.filter,
            &tts,
            self.active.voice(),
            &session_id,
            self.active.agent_name(),
            stream,
            &self.audio_tx,
        )
        .await
    }
}
