//! Realtime worker entrypoint: the `learning-english` session.
//!
//! The audio path is produced natively inside the realtime model, so the
//! per-sentence guarded synthesis of the pipeline agents cannot apply
//! here. The mitigation is a post-hoc safety check on every committed
//! assistant item: flagged content is logged and audited, but the audio
//! has already played. The English agent's instructions also carry the
//! in-band safety framing as defence in depth.

use crate::error::WorkerError;
use crate::worker::JobContext;
use async_trait::async_trait;
use schola_agents::{SessionShared, ToolCallRequest, ENGLISH_SYSTEM_PROMPT};
use schola_guardrail::{SafetyAudit, SafetyEvent, SafetyFilter};
use schola_media::{DispatchControl, RoomOutlet};
use schola_store::{spawn_write, StoreClient};
use schola_telemetry::{SessionType, SpanEvent};
use schola_types::{
    ConversationRole, DispatchMetadata, SessionState, Speaker, Subject, TranscriptEvent,
    PIPELINE_AGENT_NAME, TRANSCRIPT_TOPIC,
};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Delay before the first reply so the WebRTC audio path fully
/// establishes; replying earlier produces a silent response.
pub const REALTIME_REPLY_DELAY: Duration = Duration::from_secs(3);

/// Delay before the realtime session closes after routing back, so its
/// farewell utterance completes.
pub const REALTIME_FAREWELL_CLOSE: Duration = Duration::from_secs(3);

/// Voice configured on the realtime session.
pub const REALTIME_VOICE: &str = "shimmer";

/// Audio-native inference session seam.
///
/// Instructions are passed at `start` (they ride on the agent, never on
/// the model object, which rejects any instruction argument). The model
/// fires committed items into the shared signals and surfaces tool calls
/// on the returned channel.
#[async_trait]
pub trait RealtimeModel: Send + Sync {
    async fn start(
        &self,
        instructions: &str,
        voice: &str,
        shared: Arc<SessionShared>,
    ) -> Result<mpsc::UnboundedReceiver<ToolCallRequest>, WorkerError>;

    async fn generate_reply(&self, user_input: Option<&str>) -> Result<(), WorkerError>;

    async fn aclose(&self);
}

/// External collaborators for the realtime entrypoint.
#[derive(Clone)]
pub struct RealtimeDeps {
    pub model: Arc<dyn RealtimeModel>,
    pub filter: SafetyFilter,
    pub audit: Arc<dyn SafetyAudit>,
    pub dispatch: Arc<dyn DispatchControl>,
    pub store: Option<Arc<StoreClient>>,
}

/// Serves one room-join job on the realtime worker.
pub async fn english_session_entrypoint(
    ctx: JobContext,
    deps: RealtimeDeps,
) -> Result<(), WorkerError> {
    let student_identity = ctx.resolve_student_identity().await;
    let metadata = DispatchMetadata::parse(&ctx.metadata);

    let session_id = metadata
        .session
        .as_deref()
        .and_then(|raw| Uuid::from_str(raw).ok())
        .unwrap_or_else(|| {
            tracing::error!(
                metadata = %ctx.metadata,
                "dispatch metadata carried no usable session id, minting a new one"
            );
            Uuid::new_v4()
        });

    let mut state = SessionState::with_session_id(session_id, &student_identity, &ctx.room_name);
    state.route_to(Subject::English);
    state.speaking_agent = Some(Subject::English);
    let shared = SessionShared::detached(state);
    let session_id = session_id.to_string();

    tracing::info!(
        session_id = %session_id,
        room = %ctx.room_name,
        "realtime English session starting"
    );
    SpanEvent::SessionStart {
        session_id: session_id.clone(),
        user_id: student_identity.clone(),
        room_name: ctx.room_name.clone(),
        session_type: SessionType::RealtimeEnglish,
        recovered: None,
    }
    .emit();

    attach_post_hoc_handler(&shared, &ctx, &deps, &student_identity);

    let mut tool_calls = deps
        .model
        .start(ENGLISH_SYSTEM_PROMPT, REALTIME_VOICE, shared.clone())
        .await?;

    if let Some(question) = metadata.question.clone() {
        let model = deps.model.clone();
        let session_id = session_id.clone();
        tokio::spawn(async move {
            tokio::time::sleep(REALTIME_REPLY_DELAY).await;
            if let Err(error) = model.generate_reply(Some(&question)).await {
                tracing::error!(%error, session_id = %session_id, "initial realtime reply failed");
            }
        });
    }

    loop {
        tokio::select! {
            call = tool_calls.recv() => match call {
                Some(call) => handle_tool_call(call, &shared, &ctx, &deps).await,
                None => break,
            },
            () = shared.wait_closed() => break,
        }
    }
    shared.aclose();
    deps.model.aclose().await;

    let (total_turns, escalated, subjects_covered) = {
        let state = shared.state();
        (state.turn_number, state.escalated, state.subjects_covered())
    };
    SpanEvent::SessionEnd {
        session_id: session_id.clone(),
        user_id: student_identity,
        session_type: SessionType::RealtimeEnglish,
        total_turns,
        escalated,
        subjects_covered,
    }
    .emit();

    tracing::info!(session_id = %session_id, "realtime English session ended");
    Ok(())
}

/// Registers the synchronous item handler. The host runtime rejects
/// asynchronous callbacks on signals, so the handler derives the row under
/// the state lock and schedules an independent worker for the I/O.
fn attach_post_hoc_handler(
    shared: &Arc<SessionShared>,
    ctx: &JobContext,
    deps: &RealtimeDeps,
    student_identity: &str,
) {
    let state_shared = shared.clone();
    let filter = deps.filter.clone();
    let audit = deps.audit.clone();
    let store = deps.store.clone();
    let user_id = student_identity.to_string();

    // One forwarding task keeps data-channel order equal to commit order.
    let (publish_tx, mut publish_rx) = mpsc::unbounded_channel::<Vec<u8>>();
    let outlet = ctx.outlet.clone();
    tokio::spawn(async move {
        while let Some(payload) = publish_rx.recv().await {
            if let Err(error) = outlet.publish_data(TRANSCRIPT_TOPIC, payload).await {
                tracing::warn!(%error, "failed to publish realtime transcript event");
            }
        }
    });

    shared.signals.on_conversation_item(move |event| {
        if event.content.is_empty() {
            return;
        }
        let (turn, session_id) = {
            let mut state = state_shared.state();
            (state.advance_turn(), state.session_id.to_string())
        };
        let speaker = match event.role {
            ConversationRole::User => Speaker::Student,
            ConversationRole::Assistant => Speaker::English,
        };
        let transcript = TranscriptEvent {
            speaker,
            role: event.role,
            content: event.content.clone(),
            subject: Some(Subject::English),
            turn,
            session_id: session_id.clone(),
        };

        SpanEvent::ConversationItem {
            session_id: session_id.clone(),
            user_id: user_id.clone(),
            subject: Some(Subject::English),
            role: event.role,
            session_type: SessionType::RealtimeEnglish,
            turn,
            e2e_response_ms: None,
        }
        .emit();

        if publish_tx.send(transcript.to_payload()).is_err() {
            tracing::warn!("realtime transcript publish queue closed");
        }

        if let Some(store) = store.clone() {
            let row = transcript;
            spawn_write("transcript_turns", async move {
                store
                    .save_transcript_turn(
                        &row.session_id,
                        row.turn,
                        row.speaker,
                        row.role,
                        &row.content,
                        row.subject,
                    )
                    .await
            });
        }

        // Post-hoc check: the audio has already played; flagged content is
        // logged and audited for teacher review.
        if event.role == ConversationRole::Assistant {
            let filter = filter.clone();
            let audit = audit.clone();
            let content = event.content.clone();
            tokio::spawn(async move {
                let verdict = filter.check(&content, &session_id).await;
                if verdict.flagged {
                    tracing::warn!(
                        session_id = %session_id,
                        categories = ?verdict.categories,
                        "realtime assistant content flagged post-hoc"
                    );
                    audit.record(SafetyEvent::audit_only(
                        &session_id,
                        "english",
                        content,
                        verdict.categories,
                        verdict.peak_score,
                    ));
                }
            });
        }
    });
}

/// Handles a tool call surfaced by the realtime model.
async fn handle_tool_call(
    call: ToolCallRequest,
    shared: &Arc<SessionShared>,
    ctx: &JobContext,
    deps: &RealtimeDeps,
) {
    if call.name != "route_back_to_orchestrator" {
        tracing::warn!(tool = %call.name, "unsupported tool call on realtime session");
        return;
    }
    let reason = call
        .arguments
        .get("reason")
        .and_then(serde_json::Value::as_str)
        .unwrap_or("student changed subject")
        .to_string();

    let session_id = shared.state().session_id.to_string();
    tracing::info!(session_id = %session_id, reason = %reason, "routing back to pipeline worker");

    let metadata =
        DispatchMetadata::for_return_to_pipeline(&session_id, &reason, Some(Subject::English));
    if let Err(error) = deps
        .dispatch
        .dispatch_agent(PIPELINE_AGENT_NAME, &ctx.room_name, &metadata.format())
        .await
    {
        tracing::error!(%error, "failed to dispatch pipeline worker on route-back");
    }

    // Close after the farewell finishes so this session cannot compete
    // with the newly dispatched pipeline session for the student's audio.
    let model = deps.model.clone();
    let shared = shared.clone();
    tokio::spawn(async move {
        tokio::time::sleep(REALTIME_FAREWELL_CLOSE).await;
        model.aclose().await;
        shared.aclose();
    });
}
