//! Transcript emission for committed conversation items.
//!
//! The runtime invokes signal handlers synchronously and rejects anything
//! that awaits, so each handler here is a synchronous dispatcher: it
//! derives the row under the state lock, then hands the I/O to an ordered
//! forwarding task. Readers trust data-channel order, so publishes go
//! through one queue per session; store writes are fire-and-forget and
//! carry no ordering promise.

use schola_agents::{AgentSession, ConversationItemEvent, SessionShared};
use schola_media::RoomOutlet;
use schola_store::{spawn_write, StoreClient};
use schola_telemetry::{SessionType, SpanEvent};
use schola_types::{ConversationRole, Speaker, TranscriptEvent, TRANSCRIPT_TOPIC};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Publishes committed items to the room data channel and the store.
#[derive(Clone)]
pub struct TranscriptPublisher {
    shared: Arc<SessionShared>,
    store: Option<Arc<StoreClient>>,
    session_type: SessionType,
    publish_tx: mpsc::UnboundedSender<Vec<u8>>,
}

impl TranscriptPublisher {
    pub fn new(
        shared: Arc<SessionShared>,
        outlet: Arc<dyn RoomOutlet>,
        store: Option<Arc<StoreClient>>,
        session_type: SessionType,
    ) -> Self {
        // One forwarding task per session keeps data-channel order equal
        // to commit order.
        let (publish_tx, mut publish_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        tokio::spawn(async move {
            while let Some(payload) = publish_rx.recv().await {
                if let Err(error) = outlet.publish_data(TRANSCRIPT_TOPIC, payload).await {
                    tracing::warn!(%error, "failed to publish transcript event");
                }
            }
        });

        Self {
            shared,
            store,
            session_type,
            publish_tx,
        }
    }

    /// Registers the conversation-item and transcription handlers on a
    /// pipeline session.
    pub fn attach(self, session: &AgentSession) {
        let publisher = self.clone();
        session
            .signals()
            .on_conversation_item(move |event| publisher.handle_item(event));

        let shared = self.shared.clone();
        session.signals().on_user_input_transcribed(move |_text| {
            shared.state().mark_user_input();
        });
    }

    /// Synchronous item handler. Must not block; all I/O is queued or
    /// spawned.
    pub fn handle_item(&self, event: &ConversationItemEvent) {
        if event.content.is_empty() {
            return;
        }

        let (transcript, e2e_response_ms, session_id, user_id, subject) = {
            let mut state = self.shared.state();

            // Phantom user items produced by replaying a handed-over
            // question are counted down and dropped before any emission.
            if event.role == ConversationRole::User && state.consume_skip() {
                tracing::debug!(
                    session_id = %state.session_id,
                    "suppressed synthetic user item"
                );
                return;
            }

            let speaker = event.speaker.unwrap_or(match event.role {
                ConversationRole::User => Speaker::Student,
                ConversationRole::Assistant => state
                    .speaking_agent
                    .map(Speaker::from)
                    .unwrap_or(Speaker::Orchestrator),
            });
            let subject = state.current_subject;
            let turn = state.advance_turn();
            let e2e_response_ms = match event.role {
                ConversationRole::Assistant => state.take_response_latency_ms(),
                ConversationRole::User => None,
            };

            (
                TranscriptEvent {
                    speaker,
                    role: event.role,
                    content: event.content.clone(),
                    subject,
                    turn,
                    session_id: state.session_id.to_string(),
                },
                e2e_response_ms,
                state.session_id.to_string(),
                state.student_identity.clone(),
                subject,
            )
        };

        SpanEvent::ConversationItem {
            session_id,
            user_id,
            subject,
            role: event.role,
            session_type: self.session_type,
            turn: transcript.turn,
            e2e_response_ms,
        }
        .emit();

        if self.publish_tx.send(transcript.to_payload()).is_err() {
            tracing::warn!("transcript publish queue closed");
        }

        if let Some(store) = &self.store {
            let store = store.clone();
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
    }
}
