//! Pipeline worker entrypoint: the `learning-orchestrator` session.

use crate::error::WorkerError;
use crate::transcript::TranscriptPublisher;
use crate::worker::JobContext;
use schola_agents::{AgentSession, SessionConfig, SessionDeps};
use schola_store::spawn_write;
use schola_telemetry::{SessionType, SpanEvent};
use schola_types::{DispatchMetadata, SessionState, Subject};
use std::str::FromStr;
use uuid::Uuid;

/// Serves one room-join job on the pipeline worker.
///
/// Builds (or recovers) the session state, starts the session with the
/// orchestrator active, and emits transcript and telemetry for every
/// committed item until the student disconnects or the session drains
/// into a realtime handoff.
pub async fn pipeline_session_entrypoint(
    mut ctx: JobContext,
    deps: SessionDeps,
) -> Result<(), WorkerError> {
    let student_identity = ctx.resolve_student_identity().await;
    let metadata = DispatchMetadata::parse(&ctx.metadata);

    let (state, recovered, question) = build_session_state(
        &metadata,
        &student_identity,
        &ctx.room_name,
    );
    let session_id = state.session_id.to_string();

    // Session row upsert must not delay session start.
    if let Some(store) = deps.store.clone() {
        let session_id = session_id.clone();
        let room_name = ctx.room_name.clone();
        let student = student_identity.clone();
        spawn_write("learning_sessions", async move {
            store
                .create_session_record(&session_id, &room_name, &student)
                .await
        });
    }

    tracing::info!(
        session_id = %session_id,
        room = %ctx.room_name,
        student = %student_identity,
        recovered,
        "pipeline session starting"
    );
    SpanEvent::SessionStart {
        session_id: session_id.clone(),
        user_id: student_identity.clone(),
        room_name: ctx.room_name.clone(),
        session_type: SessionType::Pipeline,
        recovered: Some(recovered),
    }
    .emit();

    let orchestrator = deps.factory.build(Subject::Orchestrator)?;
    if let Some(question) = question {
        orchestrator.set_pending_question(question);
    }

    let store = deps.store.clone();
    let (mut session, _audio_rx) =
        AgentSession::new(state, orchestrator, deps, SessionConfig::default());
    let shared = session.shared();

    TranscriptPublisher::new(
        shared.clone(),
        ctx.outlet.clone(),
        store.clone(),
        SessionType::Pipeline,
    )
    .attach(&session);

    session.start().await?;

    // Serve until the student disconnects (utterance feed closes) or a
    // routing drain closes the session from the side.
    loop {
        tokio::select! {
            utterance = ctx.utterances.recv() => match utterance {
                Some(text) => {
                    if let Err(error) = session.handle_user_utterance(&text).await {
                        tracing::error!(%error, session_id = %session_id, "session turn failed");
                        break;
                    }
                }
                None => {
                    tracing::info!(session_id = %session_id, "student disconnected");
                    break;
                }
            },
            () = shared.wait_closed() => break,
        }
    }
    shared.aclose();

    // Session report and end-of-session telemetry.
    let (total_turns, escalated, subjects_covered, report) = {
        let state = shared.state();
        (
            state.turn_number,
            state.escalated,
            state.subjects_covered(),
            state.session_report(),
        )
    };
    if let Some(store) = store {
        let session_id = session_id.clone();
        spawn_write("learning_sessions", async move {
            store.close_session_record(&session_id, report).await
        });
    }
    SpanEvent::SessionEnd {
        session_id: session_id.clone(),
        user_id: student_identity,
        session_type: SessionType::Pipeline,
        total_turns,
        escalated,
        subjects_covered,
    }
    .emit();

    tracing::info!(
        session_id = %session_id,
        turns = total_turns,
        escalated,
        "pipeline session ended"
    );
    Ok(())
}

/// Builds fresh state, or recovers the prior session when the realtime
/// worker handed control back. Returns the state, whether it was
/// recovered, and the question to hand to the orchestrator.
fn build_session_state(
    metadata: &DispatchMetadata,
    student_identity: &str,
    room_name: &str,
) -> (SessionState, bool, Option<String>) {
    let recovered_id = metadata
        .return_from_english
        .as_deref()
        .and_then(|raw| match Uuid::from_str(raw) {
            Ok(id) => Some(id),
            Err(_) => {
                // Recovery failure: a new id is minted and the prior trace
                // lineage is lost.
                tracing::error!(raw, "unparseable session id in return metadata");
                None
            }
        });

    let mut state = match recovered_id {
        Some(id) => SessionState::with_session_id(id, student_identity, room_name),
        None => SessionState::new(student_identity, room_name),
    };
    let recovered = recovered_id.is_some();

    let question = if recovered {
        let prior = metadata.subject.unwrap_or(Subject::English);
        state.previous_subjects.push(prior);
        if metadata.question.is_some() {
            // The question is replayed to the orchestrator as synthetic
            // input; suppress the phantom user item it produces.
            state.skip_next_user_turns = 1;
        }
        metadata.question.clone()
    } else {
        None
    };

    (state, recovered, question)
}
