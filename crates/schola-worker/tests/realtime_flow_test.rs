//! Realtime worker session: delayed first reply, post-hoc safety, and the
//! handoff back to the pipeline worker.

mod support;

use schola_types::{ConversationRole, DispatchMetadata, Subject, PIPELINE_AGENT_NAME};
use schola_worker::realtime::{english_session_entrypoint, RealtimeDeps, REALTIME_VOICE};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use support::*;
use uuid::Uuid;

fn realtime_deps(
    harness: &WorkerHarness,
    model: Arc<FakeRealtimeModel>,
    needle: &'static str,
) -> RealtimeDeps {
    RealtimeDeps {
        model,
        filter: harness.filter(needle),
        audit: harness.audit.clone(),
        dispatch: harness.dispatch.clone(),
        store: None,
    }
}

/// Polls until the condition holds; virtual time advances while awaiting.
async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("condition never became true");
}

#[tokio::test(start_paused = true)]
async fn realtime_session_replays_question_and_routes_back() {
    let harness = WorkerHarness::new();
    let model = FakeRealtimeModel::new();
    let session_id = Uuid::new_v4();
    let metadata = format!("session:{session_id}|question:adjectives|subject:orchestrator");
    let (ctx, _utterances, mut published) = job_context("room-1", "student-1", &metadata);

    let deps = realtime_deps(&harness, model.clone(), "stupid");
    let session = tokio::spawn(english_session_entrypoint(ctx, deps));

    // Instructions ride on the agent and reach the model at start.
    eventually(|| model.started.lock().unwrap().is_some()).await;
    {
        let started = model.started.lock().unwrap();
        let (instructions, voice) = started.as_ref().unwrap();
        assert!(instructions.contains("English language and literature tutor"));
        assert_eq!(voice, REALTIME_VOICE);
    }

    // The first reply is conditioned on the handed-over question, after
    // the audio-path establishment delay.
    eventually(|| !model.replies.lock().unwrap().is_empty()).await;
    assert_eq!(
        model.replies.lock().unwrap().first().unwrap().as_deref(),
        Some("adjectives")
    );

    // A committed assistant item is published with english attribution and
    // checked post-hoc; flagged content is audited, not suppressed.
    model.fire_item(
        ConversationRole::Assistant,
        "That was a stupid question, but adjectives describe nouns.",
    );
    let (topic, payload) = published.recv().await.unwrap();
    assert_eq!(topic, "transcript");
    let event: Value = serde_json::from_slice(&payload).unwrap();
    assert_eq!(event["speaker"], "english");
    assert_eq!(event["subject"], "english");
    assert_eq!(event["session_id"], session_id.to_string());

    eventually(|| !harness.audit.events.lock().unwrap().is_empty()).await;
    {
        let events = harness.audit.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action_taken, "audit_only");
        assert_eq!(events[0].agent_name, "english");
    }

    // Routing back dispatches the pipeline worker into the same room with
    // the session id in the return metadata, then closes after the
    // farewell interval.
    model.fire_tool_call(
        "route_back_to_orchestrator",
        json!({ "reason": "wants to talk about fractions" }),
    );
    eventually(|| !harness.dispatch.calls.lock().unwrap().is_empty()).await;
    {
        let calls = harness.dispatch.calls.lock().unwrap();
        let (agent_name, room, metadata) = &calls[0];
        assert_eq!(agent_name, PIPELINE_AGENT_NAME);
        assert_eq!(room, "room-1");
        let metadata = DispatchMetadata::parse(metadata);
        assert_eq!(
            metadata.return_from_english.as_deref(),
            Some(session_id.to_string().as_str())
        );
        assert_eq!(
            metadata.question.as_deref(),
            Some("wants to talk about fractions")
        );
        assert_eq!(metadata.subject, Some(Subject::English));
    }

    eventually(|| *model.closed.lock().unwrap()).await;
    session.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn missing_session_id_mints_a_new_one() {
    let harness = WorkerHarness::new();
    let model = FakeRealtimeModel::new();
    let (ctx, _utterances, mut published) = job_context("room-1", "student-1", "question:verbs");

    let deps = realtime_deps(&harness, model.clone(), "\u{1}");
    let _session = tokio::spawn(english_session_entrypoint(ctx, deps));

    eventually(|| model.started.lock().unwrap().is_some()).await;
    model.fire_item(ConversationRole::User, "What is a verb?");
    let (_, payload) = published.recv().await.unwrap();
    let event: Value = serde_json::from_slice(&payload).unwrap();
    assert_eq!(event["speaker"], "student");
    // A fresh id was minted; it still parses as a UUID.
    assert!(Uuid::parse_str(event["session_id"].as_str().unwrap()).is_ok());
}
