//! Out-of-session English dispatch: metadata, drain timing, and the
//! degraded fallback path.

mod support;

use schola_agents::{AgentSession, SessionConfig};
use schola_types::{DispatchMetadata, SessionState, Speaker, Subject, REALTIME_AGENT_NAME};
use serde_json::json;
use std::time::Duration;
use support::*;

fn orchestrator_routing_english() -> schola_agents::GuardedAgent {
    build_agent(
        Subject::Orchestrator,
        ScriptedLlm::new(vec![Scripted::Tool(
            "route_to_english",
            json!({ "question_summary": "adjectives" }),
        )]),
    )
}

#[tokio::test(start_paused = true)]
async fn english_dispatch_drains_then_closes_gracefully() {
    let harness = Harness::new();
    let state = SessionState::new("student-1", "room-1");
    let session_id = state.session_id.to_string();
    let (mut session, _audio) = AgentSession::new(
        state,
        orchestrator_routing_english(),
        harness.deps("\u{1}"),
        SessionConfig::default(),
    );
    let rows = attach_transcript_collector(&session);

    session
        .handle_user_utterance("What is an adjective?")
        .await
        .unwrap();

    // The dispatch used the typed request against the realtime worker and
    // carried the session id and question in metadata.
    let calls = harness.dispatch.calls.lock().unwrap().clone();
    assert_eq!(calls.len(), 1);
    let (agent_name, room, metadata) = &calls[0];
    assert_eq!(agent_name, REALTIME_AGENT_NAME);
    assert_eq!(room, "room-1");
    let metadata = DispatchMetadata::parse(metadata);
    assert_eq!(metadata.session.as_deref(), Some(session_id.as_str()));
    assert_eq!(metadata.question.as_deref(), Some("adjectives"));

    // The outgoing agent's transition is spoken and attributed to it.
    assert_eq!(
        rows.lock().unwrap().last().unwrap().0,
        Speaker::Orchestrator
    );

    // The pipeline stays open through the drain interval, then closes
    // gracefully. Nothing ever interrupts it.
    let shared = session.shared();
    assert!(!shared.is_closed());
    tokio::time::sleep(Duration::from_millis(3400)).await;
    assert!(!shared.is_closed(), "drain must hold the full interval");
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(shared.is_closed(), "drain closes after 3.5s");
    assert_eq!(shared.stats().interrupts(), 0);

    // The 30s watchdog finds the session already closed.
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(shared.is_closed());
}

#[tokio::test(start_paused = true)]
async fn failed_dispatch_degrades_to_pipeline_english() {
    let harness = Harness::new().failing_dispatch();
    harness.factory.script(
        Subject::English,
        ScriptedLlm::new(vec![Scripted::Say(vec![
            "An adjective is a word that describes a noun.",
        ])]),
    );
    let state = SessionState::new("student-1", "room-1");
    let (mut session, _audio) = AgentSession::new(
        state,
        orchestrator_routing_english(),
        harness.deps("\u{1}"),
        SessionConfig::default(),
    );
    let rows = attach_transcript_collector(&session);

    session
        .handle_user_utterance("What is an adjective?")
        .await
        .unwrap();

    assert_eq!(session.active_subject(), Subject::English);
    let rows = rows.lock().unwrap();
    assert_eq!(
        rows.last().unwrap(),
        &(
            Speaker::English,
            schola_types::ConversationRole::Assistant,
            "An adjective is a word that describes a noun.".to_string()
        )
    );

    // No drain was scheduled; the degraded session keeps serving.
    let shared = session.shared();
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(!shared.is_closed());
    {
        let state = shared.state();
        assert_eq!(state.current_subject, Some(Subject::English));
        assert_eq!(state.skip_next_user_turns, 0);
    }
}
