//! Teacher escalation: latch, notification, and continued routing.

mod support;

use schola_agents::{AgentSession, SessionConfig};
use schola_types::{SessionState, Subject};
use serde_json::json;
use support::*;

#[tokio::test]
async fn escalation_latches_notifies_once_and_keeps_the_session_alive() {
    let harness = Harness::new();
    harness.factory.script(
        Subject::Math,
        ScriptedLlm::new(vec![Scripted::Say(vec!["Let's count together."])]),
    );
    let orchestrator = build_agent(
        Subject::Orchestrator,
        ScriptedLlm::new(vec![
            Scripted::Tool(
                "escalate_to_teacher",
                json!({ "reason": "student expressing distress" }),
            ),
            Scripted::Tool(
                "escalate_to_teacher",
                json!({ "reason": "still worried about the student" }),
            ),
            Scripted::Tool("route_to_math", json!({ "question_summary": "counting" })),
        ]),
    );

    let state = SessionState::new("student-1", "room-1");
    let (mut session, _audio) = AgentSession::new(
        state,
        orchestrator,
        harness.deps("\u{1}"),
        SessionConfig::default(),
    );

    session
        .handle_user_utterance("I feel really sad and alone.")
        .await
        .unwrap();

    let shared = session.shared();
    {
        let state = shared.state();
        assert!(state.escalated);
        assert_eq!(
            state.escalation_reason.as_deref(),
            Some("student expressing distress")
        );
    }

    // Exactly one escalation row, carrying a signed teacher token.
    {
        let events = harness.escalation.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].1, "room-1");
        assert_eq!(events[0].2, "student expressing distress");
    }

    // The spoken acknowledgement reached synthesis.
    assert!(harness
        .tts
        .spoken
        .lock()
        .unwrap()
        .iter()
        .any(|s| s.contains("teacher")));

    // A second escalation call keeps the latch and does not re-notify.
    session.handle_user_utterance("I am still sad.").await.unwrap();
    {
        let state = shared.state();
        assert!(state.escalated);
        assert_eq!(
            state.escalation_reason.as_deref(),
            Some("student expressing distress")
        );
    }
    assert_eq!(harness.escalation.events.lock().unwrap().len(), 1);

    // Escalation does not absorb further routing.
    session
        .handle_user_utterance("Can you help me count to ten?")
        .await
        .unwrap();
    assert_eq!(session.active_subject(), Subject::Math);
    assert!(!shared.is_closed());
}
