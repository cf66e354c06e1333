//! Per-sentence guardrail behavior on the live speech path.

mod support;

use schola_agents::{AgentSession, SessionConfig};
use schola_guardrail::ModerationApi;
use schola_types::{ConversationRole, SessionState, Subject};
use support::*;

const HOSTILE: &str = "I hate you, you are worthless and stupid.";

#[tokio::test]
async fn flagged_sentence_is_rewritten_before_synthesis() {
    let harness = Harness::new();
    let math = build_agent(
        Subject::Math,
        ScriptedLlm::new(vec![Scripted::Say(vec![HOSTILE])]),
    );
    let mut state = SessionState::new("student-1", "room-1");
    state.route_to(Subject::Math);
    let (mut session, _audio) =
        AgentSession::new(state, math, harness.deps("worthless"), SessionConfig::default());
    let rows = attach_transcript_collector(&session);

    session.handle_user_utterance("Say something.").await.unwrap();

    // Synthesis saw only the rewritten text.
    let spoken = harness.tts.spoken.lock().unwrap().clone();
    assert_eq!(spoken, vec![KIND_REWRITE.to_string()]);

    // Exactly one audit record, carrying both texts and the category.
    let events = harness.audit.events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].original_text, HOSTILE);
    assert_eq!(events[0].rewritten_text, KIND_REWRITE);
    assert_eq!(events[0].categories_flagged, vec!["harassment"]);
    assert!((events[0].peak_score - 0.92).abs() < f64::EPSILON);

    // The committed item carries the safe text, not the original.
    let rows = rows.lock().unwrap();
    assert_eq!(
        rows.last().unwrap(),
        &(
            schola_types::Speaker::Math,
            ConversationRole::Assistant,
            KIND_REWRITE.to_string()
        )
    );
}

#[tokio::test]
async fn rewritten_text_passes_a_second_check() {
    let moderation = NeedleModeration { needle: "worthless" };
    let verdict = moderation.check(KIND_REWRITE).await.unwrap();
    assert!(!verdict.flagged);
}

#[tokio::test]
async fn only_the_flagged_sentence_is_rewritten() {
    let harness = Harness::new();
    let math = build_agent(
        Subject::Math,
        ScriptedLlm::new(vec![Scripted::Say(vec![
            "That is a good question. ",
            "I hate you, you are worthless and stupid. ",
            "Let's move on",
        ])]),
    );
    let mut state = SessionState::new("student-1", "room-1");
    state.route_to(Subject::Math);
    let (mut session, _audio) =
        AgentSession::new(state, math, harness.deps("worthless"), SessionConfig::default());

    session.handle_user_utterance("Say something.").await.unwrap();

    let spoken = harness.tts.spoken.lock().unwrap().clone();
    assert_eq!(spoken.len(), 3, "one flush per sentence, final flush at end");
    assert_eq!(spoken[0], "That is a good question.");
    assert_eq!(spoken[1], KIND_REWRITE);
    assert_eq!(spoken[2], " Let's move on");

    assert_eq!(harness.audit.events.lock().unwrap().len(), 1);
}
