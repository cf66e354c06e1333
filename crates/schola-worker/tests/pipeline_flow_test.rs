//! End-to-end pipeline worker session: transcript publishing, phantom
//! suppression, and recovery from dispatch metadata.

mod support;

use schola_types::Subject;
use schola_worker::pipeline::pipeline_session_entrypoint;
use serde_json::{json, Value};
use std::time::Duration;
use support::*;
use uuid::Uuid;

async fn collect_published(
    mut published: tokio::sync::mpsc::UnboundedReceiver<(String, Vec<u8>)>,
    expected: usize,
) -> Vec<Value> {
    let mut events: Vec<Value> = Vec::new();
    while events.len() < expected {
        let (topic, payload) =
            tokio::time::timeout(Duration::from_secs(2), published.recv())
                .await
                .expect("timed out waiting for transcript event")
                .expect("outlet closed early");
        assert_eq!(topic, "transcript");
        events.push(serde_json::from_slice(&payload).unwrap());
    }
    // Publishes are fire-and-forget tasks; order rows by turn number.
    events.sort_by_key(|event| event["turn"].as_u64());
    events
}

#[tokio::test(flavor = "multi_thread")]
async fn fresh_session_routes_and_publishes_the_full_transcript() {
    let harness = WorkerHarness::new();
    harness.factory.script(
        Subject::Orchestrator,
        ScriptedLlm::new(vec![
            Scripted::Say(vec!["Hi! What would you like to learn today?"]),
            Scripted::Tool(
                "route_to_math",
                json!({ "question_summary": "seven times eight" }),
            ),
        ]),
    );
    harness.factory.script(
        Subject::Math,
        ScriptedLlm::new(vec![Scripted::Say(vec!["Seven times eight is 56."])]),
    );

    let (ctx, utterances, published) = job_context("room-1", "student-1", "");
    let deps = harness.session_deps("\u{1}");
    let session = tokio::spawn(pipeline_session_entrypoint(ctx, deps));

    utterances
        .send("What is seven times eight?".to_string())
        .unwrap();
    let events = collect_published(published, 4).await;
    drop(utterances);
    session.await.unwrap().unwrap();

    // Greeting, user turn, transition, specialist answer; the phantom user
    // item never reaches the data channel.
    assert_eq!(events[0]["speaker"], "orchestrator");
    assert_eq!(events[0]["role"], "assistant");
    assert_eq!(events[1]["speaker"], "student");
    assert_eq!(events[1]["content"], "What is seven times eight?");
    assert_eq!(events[2]["speaker"], "orchestrator");
    assert_eq!(
        events[2]["content"],
        "Let me connect you with our Mathematics tutor!"
    );
    assert_eq!(events[3]["speaker"], "math");
    assert_eq!(events[3]["subject"], "math");
    assert_eq!(events[3]["content"], "Seven times eight is 56.");

    let turns: Vec<u64> = events
        .iter()
        .map(|event| event["turn"].as_u64().unwrap())
        .collect();
    assert_eq!(turns, vec![1, 2, 3, 4]);

    let session_id = events[0]["session_id"].as_str().unwrap();
    assert!(events
        .iter()
        .all(|event| event["session_id"] == session_id));
}

#[tokio::test(flavor = "multi_thread")]
async fn recovered_session_replays_the_question_under_the_same_id() {
    let harness = WorkerHarness::new();
    harness.factory.script(
        Subject::Orchestrator,
        ScriptedLlm::new(vec![Scripted::Say(vec![
            "Welcome back! Fractions are parts of a whole.",
        ])]),
    );

    let prior_id = Uuid::new_v4();
    let metadata = format!("return_from_english:{prior_id}|question:fractions|subject:english");
    let (ctx, utterances, published) = job_context("room-1", "student-1", &metadata);
    let deps = harness.session_deps("\u{1}");
    let session = tokio::spawn(pipeline_session_entrypoint(ctx, deps));

    let events = collect_published(published, 1).await;
    drop(utterances);
    session.await.unwrap().unwrap();

    // The replayed question is suppressed; only the answer is published,
    // and telemetry continues under the recovered session id.
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["role"], "assistant");
    assert_eq!(events[0]["speaker"], "orchestrator");
    assert_eq!(events[0]["session_id"], prior_id.to_string());
}
