//! REST client for the external relational store.

use crate::error::StoreError;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use schola_guardrail::{SafetyAudit, SafetyEvent};
use schola_types::{ConversationRole, Speaker, Subject};
use serde_json::{json, Value};
use std::future::Future;
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// Timeout for one store write.
const STORE_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection settings for the store's REST surface.
#[derive(Clone)]
pub struct StoreConfig {
    pub base_url: String,
    pub service_key: String,
}

impl StoreConfig {
    /// Reads `SCHOLA_STORE_URL` and `SCHOLA_STORE_SERVICE_KEY`.
    pub fn from_env() -> Result<Self, StoreError> {
        Ok(Self {
            base_url: std::env::var("SCHOLA_STORE_URL")
                .map_err(|_| StoreError::MissingCredential("SCHOLA_STORE_URL"))?,
            service_key: std::env::var("SCHOLA_STORE_SERVICE_KEY")
                .map_err(|_| StoreError::MissingCredential("SCHOLA_STORE_SERVICE_KEY"))?,
        })
    }
}

impl std::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConfig")
            .field("base_url", &self.base_url)
            .field("service_key", &"[REDACTED]")
            .finish()
    }
}

/// Client for the store. Cheap to clone; shared across sessions.
#[derive(Debug, Clone)]
pub struct StoreClient {
    client: reqwest::Client,
    config: StoreConfig,
}

impl StoreClient {
    pub fn new(config: StoreConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(STORE_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client, config }
    }

    fn table_url(&self, table: &str) -> String {
        format!(
            "{}/rest/v1/{table}",
            self.config.base_url.trim_end_matches('/')
        )
    }

    async fn insert(&self, table: &str, row: Value) -> Result<(), StoreError> {
        self.client
            .post(self.table_url(table))
            .header("apikey", &self.config.service_key)
            .bearer_auth(&self.config.service_key)
            .json(&row)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn update_by_session(
        &self,
        table: &str,
        session_id: &str,
        patch: Value,
    ) -> Result<(), StoreError> {
        self.client
            .patch(self.table_url(table))
            .query(&[("session_id", format!("eq.{session_id}"))])
            .header("apikey", &self.config.service_key)
            .bearer_auth(&self.config.service_key)
            .json(&patch)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// Inserts the `learning_sessions` row at session start.
    pub async fn create_session_record(
        &self,
        session_id: &str,
        room_name: &str,
        student_identity: &str,
    ) -> Result<(), StoreError> {
        self.insert(
            "learning_sessions",
            json!({
                "session_id": session_id,
                "room_name": room_name,
                "student_identity": student_identity,
            }),
        )
        .await
    }

    /// Stamps `ended_at` and attaches the session report on close.
    pub async fn close_session_record(
        &self,
        session_id: &str,
        session_report: Value,
    ) -> Result<(), StoreError> {
        self.update_by_session(
            "learning_sessions",
            session_id,
            json!({
                "ended_at": Utc::now().to_rfc3339(),
                "session_report": session_report,
            }),
        )
        .await
    }

    /// Inserts one committed transcript turn.
    pub async fn save_transcript_turn(
        &self,
        session_id: &str,
        turn_number: u32,
        speaker: Speaker,
        role: ConversationRole,
        content: &str,
        subject_area: Option<Subject>,
    ) -> Result<(), StoreError> {
        self.insert(
            "transcript_turns",
            json!({
                "session_id": session_id,
                "turn_number": turn_number,
                "speaker": speaker.as_str(),
                "role": role.as_str(),
                "content": content,
                "subject_area": subject_area.map(Subject::as_str),
            }),
        )
        .await
    }

    /// Records an agent handoff decision.
    pub async fn save_routing_decision(
        &self,
        session_id: &str,
        turn_number: u32,
        from_agent: &str,
        to_agent: &str,
        question_summary: &str,
    ) -> Result<(), StoreError> {
        self.insert(
            "routing_decisions",
            json!({
                "session_id": session_id,
                "turn_number": turn_number,
                "from_agent": from_agent,
                "to_agent": to_agent,
                "question_summary": question_summary,
            }),
        )
        .await
    }

    /// Records a teacher escalation with its pre-signed join token. The row
    /// insert is what notifies the teacher portal.
    pub async fn save_escalation_event(
        &self,
        session_id: &str,
        room_name: &str,
        reason: &str,
        teacher_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.insert(
            "escalation_events",
            json!({
                "session_id": session_id,
                "room_name": room_name,
                "reason": reason,
                "teacher_token": teacher_token,
                "expires_at": expires_at.to_rfc3339(),
            }),
        )
        .await
    }

    /// Persists one guardrail audit record.
    pub async fn save_guardrail_event(&self, event: &SafetyEvent) -> Result<(), StoreError> {
        self.insert(
            "guardrail_events",
            json!({
                "session_id": event.session_id,
                "agent_name": event.agent_name,
                "original_text": event.original_text,
                "rewritten_text": event.rewritten_text,
                "categories_flagged": event.categories_flagged,
                "moderation_score": event.peak_score,
                "action_taken": event.action_taken,
            }),
        )
        .await
    }
}

impl SafetyAudit for StoreClient {
    fn record(&self, event: SafetyEvent) {
        let client = self.clone();
        spawn_write("guardrail_events", async move {
            client.save_guardrail_event(&event).await
        });
    }
}

/// Spawns a store write, logging any failure. The caller never waits.
pub fn spawn_write<F>(label: &'static str, write: F)
where
    F: Future<Output = Result<(), StoreError>> + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(error) = write.await {
            tracing::error!(table = label, %error, "store write failed");
        }
    });
}

static STORE: Lazy<RwLock<Option<Arc<StoreClient>>>> = Lazy::new(|| RwLock::new(None));

/// Returns the shared store client, creating it from the environment on
/// first use.
pub fn store_client() -> Result<Arc<StoreClient>, StoreError> {
    if let Some(client) = STORE.read().expect("store lock").as_ref() {
        return Ok(client.clone());
    }
    let mut slot = STORE.write().expect("store lock");
    if let Some(client) = slot.as_ref() {
        return Ok(client.clone());
    }
    let client = Arc::new(StoreClient::new(StoreConfig::from_env()?));
    *slot = Some(client.clone());
    Ok(client)
}

/// Replaces the store singleton (test injection).
pub fn set_store_client(client: Arc<StoreClient>) {
    *STORE.write().expect("store lock") = Some(client);
}

/// Drops the store singleton. Call in test teardown.
pub fn reset_store_client() {
    *STORE.write().expect("store lock") = None;
}
