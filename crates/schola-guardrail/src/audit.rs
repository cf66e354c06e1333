//! Safety-event audit records.

use chrono::{DateTime, Utc};

/// One rewrite (or post-hoc detection) worth of audit trail.
#[derive(Debug, Clone)]
pub struct SafetyEvent {
    pub session_id: String,
    pub agent_name: String,
    pub original_text: String,
    pub rewritten_text: String,
    pub categories_flagged: Vec<String>,
    pub peak_score: f64,
    /// `rewrite` for the guarded text path, `audit_only` for post-hoc
    /// detections on the realtime path.
    pub action_taken: &'static str,
    pub occurred_at: DateTime<Utc>,
}

impl SafetyEvent {
    pub fn rewrite(
        session_id: impl Into<String>,
        agent_name: impl Into<String>,
        original_text: impl Into<String>,
        rewritten_text: impl Into<String>,
        categories_flagged: Vec<String>,
        peak_score: f64,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            agent_name: agent_name.into(),
            original_text: original_text.into(),
            rewritten_text: rewritten_text.into(),
            categories_flagged,
            peak_score,
            action_taken: "rewrite",
            occurred_at: Utc::now(),
        }
    }

    pub fn audit_only(
        session_id: impl Into<String>,
        agent_name: impl Into<String>,
        original_text: impl Into<String>,
        categories_flagged: Vec<String>,
        peak_score: f64,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            agent_name: agent_name.into(),
            original_text: original_text.into(),
            rewritten_text: "[post-hoc detection only — realtime path]".to_string(),
            categories_flagged,
            peak_score,
            action_taken: "audit_only",
            occurred_at: Utc::now(),
        }
    }
}

/// Sink for safety events.
///
/// `record` is synchronous and must not block: implementations spawn their
/// own write task so the speech path never waits on the audit trail.
pub trait SafetyAudit: Send + Sync {
    fn record(&self, event: SafetyEvent);
}

/// Discards events. Used when no store is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAudit;

impl SafetyAudit for NoopAudit {
    fn record(&self, _event: SafetyEvent) {}
}
