//! Per-room session state carried across agent handoffs.

use crate::subject::Subject;
use chrono::{DateTime, Utc};
use serde_json::json;
use std::time::Instant;
use uuid::Uuid;

/// Shared mutable record for one student visit.
///
/// One live instance per room. Attached to the pipeline session as userdata
/// and recreated on the realtime worker from dispatch metadata so both
/// workers trace under the same `session_id`.
#[derive(Debug, Clone)]
pub struct SessionState {
    /// Stable for the life of the student's visit; survives worker-to-worker
    /// handoff via dispatch metadata. Immutable once assigned.
    pub session_id: Uuid,
    pub student_identity: String,
    pub room_name: String,
    /// The routed-to subject.
    pub current_subject: Option<Subject>,
    /// The currently-speaking subject. Distinct from `current_subject` so the
    /// transition sentence is attributed to the outgoing agent.
    pub speaking_agent: Option<Subject>,
    /// Prior `current_subject` values, oldest first.
    pub previous_subjects: Vec<Subject>,
    /// Count of committed conversation items.
    pub turn_number: u32,
    /// While > 0, the next user-role items are suppressed from transcript
    /// emission and the counter decremented.
    pub skip_next_user_turns: u32,
    /// Monotonic latch; never clears within the session.
    pub escalated: bool,
    pub escalation_reason: Option<String>,
    /// Set when a user utterance is committed; consumed when computing the
    /// end-to-end latency of the next assistant item.
    pub last_user_input_at: Option<Instant>,
    pub created_at: DateTime<Utc>,
}

impl SessionState {
    /// Creates fresh state with a new session id.
    pub fn new(student_identity: impl Into<String>, room_name: impl Into<String>) -> Self {
        Self::with_session_id(Uuid::new_v4(), student_identity, room_name)
    }

    /// Creates state bound to an existing session id (recovery from dispatch
    /// metadata on the realtime worker or on return-from-english).
    pub fn with_session_id(
        session_id: Uuid,
        student_identity: impl Into<String>,
        room_name: impl Into<String>,
    ) -> Self {
        Self {
            session_id,
            student_identity: student_identity.into(),
            room_name: room_name.into(),
            current_subject: None,
            speaking_agent: None,
            previous_subjects: Vec::new(),
            turn_number: 0,
            skip_next_user_turns: 0,
            escalated: false,
            escalation_reason: None,
            last_user_input_at: None,
            created_at: Utc::now(),
        }
    }

    /// Records a routing decision. Pushes the old subject onto
    /// `previous_subjects` unless the target equals the current subject
    /// (re-routing to the same subject must not duplicate the history).
    pub fn route_to(&mut self, subject: Subject) {
        if self.current_subject == Some(subject) {
            return;
        }
        if let Some(previous) = self.current_subject {
            self.previous_subjects.push(previous);
        }
        self.current_subject = Some(subject);
    }

    /// Increments and returns the turn number.
    pub fn advance_turn(&mut self) -> u32 {
        self.turn_number += 1;
        self.turn_number
    }

    /// Decrements the suppression counter if set. Returns `true` when the
    /// caller should drop the current user item.
    pub fn consume_skip(&mut self) -> bool {
        if self.skip_next_user_turns > 0 {
            self.skip_next_user_turns -= 1;
            true
        } else {
            false
        }
    }

    /// Flips the escalation latch. Returns `true` only on the first call;
    /// the latch and the original reason survive repeat calls.
    pub fn escalate(&mut self, reason: impl Into<String>) -> bool {
        if self.escalated {
            return false;
        }
        self.escalated = true;
        self.escalation_reason = Some(reason.into());
        true
    }

    /// Marks the arrival of a committed user utterance.
    pub fn mark_user_input(&mut self) {
        self.last_user_input_at = Some(Instant::now());
    }

    /// Consumes the pending user-input timestamp, returning the elapsed
    /// milliseconds if one was set.
    pub fn take_response_latency_ms(&mut self) -> Option<u64> {
        self.last_user_input_at
            .take()
            .map(|at| at.elapsed().as_millis() as u64)
    }

    /// Deduplicated set of subjects the session has touched, oldest first.
    pub fn subjects_covered(&self) -> Vec<Subject> {
        let mut covered = Vec::new();
        for subject in self
            .previous_subjects
            .iter()
            .chain(self.current_subject.iter())
        {
            if !covered.contains(subject) {
                covered.push(*subject);
            }
        }
        covered
    }

    /// Session report written to the store row on close.
    pub fn session_report(&self) -> serde_json::Value {
        json!({
            "session_id": self.session_id.to_string(),
            "student_identity": self.student_identity,
            "room_name": self.room_name,
            "subjects_covered": self.subjects_covered(),
            "total_turns": self.turn_number,
            "escalated": self.escalated,
            "escalation_reason": self.escalation_reason,
            "created_at": self.created_at.to_rfc3339(),
        })
    }
}
