//! Span taxonomy and attribute mapping.

use opentelemetry::trace::{Span, Tracer};
use opentelemetry::{global, KeyValue};
use schola_types::{ConversationRole, Subject};

/// Free-text span attributes are truncated to this many characters.
pub const ATTR_TRUNCATE_LIMIT: usize = 500;

/// Truncates a free-text attribute value to [`ATTR_TRUNCATE_LIMIT`] chars.
pub fn truncate_attr(text: &str) -> String {
    text.chars().take(ATTR_TRUNCATE_LIMIT).collect()
}

/// Which kind of session produced a span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionType {
    /// STT → LLM → TTS pipeline session.
    Pipeline,
    /// Audio-native realtime English session.
    RealtimeEnglish,
}

impl SessionType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pipeline => "pipeline",
            Self::RealtimeEnglish => "realtime_english",
        }
    }
}

/// One structured span, ready to emit.
///
/// Each variant corresponds to a span name; [`SpanEvent::attributes`] maps
/// the fields onto the mandatory attribute set for that span.
#[derive(Debug, Clone)]
pub enum SpanEvent {
    SessionStart {
        session_id: String,
        user_id: String,
        room_name: String,
        session_type: SessionType,
        /// Whether the session state was recovered from dispatch metadata.
        /// Pipeline sessions only.
        recovered: Option<bool>,
    },
    SessionEnd {
        session_id: String,
        user_id: String,
        session_type: SessionType,
        total_turns: u32,
        escalated: bool,
        subjects_covered: Vec<Subject>,
    },
    AgentActivated {
        agent: Subject,
        session_id: String,
        user_id: String,
        history_length: usize,
        last_user_message: String,
    },
    RoutingDecision {
        session_id: String,
        user_id: String,
        from_agent: Subject,
        to_agent: String,
        question_summary: String,
        previous_subject: Option<Subject>,
        decision_ms: u64,
        last_user_message: String,
        history_length: usize,
        turn_number: u32,
    },
    ConversationItem {
        session_id: String,
        user_id: String,
        subject: Option<Subject>,
        role: ConversationRole,
        session_type: SessionType,
        turn: u32,
        e2e_response_ms: Option<u64>,
    },
    TtsSentence {
        session_id: String,
        sentence_length: usize,
        guardrail_ms: u64,
        synthesis_ms: u64,
        rewritten: bool,
    },
    GuardrailCheck {
        session_id: String,
        text_length: usize,
        flagged: bool,
        peak_score: f64,
        check_ms: u64,
    },
    GuardrailRewrite {
        session_id: String,
        original_length: usize,
        rewritten_length: usize,
        rewrite_ms: u64,
    },
    TeacherEscalation {
        session_id: String,
        user_id: String,
        from_agent: Subject,
        reason: String,
        room_name: String,
        turn_number: u32,
    },
}

impl SpanEvent {
    /// Returns the span name for this event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SessionStart { .. } => "session.start",
            Self::SessionEnd { .. } => "session.end",
            Self::AgentActivated { .. } => "agent.activated",
            Self::RoutingDecision { .. } => "routing.decision",
            Self::ConversationItem { .. } => "conversation.item",
            Self::TtsSentence { .. } => "tts.sentence",
            Self::GuardrailCheck { .. } => "guardrail.check",
            Self::GuardrailRewrite { .. } => "guardrail.rewrite",
            Self::TeacherEscalation { .. } => "teacher.escalation",
        }
    }

    /// Maps the event onto its span attribute set.
    pub fn attributes(&self) -> Vec<KeyValue> {
        match self {
            Self::SessionStart {
                session_id,
                user_id,
                room_name,
                session_type,
                recovered,
            } => {
                let mut attrs = vec![
                    KeyValue::new("session.id", session_id.clone()),
                    KeyValue::new("user.id", user_id.clone()),
                    KeyValue::new("room.name", room_name.clone()),
                    KeyValue::new("session_type", session_type.as_str()),
                ];
                if let Some(recovered) = recovered {
                    attrs.push(KeyValue::new("recovered", *recovered));
                }
                attrs
            }
            Self::SessionEnd {
                session_id,
                user_id,
                session_type,
                total_turns,
                escalated,
                subjects_covered,
            } => vec![
                KeyValue::new("session.id", session_id.clone()),
                KeyValue::new("user.id", user_id.clone()),
                KeyValue::new("session_type", session_type.as_str()),
                KeyValue::new("total_turns", i64::from(*total_turns)),
                KeyValue::new("escalated", *escalated),
                KeyValue::new(
                    "subjects_covered",
                    subjects_covered
                        .iter()
                        .map(|s| s.as_str())
                        .collect::<Vec<_>>()
                        .join(","),
                ),
            ],
            Self::AgentActivated {
                agent,
                session_id,
                user_id,
                history_length,
                last_user_message,
            } => vec![
                KeyValue::new("agent.name", agent.as_str()),
                KeyValue::new("session.id", session_id.clone()),
                KeyValue::new("user.id", user_id.clone()),
                KeyValue::new("history_length", *history_length as i64),
                KeyValue::new("last_user_message", truncate_attr(last_user_message)),
            ],
            Self::RoutingDecision {
                session_id,
                user_id,
                from_agent,
                to_agent,
                question_summary,
                previous_subject,
                decision_ms,
                last_user_message,
                history_length,
                turn_number,
            } => vec![
                KeyValue::new("session.id", session_id.clone()),
                KeyValue::new("user.id", user_id.clone()),
                KeyValue::new("from_agent", from_agent.as_str()),
                KeyValue::new("to_agent", to_agent.clone()),
                KeyValue::new("question_summary", truncate_attr(question_summary)),
                KeyValue::new(
                    "previous_subject",
                    previous_subject.map(Subject::as_str).unwrap_or(""),
                ),
                KeyValue::new("decision_ms", *decision_ms as i64),
                KeyValue::new("last_user_message", truncate_attr(last_user_message)),
                KeyValue::new("history_length", *history_length as i64),
                KeyValue::new("turn_number", i64::from(*turn_number)),
            ],
            Self::ConversationItem {
                session_id,
                user_id,
                subject,
                role,
                session_type,
                turn,
                e2e_response_ms,
            } => {
                let mut attrs = vec![
                    KeyValue::new("session.id", session_id.clone()),
                    KeyValue::new("user.id", user_id.clone()),
                    KeyValue::new("subject_area", subject.map(Subject::as_str).unwrap_or("")),
                    KeyValue::new("role", role.as_str()),
                    KeyValue::new("session_type", session_type.as_str()),
                    KeyValue::new("turn", i64::from(*turn)),
                ];
                if let Some(ms) = e2e_response_ms {
                    attrs.push(KeyValue::new("e2e_response_ms", *ms as i64));
                }
                attrs
            }
            Self::TtsSentence {
                session_id,
                sentence_length,
                guardrail_ms,
                synthesis_ms,
                rewritten,
            } => vec![
                KeyValue::new("session.id", session_id.clone()),
                KeyValue::new("sentence_length", *sentence_length as i64),
                KeyValue::new("guardrail_ms", *guardrail_ms as i64),
                KeyValue::new("synthesis_ms", *synthesis_ms as i64),
                KeyValue::new("rewritten", *rewritten),
            ],
            Self::GuardrailCheck {
                session_id,
                text_length,
                flagged,
                peak_score,
                check_ms,
            } => vec![
                KeyValue::new("session.id", session_id.clone()),
                KeyValue::new("text_length", *text_length as i64),
                KeyValue::new("flagged", *flagged),
                KeyValue::new("peak_score", *peak_score),
                KeyValue::new("check_ms", *check_ms as i64),
            ],
            Self::GuardrailRewrite {
                session_id,
                original_length,
                rewritten_length,
                rewrite_ms,
            } => vec![
                KeyValue::new("session.id", session_id.clone()),
                KeyValue::new("original_length", *original_length as i64),
                KeyValue::new("rewritten_length", *rewritten_length as i64),
                KeyValue::new("rewrite_ms", *rewrite_ms as i64),
            ],
            Self::TeacherEscalation {
                session_id,
                user_id,
                from_agent,
                reason,
                room_name,
                turn_number,
            } => vec![
                KeyValue::new("session.id", session_id.clone()),
                KeyValue::new("user.id", user_id.clone()),
                KeyValue::new("from_agent", from_agent.as_str()),
                KeyValue::new("reason", truncate_attr(reason)),
                KeyValue::new("room.name", room_name.clone()),
                KeyValue::new("turn_number", i64::from(*turn_number)),
            ],
        }
    }

    /// Starts and immediately ends a span carrying this event's attributes
    /// on the globally installed tracer.
    pub fn emit(&self) {
        let tracer = global::tracer("schola-agent");
        let mut span = tracer
            .span_builder(self.name())
            .with_attributes(self.attributes())
            .start(&tracer);
        span.end();
    }
}
