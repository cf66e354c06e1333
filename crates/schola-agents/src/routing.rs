//! Cross-agent routing.
//!
//! The five routing operations the active agent's language model may call.
//! Tool-call payloads are reified into the [`RoutingTool`] variants and
//! dispatched in a single step. Every operation is idempotent per call and
//! emits a `routing.decision` (or `teacher.escalation`) span.

use crate::agent::GuardedAgent;
use crate::engines::ToolSpec;
use crate::error::AgentError;
use crate::session::{SessionDeps, SessionShared};
use chrono::{DateTime, Utc};
use schola_media::DispatchControl;
use schola_store::{spawn_write, StoreClient};
use schola_telemetry::SpanEvent;
use schola_types::{DispatchMetadata, Subject, REALTIME_AGENT_NAME};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How long the pipeline drains after a successful realtime dispatch before
/// closing. Tuned so the outgoing transition sentence finishes and the
/// realtime worker's first utterance lands about half a second later.
pub const PIPELINE_DRAIN: Duration = Duration::from_millis(3500);

/// Upper bound on the drain-and-close sequence; forces a graceful close
/// even if the drain task is lost.
pub const CLOSE_WATCHDOG: Duration = Duration::from_secs(30);

/// The routing toolset an agent can expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingToolName {
    RouteToMath,
    RouteToHistory,
    RouteToEnglish,
    RouteBackToOrchestrator,
    EscalateToTeacher,
}

impl RoutingToolName {
    pub fn name(self) -> &'static str {
        match self {
            Self::RouteToMath => "route_to_math",
            Self::RouteToHistory => "route_to_history",
            Self::RouteToEnglish => "route_to_english",
            Self::RouteBackToOrchestrator => "route_back_to_orchestrator",
            Self::EscalateToTeacher => "escalate_to_teacher",
        }
    }

    /// Tool schema presented to the language model.
    pub fn spec(self) -> ToolSpec {
        match self {
            Self::RouteToMath => ToolSpec {
                name: self.name(),
                description: "Route the student to the mathematics specialist",
                parameters: summary_schema("question_summary"),
            },
            Self::RouteToHistory => ToolSpec {
                name: self.name(),
                description: "Route the student to the history specialist",
                parameters: summary_schema("question_summary"),
            },
            Self::RouteToEnglish => ToolSpec {
                name: self.name(),
                description: "Route the student to the English language and literature specialist",
                parameters: summary_schema("question_summary"),
            },
            Self::RouteBackToOrchestrator => ToolSpec {
                name: self.name(),
                description: "Route back to the main tutor when the student changes \
                              subject or wants to end the session",
                parameters: summary_schema("reason"),
            },
            Self::EscalateToTeacher => ToolSpec {
                name: self.name(),
                description: "Escalate to a human teacher when the student is distressed, \
                              asks something inappropriate, or you are unable to help \
                              effectively",
                parameters: summary_schema("reason"),
            },
        }
    }
}

fn summary_schema(field: &str) -> Value {
    let mut properties = serde_json::Map::new();
    properties.insert(field.to_string(), json!({ "type": "string" }));
    json!({
        "type": "object",
        "properties": properties,
        "required": [field],
    })
}

/// A reified routing tool call.
#[derive(Debug, Clone, PartialEq)]
pub enum RoutingTool {
    RouteToMath { question_summary: String },
    RouteToHistory { question_summary: String },
    RouteToEnglish { question_summary: String },
    RouteBackToOrchestrator { reason: String },
    EscalateToTeacher { reason: String },
}

impl RoutingTool {
    /// Decodes a tool-call payload from the language model.
    pub fn parse(call: &crate::engines::ToolCallRequest) -> Result<Self, AgentError> {
        let arg = |key: &str| -> Result<String, AgentError> {
            call.arguments
                .get(key)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| AgentError::BadToolArguments {
                    tool: call.name.clone(),
                    message: format!("missing string argument '{key}'"),
                })
        };

        match call.name.as_str() {
            "route_to_math" => Ok(Self::RouteToMath {
                question_summary: arg("question_summary")?,
            }),
            "route_to_history" => Ok(Self::RouteToHistory {
                question_summary: arg("question_summary")?,
            }),
            "route_to_english" => Ok(Self::RouteToEnglish {
                question_summary: arg("question_summary")?,
            }),
            "route_back_to_orchestrator" => Ok(Self::RouteBackToOrchestrator {
                reason: arg("reason")?,
            }),
            "escalate_to_teacher" => Ok(Self::EscalateToTeacher {
                reason: arg("reason")?,
            }),
            other => Err(AgentError::UnknownTool(other.to_string())),
        }
    }

    /// Executes the routing decision against the session.
    pub async fn execute(self, ctx: &RoutingContext<'_>) -> Result<RoutingOutcome, AgentError> {
        let started = Instant::now();
        match self {
            Self::RouteToMath { question_summary } => {
                swap_route(
                    ctx,
                    Subject::Math,
                    question_summary,
                    "Let me connect you with our Mathematics tutor!",
                    started,
                )
                .await
            }
            Self::RouteToHistory { question_summary } => {
                swap_route(
                    ctx,
                    Subject::History,
                    question_summary,
                    "Let me connect you with our History tutor!",
                    started,
                )
                .await
            }
            Self::RouteBackToOrchestrator { reason } => {
                swap_route(
                    ctx,
                    Subject::Orchestrator,
                    reason,
                    "Let me take you back to our main tutor!",
                    started,
                )
                .await
            }
            Self::RouteToEnglish { question_summary } => {
                route_to_english(ctx, question_summary, started).await
            }
            Self::EscalateToTeacher { reason } => escalate(ctx, reason).await,
        }
    }
}

/// What the session does after a routing call returns.
pub enum RoutingOutcome {
    /// In-session handoff: speak the transition through the outgoing agent,
    /// then activate the new agent.
    Swap {
        agent: GuardedAgent,
        transition: String,
    },
    /// Out-of-session handoff or acknowledgement: speak the text, keep the
    /// current agent.
    Spoken(String),
    /// Target equals the current subject: nothing to do.
    Stay,
}

/// Everything a routing operation can see.
pub struct RoutingContext<'a> {
    pub from_agent: Subject,
    pub shared: &'a Arc<SessionShared>,
    pub deps: &'a SessionDeps,
    pub history_length: usize,
    pub last_user_message: String,
}

/// Sink for escalation events. `record` is synchronous fire-and-forget.
pub trait EscalationSink: Send + Sync {
    fn record(
        &self,
        session_id: &str,
        room_name: &str,
        reason: &str,
        teacher_token: &str,
        expires_at: DateTime<Utc>,
    );
}

impl EscalationSink for StoreClient {
    fn record(
        &self,
        session_id: &str,
        room_name: &str,
        reason: &str,
        teacher_token: &str,
        expires_at: DateTime<Utc>,
    ) {
        let client = self.clone();
        let session_id = session_id.to_string();
        let room_name = room_name.to_string();
        let reason = reason.to_string();
        let teacher_token = teacher_token.to_string();
        spawn_write("escalation_events", async move {
            client
                .save_escalation_event(&session_id, &room_name, &reason, &teacher_token, expires_at)
                .await
        });
    }
}

/// Discards escalation events. Used when no store is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEscalation;

impl EscalationSink for NoopEscalation {
    fn record(&self, _: &str, _: &str, _: &str, _: &str, _: DateTime<Utc>) {}
}

struct DecisionSnapshot {
    session_id: String,
    user_id: String,
    room_name: String,
    previous_subject: Option<Subject>,
    turn_number: u32,
    same_target: bool,
}

/// Applies the state mutation for a routing decision under one short lock.
fn apply_route(ctx: &RoutingContext<'_>, target: Subject) -> DecisionSnapshot {
    let mut state = ctx.shared.state();
    let same_target = state.current_subject == Some(target);
    let previous_subject = state.current_subject;
    if !same_target {
        state.route_to(target);
        // Pre-set so the first drain-phase utterance is attributed to the
        // incoming agent; the transition sentence itself is attributed by
        // the session to the outgoing agent.
        state.speaking_agent = Some(target);
    }
    DecisionSnapshot {
        session_id: state.session_id.to_string(),
        user_id: state.student_identity.clone(),
        room_name: state.room_name.clone(),
        previous_subject,
        turn_number: state.turn_number,
        same_target,
    }
}

fn emit_decision_span(
    ctx: &RoutingContext<'_>,
    snapshot: &DecisionSnapshot,
    to_agent: &str,
    question_summary: &str,
    started: Instant,
) {
    SpanEvent::RoutingDecision {
        session_id: snapshot.session_id.clone(),
        user_id: snapshot.user_id.clone(),
        from_agent: ctx.from_agent,
        to_agent: to_agent.to_string(),
        question_summary: question_summary.to_string(),
        previous_subject: snapshot.previous_subject,
        decision_ms: started.elapsed().as_millis() as u64,
        last_user_message: ctx.last_user_message.clone(),
        history_length: ctx.history_length,
        turn_number: snapshot.turn_number,
    }
    .emit();
}

fn persist_decision(
    ctx: &RoutingContext<'_>,
    snapshot: &DecisionSnapshot,
    to_agent: &'static str,
    question_summary: &str,
) {
    if let Some(store) = &ctx.deps.store {
        let store = store.clone();
        let session_id = snapshot.session_id.clone();
        let turn_number = snapshot.turn_number;
        let from_agent = ctx.from_agent.as_str();
        let question_summary = question_summary.to_string();
        spawn_write("routing_decisions", async move {
            store
                .save_routing_decision(
                    &session_id,
                    turn_number,
                    from_agent,
                    to_agent,
                    &question_summary,
                )
                .await
        });
    }
}

/// In-session handoff to a pipeline specialist (or back to the
/// orchestrator).
async fn swap_route(
    ctx: &RoutingContext<'_>,
    target: Subject,
    question: String,
    transition: &str,
    started: Instant,
) -> Result<RoutingOutcome, AgentError> {
    let snapshot = apply_route(ctx, target);
    emit_decision_span(ctx, &snapshot, target.as_str(), &question, started);
    if snapshot.same_target {
        // Re-routing to the active subject never rebuilds the agent.
        return Ok(RoutingOutcome::Stay);
    }

    // Suppress the phantom user item produced when the incoming agent is
    // driven with the handed-over question as synthetic input. Counter, not
    // string matching: the model rephrases the question unpredictably.
    ctx.shared.state().skip_next_user_turns = 1;

    persist_decision(ctx, &snapshot, target.as_str(), &question);

    let agent = ctx.deps.factory.build(target)?;
    agent.set_pending_question(question.clone());
    tracing::info!(
        from = ctx.from_agent.as_str(),
        to = target.as_str(),
        session_id = %snapshot.session_id,
        "routing to specialist"
    );
    Ok(RoutingOutcome::Swap {
        agent,
        transition: transition.to_string(),
    })
}

/// Out-of-session handoff to the audio-native English worker.
async fn route_to_english(
    ctx: &RoutingContext<'_>,
    question: String,
    started: Instant,
) -> Result<RoutingOutcome, AgentError> {
    let snapshot = apply_route(ctx, Subject::English);
    emit_decision_span(ctx, &snapshot, "english", &question, started);
    if snapshot.same_target {
        return Ok(RoutingOutcome::Stay);
    }
    persist_decision(ctx, &snapshot, "english", &question);

    let metadata = DispatchMetadata::for_english_dispatch(
        &snapshot.session_id,
        &question,
        snapshot.previous_subject,
    );

    match ctx
        .deps
        .dispatch
        .dispatch_agent(REALTIME_AGENT_NAME, &snapshot.room_name, &metadata.format())
        .await
    {
        Ok(()) => {
            schedule_drain(ctx.shared.clone());
            Ok(RoutingOutcome::Spoken(
                "Let me connect you with our English tutor right away!".to_string(),
            ))
        }
        Err(error) => {
            tracing::warn!(
                %error,
                session_id = %snapshot.session_id,
                "failed to dispatch realtime English worker — degrading to pipeline English"
            );
            ctx.shared.state().skip_next_user_turns = 1;
            let agent = ctx.deps.factory.build(Subject::English)?;
            agent.set_pending_question(question.clone());
            Ok(RoutingOutcome::Swap {
                agent,
                transition: "Let me connect you with our English tutor!".to_string(),
            })
        }
    }
}

/// Drain-then-close after a successful realtime dispatch. The transition
/// sentence must finish before the session closes, so the close is a timed
/// graceful `aclose`, never an interrupt. Both tasks outlive the tool call.
fn schedule_drain(shared: Arc<SessionShared>) {
    let drain = shared.clone();
    tokio::spawn(async move {
        tokio::time::sleep(PIPELINE_DRAIN).await;
        tracing::info!("pipeline drain complete — closing session");
        drain.aclose();
    });

    tokio::spawn(async move {
        tokio::time::sleep(CLOSE_WATCHDOG).await;
        if !shared.is_closed() {
            tracing::warn!("drain watchdog fired — forcing graceful close");
            shared.aclose();
        }
    });
}

/// Latches the escalation flag, notifies the teacher portal, and returns
/// the spoken acknowledgement.
async fn escalate(ctx: &RoutingContext<'_>, reason: String) -> Result<RoutingOutcome, AgentError> {
    let (session_id, user_id, room_name, turn_number, newly_escalated) = {
        let mut state = ctx.shared.state();
        let newly = state.escalate(&reason);
        (
            state.session_id.to_string(),
            state.student_identity.clone(),
            state.room_name.clone(),
            state.turn_number,
            newly,
        )
    };

    SpanEvent::TeacherEscalation {
        session_id: session_id.clone(),
        user_id,
        from_agent: ctx.from_agent,
        reason: reason.clone(),
        room_name: room_name.clone(),
        turn_number,
    }
    .emit();

    if newly_escalated {
        tracing::warn!(
            session_id = %session_id,
            from = ctx.from_agent.as_str(),
            reason = %schola_telemetry::truncate_attr(&reason),
            "escalating to teacher"
        );

        if let Some(store) = &ctx.deps.store {
            let store = store.clone();
            let session_id = session_id.clone();
            let from_agent = ctx.from_agent.as_str();
            let reason = reason.clone();
            spawn_write("routing_decisions", async move {
                store
                    .save_routing_decision(
                        &session_id,
                        turn_number,
                        from_agent,
                        "teacher_escalation",
                        &reason,
                    )
                    .await
            });
        }

        // Token generation is local signing; failure leaves the latch set
        // and the student's session running.
        match ctx.deps.media.generate_teacher_token(&room_name) {
            Ok(token) => {
                let ttl = chrono::Duration::from_std(ctx.deps.media.teacher_token_ttl())
                    .unwrap_or_else(|_| chrono::Duration::hours(2));
                ctx.deps
                    .escalation
                    .record(&session_id, &room_name, &reason, &token, Utc::now() + ttl);
            }
            Err(error) => {
                tracing::error!(%error, "failed to generate teacher join token");
            }
        }
    }

    Ok(RoutingOutcome::Spoken(
        "I'd like to get your teacher involved to help with this. I've sent a \
         notification to your teacher, and they'll be joining us shortly. Please \
         hold on for a moment."
            .to_string(),
    ))
}
