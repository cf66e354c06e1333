//! Telemetry surface for the Schola platform.
//!
//! Emits structured spans over OTLP/HTTP protobuf. The target backend
//! ingests at `{host}/api/public/otel/v1/traces` with Basic auth and does
//! not accept gRPC, so the exporter is pinned to the HTTP binary protocol.
//!
//! Session id and user id ride on every span as plain attributes (not trace
//! context alone) because the backend filters by them.
//!
//! # Span taxonomy
//!
//! | Span | Emitted by |
//! |------|-----------|
//! | `session.start` / `session.end` | worker entrypoints |
//! | `agent.activated` | agent activation hook |
//! | `routing.decision` | routing controller |
//! | `conversation.item` | item handlers on both workers |
//! | `tts.sentence` | guarded synthesis path |
//! | `guardrail.check` / `guardrail.rewrite` | safety filter |
//! | `teacher.escalation` | escalation tool |

mod setup;
mod span;

pub use setup::{init, TelemetryConfig, TelemetryError};
pub use span::{truncate_attr, SessionType, SpanEvent, ATTR_TRUNCATE_LIMIT};

use opentelemetry::global;
use opentelemetry::trace::Tracer;

/// Returns a tracer for manual span creation.
pub fn tracer() -> impl Tracer {
    global::tracer("schola-agent")
}
