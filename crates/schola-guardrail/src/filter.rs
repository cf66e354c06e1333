//! The combined check-and-possibly-rewrite pipeline.

use crate::audit::{SafetyAudit, SafetyEvent};
use crate::clients;
use crate::error::GuardrailError;
use crate::moderation::{ModerationApi, ModerationVerdict};
use crate::rewrite::{RewriterApi, FALLBACK_REWRITE};
use schola_telemetry::SpanEvent;
use std::sync::Arc;
use std::time::Instant;

/// Per-sentence safety filter.
///
/// Holds no mutable state; one instance is shared by every agent in a
/// worker process.
#[derive(Clone)]
pub struct SafetyFilter {
    moderation: Arc<dyn ModerationApi>,
    rewriter: Arc<dyn RewriterApi>,
    audit: Arc<dyn SafetyAudit>,
}

impl SafetyFilter {
    pub fn new(
        moderation: Arc<dyn ModerationApi>,
        rewriter: Arc<dyn RewriterApi>,
        audit: Arc<dyn SafetyAudit>,
    ) -> Self {
        Self {
            moderation,
            rewriter,
            audit,
        }
    }

    /// Builds a filter over the process-wide lazy clients.
    pub fn from_env(audit: Arc<dyn SafetyAudit>) -> Result<Self, GuardrailError> {
        Ok(Self::new(
            clients::moderation_client()?,
            clients::rewriter_client()?,
            audit,
        ))
    }

    /// Runs the moderation check, emitting a `guardrail.check` span.
    ///
    /// Moderation failure reads as not-flagged: the speech path must not go
    /// silent because the telemetry side of safety is down.
    pub async fn check(&self, text: &str, session_id: &str) -> ModerationVerdict {
        let started = Instant::now();
        let verdict = match self.moderation.check(text).await {
            Ok(verdict) => verdict,
            Err(error) => {
                tracing::error!(%error, "moderation check failed — treating as not flagged");
                ModerationVerdict::default()
            }
        };
        SpanEvent::GuardrailCheck {
            session_id: session_id.to_string(),
            text_length: text.chars().count(),
            flagged: verdict.flagged,
            peak_score: verdict.peak_score,
            check_ms: started.elapsed().as_millis() as u64,
        }
        .emit();
        verdict
    }

    /// Rewrites flagged text, emitting a `guardrail.rewrite` span. Falls
    /// back to [`FALLBACK_REWRITE`] if the rewriter errors.
    pub async fn rewrite(&self, text: &str, session_id: &str) -> String {
        let started = Instant::now();
        let rewritten = match self.rewriter.rewrite(text).await {
            Ok(rewritten) => rewritten,
            Err(error) => {
                tracing::error!(%error, "rewrite failed — returning fallback sentence");
                FALLBACK_REWRITE.to_string()
            }
        };
        SpanEvent::GuardrailRewrite {
            session_id: session_id.to_string(),
            original_length: text.chars().count(),
            rewritten_length: rewritten.chars().count(),
            rewrite_ms: started.elapsed().as_millis() as u64,
        }
        .emit();
        rewritten
    }

    /// Returns safe-to-speak text: the original when clean, the rewrite when
    /// flagged. A flagged sentence fires one audit record asynchronously via
    /// the sink; the speech path does not wait on it.
    ///
    /// Returns the safe text plus whether a rewrite happened (surfaced on
    /// the enclosing `tts.sentence` span).
    pub async fn check_and_rewrite(
        &self,
        text: &str,
        session_id: &str,
        agent_name: &str,
    ) -> (String, bool) {
        let verdict = self.check(text, session_id).await;
        if !verdict.flagged {
            return (text.to_string(), false);
        }

        tracing::warn!(
            session_id,
            agent_name,
            categories = ?verdict.categories,
            "content flagged — rewriting before synthesis"
        );

        let safe_text = self.rewrite(text, session_id).await;
        self.audit.record(SafetyEvent::rewrite(
            session_id,
            agent_name,
            text,
            safe_text.clone(),
            verdict.categories,
            verdict.peak_score,
        ));
        (safe_text, true)
    }
}
