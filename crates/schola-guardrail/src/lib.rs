//! Safety filter for synthesized speech.
//!
//! Two-stage check-and-possibly-rewrite pipeline applied to every sentence
//! before it reaches text-to-speech:
//!
//! 1. [`SafetyFilter::check`]: external moderation over the fixed
//!    thirteen-category vocabulary (~5 ms clean path).
//! 2. If flagged, [`SafetyFilter::rewrite`]: an age-appropriate rewrite by a
//!    small language model, then a fire-and-forget audit record.
//!
//! Moderation failure is treated as not-flagged (the speech path must never
//! stall on telemetry); rewriter failure yields a fixed fallback sentence.
//!
//! External clients are lazy per-process singletons, resettable for test
//! isolation via [`reset_clients`].

mod audit;
mod clients;
mod error;
mod filter;
mod moderation;
mod rewrite;

pub use audit::{NoopAudit, SafetyAudit, SafetyEvent};
pub use clients::{moderation_client, reset_clients, rewriter_client, set_moderation_client,
    set_rewriter_client};
pub use error::GuardrailError;
pub use filter::SafetyFilter;
pub use moderation::{ModerationApi, ModerationVerdict, OpenAiModeration, MODERATION_CATEGORIES};
pub use rewrite::{AnthropicRewriter, RewriterApi, FALLBACK_REWRITE};
