//! Lazy per-process singleton clients.
//!
//! Created from the environment on first use and shared by every session in
//! the worker. Tests inject fakes with the `set_*` functions and call
//! [`reset_clients`] in teardown.

use crate::error::GuardrailError;
use crate::moderation::{ModerationApi, OpenAiModeration};
use crate::rewrite::{AnthropicRewriter, RewriterApi};
use once_cell::sync::Lazy;
use std::sync::{Arc, RwLock};

static MODERATION: Lazy<RwLock<Option<Arc<dyn ModerationApi>>>> = Lazy::new(|| RwLock::new(None));
static REWRITER: Lazy<RwLock<Option<Arc<dyn RewriterApi>>>> = Lazy::new(|| RwLock::new(None));

/// Returns the shared moderation client, creating it from the environment on
/// first use.
pub fn moderation_client() -> Result<Arc<dyn ModerationApi>, GuardrailError> {
    if let Some(client) = MODERATION.read().expect("moderation lock").as_ref() {
        return Ok(client.clone());
    }
    let mut slot = MODERATION.write().expect("moderation lock");
    if let Some(client) = slot.as_ref() {
        return Ok(client.clone());
    }
    let client: Arc<dyn ModerationApi> = Arc::new(OpenAiModeration::from_env()?);
    *slot = Some(client.clone());
    Ok(client)
}

/// Returns the shared rewriter client, creating it from the environment on
/// first use.
pub fn rewriter_client() -> Result<Arc<dyn RewriterApi>, GuardrailError> {
    if let Some(client) = REWRITER.read().expect("rewriter lock").as_ref() {
        return Ok(client.clone());
    }
    let mut slot = REWRITER.write().expect("rewriter lock");
    if let Some(client) = slot.as_ref() {
        return Ok(client.clone());
    }
    let client: Arc<dyn RewriterApi> = Arc::new(AnthropicRewriter::from_env()?);
    *slot = Some(client.clone());
    Ok(client)
}

/// Replaces the moderation singleton (test injection).
pub fn set_moderation_client(client: Arc<dyn ModerationApi>) {
    *MODERATION.write().expect("moderation lock") = Some(client);
}

/// Replaces the rewriter singleton (test injection).
pub fn set_rewriter_client(client: Arc<dyn RewriterApi>) {
    *REWRITER.write().expect("rewriter lock") = Some(client);
}

/// Drops both singletons. Call in test teardown.
pub fn reset_clients() {
    *MODERATION.write().expect("moderation lock") = None;
    *REWRITER.write().expect("rewriter lock") = None;
}
