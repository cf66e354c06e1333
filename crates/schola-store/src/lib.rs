//! Persistence surface for the Schola platform.
//!
//! Writes audit and transcript rows to the external relational store over
//! its REST surface using the service credential (which bypasses row-level
//! access control). Every write from the core is fire-and-forget: failures
//! are logged and never propagate into the speech path.
//!
//! Tables written: `learning_sessions`, `transcript_turns`,
//! `routing_decisions`, `escalation_events`, `guardrail_events`.

mod client;
mod error;

pub use client::{
    reset_store_client, set_store_client, spawn_write, store_client, StoreClient, StoreConfig,
};
pub use error::StoreError;
