//! Dual-worker runtime for the Schola platform.
//!
//! A single binary registers against the media-plane control service as one
//! of two workers, selected by the `AGENT_TYPE` environment variable:
//!
//! - `orchestrator` → the pipeline worker (`learning-orchestrator`):
//!   STT → LLM → TTS sessions hosting the orchestrator and the math and
//!   history specialists, with the voice-activity model loaded at prewarm.
//! - `english` → the realtime worker (`learning-english`): audio-native
//!   English sessions in the same room, coordinated through dispatch
//!   metadata.

pub mod config;
mod error;
pub mod pipeline;
pub mod realtime;
pub mod realtime_model;
pub mod transcript;
pub mod vad;
pub mod worker;

pub use config::{load_config, Config};
pub use error::WorkerError;
pub use worker::{DispatchJobSource, JobContext, JobSource, QueueJobSource, WorkerKind};
