//! Shared vocabulary for the Schola voice tutoring platform.
//!
//! Defines the subject/speaker vocabulary, the per-room session state carried
//! across agent handoffs, the transcript event published on the room data
//! channel, and the dispatch-metadata codec used to pass context between the
//! pipeline worker and the realtime worker.
//!
//! # Worker names
//!
//! | Worker | Registered name | Hosts |
//! |--------|-----------------|-------|
//! | Pipeline | `learning-orchestrator` | orchestrator, math, history |
//! | Realtime | `learning-english` | english (audio-native) |

mod metadata;
mod session;
mod subject;
mod transcript;

pub use metadata::DispatchMetadata;
pub use session::SessionState;
pub use subject::{ConversationRole, ParseSubjectError, Speaker, Subject};
pub use transcript::TranscriptEvent;

/// Registered name of the pipeline (STT → LLM → TTS) worker.
pub const PIPELINE_AGENT_NAME: &str = "learning-orchestrator";

/// Registered name of the realtime (audio-native English) worker.
pub const REALTIME_AGENT_NAME: &str = "learning-english";

/// Data-channel topic for transcript events.
pub const TRANSCRIPT_TOPIC: &str = "transcript";
