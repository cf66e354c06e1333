//! Transcript event published on the room data channel.

use crate::subject::{ConversationRole, Speaker, Subject};
use serde::{Deserialize, Serialize};

/// One committed conversation item, published as UTF-8 JSON on the
/// `transcript` topic for the student/teacher transcript panels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEvent {
    pub speaker: Speaker,
    pub role: ConversationRole,
    pub content: String,
    /// `null` until the first routing decision.
    pub subject: Option<Subject>,
    pub turn: u32,
    pub session_id: String,
}

impl TranscriptEvent {
    /// Serialises to the wire payload published on the data channel.
    pub fn to_payload(&self) -> Vec<u8> {
        // A struct of strings and ints cannot fail to serialise.
        serde_json::to_vec(self).expect("transcript event serialises")
    }
}
