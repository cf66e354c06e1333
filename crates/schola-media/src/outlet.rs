//! Room data-channel seam.

use crate::error::MediaError;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Publishes data packets onto a room, labelled by topic.
///
/// In production the worker harness hands the session an outlet backed by
/// the room's local participant; tests and the in-process harness use
/// [`ChannelOutlet`] to capture what would have been published.
#[async_trait]
pub trait RoomOutlet: Send + Sync {
    async fn publish_data(&self, topic: &str, payload: Vec<u8>) -> Result<(), MediaError>;
}

/// An outlet backed by an in-process channel.
#[derive(Debug, Clone)]
pub struct ChannelOutlet {
    sender: mpsc::UnboundedSender<(String, Vec<u8>)>,
}

impl ChannelOutlet {
    /// Returns the outlet and the receiving half carrying
    /// `(topic, payload)` pairs in publish order.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(String, Vec<u8>)>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl RoomOutlet for ChannelOutlet {
    async fn publish_data(&self, topic: &str, payload: Vec<u8>) -> Result<(), MediaError> {
        self.sender
            .send((topic.to_string(), payload))
            .map_err(|_| MediaError::Publish("room outlet closed".to_string()))
    }
}
