//! Media-plane control service client.
//!
//! Consumes the hosted WebRTC service's control surface: agent dispatch to a
//! named worker in a specific room, and pre-signed join tokens. Media I/O
//! itself (audio frames, data packets) stays behind the [`RoomOutlet`]
//! seam; the transport is owned by the hosted service, not this crate.

mod config;
mod error;
mod outlet;
mod service;

pub use config::{MediaConfig, DEV_MEDIA_API_KEY, DEV_MEDIA_API_SECRET, DEV_MEDIA_URL};
pub use error::MediaError;
pub use outlet::{ChannelOutlet, RoomOutlet};
pub use service::{DispatchControl, MediaControl};
