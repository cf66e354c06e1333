use serde::{Deserialize, Serialize};
use std::fmt;

fn default_teacher_token_ttl_seconds() -> u64 {
    7200
}

/// Default URL used when no media-plane config is provided. Matches the
/// local `docker-compose.yml` dev stack.
pub const DEV_MEDIA_URL: &str = "ws://localhost:7880";
/// Default API key for the media plane's `--dev` mode.
pub const DEV_MEDIA_API_KEY: &str = "devkey";
/// Default API secret for the media plane's `--dev` mode.
pub const DEV_MEDIA_API_SECRET: &str = "secret";

#[derive(Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    pub url: String,
    pub api_key: String,
    #[serde(skip_serializing)]
    pub api_secret: String,
    /// TTL in seconds for teacher join tokens. Default: 7200 (2 hours).
    #[serde(default = "default_teacher_token_ttl_seconds")]
    pub teacher_token_ttl_seconds: u64,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            url: DEV_MEDIA_URL.to_string(),
            api_key: DEV_MEDIA_API_KEY.to_string(),
            api_secret: DEV_MEDIA_API_SECRET.to_string(),
            teacher_token_ttl_seconds: default_teacher_token_ttl_seconds(),
        }
    }
}

impl fmt::Debug for MediaConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaConfig")
            .field("url", &self.url)
            .field("api_key", &self.api_key)
            .field("api_secret", &"[REDACTED]")
            .field("teacher_token_ttl_seconds", &self.teacher_token_ttl_seconds)
            .finish()
    }
}

impl MediaConfig {
    pub fn new(
        url: impl Into<String>,
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            teacher_token_ttl_seconds: default_teacher_token_ttl_seconds(),
        }
    }

    /// Reads `LIVEKIT_URL`, `LIVEKIT_API_KEY`, `LIVEKIT_API_SECRET`,
    /// falling back to the dev defaults for anything unset.
    pub fn from_env() -> Self {
        Self {
            url: std::env::var("LIVEKIT_URL").unwrap_or_else(|_| DEV_MEDIA_URL.to_string()),
            api_key: std::env::var("LIVEKIT_API_KEY")
                .unwrap_or_else(|_| DEV_MEDIA_API_KEY.to_string()),
            api_secret: std::env::var("LIVEKIT_API_SECRET")
                .unwrap_or_else(|_| DEV_MEDIA_API_SECRET.to_string()),
            teacher_token_ttl_seconds: default_teacher_token_ttl_seconds(),
        }
    }
}
