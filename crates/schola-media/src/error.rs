use thiserror::Error;

#[derive(Error, Debug)]
pub enum MediaError {
    #[error("access token error: {0}")]
    AccessToken(#[from] livekit_api::access_token::AccessTokenError),

    #[error("agent dispatch error: {0}")]
    Dispatch(String),

    #[error("data publish error: {0}")]
    Publish(String),
}
