use thiserror::Error;

#[derive(Error, Debug)]
pub enum GuardrailError {
    #[error("moderation request failed: {0}")]
    Moderation(String),

    #[error("rewrite request failed: {0}")]
    Rewrite(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("missing credential: {0}")]
    MissingCredential(&'static str),
}
