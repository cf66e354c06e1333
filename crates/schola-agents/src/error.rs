use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("language model error: {0}")]
    Llm(String),

    #[error("speech synthesis error: {0}")]
    Synthesis(String),

    #[error("speech recognition error: {0}")]
    Stt(String),

    #[error("unknown tool call: {0}")]
    UnknownTool(String),

    #[error("bad arguments for tool {tool}: {message}")]
    BadToolArguments { tool: String, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("guardrail error: {0}")]
    Guardrail(#[from] schola_guardrail::GuardrailError),

    #[error("media-plane error: {0}")]
    Media(#[from] schola_media::MediaError),

    #[error("missing credential: {0}")]
    MissingCredential(&'static str),

    #[error("session closed")]
    SessionClosed,
}
