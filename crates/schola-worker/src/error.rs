use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("agent error: {0}")]
    Agent(#[from] schola_agents::AgentError),

    #[error("media-plane error: {0}")]
    Media(#[from] schola_media::MediaError),

    #[error("guardrail error: {0}")]
    Guardrail(#[from] schola_guardrail::GuardrailError),

    #[error("realtime transport error: {0}")]
    Realtime(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("missing credential: {0}")]
    MissingCredential(&'static str),
}
