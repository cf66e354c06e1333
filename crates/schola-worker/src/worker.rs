//! Worker registration and room-join job intake.

use crate::error::WorkerError;
use async_trait::async_trait;
use livekit_api::services::agent_dispatch::AgentDispatchClient;
use livekit_api::services::room::RoomClient;
use schola_media::{MediaConfig, RoomOutlet};
use schola_types::{PIPELINE_AGENT_NAME, REALTIME_AGENT_NAME};
use std::collections::HashSet;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::mpsc;

/// Which worker this process registered as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerKind {
    /// `learning-orchestrator`: STT → LLM → TTS pipeline sessions.
    Pipeline,
    /// `learning-english`: audio-native realtime sessions.
    RealtimeEnglish,
}

impl WorkerKind {
    /// Reads the `AGENT_TYPE` selector. Anything other than
    /// `orchestrator` or `english` is a startup contract error; the worker
    /// refuses to serve.
    pub fn from_env() -> Result<Self, WorkerError> {
        match std::env::var("AGENT_TYPE").as_deref() {
            Ok("orchestrator") => Ok(Self::Pipeline),
            Ok("english") => Ok(Self::RealtimeEnglish),
            Ok(other) => Err(WorkerError::Config(format!(
                "unknown AGENT_TYPE '{other}' (expected 'orchestrator' or 'english')"
            ))),
            Err(_) => Err(WorkerError::Config(
                "AGENT_TYPE not set (expected 'orchestrator' or 'english')".to_string(),
            )),
        }
    }

    /// The name this worker registers under with the control service.
    pub fn agent_name(self) -> &'static str {
        match self {
            Self::Pipeline => PIPELINE_AGENT_NAME,
            Self::RealtimeEnglish => REALTIME_AGENT_NAME,
        }
    }
}

/// One accepted room-join job.
pub struct JobContext {
    pub room_name: String,
    /// Remote participant identities visible in the room; the student's is
    /// first. May still be filling while the room forms.
    pub participants: Arc<RwLock<Vec<String>>>,
    /// Dispatch metadata string attached to the job.
    pub metadata: String,
    /// Data-channel outlet for transcript events.
    pub outlet: Arc<dyn RoomOutlet>,
    /// Committed student utterances from the room's STT path. Closes when
    /// the student disconnects.
    pub utterances: mpsc::UnboundedReceiver<String>,
}

impl JobContext {
    /// The student's identity, waiting briefly for the room to finish
    /// forming before falling back to a placeholder.
    pub async fn resolve_student_identity(&self) -> String {
        if let Some(identity) = self.first_participant() {
            return identity;
        }
        // The room may still be forming when the job lands.
        tokio::time::sleep(Duration::from_secs(1)).await;
        self.first_participant()
            .unwrap_or_else(|| "unknown-student".to_string())
    }

    fn first_participant(&self) -> Option<String> {
        self.participants
            .read()
            .expect("participants lock")
            .first()
            .cloned()
    }
}

/// Source of room-join jobs for a registered worker.
#[async_trait]
pub trait JobSource: Send {
    /// Next accepted job, or `None` when the worker should shut down.
    async fn next_job(&mut self) -> Option<JobContext>;
}

/// In-process job queue. Backs tests and harnesses that drive the workers
/// directly.
pub struct QueueJobSource {
    jobs: mpsc::UnboundedReceiver<JobContext>,
}

impl QueueJobSource {
    pub fn new() -> (Self, mpsc::UnboundedSender<JobContext>) {
        let (tx, jobs) = mpsc::unbounded_channel();
        (Self { jobs }, tx)
    }
}

#[async_trait]
impl JobSource for QueueJobSource {
    async fn next_job(&mut self) -> Option<JobContext> {
        self.jobs.recv().await
    }
}

/// Interval between dispatch polls against the control service.
const DISPATCH_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Job intake backed by the media-plane control service: polls the agent
/// dispatches of every live room and yields one job per new dispatch that
/// names this worker.
///
/// The room's media I/O (audio frames, data-channel subscription, the STT
/// feed) is owned by the hosted media plane; the contexts yielded here
/// carry the control-plane view of the job.
pub struct DispatchJobSource {
    room_client: RoomClient,
    dispatch_client: AgentDispatchClient,
    agent_name: &'static str,
    outlet: Arc<dyn RoomOutlet>,
    seen: HashSet<String>,
    /// Senders for the per-job utterance feeds, held so the feeds stay
    /// open for the media-plane harness to connect.
    utterance_feeds: Vec<mpsc::UnboundedSender<String>>,
}

impl DispatchJobSource {
    pub fn new(config: &MediaConfig, agent_name: &'static str, outlet: Arc<dyn RoomOutlet>) -> Self {
        Self {
            room_client: RoomClient::with_api_key(&config.url, &config.api_key, &config.api_secret),
            dispatch_client: AgentDispatchClient::with_api_key(
                &config.url,
                &config.api_key,
                &config.api_secret,
            ),
            agent_name,
            outlet,
            seen: HashSet::new(),
            utterance_feeds: Vec::new(),
        }
    }

    async fn poll_once(&mut self) -> Option<JobContext> {
        let rooms = match self.room_client.list_rooms(vec![]).await {
            Ok(rooms) => rooms,
            Err(error) => {
                tracing::warn!(%error, "failed to list rooms while polling for dispatches");
                return None;
            }
        };

        for room in rooms {
            let dispatches = match self.dispatch_client.list_dispatch(&room.name).await {
                Ok(dispatches) => dispatches,
                Err(error) => {
                    tracing::warn!(room = %room.name, %error, "failed to list dispatches");
                    continue;
                }
            };
            for dispatch in dispatches {
                if dispatch.agent_name != self.agent_name || !self.seen.insert(dispatch.id.clone())
                {
                    continue;
                }
                let participants = match self.room_client.list_participants(&room.name).await {
                    Ok(list) => list.into_iter().map(|p| p.identity).collect(),
                    Err(_) => Vec::new(),
                };
                // The utterance feed belongs to the media plane's STT path;
                // the sender is parked here so the feed stays open for the
                // harness to connect.
                let (feed, utterances) = mpsc::unbounded_channel();
                self.utterance_feeds.push(feed);
                return Some(JobContext {
                    room_name: room.name.clone(),
                    participants: Arc::new(RwLock::new(participants)),
                    metadata: dispatch.metadata.clone(),
                    outlet: self.outlet.clone(),
                    utterances,
                });
            }
        }
        None
    }
}

#[async_trait]
impl JobSource for DispatchJobSource {
    async fn next_job(&mut self) -> Option<JobContext> {
        loop {
            if let Some(job) = self.poll_once().await {
                return Some(job);
            }
            tokio::time::sleep(DISPATCH_POLL_INTERVAL).await;
        }
    }
}

/// Outlet used when the room's data channel is not wired up (the media
/// plane owns the transport; its harness supplies the real outlet).
/// Transcript events are logged instead of dropped silently.
pub struct LoggingOutlet;

#[async_trait]
impl RoomOutlet for LoggingOutlet {
    async fn publish_data(
        &self,
        topic: &str,
        payload: Vec<u8>,
    ) -> Result<(), schola_media::MediaError> {
        tracing::debug!(topic, bytes = payload.len(), "transcript event (no room outlet wired)");
        Ok(())
    }
}

/// Waits for a SIGINT (Ctrl+C) or SIGTERM signal for graceful shutdown.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { tracing::info!("received SIGINT, initiating graceful shutdown"); }
        () = terminate => { tracing::info!("received SIGTERM, initiating graceful shutdown"); }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_type_selector_is_strict() {
        std::env::set_var("AGENT_TYPE", "orchestrator");
        assert_eq!(WorkerKind::from_env().unwrap(), WorkerKind::Pipeline);
        assert_eq!(WorkerKind::from_env().unwrap().agent_name(), "learning-orchestrator");

        std::env::set_var("AGENT_TYPE", "english");
        assert_eq!(WorkerKind::from_env().unwrap(), WorkerKind::RealtimeEnglish);
        assert_eq!(WorkerKind::from_env().unwrap().agent_name(), "learning-english");

        std::env::set_var("AGENT_TYPE", "chemistry");
        assert!(WorkerKind::from_env().is_err());
        std::env::remove_var("AGENT_TYPE");
        assert!(WorkerKind::from_env().is_err());
    }
}
