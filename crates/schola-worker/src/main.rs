//! Schola worker binary.
//!
//! Registers as the pipeline worker or the realtime worker depending on
//! `AGENT_TYPE`, then serves room-join jobs until SIGINT/SIGTERM.

use schola_agents::{EnvAgentFactory, NoopEscalation, OpenAiSpeech, VoiceActivityDetector};
use schola_guardrail::{NoopAudit, SafetyAudit, SafetyFilter};
use schola_media::{MediaConfig, MediaControl};
use schola_store::store_client;
use schola_telemetry::TelemetryConfig;
use schola_worker::pipeline::pipeline_session_entrypoint;
use schola_worker::realtime::{english_session_entrypoint, RealtimeDeps};
use schola_worker::realtime_model::OpenAiRealtime;
use schola_worker::vad::SileroVad;
use schola_worker::worker::{shutdown_signal, DispatchJobSource, JobSource, LoggingOutlet};
use schola_worker::{load_config, Config, WorkerError, WorkerKind};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn resolve_config_path() -> Option<String> {
    if let Some(path) = std::env::args()
        .nth(1)
        .filter(|value| !value.trim().is_empty())
    {
        return Some(path);
    }
    std::env::var("SCHOLA_CONFIG_PATH")
        .ok()
        .filter(|path| !path.trim().is_empty())
}

#[tokio::main]
async fn main() {
    // Worker selection is a startup contract: an unknown AGENT_TYPE means
    // this process must refuse to serve.
    let kind = WorkerKind::from_env()
        .expect("AGENT_TYPE must be 'orchestrator' or 'english' — the worker cannot start");

    let config_path = resolve_config_path().or(Some("config.toml".to_string()));
    let config = load_config(config_path.as_deref())
        .expect("failed to load configuration — the worker cannot start without valid config");

    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));
    if config.logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let telemetry = schola_telemetry::init(&TelemetryConfig::from_env())
        .expect("failed to configure telemetry export");

    tracing::info!(agent_name = kind.agent_name(), "worker starting");

    let result = match kind {
        WorkerKind::Pipeline => run_pipeline_worker(&config).await,
        WorkerKind::RealtimeEnglish => run_realtime_worker().await,
    };
    if let Err(error) = result {
        tracing::error!(%error, "worker terminated with error");
    }

    if let Some(provider) = telemetry {
        if let Err(error) = provider.shutdown() {
            tracing::warn!(%error, "failed to flush telemetry on shutdown");
        }
    }
    tracing::info!("worker shut down");
}

/// Store client plus the audit/escalation sinks derived from it. The
/// worker serves without persistence when the store is unconfigured.
fn store_and_audit() -> (
    Option<Arc<schola_store::StoreClient>>,
    Arc<dyn SafetyAudit>,
) {
    match store_client() {
        Ok(client) => {
            let audit: Arc<dyn SafetyAudit> = client.clone();
            (Some(client), audit)
        }
        Err(error) => {
            tracing::warn!(%error, "store not configured — persistence disabled");
            (None, Arc::new(NoopAudit))
        }
    }
}

async fn run_pipeline_worker(config: &Config) -> Result<(), WorkerError> {
    // Prewarm: the VAD load is asynchronous and awaited here so the first
    // student connection never pays for it.
    let vad: Option<Arc<dyn VoiceActivityDetector>> = match SileroVad::load(&config.vad).await {
        Ok(vad) => Some(Arc::new(vad)),
        Err(error) => {
            tracing::warn!(%error, "voice-activity model unavailable — endpointing degraded");
            None
        }
    };

    let (store, audit) = store_and_audit();
    let media = Arc::new(MediaControl::new(MediaConfig::from_env()));
    let deps = schola_agents::SessionDeps {
        filter: SafetyFilter::from_env(audit)?,
        tts: Arc::new(OpenAiSpeech::from_env()?),
        dispatch: media.clone(),
        media,
        escalation: store
            .clone()
            .map(|client| client as Arc<dyn schola_agents::EscalationSink>)
            .unwrap_or_else(|| Arc::new(NoopEscalation)),
        store,
        factory: Arc::new(EnvAgentFactory),
        vad,
    };

    let outlet = Arc::new(LoggingOutlet);
    let mut jobs = DispatchJobSource::new(
        &MediaConfig::from_env(),
        WorkerKind::Pipeline.agent_name(),
        outlet,
    );

    tokio::select! {
        () = async {
            while let Some(job) = jobs.next_job().await {
                let deps = deps.clone();
                tokio::spawn(async move {
                    if let Err(error) = pipeline_session_entrypoint(job, deps).await {
                        tracing::error!(%error, "pipeline session failed");
                    }
                });
            }
        } => {}
        () = shutdown_signal() => {}
    }
    Ok(())
}

async fn run_realtime_worker() -> Result<(), WorkerError> {
    let (store, audit) = store_and_audit();
    let media = Arc::new(MediaControl::new(MediaConfig::from_env()));
    let deps = RealtimeDeps {
        model: Arc::new(OpenAiRealtime::from_env()?),
        filter: SafetyFilter::from_env(audit.clone())?,
        audit,
        dispatch: media,
        store,
    };

    let outlet = Arc::new(LoggingOutlet);
    let mut jobs = DispatchJobSource::new(
        &MediaConfig::from_env(),
        WorkerKind::RealtimeEnglish.agent_name(),
        outlet,
    );

    tokio::select! {
        () = async {
            while let Some(job) = jobs.next_job().await {
                let deps = deps.clone();
                tokio::spawn(async move {
                    if let Err(error) = english_session_entrypoint(job, deps).await {
                        tracing::error!(%error, "realtime session failed");
                    }
                });
            }
        } => {}
        () = shutdown_signal() => {}
    }
    Ok(())
}
