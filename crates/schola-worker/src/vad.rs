//! Voice-activity model, loaded at worker prewarm.

use crate::config::VadConfig;
use crate::error::WorkerError;
use schola_agents::VoiceActivityDetector;

/// The voice-activity model.
///
/// The weights are read asynchronously at prewarm so the first student
/// connection never pays the load; the media-plane audio path consumes
/// them for endpointing inference via [`SileroVad::model_bytes`]. The
/// local [`VoiceActivityDetector`] impl is the RMS energy gate used for
/// coarse frame classification on this side of the boundary.
pub struct SileroVad {
    model_bytes: Vec<u8>,
    energy_threshold: f32,
}

impl SileroVad {
    /// Loads the model weights. The read is asynchronous and must be
    /// awaited at load time; prewarm awaits it before the worker accepts
    /// jobs.
    pub async fn load(config: &VadConfig) -> Result<Self, WorkerError> {
        let model_bytes = tokio::fs::read(&config.model_path).await?;
        tracing::info!(
            path = %config.model_path,
            bytes = model_bytes.len(),
            "voice-activity model loaded"
        );
        Ok(Self {
            model_bytes,
            energy_threshold: config.energy_threshold,
        })
    }

    /// The raw model weights, handed to the media plane's inference engine.
    pub fn model_bytes(&self) -> &[u8] {
        &self.model_bytes
    }
}

impl VoiceActivityDetector for SileroVad {
    fn is_speech(&self, frame: &[i16]) -> bool {
        if frame.is_empty() {
            return false;
        }
        let sum_squares: f64 = frame
            .iter()
            .map(|&s| {
                let normalised = f64::from(s) / f64::from(i16::MAX);
                normalised * normalised
            })
            .sum();
        let rms = (sum_squares / frame.len() as f64).sqrt();
        rms > f64::from(self.energy_threshold)
    }
}
