//! Worker configuration loading from file and environment variables.

use serde::Deserialize;
use thiserror::Error;

/// Top-level worker configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Voice-activity model settings.
    #[serde(default)]
    pub vad: VadConfig,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "schola_worker=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

/// Voice-activity detection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct VadConfig {
    /// Path to the VAD model weights loaded at prewarm.
    #[serde(default = "default_vad_model_path")]
    pub model_path: String,

    /// RMS amplitude above which a frame counts as speech.
    #[serde(default = "default_vad_threshold")]
    pub energy_threshold: f32,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_vad_model_path() -> String {
    "assets/silero_vad.onnx".to_string()
}

fn default_vad_threshold() -> f32 {
    0.015
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            model_path: default_vad_model_path(),
            energy_threshold: default_vad_threshold(),
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `SCHOLA_LOG_LEVEL` overrides `logging.level`
/// - `SCHOLA_LOG_JSON` overrides `logging.json` (set to "true" to enable)
/// - `SCHOLA_VAD_MODEL_PATH` overrides `vad.model_path`
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    // Environment variable overrides
    if let Ok(level) = std::env::var("SCHOLA_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Ok(json) = std::env::var("SCHOLA_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
    if let Ok(model_path) = std::env::var("SCHOLA_VAD_MODEL_PATH") {
        config.vad.model_path = model_path;
    }

    Ok(config)
}
