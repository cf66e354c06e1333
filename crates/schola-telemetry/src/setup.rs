//! Exporter setup.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use opentelemetry::KeyValue;
use opentelemetry_otlp::{Protocol, WithExportConfig, WithHttpConfig};
use opentelemetry_sdk::trace::TracerProvider as SdkTracerProvider;
use opentelemetry_sdk::Resource;
use std::collections::HashMap;
use thiserror::Error;

/// Configuration for the OTLP/HTTP exporter.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Base URL of the observability backend.
    pub host: String,
    pub public_key: String,
    pub secret_key: String,
    pub service_name: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            host: "http://localhost:3001".to_string(),
            public_key: String::new(),
            secret_key: String::new(),
            service_name: "schola-voice-agent".to_string(),
        }
    }
}

impl TelemetryConfig {
    /// Reads configuration from the environment:
    /// `SCHOLA_TELEMETRY_HOST`, `SCHOLA_TELEMETRY_PUBLIC_KEY`,
    /// `SCHOLA_TELEMETRY_SECRET_KEY`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(host) = std::env::var("SCHOLA_TELEMETRY_HOST") {
            config.host = host;
        }
        if let Ok(key) = std::env::var("SCHOLA_TELEMETRY_PUBLIC_KEY") {
            config.public_key = key;
        }
        if let Ok(key) = std::env::var("SCHOLA_TELEMETRY_SECRET_KEY") {
            config.secret_key = key;
        }
        config
    }

    /// OTLP trace ingestion endpoint.
    pub fn traces_endpoint(&self) -> String {
        format!("{}/api/public/otel/v1/traces", self.host.trim_end_matches('/'))
    }

    /// `Basic base64(public:secret)` authorization value.
    pub fn basic_auth(&self) -> String {
        let credentials = BASE64.encode(format!("{}:{}", self.public_key, self.secret_key));
        format!("Basic {credentials}")
    }
}

/// Errors raised while building the exporter.
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("failed to build OTLP span exporter: {0}")]
    Exporter(#[from] opentelemetry::trace::TraceError),
}

/// Configures tracing export to the observability backend.
///
/// Returns `Ok(None)` (with a warning) when the key pair is missing, so a
/// worker without telemetry credentials still serves students. The returned
/// provider is installed globally; hold it and call `shutdown()` on worker
/// exit to flush batched spans.
pub fn init(config: &TelemetryConfig) -> Result<Option<SdkTracerProvider>, TelemetryError> {
    if config.public_key.is_empty() || config.secret_key.is_empty() {
        tracing::warn!(
            "telemetry public/secret key not set — span export disabled; \
             set SCHOLA_TELEMETRY_PUBLIC_KEY and SCHOLA_TELEMETRY_SECRET_KEY to enable"
        );
        return Ok(None);
    }

    let mut headers = HashMap::new();
    headers.insert("Authorization".to_string(), config.basic_auth());

    // The backend only accepts OTLP over HTTP protobuf, never gRPC.
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_protocol(Protocol::HttpBinary)
        .with_endpoint(config.traces_endpoint())
        .with_headers(headers)
        .build()?;

    let provider = SdkTracerProvider::builder()
        .with_batch_exporter(exporter, opentelemetry_sdk::runtime::Tokio)
        .with_resource(Resource::new(vec![
            KeyValue::new("service.name", config.service_name.clone()),
            KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
        ]))
        .build();

    opentelemetry::global::set_tracer_provider(provider.clone());
    tracing::info!(host = %config.host, "telemetry span export configured");
    Ok(Some(provider))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_appends_traces_path() {
        let config = TelemetryConfig {
            host: "https://telemetry.example.com/".to_string(),
            ..TelemetryConfig::default()
        };
        assert_eq!(
            config.traces_endpoint(),
            "https://telemetry.example.com/api/public/otel/v1/traces"
        );
    }

    #[test]
    fn basic_auth_encodes_key_pair() {
        let config = TelemetryConfig {
            public_key: "pk".to_string(),
            secret_key: "sk".to_string(),
            ..TelemetryConfig::default()
        };
        assert_eq!(config.basic_auth(), format!("Basic {}", "cGs6c2s="));
    }

    #[test]
    fn missing_keys_disable_export() {
        let provider = init(&TelemetryConfig::default()).unwrap();
        assert!(provider.is_none());
    }
}
