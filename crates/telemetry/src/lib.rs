//! Telemetry surface: tracing initialization and typed span emitters
//!
//! Spans are exported over OTLP/HTTP protobuf; the target backend does not
//! accept gRPC. Session id and user id ride on every span as plain
//! attributes (not trace context alone) because the backend filters by them.

pub mod spans;

use opentelemetry::trace::TracerProvider as _;
use opentelemetry::KeyValue;
use opentelemetry_otlp::{Protocol, WithExportConfig, WithHttpConfig};
use opentelemetry_sdk::{runtime, trace as sdktrace, Resource};
use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use tutor_agent_config::ObservabilityConfig;

pub use spans::{SessionIds, SessionType};

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("failed to build OTLP exporter: {0}")]
    Exporter(String),
    #[error("failed to install tracing subscriber: {0}")]
    Subscriber(String),
}

/// Keeps the tracer provider alive; shut down on worker exit to flush
/// batched spans.
pub struct TelemetryGuard {
    provider: Option<sdktrace::TracerProvider>,
}

impl TelemetryGuard {
    pub fn shutdown(&mut self) {
        if let Some(provider) = self.provider.take() {
            if let Err(e) = provider.shutdown() {
                tracing::warn!(error = %e, "trace exporter shutdown failed");
            }
        }
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Initialize tracing: env-filtered fmt output plus, when an OTLP endpoint
/// is configured, an OpenTelemetry layer exporting over HTTP protobuf.
pub fn init_tracing(
    config: &ObservabilityConfig,
    service_name: &str,
) -> Result<TelemetryGuard, TelemetryError> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("tutor_agent={}", config.log_level).into());

    let fmt_layer = if config.log_json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    let (otel_layer, provider) = match &config.otlp_endpoint {
        Some(endpoint) => {
            let mut builder = opentelemetry_otlp::SpanExporter::builder()
                .with_http()
                .with_protocol(Protocol::HttpBinary)
                .with_endpoint(endpoint.clone());
            if let Some(auth) = &config.otlp_auth_header {
                builder = builder.with_headers(std::collections::HashMap::from([(
                    "authorization".to_string(),
                    auth.clone(),
                )]));
            }
            let exporter = builder
                .build()
                .map_err(|e| TelemetryError::Exporter(e.to_string()))?;

            let provider = sdktrace::TracerProvider::builder()
                .with_batch_exporter(exporter, runtime::Tokio)
                .with_resource(Resource::new(vec![
                    KeyValue::new("service.name", service_name.to_string()),
                    KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
                ]))
                .build();
            let tracer = provider.tracer("tutor-agent");
            (
                Some(tracing_opentelemetry::layer().with_tracer(tracer)),
                Some(provider),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .with(otel_layer)
        .try_init()
        .map_err(|e| TelemetryError::Subscriber(e.to_string()))?;

    if let Some(endpoint) = &config.otlp_endpoint {
        tracing::info!(endpoint = %endpoint, "OTLP/HTTP trace export enabled");
    }

    Ok(TelemetryGuard { provider })
}
