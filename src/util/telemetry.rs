use std::time::Duration;

use opentelemetry::KeyValue;
use opentelemetry::global;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge;
use opentelemetry_otlp::{ExporterBuildError, Protocol, WithExportConfig};
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::logs::SdkLoggerProvider;
use opentelemetry_sdk::trace::SdkTracerProvider;
use thiserror::Error;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::util::env::Env;

const EXPORT_TIMEOUT: Duration = Duration::from_secs(5);

/// Log filters used when `RUST_LOG` isn't set.
const FILTER_DEBUG: &str = "quizboard_server=debug,tower_http=debug,axum=debug,sqlx=info,info";
const FILTER_DEFAULT: &str = "quizboard_server=info,tower_http=info,sqlx=warn,warn";

pub type TelemetryResult<T> = core::result::Result<T, TelemetryErr>;

#[derive(Debug, Error)]
pub enum TelemetryErr {
    #[error("while building otlp exporter: {0}")]
    Exporter(#[from] ExporterBuildError),
}

#[derive(Debug)]
pub struct Telemetry {
    service_name: String,
    filter: &'static str,

    /// Only present when an OTLP collector is configured.
    tracer_provider: Option<SdkTracerProvider>,
    logger_provider: Option<SdkLoggerProvider>,
}

impl Telemetry {
    pub fn new(env: &Env) -> TelemetryResult<Self> {
        let service_name = env.service_name.clone();
        let filter = if env.debug { FILTER_DEBUG } else { FILTER_DEFAULT };

        let (tracer_provider, logger_provider) = match &env.otel_exporter_otlp_endpoint {
            Some(collector_url) => {
                let resource = base_attrs(&service_name, env!("CARGO_PKG_VERSION"));
                (
                    Some(build_tracer_provider(collector_url, resource.clone())?),
                    Some(build_logger_provider(collector_url, resource)?),
                )
            }
            None => (None, None),
        };

        Ok(Self {
            service_name,
            filter,
            tracer_provider,
            logger_provider,
        })
    }

    pub fn register(self) -> Self {
        let trace_layer = self.tracer_provider.as_ref().map(|provider| {
            global::set_tracer_provider(provider.clone());
            tracing_opentelemetry::layer().with_tracer(provider.tracer(self.service_name.clone()))
        });
        let log_layer = self
            .logger_provider
            .as_ref()
            .map(OpenTelemetryTracingBridge::new);

        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.filter));

        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_line_number(true),
            )
            .with(trace_layer)
            .with(log_layer)
            .init();

        tracing::debug!(
            otlp = self.tracer_provider.is_some(),
            filter = self.filter,
            "telemetry registered"
        );

        self
    }

    pub fn shutdown(self) {
        if let Some(provider) = self.logger_provider
            && let Err(e) = provider.shutdown()
        {
            tracing::warn!(error = ?e, "error during logging shutdown");
        }

        if let Some(provider) = self.tracer_provider
            && let Err(e) = provider.shutdown()
        {
            tracing::warn!(error = ?e, "error during tracing shutdown");
        }
    }
}

fn build_logger_provider(
    collector_url: &str,
    resource: Resource,
) -> TelemetryResult<SdkLoggerProvider> {
    let exporter = opentelemetry_otlp::LogExporter::builder()
        .with_tonic()
        .with_protocol(Protocol::Grpc)
        .with_endpoint(collector_url)
        .with_timeout(EXPORT_TIMEOUT)
        .build()?;

    Ok(SdkLoggerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(resource)
        .build())
}

fn build_tracer_provider(
    collector_url: &str,
    resource: Resource,
) -> TelemetryResult<SdkTracerProvider> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_protocol(Protocol::Grpc)
        .with_endpoint(collector_url)
        .with_timeout(EXPORT_TIMEOUT)
        .build()?;

    Ok(SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(resource)
        .build())
}

fn base_attrs(name: &str, version: &'static str) -> Resource {
    Resource::builder()
        .with_attributes([
            KeyValue::new("service.name", name.to_string()),
            KeyValue::new("service.version", version),
        ])
        .build()
}
