//! Log output and optional OTLP trace export.
//!
//! Traces are exported over gRPC only when `OTEL_EXPORTER_OTLP_ENDPOINT` is
//! set. Headers and the remaining `OTEL_*` variables are read by the
//! exporter itself.

use crate::cli::commands::logging::LogFormat;
use anyhow::{Result, anyhow};
use opentelemetry::{KeyValue, global, trace::TracerProvider as _};
use opentelemetry_otlp::{Compression, SpanExporter, WithExportConfig, WithTonicConfig};
use opentelemetry_sdk::{
    Resource,
    propagation::TraceContextPropagator,
    trace::{SdkTracerProvider, Tracer},
};
use std::{env::var, sync::OnceLock, time::Duration};
use tonic::transport::ClientTlsConfig;
use tracing::{Level, debug};
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, layer::SubscriberExt};
use ulid::Ulid;
use url::Url;

const EXPORT_TIMEOUT: Duration = Duration::from_secs(3);

// Dependencies that are chatty well below the level cadena runs at.
const QUIET: [&str; 5] = [
    "hyper=error",
    "h2=error",
    "tokio=error",
    "sqlx=warn",
    "opentelemetry_sdk=warn",
];

static TRACER_PROVIDER: OnceLock<SdkTracerProvider> = OnceLock::new();

/// Endpoints without a scheme are assumed to be TLS collectors.
fn collector_url(raw: &str) -> Result<Url> {
    let raw = raw.trim().trim_end_matches('/');
    let url = if raw.contains("://") {
        Url::parse(raw)
    } else {
        Url::parse(&format!("https://{raw}"))
    };
    url.map_err(|err| anyhow!("invalid OTLP endpoint '{raw}': {err}"))
}

fn filter(level: Level) -> Result<EnvFilter> {
    let mut filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();
    for directive in QUIET {
        filter = filter.add_directive(directive.parse()?);
    }
    Ok(filter)
}

fn resource() -> Resource {
    let instance_id = var("OTEL_SERVICE_INSTANCE_ID").unwrap_or_else(|_| Ulid::new().to_string());
    Resource::builder_empty()
        .with_attributes([
            KeyValue::new("service.name", env!("CARGO_PKG_NAME")),
            KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
            KeyValue::new("service.instance.id", instance_id),
            KeyValue::new("vcs.revision", crate::GIT_COMMIT_HASH.trim()),
        ])
        .build()
}

fn tracer(collector: &Url) -> Result<Tracer> {
    let mut exporter = SpanExporter::builder()
        .with_tonic()
        .with_endpoint(collector.as_str().trim_end_matches('/'))
        .with_compression(Compression::Gzip)
        .with_timeout(EXPORT_TIMEOUT);

    if collector.scheme() == "https"
        && let Some(host) = collector.host_str()
    {
        exporter = exporter.with_tls_config(
            ClientTlsConfig::new()
                .domain_name(host.to_string())
                .with_native_roots(),
        );
    }

    let provider = SdkTracerProvider::builder()
        .with_batch_exporter(exporter.build()?)
        .with_resource(resource())
        .build();

    let _ = TRACER_PROVIDER.set(provider.clone());
    global::set_tracer_provider(provider.clone());
    global::set_text_map_propagator(TraceContextPropagator::new());

    Ok(provider.tracer(env!("CARGO_PKG_NAME")))
}

/// Install the global subscriber. `level` defaults to ERROR; `RUST_LOG`
/// directives refine it.
///
/// # Errors
/// Returns an error for an invalid OTLP endpoint or if a subscriber is
/// already installed.
pub fn init(level: Option<Level>, format: LogFormat) -> Result<()> {
    let filter = filter(level.unwrap_or(Level::ERROR))?;

    let output: Box<dyn Layer<Registry> + Send + Sync> = match format {
        LogFormat::Pretty => fmt::layer().with_target(false).pretty().boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .flatten_event(true)
            .boxed(),
    };

    let otel = match var("OTEL_EXPORTER_OTLP_ENDPOINT") {
        Ok(endpoint) if !endpoint.trim().is_empty() => {
            let collector = collector_url(&endpoint)?;
            Some(tracing_opentelemetry::layer().with_tracer(tracer(&collector)?))
        }
        _ => None,
    };

    let subscriber = Registry::default().with(output).with(otel).with(filter);
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

/// Flush and shut down the tracer provider, if one was installed.
pub fn shutdown_tracer() {
    if let Some(provider) = TRACER_PROVIDER.get() {
        debug!("Flushing spans");
        let _ = provider.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collector_scheme_defaults_to_https() -> Result<()> {
        let url = collector_url("collector.internal:4317/")?;
        assert_eq!(url.scheme(), "https");
        assert_eq!(url.host_str(), Some("collector.internal"));
        assert_eq!(url.port(), Some(4317));

        let url = collector_url("http://localhost:4317")?;
        assert_eq!(url.scheme(), "http");
        Ok(())
    }

    #[test]
    fn malformed_collector_is_rejected() {
        assert!(collector_url("https://").is_err());
    }

    #[test]
    fn quiet_directives_parse() -> Result<()> {
        let filter = filter(Level::DEBUG)?;
        let rendered = filter.to_string();
        assert!(rendered.contains("sqlx=warn"));
        assert!(rendered.contains("hyper=error"));
        Ok(())
    }

    #[test]
    fn resource_names_the_service() {
        let resource = resource();
        assert!(
            resource
                .iter()
                .any(|(key, value)| key.as_str() == "service.name" && value.as_str() == "cadena")
        );
    }

    #[test]
    fn shutdown_without_provider_is_a_noop() {
        shutdown_tracer();
    }
}
