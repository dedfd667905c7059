//! Logs, traces and metrics for the gateway process.
//!
//! # Purpose
//! - `tracing` subscriber with an env filter and text or JSON output.
//! - OTLP span export, only when `OTEL_EXPORTER_OTLP_ENDPOINT` is set.
//! - W3C `traceparent` extraction so request spans join the caller's trace.
//! - A Prometheus recorder with the admission metrics described up front, and
//!   the scrape endpoint that renders it.
//!
//! # Notes
//! Setup runs once per process; later calls reuse the installed recorder so
//! tests can call [`init_observability`] freely.
use anyhow::Context;
use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use opentelemetry::propagation::Extractor;
use opentelemetry::trace::TracerProvider;
use opentelemetry::{KeyValue, global};
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::SdkTracerProvider;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Mutex, Once};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

const OTLP_ENDPOINT_ENV: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";
const LOG_FORMAT_ENV: &str = "TENANTGATE_LOG_FORMAT";
const DEFAULT_FILTER: &str = "info,tower_http=warn";

static TRACING: Once = Once::new();
static PROPAGATOR: Once = Once::new();
static RECORDER: Mutex<Option<PrometheusHandle>> = Mutex::new(None);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    fn from_env() -> Self {
        match std::env::var(LOG_FORMAT_ENV) {
            Ok(value) if value.trim().eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Text,
        }
    }
}

/// Install tracing and the metrics recorder; returns the scrape handle.
pub fn init_observability(service_name: &str) -> anyhow::Result<PrometheusHandle> {
    TRACING.call_once(|| install_tracing(service_name));
    metrics_handle()
}

fn install_tracing(service_name: &str) {
    install_propagator();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let output = match LogFormat::from_env() {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .boxed(),
        LogFormat::Text => tracing_subscriber::fmt::layer().with_target(false).boxed(),
    };
    let registry = tracing_subscriber::registry().with(filter).with(output);
    match span_exporter(service_name) {
        Some(provider) => {
            let tracer = provider.tracer(service_name.to_string());
            global::set_tracer_provider(provider);
            let _ = registry
                .with(tracing_opentelemetry::layer().with_tracer(tracer))
                .try_init();
        }
        None => {
            let _ = registry.try_init();
        }
    }
}

fn install_propagator() {
    PROPAGATOR.call_once(|| global::set_text_map_propagator(TraceContextPropagator::new()));
}

fn span_exporter(service_name: &str) -> Option<SdkTracerProvider> {
    std::env::var(OTLP_ENDPOINT_ENV).ok()?;
    let exporter = match opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .build()
    {
        Ok(exporter) => exporter,
        Err(err) => {
            eprintln!("otlp exporter disabled: {err}");
            return None;
        }
    };
    Some(
        SdkTracerProvider::builder()
            .with_batch_exporter(exporter)
            .with_resource(
                Resource::builder_empty()
                    .with_attributes(service_attributes(service_name))
                    .build(),
            )
            .build(),
    )
}

fn service_attributes(service_name: &str) -> Vec<KeyValue> {
    let mut attributes = vec![
        KeyValue::new("service.name", service_name.to_string()),
        KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
    ];
    if let Ok(instance) = std::env::var("HOSTNAME") {
        attributes.push(KeyValue::new("service.instance.id", instance));
    }
    if let Ok(environment) = std::env::var("DEPLOYMENT_ENVIRONMENT") {
        attributes.push(KeyValue::new("deployment.environment", environment));
    }
    attributes
}

/// Remote parent for a request span, from `traceparent`/`tracestate`.
pub fn trace_context_from_headers(headers: &axum::http::HeaderMap) -> opentelemetry::Context {
    install_propagator();
    global::get_text_map_propagator(|propagator| propagator.extract(&HeaderExtractor(headers)))
}

struct HeaderExtractor<'a>(&'a axum::http::HeaderMap);

impl Extractor for HeaderExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key)?.to_str().ok()
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(axum::http::HeaderName::as_str).collect()
    }
}

fn metrics_handle() -> anyhow::Result<PrometheusHandle> {
    let mut installed = RECORDER
        .lock()
        .map_err(|_| anyhow::anyhow!("metrics recorder lock poisoned"))?;
    if let Some(handle) = installed.as_ref() {
        return Ok(handle.clone());
    }
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .context("install prometheus recorder")?;
    describe_gateway_metrics();
    *installed = Some(handle.clone());
    Ok(handle)
}

fn describe_gateway_metrics() {
    describe_counter!(
        "tenantgate_requests_total",
        "Admission outcomes for tenant-scoped requests"
    );
    describe_counter!(
        "tenantgate_rejections_total",
        "Rejected requests by pipeline stage and rejection kind"
    );
    describe_counter!("tenantgate_jwks_fetches_total", "Identity provider key set fetches");
    describe_counter!(
        "tenantgate_tenants_provisioned_total",
        "Personal tenants created on first use"
    );
    describe_counter!("tenantgate_usage_writes_total", "Usage metric writes by result");
    describe_counter!(
        "tenantgate_usage_dropped_total",
        "Usage events dropped because the queue was full or closed"
    );
    describe_gauge!("tenantgate_store_organizations", "Organizations in the memory store");
    describe_gauge!("tenantgate_store_memberships", "Memberships in the memory store");
}

/// Serve `GET /metrics` on `addr` until the task is aborted.
pub async fn serve_metrics(handle: PrometheusHandle, addr: SocketAddr) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "metrics listening");
    serve_scrape_endpoint(handle, listener, std::future::pending()).await
}

async fn serve_scrape_endpoint<F>(
    handle: PrometheusHandle,
    listener: tokio::net::TcpListener,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let scrape = axum::Router::new().route(
        "/metrics",
        axum::routing::get(move || {
            let handle = handle.clone();
            async move { handle.render() }
        }),
    );
    axum::serve(listener, scrape.into_make_service())
        .with_graceful_shutdown(shutdown)
        .await
}
