//! OpenTelemetry setup for AWS X-Ray.
//!
//! Spans are exported over OTLP (gRPC) to the collector that runs next to the
//! function or container (the ADOT Lambda layer or a sidecar), using X-Ray
//! compatible trace ids. Context is propagated with the `X-Amzn-Trace-Id`
//! header.

use std::collections::HashMap;
use std::sync::Arc;

use http::{HeaderMap, HeaderName, HeaderValue};
use opentelemetry::propagation::{text_map_propagator::FieldIter, Extractor, Injector, TextMapPropagator};
use opentelemetry::trace::TraceContextExt;
use opentelemetry::{Context, KeyValue};
use opentelemetry_aws::trace::{XrayIdGenerator, XrayPropagator};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::TracerProvider;
use opentelemetry_sdk::{runtime, Resource};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::env::non_empty_var;

/// Header carrying the X-Ray trace context.
pub const X_AMZN_TRACE_ID_HEADER: &str = "X-Amzn-Trace-Id";

/// Errors raised while configuring tracing.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The span exporter could not be constructed.
    #[error("failed to build span exporter: {0}")]
    Exporter(String),

    /// A service name is required to name server spans.
    #[error("missing service name to use for tracing")]
    MissingServiceName,
}

/// Tracing configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracingConfig {
    /// Reported as the `service.name` resource attribute.
    pub service_name: String,
    /// OTLP endpoint; the exporter default (`http://localhost:4317`) when unset.
    pub endpoint: Option<String>,
}

impl TracingConfig {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            endpoint: None,
        }
    }

    /// Read the endpoint from `OTEL_EXPORTER_OTLP_ENDPOINT`.
    pub fn from_env(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            endpoint: non_empty_var("OTEL_EXPORTER_OTLP_ENDPOINT"),
        }
    }
}

/// Build a tracer provider exporting X-Ray compatible spans over OTLP.
///
/// Must be called from within a Tokio runtime; the batch processor runs on it.
pub fn xray_tracer_provider(config: &TracingConfig) -> Result<TracerProvider, TelemetryError> {
    if config.service_name.is_empty() {
        return Err(TelemetryError::MissingServiceName);
    }

    let mut builder = opentelemetry_otlp::SpanExporter::builder().with_tonic();
    if let Some(endpoint) = &config.endpoint {
        builder = builder.with_endpoint(endpoint.clone());
    }
    let exporter = builder
        .build()
        .map_err(|e| TelemetryError::Exporter(e.to_string()))?;

    let provider = TracerProvider::builder()
        .with_batch_exporter(exporter, runtime::Tokio)
        .with_id_generator(XrayIdGenerator::default())
        .with_resource(Resource::new(vec![KeyValue::new(
            "service.name",
            config.service_name.clone(),
        )]))
        .build();

    info!(
        service = %config.service_name,
        endpoint = config.endpoint.as_deref().unwrap_or("default"),
        "X-Ray tracer provider initialized"
    );

    Ok(provider)
}

/// A cloneable, type-erased text map propagator.
#[derive(Clone)]
pub struct SharedPropagator(Arc<dyn TextMapPropagator + Send + Sync>);

impl SharedPropagator {
    pub fn new(propagator: impl TextMapPropagator + Send + Sync + 'static) -> Self {
        Self(Arc::new(propagator))
    }

    /// The X-Ray propagator.
    pub fn xray() -> Self {
        Self::new(XrayPropagator::default())
    }

    /// Extract a parent context from HTTP headers.
    pub fn extract_headers(&self, headers: &HeaderMap) -> Context {
        self.0.extract(&HeaderExtractor(headers))
    }

    /// Inject the given context into HTTP headers.
    pub fn inject_headers(&self, cx: &Context, headers: &mut HeaderMap) {
        self.0.inject_context(cx, &mut HeaderInjector(headers));
    }
}

impl Default for SharedPropagator {
    fn default() -> Self {
        Self::xray()
    }
}

impl std::fmt::Debug for SharedPropagator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SharedPropagator").finish()
    }
}

impl TextMapPropagator for SharedPropagator {
    fn inject_context(&self, cx: &Context, injector: &mut dyn Injector) {
        self.0.inject_context(cx, injector)
    }

    fn extract_with_context(&self, cx: &Context, extractor: &dyn Extractor) -> Context {
        self.0.extract_with_context(cx, extractor)
    }

    fn fields(&self) -> FieldIter<'_> {
        self.0.fields()
    }
}

/// Register the provider and propagator as the process-wide defaults.
pub fn install_global(provider: &TracerProvider, propagator: SharedPropagator) {
    let _ = opentelemetry::global::set_tracer_provider(provider.clone());
    opentelemetry::global::set_text_map_propagator(propagator);
}

/// Export any buffered spans. Failures are logged.
pub fn force_flush(provider: &TracerProvider) {
    for result in provider.force_flush() {
        if let Err(e) = result {
            warn!(error = %e, "failed to flush spans");
        }
    }
}

/// Flush and stop the provider. Failures are logged.
pub fn shutdown(provider: &TracerProvider) {
    if let Err(e) = provider.shutdown() {
        error!(error = %e, "Error shutting down tracer provider");
    }
}

/// Reads propagation fields from an [`http::HeaderMap`].
pub struct HeaderExtractor<'a>(pub &'a HeaderMap);

impl Extractor for HeaderExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.to_str().ok())
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(|k| k.as_str()).collect()
    }
}

/// Writes propagation fields into an [`http::HeaderMap`].
pub struct HeaderInjector<'a>(pub &'a mut HeaderMap);

impl Injector for HeaderInjector<'_> {
    fn set(&mut self, key: &str, value: String) {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(key.as_bytes()),
            HeaderValue::from_str(&value),
        ) {
            self.0.insert(name, value);
        }
    }
}

/// Identifiers used to correlate log entries with traces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationIds {
    /// Hex trace id, logged as `dd.trace_id`.
    pub trace_id: String,
    /// Hex span id, logged as `dd.span_id`.
    pub span_id: String,
    /// Rendered `X-Amzn-Trace-Id` value.
    pub amzn_trace_id: Option<String>,
}

/// Correlation ids of the active span in `cx`, if it is valid.
pub fn correlation_ids(cx: &Context) -> Option<CorrelationIds> {
    let span = cx.span();
    let span_context = span.span_context();
    if !span_context.is_valid() {
        return None;
    }

    let mut carrier: HashMap<String, String> = HashMap::new();
    XrayPropagator::default().inject_context(cx, &mut carrier);
    let amzn_trace_id = carrier
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(X_AMZN_TRACE_ID_HEADER))
        .map(|(_, v)| v.clone());

    Some(CorrelationIds {
        trace_id: span_context.trace_id().to_string(),
        span_id: span_context.span_id().to_string(),
        amzn_trace_id,
    })
}
