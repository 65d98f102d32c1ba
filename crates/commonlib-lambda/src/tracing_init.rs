//! X-Ray tracing of Lambda invocations.

use std::collections::HashMap;
use std::future::Future;

use lambda_runtime::Context as LambdaContext;
use opentelemetry::propagation::TextMapPropagator;
use opentelemetry::trace::{FutureExt, SpanKind, Status, TraceContextExt, Tracer, TracerProvider as _};
use opentelemetry::{Context, KeyValue};
use opentelemetry_sdk::trace::TracerProvider;
use tracing::error;

use commonlib_core::telemetry::{self, TracingConfig, X_AMZN_TRACE_ID_HEADER};
use commonlib_core::{SharedPropagator, TelemetryError};

const TRACER_NAME: &str = "commonlib-lambda";

/// Create an X-Ray tracer provider and install it with the X-Ray propagator
/// as the global defaults.
pub fn initialize_tracing(service: &str) -> Result<TracerProvider, TelemetryError> {
    if service.is_empty() {
        return Err(TelemetryError::MissingServiceName);
    }
    let provider = telemetry::xray_tracer_provider(&TracingConfig::from_env(service))?;
    telemetry::install_global(&provider, SharedPropagator::xray());
    Ok(provider)
}

/// Flush and stop the provider. Errors are logged.
pub fn shutdown_tracing(provider: &TracerProvider) {
    telemetry::shutdown(provider);
}

/// Records each invocation as a server span.
///
/// The parent is taken from the invocation's X-Ray trace header. Spans are
/// flushed when the invocation completes, since the execution environment
/// may be frozen right after.
#[derive(Clone, Debug)]
pub struct InvocationTracing {
    provider: TracerProvider,
    propagator: SharedPropagator,
    span_name: String,
}

impl InvocationTracing {
    pub fn new(provider: TracerProvider, service: &str) -> Self {
        Self {
            provider,
            propagator: SharedPropagator::xray(),
            span_name: service.to_string(),
        }
    }

    /// Run `future` inside a span for the invocation described by `context`.
    pub async fn trace<Fut, T, E>(&self, context: &LambdaContext, future: Fut) -> Result<T, E>
    where
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let cx = self.start_span(context);
        let result = future.with_context(cx.clone()).await;

        let span = cx.span();
        if let Err(e) = &result {
            span.set_status(Status::error(e.to_string()));
        }
        span.end();

        let provider = self.provider.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || telemetry::force_flush(&provider)).await
        {
            error!(error = %e, "failed to flush spans");
        }

        result
    }

    fn start_span(&self, context: &LambdaContext) -> Context {
        let mut carrier = HashMap::new();
        if let Some(trace_id) = &context.xray_trace_id {
            carrier.insert(X_AMZN_TRACE_ID_HEADER.to_lowercase(), trace_id.clone());
        }
        let parent = self.propagator.extract(&carrier);

        let tracer = self.provider.tracer(TRACER_NAME);
        let span = tracer
            .span_builder(self.span_name.clone())
            .with_kind(SpanKind::Server)
            .with_attributes(vec![
                KeyValue::new("faas.invocation_id", context.request_id.clone()),
                KeyValue::new("cloud.resource_id", context.invoked_function_arn.clone()),
            ])
            .start_with_context(&tracer, &parent);
        parent.with_span(span)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry_sdk::testing::trace::InMemorySpanExporter;

    fn context(trace_id: Option<&str>) -> LambdaContext {
        let mut context = LambdaContext::default();
        context.request_id = "req-1".to_string();
        context.xray_trace_id = trace_id.map(String::from);
        context
    }

    fn tracing_with_exporter() -> (InvocationTracing, InMemorySpanExporter) {
        let exporter = InMemorySpanExporter::default();
        let provider = TracerProvider::builder()
            .with_simple_exporter(exporter.clone())
            .build();
        (InvocationTracing::new(provider, "my-function"), exporter)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_trace_records_invocation_span() {
        let (tracing, exporter) = tracing_with_exporter();
        let context = context(Some(
            "Root=1-5759e988-bd862e3fe1be46a994272793;Parent=53995c3f42cd8ad8;Sampled=1",
        ));

        let result: Result<u8, String> = tracing.trace(&context, async { Ok(7) }).await;
        assert_eq!(result, Ok(7));

        let spans = exporter.get_finished_spans().unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].name, "my-function");
        assert_eq!(
            spans[0].span_context.trace_id().to_string(),
            "5759e988bd862e3fe1be46a994272793"
        );
        assert_eq!(spans[0].parent_span_id.to_string(), "53995c3f42cd8ad8");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_trace_marks_errors() {
        let (tracing, exporter) = tracing_with_exporter();

        let result: Result<u8, String> = tracing
            .trace(&context(None), async { Err("boom".to_string()) })
            .await;
        assert!(result.is_err());

        let spans = exporter.get_finished_spans().unwrap();
        assert_eq!(spans.len(), 1);
        assert!(matches!(spans[0].status, Status::Error { .. }));
    }

    #[test]
    fn test_initialize_tracing_requires_service() {
        assert!(matches!(
            initialize_tracing(""),
            Err(TelemetryError::MissingServiceName)
        ));
    }
}
