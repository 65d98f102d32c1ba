//! Request span tests using an in-memory span exporter.

use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum_test::TestServer;
use opentelemetry::trace::{SpanKind, Status};
use opentelemetry::{Key, Value};
use opentelemetry_sdk::export::trace::SpanData;
use opentelemetry_sdk::testing::trace::InMemorySpanExporter;
use opentelemetry_sdk::trace::TracerProvider;

use commonlib_core::SharedPropagator;
use commonlib_web::{ApiError, Method, WebEngine, WebOption};

const TRACE_HEADER: &str = "Root=1-5759e988-bd862e3fe1be46a994272793;Parent=53995c3f42cd8ad8;Sampled=1";

fn traced_engine(exporter: &InMemorySpanExporter) -> WebEngine {
    let provider = TracerProvider::builder()
        .with_simple_exporter(exporter.clone())
        .build();
    WebEngine::new([WebOption::tracing(
        "orders-service",
        provider,
        SharedPropagator::xray(),
    )])
    .unwrap()
}

fn attribute<'a>(span: &'a SpanData, key: &str) -> Option<&'a Value> {
    span.attributes
        .iter()
        .find(|kv| kv.key == Key::from(key.to_string()))
        .map(|kv| &kv.value)
}

#[tokio::test]
async fn test_server_span_per_request() {
    let exporter = InMemorySpanExporter::default();
    let mut engine = traced_engine(&exporter);
    assert!(engine.tracing_enabled());
    engine.add_route(None, "/orders/:id", Method::Get, None, || async { "order" });

    let server = TestServer::new(engine.into_router()).unwrap();
    server
        .get("/orders/7")
        .add_query_param("expand", "lines")
        .add_header(
            HeaderName::from_static("x-amzn-trace-id"),
            HeaderValue::from_static(TRACE_HEADER),
        )
        .await
        .assert_status_ok();

    let spans = exporter.get_finished_spans().unwrap();
    assert_eq!(spans.len(), 1);
    let span = &spans[0];

    assert_eq!(span.name, "orders-service");
    assert_eq!(span.span_kind, SpanKind::Server);
    assert_eq!(
        span.span_context.trace_id().to_string(),
        "5759e988bd862e3fe1be46a994272793"
    );
    assert_eq!(span.parent_span_id.to_string(), "53995c3f42cd8ad8");
    assert_eq!(
        attribute(span, "http.request.method").map(|v| v.to_string()),
        Some("GET".to_string())
    );
    assert_eq!(
        attribute(span, "url.path").map(|v| v.to_string()),
        Some("/orders/7".to_string())
    );
    assert_eq!(
        attribute(span, "url.query").map(|v| v.to_string()),
        Some("expand=lines".to_string())
    );
    assert_eq!(
        attribute(span, "http.response.status_code"),
        Some(&Value::I64(200))
    );
    assert_eq!(span.status, Status::Unset);
}

#[tokio::test]
async fn test_server_error_marks_span_as_error() {
    let exporter = InMemorySpanExporter::default();
    let mut engine = traced_engine(&exporter);
    engine.add_route(None, "/broken", Method::Get, None, || async {
        Err::<String, _>(ApiError::internal_server_error("boom"))
    });

    let server = TestServer::new(engine.into_router()).unwrap();
    server
        .get("/broken")
        .await
        .assert_status(StatusCode::INTERNAL_SERVER_ERROR);

    let spans = exporter.get_finished_spans().unwrap();
    assert_eq!(spans.len(), 1);
    assert_eq!(
        attribute(&spans[0], "http.response.status_code"),
        Some(&Value::I64(500))
    );
    assert!(matches!(spans[0].status, Status::Error { .. }));
}

#[tokio::test]
async fn test_handler_sees_request_context() {
    let exporter = InMemorySpanExporter::default();
    let mut engine = traced_engine(&exporter);
    engine.add_route(
        None,
        "/trace",
        Method::Get,
        None,
        |axum::Extension(cx): axum::Extension<opentelemetry::Context>| async move {
            commonlib_core::correlation_ids(&cx)
                .map(|ids| ids.trace_id)
                .unwrap_or_default()
        },
    );

    let server = TestServer::new(engine.into_router()).unwrap();
    let response = server
        .get("/trace")
        .add_header(
            HeaderName::from_static("x-amzn-trace-id"),
            HeaderValue::from_static(TRACE_HEADER),
        )
        .await;

    response.assert_text("5759e988bd862e3fe1be46a994272793");
}
