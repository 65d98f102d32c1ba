//! Serves real tonic routes on a loopback listener and calls them with a
//! tonic client.

use std::convert::Infallible;
use std::future::{ready, Ready};
use std::net::SocketAddr;
use std::task::{Context, Poll};

use http::uri::PathAndQuery;
use opentelemetry::trace::{SpanKind, Status as SpanStatus};
use opentelemetry::{Key, Value};
use opentelemetry_sdk::export::trace::SpanData;
use opentelemetry_sdk::testing::trace::InMemorySpanExporter;
use opentelemetry_sdk::trace::TracerProvider;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tonic::body::BoxBody;
use tonic::client::Grpc;
use tonic::codec::ProstCodec;
use tonic::metadata::MetadataValue;
use tonic::server::NamedService;
use tonic::transport::Channel;
use tonic::{Code, Status};
use tower::Service;

use commonlib_core::SharedPropagator;
use commonlib_grpc::{Error, GrpcServer, GrpcTraceLayer};

const TRACE_HEADER: &str = "Root=1-5759e988-bd862e3fe1be46a994272793;Parent=53995c3f42cd8ad8;Sampled=1";

/// Answers every call with `NOT_FOUND`.
#[derive(Clone)]
struct MissingOrders;

impl NamedService for MissingOrders {
    const NAME: &'static str = "orders.v1.Orders";
}

impl Service<http::Request<BoxBody>> for MissingOrders {
    type Response = http::Response<BoxBody>;
    type Error = Infallible;
    type Future = Ready<Result<Self::Response, Infallible>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, _req: http::Request<BoxBody>) -> Self::Future {
        ready(Ok(Status::not_found("no such order").into_http()))
    }
}

struct Running {
    addr: SocketAddr,
    stop: oneshot::Sender<()>,
    handle: tokio::task::JoinHandle<commonlib_grpc::Result<()>>,
}

impl Running {
    async fn shutdown(self) {
        let _ = self.stop.send(());
        self.handle.await.unwrap().unwrap();
    }
}

async fn serve(server: GrpcServer) -> Running {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop, stopped) = oneshot::channel::<()>();
    let handle = tokio::spawn(server.serve_with_shutdown(listener, async {
        let _ = stopped.await;
    }));
    Running { addr, stop, handle }
}

async fn call(addr: SocketAddr, path: &'static str, trace_header: Option<&'static str>) -> Status {
    let channel = Channel::from_shared(format!("http://{addr}"))
        .unwrap()
        .connect()
        .await
        .unwrap();
    let mut grpc = Grpc::new(channel);
    grpc.ready().await.unwrap();

    let mut request = tonic::Request::new(());
    if let Some(header) = trace_header {
        request
            .metadata_mut()
            .insert("x-amzn-trace-id", MetadataValue::from_static(header));
    }
    grpc.unary::<(), (), _>(
        request,
        PathAndQuery::from_static(path),
        ProstCodec::<(), ()>::default(),
    )
    .await
    .unwrap_err()
}

fn attribute<'a>(span: &'a SpanData, key: &str) -> Option<&'a Value> {
    span.attributes
        .iter()
        .find(|kv| kv.key == Key::from(key.to_string()))
        .map(|kv| &kv.value)
}

#[tokio::test]
async fn test_registered_service_answers() {
    let mut server = GrpcServer::new(false);
    assert!(!server.tracing_enabled());
    server.add_service(MissingOrders);
    let running = serve(server).await;

    let status = call(running.addr, "/orders.v1.Orders/GetOrder", None).await;
    assert_eq!(status.code(), Code::NotFound);
    assert_eq!(status.message(), "no such order");

    running.shutdown().await;
}

#[tokio::test]
async fn test_unknown_service_is_unimplemented() {
    let mut server = GrpcServer::new(false);
    server.add_service(MissingOrders);
    let running = serve(server).await;

    let status = call(running.addr, "/billing.v1.Invoices/List", None).await;
    assert_eq!(status.code(), Code::Unimplemented);

    running.shutdown().await;
}

#[tokio::test]
async fn test_traced_call_records_server_span() {
    let exporter = InMemorySpanExporter::default();
    let provider = TracerProvider::builder()
        .with_simple_exporter(exporter.clone())
        .build();
    let tracer = opentelemetry::trace::TracerProvider::tracer(&provider, "grpc-test");

    let mut server =
        GrpcServer::with_trace_layer(GrpcTraceLayer::new(tracer, SharedPropagator::xray()));
    assert!(server.tracing_enabled());
    server.add_service(MissingOrders);
    let running = serve(server).await;

    let status = call(running.addr, "/orders.v1.Orders/GetOrder", Some(TRACE_HEADER)).await;
    assert_eq!(status.code(), Code::NotFound);
    running.shutdown().await;

    let spans = exporter.get_finished_spans().unwrap();
    assert_eq!(spans.len(), 1);
    let span = &spans[0];
    assert_eq!(span.name, "orders.v1.Orders/GetOrder");
    assert_eq!(span.span_kind, SpanKind::Server);
    assert_eq!(
        span.span_context.trace_id().to_string(),
        "5759e988bd862e3fe1be46a994272793"
    );
    assert_eq!(span.parent_span_id.to_string(), "53995c3f42cd8ad8");
    assert_eq!(
        attribute(span, "rpc.service").map(|v| v.to_string()),
        Some("orders.v1.Orders".to_string())
    );
    assert_eq!(
        attribute(span, "rpc.method").map(|v| v.to_string()),
        Some("GetOrder".to_string())
    );
    assert_eq!(attribute(span, "rpc.grpc.status_code"), Some(&Value::I64(5)));
    assert!(matches!(span.status, SpanStatus::Error { .. }));
}

#[tokio::test]
async fn test_start_fails_when_port_is_taken() {
    let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = taken.local_addr().unwrap().port();

    let err = GrpcServer::new(false).start(port).await.unwrap_err();
    assert!(matches!(err, Error::Listen { port: p, .. } if p == port));
}
