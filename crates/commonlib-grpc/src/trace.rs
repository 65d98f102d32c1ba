//! OpenTelemetry server spans for gRPC calls.
//!
//! The span is named after the full method (`package.Service/Method`) and
//! carries `rpc.system`, `rpc.service` and `rpc.method`. A trailers-only
//! response (every error status) also records `rpc.grpc.status_code`.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use http::{Request, Response};
use opentelemetry::global::BoxedTracer;
use opentelemetry::trace::{SpanKind, Status as SpanStatus, TraceContextExt, Tracer};
use opentelemetry::KeyValue;
use pin_project_lite::pin_project;
use tower::{Layer, Service};

use commonlib_core::SharedPropagator;

const TRACER_NAME: &str = "commonlib-grpc";

/// Tower layer that starts one server span per call, or passes calls
/// through untouched when disabled.
#[derive(Clone)]
pub struct GrpcTraceLayer {
    tracer: Option<Arc<BoxedTracer>>,
    propagator: SharedPropagator,
}

impl std::fmt::Debug for GrpcTraceLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrpcTraceLayer")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

impl GrpcTraceLayer {
    pub fn new<T>(tracer: T, propagator: SharedPropagator) -> Self
    where
        T: Tracer + Send + Sync + 'static,
        T::Span: Send + Sync + 'static,
    {
        Self::boxed(BoxedTracer::new(Box::new(tracer)), propagator)
    }

    /// Trace through the global tracer provider, extracting X-Ray parents.
    pub fn global() -> Self {
        Self::boxed(
            opentelemetry::global::tracer(TRACER_NAME),
            SharedPropagator::default(),
        )
    }

    pub fn disabled() -> Self {
        Self {
            tracer: None,
            propagator: SharedPropagator::default(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.tracer.is_some()
    }

    fn boxed(tracer: BoxedTracer, propagator: SharedPropagator) -> Self {
        Self {
            tracer: Some(Arc::new(tracer)),
            propagator,
        }
    }
}

impl<S> Layer<S> for GrpcTraceLayer {
    type Service = GrpcTrace<S>;

    fn layer(&self, inner: S) -> Self::Service {
        GrpcTrace {
            inner,
            layer: self.clone(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct GrpcTrace<S> {
    inner: S,
    layer: GrpcTraceLayer,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for GrpcTrace<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = GrpcTraceFuture<S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let Some(tracer) = self.layer.tracer.as_deref() else {
            return GrpcTraceFuture {
                inner: self.inner.call(req),
                otel_cx: None,
            };
        };

        let (service, method) = split_full_method(req.uri().path());
        let parent = self.layer.propagator.extract_headers(req.headers());
        let span = tracer
            .span_builder(format!("{service}/{method}"))
            .with_kind(SpanKind::Server)
            .with_attributes([
                KeyValue::new("rpc.system", "grpc"),
                KeyValue::new("rpc.service", service),
                KeyValue::new("rpc.method", method),
            ])
            .start_with_context(tracer, &parent);
        let otel_cx = parent.with_span(span);

        let inner = {
            let _guard = otel_cx.clone().attach();
            self.inner.call(req)
        };
        GrpcTraceFuture {
            inner,
            otel_cx: Some(otel_cx),
        }
    }
}

pin_project! {
    /// Ends the server span once the inner future completes.
    pub struct GrpcTraceFuture<F> {
        #[pin]
        inner: F,
        otel_cx: Option<opentelemetry::Context>,
    }
}

impl<F, ResBody, E> Future for GrpcTraceFuture<F>
where
    F: Future<Output = Result<Response<ResBody>, E>>,
{
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let Some(otel_cx) = this.otel_cx.as_ref() else {
            return this.inner.poll(cx);
        };
        let _guard = otel_cx.clone().attach();

        let result = match this.inner.poll(cx) {
            Poll::Pending => return Poll::Pending,
            Poll::Ready(result) => result,
        };

        let span = otel_cx.span();
        match &result {
            Ok(response) => {
                let code = header_str(response, "grpc-status").and_then(|c| c.parse::<i64>().ok());
                if let Some(code) = code {
                    span.set_attribute(KeyValue::new("rpc.grpc.status_code", code));
                    if code != 0 {
                        let message = header_str(response, "grpc-message").unwrap_or("grpc error");
                        span.set_status(SpanStatus::error(message.to_string()));
                    }
                }
            }
            Err(_) => span.set_status(SpanStatus::error("request failed")),
        }
        span.end();
        Poll::Ready(result)
    }
}

fn header_str<'a, B>(response: &'a Response<B>, name: &str) -> Option<&'a str> {
    response.headers().get(name).and_then(|v| v.to_str().ok())
}

/// Split `/package.Service/Method` into its service and method names.
fn split_full_method(path: &str) -> (String, String) {
    let path = path.trim_start_matches('/');
    match path.split_once('/') {
        Some((service, method)) => (service.to_string(), method.to_string()),
        None => (path.to_string(), String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_full_method() {
        assert_eq!(
            split_full_method("/orders.v1.Orders/GetOrder"),
            ("orders.v1.Orders".to_string(), "GetOrder".to_string())
        );
        assert_eq!(split_full_method("/health"), ("health".to_string(), String::new()));
    }

    #[test]
    fn test_disabled_layer() {
        assert!(!GrpcTraceLayer::disabled().is_enabled());
        assert!(GrpcTraceLayer::global().is_enabled());
    }
}
