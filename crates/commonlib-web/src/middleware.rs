//! HTTP middleware for the web engine.
//!
//! - [`RequestId`]: correlation id taken from `X-Request-ID` or generated
//! - [`RequestLogLayer`]: logs each request with status and latency
//! - [`TracingLayer`]: one OpenTelemetry server span per request
//! - [`cors_layer`]: permissive CORS with credentials
//!
//! # Request ID Propagation
//!
//! The `X-Request-ID` header is used when present, otherwise a UUID v7 is
//! generated. The id is put in the request extensions, echoed in the
//! response header and recorded on the request's tracing span.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, Request, Response};
use opentelemetry::trace::{SpanKind, Status, TraceContextExt, Tracer};
use opentelemetry::KeyValue;
use opentelemetry_sdk::trace::Tracer as SdkTracer;
use pin_project_lite::pin_project;
use tower::{Layer, Service};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{info, info_span, Span};
use uuid::Uuid;

use commonlib_core::{correlation_ids, SharedPropagator};

/// Header carrying the request correlation id.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Newtype wrapper for request correlation IDs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a new UUID v7 request ID.
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Extract the request ID from headers or generate a new UUID v7.
///
/// Empty or non UTF-8 header values are ignored.
pub fn extract_or_generate_request_id(headers: &HeaderMap) -> RequestId {
    headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .map(RequestId::from)
        .unwrap_or_else(RequestId::generate)
}

/// CORS policy: every origin is mirrored and credentials are allowed.
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_credentials(true)
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
        ])
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::HEAD,
            Method::OPTIONS,
        ])
}

// =============================================================================
// RequestLogLayer
// =============================================================================

/// Tower layer logging every request.
#[derive(Debug, Clone, Default)]
pub struct RequestLogLayer;

impl<S> Layer<S> for RequestLogLayer {
    type Service = RequestLogMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestLogMiddleware { inner }
    }
}

#[derive(Debug, Clone)]
pub struct RequestLogMiddleware<S> {
    inner: S,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for RequestLogMiddleware<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send,
    ReqBody: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = RequestLogFuture<S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<ReqBody>) -> Self::Future {
        let start = Instant::now();
        let request_id = extract_or_generate_request_id(req.headers());
        let method = req.method().clone();
        let path = req.uri().path().to_string();

        let span = info_span!(
            "request",
            request_id = %request_id,
            method = %method,
            path = %path,
        );

        req.extensions_mut().insert(request_id.clone());

        let future = {
            let _enter = span.enter();
            self.inner.call(req)
        };

        RequestLogFuture {
            inner: future,
            start,
            request_id,
            span,
        }
    }
}

pin_project! {
    /// Logs the outcome once the inner future completes.
    pub struct RequestLogFuture<F> {
        #[pin]
        inner: F,
        start: Instant,
        request_id: RequestId,
        span: Span,
    }
}

impl<F, ResBody, E> Future for RequestLogFuture<F>
where
    F: Future<Output = Result<Response<ResBody>, E>>,
{
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let _enter = this.span.enter();

        match this.inner.poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(mut result) => {
                let latency_ms = this.start.elapsed().as_secs_f64() * 1000.0;

                match &mut result {
                    Ok(response) => {
                        if let Ok(value) = HeaderValue::from_str(this.request_id.as_str()) {
                            response
                                .headers_mut()
                                .insert(HeaderName::from_static(X_REQUEST_ID), value);
                        }
                        info!(
                            status = response.status().as_u16(),
                            latency_ms = latency_ms,
                            "request completed"
                        );
                    }
                    Err(_) => {
                        tracing::error!(latency_ms = latency_ms, "request failed");
                    }
                }

                Poll::Ready(result)
            }
        }
    }
}

// =============================================================================
// TracingLayer
// =============================================================================

/// Tower layer starting an OpenTelemetry server span for each request.
///
/// The parent context is extracted from the request headers. The span's
/// [`opentelemetry::Context`] is attached while the handler runs and is also
/// available as a request extension. Logs emitted by the handler carry
/// `dd.trace_id`, `dd.span_id` and `x_amzn_trace_id`.
#[derive(Clone)]
pub struct TracingLayer {
    tracer: SdkTracer,
    propagator: SharedPropagator,
    span_name: Arc<str>,
}

impl TracingLayer {
    pub fn new(tracer: SdkTracer, propagator: SharedPropagator, service: &str) -> Self {
        Self {
            tracer,
            propagator,
            span_name: Arc::from(service),
        }
    }
}

impl std::fmt::Debug for TracingLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TracingLayer")
            .field("span_name", &self.span_name)
            .finish()
    }
}

impl<S> Layer<S> for TracingLayer {
    type Service = TracingMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TracingMiddleware {
            inner,
            layer: self.clone(),
        }
    }
}

#[derive(Clone)]
pub struct TracingMiddleware<S> {
    inner: S,
    layer: TracingLayer,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for TracingMiddleware<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send,
    ReqBody: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = TracingFuture<S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<ReqBody>) -> Self::Future {
        let parent = self.layer.propagator.extract_headers(req.headers());

        let mut attributes = vec![
            KeyValue::new("http.request.method", req.method().as_str().to_string()),
            KeyValue::new("url.path", req.uri().path().to_string()),
        ];
        if let Some(query) = req.uri().query() {
            attributes.push(KeyValue::new("url.query", query.to_string()));
        }

        let tracer = &self.layer.tracer;
        let otel_span = tracer
            .span_builder(self.layer.span_name.to_string())
            .with_kind(SpanKind::Server)
            .with_attributes(attributes)
            .start_with_context(tracer, &parent);
        let otel_cx = parent.with_span(otel_span);

        let ids = correlation_ids(&otel_cx);
        let span = info_span!(
            "trace",
            dd.trace_id = ids.as_ref().map(|i| i.trace_id.as_str()).unwrap_or(""),
            dd.span_id = ids.as_ref().map(|i| i.span_id.as_str()).unwrap_or(""),
            x_amzn_trace_id = ids
                .as_ref()
                .and_then(|i| i.amzn_trace_id.as_deref())
                .unwrap_or(""),
        );

        req.extensions_mut().insert(otel_cx.clone());

        let future = {
            let _guard = otel_cx.clone().attach();
            let _enter = span.enter();
            self.inner.call(req)
        };

        TracingFuture {
            inner: future,
            otel_cx,
            span,
        }
    }
}

pin_project! {
    /// Ends the server span once the inner future completes.
    pub struct TracingFuture<F> {
        #[pin]
        inner: F,
        otel_cx: opentelemetry::Context,
        span: Span,
    }
}

impl<F, ResBody, E> Future for TracingFuture<F>
where
    F: Future<Output = Result<Response<ResBody>, E>>,
{
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let _guard = this.otel_cx.clone().attach();
        let _enter = this.span.enter();

        match this.inner.poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(result) => {
                let otel_span = this.otel_cx.span();
                match &result {
                    Ok(response) => {
                        let status = response.status();
                        otel_span.set_attribute(KeyValue::new(
                            "http.response.status_code",
                            i64::from(status.as_u16()),
                        ));
                        if status.is_server_error() {
                            otel_span.set_status(Status::error(
                                status.canonical_reason().unwrap_or("server error"),
                            ));
                        }
                    }
                    Err(_) => otel_span.set_status(Status::error("request failed")),
                }
                otel_span.end();
                Poll::Ready(result)
            }
        }
    }
}
