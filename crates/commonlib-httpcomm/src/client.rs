//! JSON API client with a base URL, default headers and optional tracing.

use std::collections::BTreeMap;
use std::time::Duration;

use http::header::CONTENT_TYPE;
use http::{HeaderMap, Method};
use opentelemetry::trace::{SpanKind, Status, TraceContextExt, Tracer};
use opentelemetry::{global, Context, KeyValue};
use reqwest::Url;
use serde::de::DeserializeOwned;
use tracing::debug;

use commonlib_core::telemetry::HeaderInjector;

use crate::error::{Error, HttpError, Result};

/// Request timeout applied to every call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const TRACER_NAME: &str = "commonlib-httpcomm";

/// HTTP client for a single API.
///
/// Resource URLs are resolved against the base URL, so both absolute URLs
/// and relative paths such as `"orders/42"` are accepted. When tracing is
/// enabled each call is recorded as a client span and the trace context is
/// propagated with the globally installed propagator.
#[derive(Debug, Clone)]
pub struct Client {
    http: reqwest::Client,
    base_url: Url,
    headers: BTreeMap<String, String>,
    tracing: bool,
}

impl Client {
    pub fn new(
        base_url: &str,
        headers: BTreeMap<String, String>,
        tracing: bool,
    ) -> Result<Self> {
        let base_url = Url::parse(base_url).map_err(|source| Error::InvalidUrl {
            url: base_url.to_string(),
            source,
        })?;
        let http = reqwest::Client::builder().timeout(DEFAULT_TIMEOUT).build()?;

        Ok(Self {
            http,
            base_url,
            headers,
            tracing,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub async fn get(&self, resource: &str, token: Option<&str>) -> Result<Vec<u8>> {
        self.send(Method::GET, resource, None, token).await
    }

    pub async fn delete(&self, resource: &str, token: Option<&str>) -> Result<Vec<u8>> {
        self.send(Method::DELETE, resource, None, token).await
    }

    pub async fn post(
        &self,
        resource: &str,
        body: Vec<u8>,
        content_type: &str,
        token: Option<&str>,
    ) -> Result<Vec<u8>> {
        self.send(Method::POST, resource, Some((body, content_type)), token)
            .await
    }

    pub async fn put(
        &self,
        resource: &str,
        body: Vec<u8>,
        content_type: &str,
        token: Option<&str>,
    ) -> Result<Vec<u8>> {
        self.send(Method::PUT, resource, Some((body, content_type)), token)
            .await
    }

    /// GET and decode the JSON body.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        resource: &str,
        token: Option<&str>,
    ) -> Result<T> {
        let body = self.get(resource, token).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    fn resolve(&self, resource: &str) -> Result<Url> {
        self.base_url
            .join(resource)
            .map_err(|source| Error::InvalidUrl {
                url: resource.to_string(),
                source,
            })
    }

    async fn send(
        &self,
        method: Method,
        resource: &str,
        body: Option<(Vec<u8>, &str)>,
        token: Option<&str>,
    ) -> Result<Vec<u8>> {
        let url = self.resolve(resource)?;

        let mut builder = self.http.request(method.clone(), url.clone());
        for (key, value) in &self.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }
        if let Some((body, content_type)) = body {
            builder = builder.header(CONTENT_TYPE, content_type).body(body);
        }
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }

        let cx = if self.tracing {
            let cx = start_client_span(&method, &url);
            let mut headers = HeaderMap::new();
            global::get_text_map_propagator(|propagator| {
                propagator.inject_context(&cx, &mut HeaderInjector(&mut headers))
            });
            builder = builder.headers(headers);
            Some(cx)
        } else {
            None
        };

        let result = self.execute(builder, &url).await;

        if let Some(cx) = cx {
            let span = cx.span();
            match &result {
                Ok(_) => span.set_attribute(KeyValue::new("http.response.status_code", 200_i64)),
                Err(e) => {
                    if let Some(status) = e.status_code() {
                        span.set_attribute(KeyValue::new(
                            "http.response.status_code",
                            i64::from(status),
                        ));
                    }
                    span.set_status(Status::error(e.to_string()));
                }
            }
            span.end();
        }

        result
    }

    async fn execute(&self, builder: reqwest::RequestBuilder, url: &Url) -> Result<Vec<u8>> {
        let response = builder.send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        debug!(url = %url, status = status.as_u16(), "API call completed");

        // Only 200 is treated as success by this client.
        if status != reqwest::StatusCode::OK {
            return Err(HttpError::new(status.as_u16(), String::from_utf8_lossy(&body)).into());
        }

        Ok(body.to_vec())
    }
}

fn start_client_span(method: &Method, url: &Url) -> Context {
    let tracer = global::tracer(TRACER_NAME);
    let span = tracer
        .span_builder(method.as_str().to_lowercase())
        .with_kind(SpanKind::Client)
        .with_attributes(vec![
            KeyValue::new("http.request.method", method.as_str().to_string()),
            KeyValue::new("url.full", url.to_string()),
        ])
        .start_with_context(&tracer, &Context::current());
    Context::current().with_span(span)
}
