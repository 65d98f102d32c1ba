//! Error responses for HTTP handlers.
//!
//! Handlers return `Result<T, ApiError>`. Any error converted into an
//! [`ApiError`] is normalized first: remote HTTP failures keep a meaningful
//! status, everything unknown becomes an opaque 500 so internal details are
//! never sent to the client.

use std::fmt;
use std::sync::Arc;

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::{error, warn};

use commonlib_httpcomm::HttpError;

/// Reason used when an unknown error is hidden from the client.
pub const INTERNAL_SERVER_ERROR_REASON: &str = "internal server error";

/// Response status paired with a client-facing reason.
#[derive(Debug, Clone)]
pub struct ApiError {
    pub status: StatusCode,
    pub reason: String,
    /// Underlying cause; logged, never returned to the client.
    pub detail: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl ApiError {
    pub fn new(status: StatusCode, reason: impl Into<String>) -> Self {
        Self {
            status,
            reason: reason.into(),
            detail: None,
        }
    }

    /// Attach the underlying cause.
    pub fn with_detail(mut self, detail: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.detail = Some(Arc::new(detail));
        self
    }

    pub fn bad_request(reason: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, reason)
    }

    pub fn unauthorized(reason: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, reason)
    }

    pub fn forbidden(reason: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, reason)
    }

    pub fn not_found(reason: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, reason)
    }

    pub fn unprocessable_entity(reason: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, reason)
    }

    pub fn failed_dependency(reason: impl Into<String>) -> Self {
        Self::new(StatusCode::FAILED_DEPENDENCY, reason)
    }

    pub fn internal_server_error(reason: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, reason)
    }

    pub fn not_implemented(reason: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_IMPLEMENTED, reason)
    }

    /// Map an arbitrary error onto an `ApiError`.
    ///
    /// - `ApiError` is returned unchanged
    /// - [`HttpError`] 404 and 403 map to the same status, any other status to 424
    /// - everything else becomes a 500 with a generic reason
    ///
    /// Only `err` itself is inspected. An unknown error wrapping an
    /// `HttpError` stays opaque, so remote bodies never leak through it.
    pub fn normalize(err: &(dyn std::error::Error + 'static)) -> Self {
        if let Some(api_error) = err.downcast_ref::<ApiError>() {
            return api_error.clone();
        }
        if let Some(http_error) = find_http_error(err) {
            return Self::from_http_error(http_error);
        }
        Self::internal_server_error(INTERNAL_SERVER_ERROR_REASON)
    }

    fn from_http_error(err: &HttpError) -> Self {
        let reason = err.to_string();
        let api_error = match err.status_code {
            404 => Self::not_found(reason),
            403 => Self::forbidden(reason),
            _ => Self::failed_dependency(reason),
        };
        api_error.with_detail(err.clone())
    }
}

fn find_http_error<'a>(err: &'a (dyn std::error::Error + 'static)) -> Option<&'a HttpError> {
    if let Some(http_error) = err.downcast_ref::<HttpError>() {
        return Some(http_error);
    }
    if let Some(commonlib_httpcomm::Error::Http(http_error)) =
        err.downcast_ref::<commonlib_httpcomm::Error>()
    {
        return Some(http_error);
    }
    None
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status_text = self.status.canonical_reason().unwrap_or("Unknown Status");
        if self.reason.is_empty() {
            write!(f, "{}", status_text)
        } else {
            write!(f, "{}: {}", status_text, self.reason)
        }
    }
}

impl std::error::Error for ApiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.detail
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

impl From<HttpError> for ApiError {
    fn from(err: HttpError) -> Self {
        Self::from_http_error(&err)
    }
}

impl From<commonlib_httpcomm::Error> for ApiError {
    fn from(err: commonlib_httpcomm::Error) -> Self {
        let normalized = Self::normalize(&err);
        normalized.with_detail(err)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        let top: &(dyn std::error::Error + 'static) = err.as_ref();
        let normalized = Self::normalize(top);
        if normalized.detail.is_some() {
            return normalized;
        }
        Self {
            detail: Some(Arc::new(AnyhowDetail(err))),
            ..normalized
        }
    }
}

/// Keeps the `anyhow` chain printable as a detail.
#[derive(Debug)]
struct AnyhowDetail(anyhow::Error);

impl fmt::Display for AnyhowDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#}", self.0)
    }
}

impl std::error::Error for AnyhowDetail {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let detail = self.detail.as_ref().map(|d| d.to_string());
        if self.status.is_server_error() {
            error!(
                status = self.status.as_u16(),
                error = %self,
                detail = detail.as_deref().unwrap_or(""),
                "An error occured, which will cause a {} response",
                self.status.as_u16()
            );
        } else {
            warn!(
                status = self.status.as_u16(),
                error = %self,
                detail = detail.as_deref().unwrap_or(""),
                "An error occured, which will cause a {} response",
                self.status.as_u16()
            );
        }

        let body = serde_json::to_string_pretty(&json!({ "error": self.to_string() }))
            .unwrap_or_else(|_| String::from("{}"));

        let mut response = (self.status, body).into_response();
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json; charset=utf-8"),
        );
        response
    }
}
