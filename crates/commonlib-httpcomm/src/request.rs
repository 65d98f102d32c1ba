//! Single-shot HTTP calls through a pluggable [`HttpDoer`].

use std::collections::BTreeMap;

use async_trait::async_trait;
use http::header::{AUTHORIZATION, CONTENT_TYPE};
use http::{HeaderName, HeaderValue, Method};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, enabled, trace, Level};

use crate::error::{Error, HttpError, Result};

/// Description of an outbound request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: String,
    pub url: String,
    pub body: Option<Vec<u8>>,
    pub headers: BTreeMap<String, String>,
    /// Sent as `Authorization: Bearer <token>`.
    pub token: Option<String>,
}

impl HttpRequest {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new("GET", url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new("POST", url)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Serialize `body` as JSON and set the content type.
    pub fn with_json<T: Serialize>(self, body: &T) -> Result<Self> {
        let bytes = serde_json::to_vec(body)?;
        Ok(self
            .with_header(CONTENT_TYPE.as_str(), "application/json")
            .with_body(bytes))
    }
}

/// A successful (2xx) response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status_code: u16,
    pub body: String,
}

impl HttpResponse {
    /// Decode the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        decode(self)
    }
}

/// Decode a JSON response body.
pub fn decode<T: DeserializeOwned>(response: &HttpResponse) -> Result<T> {
    Ok(serde_json::from_str(&response.body)?)
}

/// Performs HTTP requests; implemented for [`reqwest::Client`] and by test fakes.
#[async_trait]
pub trait HttpDoer: Send + Sync {
    async fn do_request(&self, request: http::Request<Vec<u8>>) -> Result<http::Response<Vec<u8>>>;
}

#[async_trait]
impl HttpDoer for reqwest::Client {
    async fn do_request(&self, request: http::Request<Vec<u8>>) -> Result<http::Response<Vec<u8>>> {
        let request = reqwest::Request::try_from(request)?;
        let response = reqwest::Client::execute(self, request).await?;

        let mut builder = http::Response::builder()
            .status(response.status())
            .version(response.version());
        if let Some(headers) = builder.headers_mut() {
            headers.extend(response.headers().clone());
        }
        let body = response.bytes().await?.to_vec();

        builder.body(body).map_err(|e| Error::Dispatch(Box::new(e)))
    }
}

/// Build an [`http::Request`] from the description.
pub fn create_request(request: &HttpRequest) -> Result<http::Request<Vec<u8>>> {
    let method = Method::from_bytes(request.method.as_bytes())
        .map_err(|_| Error::InvalidMethod(request.method.clone()))?;

    let mut builder = http::Request::builder().method(method).uri(&request.url);

    for (key, value) in &request.headers {
        let name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|_| Error::InvalidHeader(format!("name {key:?}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| Error::InvalidHeader(format!("value for {key}")))?;
        builder = builder.header(name, value);
    }

    if let Some(token) = &request.token {
        let value = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| Error::InvalidHeader("bearer token".to_string()))?;
        builder = builder.header(AUTHORIZATION, value);
    }

    builder
        .body(request.body.clone().unwrap_or_default())
        .map_err(|source| Error::InvalidUri {
            uri: request.url.clone(),
            source,
        })
}

/// Send a request and return the response, or [`HttpError`] for non-2xx.
pub async fn call(doer: &dyn HttpDoer, request: &HttpRequest) -> Result<HttpResponse> {
    let req = create_request(request)?;

    if enabled!(Level::DEBUG) {
        let headers: Vec<String> = req
            .headers()
            .iter()
            .filter(|(name, _)| **name != AUTHORIZATION)
            .map(|(name, value)| format!("{}: {}", name, value.to_str().unwrap_or("<binary>")))
            .collect();
        debug!(
            method = %req.method(),
            url = %req.uri(),
            headers = ?headers,
            body = %String::from_utf8_lossy(req.body()),
            "outgoing request"
        );
    }

    let response = doer.do_request(req).await?;
    let status_code = response.status().as_u16();
    let body = String::from_utf8_lossy(response.body()).into_owned();

    trace!(status = status_code, body = %body, "incoming response");

    if !response.status().is_success() {
        return Err(HttpError::new(status_code, body).into());
    }

    Ok(HttpResponse { status_code, body })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::sync::Mutex;

    struct MockDoer {
        status: u16,
        body: &'static str,
        seen: Mutex<Vec<http::Request<Vec<u8>>>>,
    }

    impl MockDoer {
        fn new(status: u16, body: &'static str) -> Self {
            Self {
                status,
                body,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl HttpDoer for MockDoer {
        async fn do_request(
            &self,
            request: http::Request<Vec<u8>>,
        ) -> Result<http::Response<Vec<u8>>> {
            self.seen.lock().unwrap().push(request);
            Ok(http::Response::builder()
                .status(self.status)
                .body(self.body.as_bytes().to_vec())
                .unwrap())
        }
    }

    struct FailingDoer;

    #[async_trait]
    impl HttpDoer for FailingDoer {
        async fn do_request(&self, _: http::Request<Vec<u8>>) -> Result<http::Response<Vec<u8>>> {
            Err(Error::Dispatch("socket: connection dropped".into()))
        }
    }

    #[derive(Debug, PartialEq, Deserialize)]
    struct TestStruct {
        field1: String,
        field2: i32,
    }

    #[tokio::test]
    async fn test_call_200_returns_response() {
        let doer = MockDoer::new(200, "OK");
        let res = call(&doer, &HttpRequest::get("http://localhost/"))
            .await
            .unwrap();

        assert_eq!(res.status_code, 200);
        assert_eq!(res.body, "OK");
    }

    #[tokio::test]
    async fn test_call_404_returns_http_error() {
        let doer = MockDoer::new(404, "NOT FOUND");
        let err = call(&doer, &HttpRequest::get("http://localhost/"))
            .await
            .unwrap_err();

        match err {
            Error::Http(e) => {
                assert_eq!(e.status_code, 404);
                assert_eq!(e.body, "NOT FOUND");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_call_failing_doer_returns_error() {
        let err = call(&FailingDoer, &HttpRequest::get("http://localhost/"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("socket: connection dropped"));
        assert_eq!(err.status_code(), None);
    }

    #[tokio::test]
    async fn test_call_sets_bearer_token_and_headers() {
        let doer = MockDoer::new(204, "");
        let request = HttpRequest::post("http://localhost/orders")
            .with_token("secret")
            .with_header("X-Correlation-Id", "abc")
            .with_body("{}");
        call(&doer, &request).await.unwrap();

        let seen = doer.seen.lock().unwrap();
        let sent = &seen[0];
        assert_eq!(sent.method(), Method::POST);
        assert_eq!(sent.headers()[AUTHORIZATION], "Bearer secret");
        assert_eq!(sent.headers()["x-correlation-id"], "abc");
        assert_eq!(sent.body(), b"{}");
    }

    #[test]
    fn test_create_request_rejects_invalid_method() {
        let err = create_request(&HttpRequest::new("GE T", "http://localhost/")).unwrap_err();
        assert!(matches!(err, Error::InvalidMethod(ref m) if m == "GE T"));
    }

    #[test]
    fn test_create_request_rejects_invalid_header() {
        let request = HttpRequest::get("http://localhost/").with_header("X-Id", "a\nb");
        assert!(matches!(create_request(&request), Err(Error::InvalidHeader(_))));

        let request = HttpRequest::get("http://localhost/").with_token("bad\ntoken");
        assert!(matches!(create_request(&request), Err(Error::InvalidHeader(_))));
    }

    fn response(body: &str) -> HttpResponse {
        HttpResponse {
            status_code: 200,
            body: body.to_string(),
        }
    }

    #[test]
    fn test_decode_valid_json_to_string() {
        let received: String = decode(&response(r#""Hello world""#)).unwrap();
        assert_eq!(received, "Hello world");
    }

    #[test]
    fn test_decode_invalid_json_to_string_returns_error() {
        assert!(decode::<String>(&response("10")).is_err());
    }

    #[test]
    fn test_decode_valid_json_to_struct() {
        let received: TestStruct = decode(&response(r#"{"field1":"Hello world","field2":10}"#)).unwrap();
        assert_eq!(
            received,
            TestStruct {
                field1: "Hello world".to_string(),
                field2: 10
            }
        );
    }

    #[test]
    fn test_decode_invalid_json_to_struct_returns_error() {
        assert!(decode::<TestStruct>(&response("10")).is_err());
    }
}
