use thiserror::Error;

/// Convenient result alias for HTTP calls.
pub type Result<T> = std::result::Result<T, Error>;

/// A non-2xx response from a remote service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("HTTP error {status_code}: {body}")]
pub struct HttpError {
    /// Response body as returned by the remote service.
    pub body: String,
    /// HTTP status code.
    pub status_code: u16,
}

impl HttpError {
    pub fn new(status_code: u16, body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            status_code,
        }
    }
}

/// Errors raised by outbound HTTP calls.
#[derive(Debug, Error)]
pub enum Error {
    /// The remote service answered with a non-2xx status.
    #[error(transparent)]
    Http(#[from] HttpError),

    /// The request could not be sent or the response could not be read.
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// A custom [`HttpDoer`](crate::HttpDoer) failed to dispatch the request.
    #[error("request failed: {0}")]
    Dispatch(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The response body was not the expected JSON.
    #[error("failed to decode response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid method {0:?}")]
    InvalidMethod(String),

    /// A header name or value, including the bearer token, is not valid HTTP.
    #[error("invalid header {0}")]
    InvalidHeader(String),

    #[error("invalid uri {uri}: {source}")]
    InvalidUri {
        uri: String,
        #[source]
        source: http::Error,
    },

    /// A resource URL could not be resolved against the base URL.
    #[error("invalid url {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
}

impl Error {
    /// The status of the remote response, when the error came from one.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::Http(e) => Some(e.status_code),
            Error::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
