use thiserror::Error;

use commonlib_core::TelemetryError;

/// Convenient result alias for the web runtime.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while configuring or running the web engine.
#[derive(Debug, Error)]
pub enum Error {
    /// Tracing middleware only wraps routes registered after it is enabled.
    #[error("tracing must be enabled before adding routes to the engine, otherwise the middleware isn't applied to the routes")]
    TracingAfterRoutes,

    /// Tracing could not be configured.
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),

    /// The OpenAPI document could not be serialized.
    #[error("failed to serialize OpenAPI document: {0}")]
    OpenApi(#[from] serde_json::Error),

    /// HTML templates could not be loaded.
    #[error("failed to load templates: {0}")]
    Template(#[from] tera::Error),

    /// The local HTTP server failed to bind or serve.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The Lambda runtime reported an error.
    #[error("lambda runtime error: {0}")]
    Lambda(String),
}
