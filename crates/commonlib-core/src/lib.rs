//! Runtime plumbing shared by every commonlib crate.
//!
//! - [`env`]: Lambda detection and environment helpers
//! - [`logging`]: logstash-style structured logging on `tracing`
//! - [`telemetry`]: OpenTelemetry tracer provider for AWS X-Ray
//! - [`stacktrace`]: panic stack capture for recovery middleware
//!
//! # Testing Support
//!
//! The [`test_utils`] module provides resource file loading for tests. Enable
//! the `test-utils` feature to access it from dependent crates.

pub mod env;
pub mod logging;
pub mod stacktrace;
pub mod telemetry;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use env::is_running_as_lambda;
pub use logging::{init_logging, LogFormat, LogLevel, LoggingConfig};
pub use stacktrace::{install_panic_hook, take_last_panic, Frame, StackTrace};
pub use telemetry::{
    correlation_ids, xray_tracer_provider, CorrelationIds, SharedPropagator, TelemetryError,
    TracingConfig,
};
