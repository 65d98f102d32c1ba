//! Bootstrap for plain AWS Lambda handlers.
//!
//! A handler is an async function from a JSON request to a JSON response:
//!
//! ```no_run
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Deserialize)]
//! struct Request { name: String }
//!
//! #[derive(Serialize)]
//! struct Response { greeting: String }
//!
//! async fn greet(req: Request) -> Result<Response, String> {
//!     Ok(Response { greeting: format!("hello {}", req.name) })
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), commonlib_lambda::Error> {
//!     commonlib_lambda::start(greet).await
//! }
//! ```
//!
//! Inside Lambda the handler is driven by `lambda_runtime`. Elsewhere an HTTP
//! emulator accepts the request JSON on any path (see [`local_router`]).

use std::fmt::Display;
use std::future::Future;

use lambda_runtime::{service_fn, LambdaEvent};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::info;

use commonlib_core::env::{non_empty_var, LAMBDA_FUNCTION_NAME_VAR};
use commonlib_core::{init_logging, is_running_as_lambda, LoggingConfig};

mod local;
mod tracing_init;

pub use local::{local_router, serve_local, DEFAULT_PORT};
pub use tracing_init::{initialize_tracing, shutdown_tracing, InvocationTracing};

/// Error type returned to the Lambda runtime.
pub type Error = lambda_runtime::Error;

/// Service name used for tracing outside Lambda.
pub const DEFAULT_SERVICE_NAME: &str = "lambda";

/// Run `handler` until the runtime stops.
pub async fn start<F, Fut, Req, Resp, E>(handler: F) -> Result<(), Error>
where
    F: Fn(Req) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<Resp, E>> + Send + 'static,
    Req: DeserializeOwned + Send + 'static,
    Resp: Serialize + Send + 'static,
    E: Display + Send + 'static,
{
    run(handler, None).await
}

/// Like [`start`], recording every invocation as an X-Ray traced span when
/// `enabled` is set.
///
/// Spans are flushed after each invocation and the provider is shut down
/// when the runtime stops.
pub async fn start_with_tracing<F, Fut, Req, Resp, E>(handler: F, enabled: bool) -> Result<(), Error>
where
    F: Fn(Req) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<Resp, E>> + Send + 'static,
    Req: DeserializeOwned + Send + 'static,
    Resp: Serialize + Send + 'static,
    E: Display + Send + 'static,
{
    if !enabled {
        return start(handler).await;
    }

    let service = non_empty_var(LAMBDA_FUNCTION_NAME_VAR)
        .unwrap_or_else(|| DEFAULT_SERVICE_NAME.to_string());
    let provider = initialize_tracing(&service)?;
    let tracing = InvocationTracing::new(provider.clone(), &service);

    let result = run(handler, Some(tracing)).await;
    shutdown_tracing(&provider);
    result
}

async fn run<F, Fut, Req, Resp, E>(
    handler: F,
    tracing: Option<InvocationTracing>,
) -> Result<(), Error>
where
    F: Fn(Req) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<Resp, E>> + Send + 'static,
    Req: DeserializeOwned + Send + 'static,
    Resp: Serialize + Send + 'static,
    E: Display + Send + 'static,
{
    init_logging(&LoggingConfig::from_env());

    if is_running_as_lambda() {
        info!("starting Lambda runtime");
        lambda_runtime::run(service_fn(move |event: LambdaEvent<Req>| {
            let handler = handler.clone();
            let tracing = tracing.clone();
            async move { invoke(handler, event, tracing.as_ref()).await }
        }))
        .await
    } else {
        serve_local(local_router(handler)).await?;
        Ok(())
    }
}

/// Call the handler for one Lambda event.
pub async fn invoke<F, Fut, Req, Resp, E>(
    handler: F,
    event: LambdaEvent<Req>,
    tracing: Option<&InvocationTracing>,
) -> Result<Resp, Error>
where
    F: Fn(Req) -> Fut,
    Fut: Future<Output = Result<Resp, E>>,
    E: Display,
{
    let result = match tracing {
        Some(tracing) => tracing.trace(&event.context, handler(event.payload)).await,
        None => handler(event.payload).await,
    };
    result.map_err(|e| Error::from(e.to_string()))
}
