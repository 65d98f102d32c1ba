//! Running the engine as a local HTTP server or behind the Lambda proxy.

use std::net::SocketAddr;

use axum::response::Response;
use axum::Router;
use opentelemetry_sdk::trace::TracerProvider;
use tower::ServiceExt;
use tracing::{error, info};

use commonlib_core::env::non_empty_var;
use commonlib_core::{is_running_as_lambda, telemetry};

use crate::engine::WebEngine;
use crate::error::{Error, Result};

/// Port used when `PORT` is unset.
pub const DEFAULT_PORT: u16 = 8080;

/// Serves Lambda HTTP events (API Gateway v2) with the engine's router.
#[derive(Clone)]
pub struct LambdaHandler {
    router: Router,
    provider: Option<TracerProvider>,
}

impl LambdaHandler {
    /// Handle one invocation. Buffered spans are flushed before returning.
    pub async fn handle(
        &self,
        request: lambda_http::Request,
    ) -> std::result::Result<Response, lambda_http::Error> {
        let response = match self.router.clone().oneshot(request).await {
            Ok(response) => response,
            Err(never) => match never {},
        };

        if let Some(provider) = self.provider.clone() {
            let flushed =
                tokio::task::spawn_blocking(move || telemetry::force_flush(&provider)).await;
            if let Err(e) = flushed {
                error!(error = %e, "failed to flush spans");
            }
        }

        Ok(response)
    }
}

impl WebEngine {
    /// Run until the server stops.
    ///
    /// Inside Lambda the router handles HTTP events from the Lambda runtime.
    /// Otherwise it listens on `0.0.0.0:$PORT` until Ctrl-C. Shutdown
    /// callbacks run afterwards in both cases.
    pub async fn start_server(self) -> Result<()> {
        let mut parts = self.into_parts();

        let result = if is_running_as_lambda() {
            let handler = LambdaHandler {
                router: parts.router.clone(),
                provider: parts.provider.clone(),
            };
            run_lambda(handler).await
        } else {
            serve_local(parts.router.clone()).await
        };

        if let Err(e) = &result {
            error!(error = %e, "Error starting server");
        }

        parts.run_shutdown_callbacks();
        info!("Application exiting.");
        result
    }

    /// The Lambda proxy for this engine, for tests.
    pub fn lambda_handler(self) -> LambdaHandler {
        let parts = self.into_parts();
        LambdaHandler {
            router: parts.router,
            provider: parts.provider,
        }
    }
}

async fn run_lambda(handler: LambdaHandler) -> Result<()> {
    lambda_http::run(lambda_http::service_fn(
        move |request: lambda_http::Request| {
            let handler = handler.clone();
            async move { handler.handle(request).await }
        },
    ))
    .await
    .map_err(|e| Error::Lambda(e.to_string()))
}

async fn serve_local(router: Router) -> Result<()> {
    let port = non_empty_var("PORT")
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_PORT);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(addr = %addr, "listening on");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(e) => {
            error!(error = %e, "failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    }
}
