//! HTTP emulator for running handlers outside Lambda.

use std::fmt::Display;
use std::future::Future;
use std::net::SocketAddr;

use axum::body::Bytes;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use tracing::{error, info, warn};

use commonlib_core::env::non_empty_var;

/// Port used when `PORT` is unset.
pub const DEFAULT_PORT: u16 = 8080;

/// Router passing each request body to `handler`.
///
/// Any method and path is accepted. The body is decoded as JSON (an empty
/// body as `null`) and the handler result is returned as JSON. Undecodable
/// bodies get a 400 and handler errors a 500, both as `{"message": ...}`.
pub fn local_router<F, Fut, Req, Resp, E>(handler: F) -> Router
where
    F: Fn(Req) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<Resp, E>> + Send + 'static,
    Req: DeserializeOwned + Send + 'static,
    Resp: Serialize + Send + 'static,
    E: Display + Send + 'static,
{
    Router::new().fallback(move |body: Bytes| {
        let handler = handler.clone();
        async move { invoke_local(handler, body).await }
    })
}

async fn invoke_local<F, Fut, Req, Resp, E>(handler: F, body: Bytes) -> Response
where
    F: Fn(Req) -> Fut,
    Fut: Future<Output = Result<Resp, E>>,
    Req: DeserializeOwned,
    Resp: Serialize,
    E: Display,
{
    let payload: &[u8] = if body.is_empty() { b"null" } else { &body };
    let request = match serde_json::from_slice::<Req>(payload) {
        Ok(request) => request,
        Err(e) => {
            warn!(error = %e, "invalid request body");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "message": format!("invalid request body: {e}") })),
            )
                .into_response();
        }
    };

    match handler(request).await {
        Ok(response) => Json(response).into_response(),
        Err(e) => {
            error!(error = %e, "handler failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "message": e.to_string() })),
            )
                .into_response()
        }
    }
}

/// Serve `router` on `0.0.0.0:$PORT` until Ctrl-C.
pub async fn serve_local(router: Router) -> std::io::Result<()> {
    let port = non_empty_var("PORT")
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_PORT);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(addr = %addr, "emulating Lambda on");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
        })
        .await
}
