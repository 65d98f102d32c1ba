//! Panic recovery for handlers.

use std::any::Any;

use axum::body::Body;
use axum::http::{Response, StatusCode};
use tower_http::catch_panic::CatchPanicLayer;
use tracing::error;

use commonlib_core::{take_last_panic, StackTrace};

pub(crate) const PANIC_MESSAGE: &str =
    "A panic occurred, which will cause a 500 INTERNAL_SERVER_ERROR response";

pub(crate) type PanicHandler = fn(Box<dyn Any + Send + 'static>) -> Response<Body>;

/// Layer turning handler panics into an empty 500 response.
///
/// The stack recorded by [`commonlib_core::install_panic_hook`] is logged
/// under `stack_trace`; without the hook only the panic reason is logged.
pub fn recovery_layer() -> CatchPanicLayer<PanicHandler> {
    CatchPanicLayer::custom(handle_panic as PanicHandler)
}

fn handle_panic(payload: Box<dyn Any + Send + 'static>) -> Response<Body> {
    let trace = take_last_panic().unwrap_or_else(|| StackTrace {
        thread: String::from("unknown"),
        frames: Vec::new(),
        reason: panic_reason(payload.as_ref()),
    });

    error!(
        stack_trace = %trace.frames_json(),
        error = %trace,
        "{}",
        PANIC_MESSAGE
    );

    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response
}

fn panic_reason(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        String::from("unknown panic payload")
    }
}
