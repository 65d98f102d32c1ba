//! Outbound HTTP helpers.
//!
//! - [`call`]: send an [`HttpRequest`] through any [`HttpDoer`] and map non-2xx
//!   responses to [`HttpError`]
//! - [`decode`]: JSON decoding of response bodies
//! - [`Client`]: a small JSON API client with a 30 second timeout
//!
//! `HttpError` is understood by the web runtime, which maps remote 404 and
//! 403 responses onto its own responses and everything else to
//! `424 Failed Dependency`.

mod client;
mod error;
mod request;

pub use client::{Client, DEFAULT_TIMEOUT};
pub use error::{Error, HttpError, Result};
pub use request::{call, create_request, decode, HttpDoer, HttpRequest, HttpResponse};
