//! HTTP web runtime for services on AWS Lambda and containers.
//!
//! [`WebEngine`] wraps an axum [`Router`](axum::Router) with the middleware
//! every service needs:
//!
//! - request logging with a correlation id ([`middleware`])
//! - permissive CORS with credentials
//! - panic recovery logging the stack trace ([`recovery`])
//! - optional OpenTelemetry request spans for AWS X-Ray
//! - optional OpenAPI 3.1 document and Swagger UI ([`openapi`])
//! - optional HTML templates ([`templates`])
//!
//! Handlers return [`ApiError`] for failures; unknown errors are hidden
//! behind a generic 500.
//!
//! # Example
//!
//! ```ignore
//! let mut engine = WebEngine::new([WebOption::xray_tracing("orders")])?;
//! engine.add_route(None, "/orders/:id", Method::Get, None, get_order);
//! engine.start_server().await?;
//! ```

pub mod api_error;
pub mod engine;
pub mod error;
pub mod middleware;
pub mod openapi;
pub mod recovery;
pub mod server;
pub mod templates;

pub use api_error::ApiError;
pub use engine::{Method, RouteGroup, WebEngine, WebOption};
pub use error::{Error, Result};
pub use middleware::RequestId;
pub use openapi::{Annotations, OpenApiDocument};
pub use server::LambdaHandler;
pub use templates::Templates;
