//! gRPC server runtime.
//!
//! [`GrpcServer`] collects tonic services and serves them on localhost.
//! With tracing enabled every call gets an OpenTelemetry server span whose
//! parent is extracted from the request metadata.
//!
//! ```no_run
//! use commonlib_grpc::GrpcServer;
//!
//! # async fn run() -> commonlib_grpc::Result<()> {
//! let mut server = GrpcServer::new(true);
//! // server.add_service(OrdersServer::new(orders));
//! server.start(50051).await
//! # }
//! ```

mod error;
mod server;
pub mod trace;

pub use error::{Error, Result};
pub use server::GrpcServer;
pub use trace::GrpcTraceLayer;
