use std::convert::Infallible;
use std::future::Future;
use std::net::{Ipv4Addr, SocketAddr};

use http::{Request, Response};
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::body::BoxBody;
use tonic::server::NamedService;
use tonic::service::RoutesBuilder;
use tonic::transport::Server;
use tower::Service;
use tracing::{error, info};

use crate::error::{Error, Result};
use crate::trace::GrpcTraceLayer;

/// Collects services and serves them over HTTP/2.
pub struct GrpcServer {
    routes: RoutesBuilder,
    trace: GrpcTraceLayer,
}

impl std::fmt::Debug for GrpcServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrpcServer")
            .field("tracing", &self.trace.is_enabled())
            .finish_non_exhaustive()
    }
}

impl GrpcServer {
    /// With `enable_tracing`, calls are traced through the global tracer
    /// provider.
    pub fn new(enable_tracing: bool) -> Self {
        let trace = if enable_tracing {
            GrpcTraceLayer::global()
        } else {
            GrpcTraceLayer::disabled()
        };
        Self::with_trace_layer(trace)
    }

    pub fn with_trace_layer(trace: GrpcTraceLayer) -> Self {
        Self {
            routes: RoutesBuilder::default(),
            trace,
        }
    }

    pub fn tracing_enabled(&self) -> bool {
        self.trace.is_enabled()
    }

    pub fn add_service<S>(&mut self, service: S) -> &mut Self
    where
        S: Service<Request<BoxBody>, Response = Response<BoxBody>, Error = Infallible>
            + NamedService
            + Clone
            + Send
            + 'static,
        S::Future: Send + 'static,
    {
        self.routes.add_service(service);
        self
    }

    /// Listen on `localhost:port` and serve until ctrl-c.
    pub async fn start(self, port: u16) -> Result<()> {
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| Error::Listen { port, source })?;
        info!("Server started on grpc://localhost:{port}");
        self.serve_with_shutdown(listener, shutdown_signal()).await
    }

    /// Serve on an already bound listener until `signal` completes.
    pub async fn serve_with_shutdown<F>(self, listener: TcpListener, signal: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let addr = listener.local_addr()?;
        info!(addr = %addr, tracing = self.trace.is_enabled(), "serving grpc");

        Server::builder()
            .layer(self.trace)
            .add_routes(self.routes.routes())
            .serve_with_incoming_shutdown(TcpListenerStream::new(listener), signal)
            .await?;
        Ok(())
    }
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
