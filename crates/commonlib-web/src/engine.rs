//! Route registration and middleware composition.

use std::convert::Infallible;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use axum::extract::Request;
use axum::handler::Handler;
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{on, MethodFilter, Route};
use axum::{Extension, Router};
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::trace::TracerProvider;
use serde_json::json;
use tower::{Layer, Service};
use tower_http::services::ServeDir;
use tracing::{error, info};

use commonlib_core::telemetry::{self, TracingConfig};
use commonlib_core::{install_panic_hook, LoggingConfig, SharedPropagator, TelemetryError};

use crate::error::{Error, Result};
use crate::middleware::{cors_layer, RequestLogLayer, TracingLayer};
use crate::openapi::{Annotations, OpenApiDocument};
use crate::recovery::recovery_layer;
use crate::templates::Templates;

const TRACER_NAME: &str = "commonlib-web";

/// HTTP methods routes can be registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }

    fn filter(self) -> MethodFilter {
        match self {
            Method::Get => MethodFilter::GET,
            Method::Post => MethodFilter::POST,
            Method::Put => MethodFilter::PUT,
            Method::Patch => MethodFilter::PATCH,
            Method::Delete => MethodFilter::DELETE,
        }
    }
}

/// Engine configuration applied by [`WebEngine::new`].
pub enum WebOption {
    OpenApi {
        service: String,
        version: String,
        description: String,
        swagger_ui_dist_url: String,
    },
    Tracing {
        service: String,
        provider: Option<TracerProvider>,
        propagator: Option<SharedPropagator>,
    },
}

impl WebOption {
    /// Serve `/openapi.json` and a Swagger UI on `/docs`.
    ///
    /// Only routes registered with annotations are part of the document.
    /// `swagger_ui_dist_url` points at a `swagger-ui-dist` distribution.
    pub fn openapi(
        service: impl Into<String>,
        version: impl Into<String>,
        description: impl Into<String>,
        swagger_ui_dist_url: impl Into<String>,
    ) -> Self {
        WebOption::OpenApi {
            service: service.into(),
            version: version.into(),
            description: description.into(),
            swagger_ui_dist_url: swagger_ui_dist_url.into(),
        }
    }

    /// Trace requests and export spans to AWS X-Ray over OTLP.
    pub fn xray_tracing(service: impl Into<String>) -> Self {
        WebOption::Tracing {
            service: service.into(),
            provider: None,
            propagator: None,
        }
    }

    /// Trace requests with the given provider and propagator.
    pub fn tracing(
        service: impl Into<String>,
        provider: TracerProvider,
        propagator: SharedPropagator,
    ) -> Self {
        WebOption::Tracing {
            service: service.into(),
            provider: Some(provider),
            propagator: Some(propagator),
        }
    }
}

type RouterLayer = Box<dyn FnOnce(Router) -> Router + Send>;
pub(crate) type ShutdownCallback = Box<dyn FnOnce() + Send>;

struct GroupState {
    prefix: String,
    router: Router,
    layers: Vec<RouterLayer>,
}

/// Routes sharing a path prefix and middleware.
///
/// Created with [`WebEngine::new_group`]; clones refer to the same group.
#[derive(Clone)]
pub struct RouteGroup {
    inner: Arc<Mutex<GroupState>>,
}

impl RouteGroup {
    fn new(prefix: &str) -> Self {
        Self {
            inner: Arc::new(Mutex::new(GroupState {
                prefix: prefix.to_string(),
                router: Router::new(),
                layers: Vec::new(),
            })),
        }
    }

    pub fn prefix(&self) -> String {
        self.lock().prefix.clone()
    }

    /// Add middleware applied to the routes of this group only.
    pub fn use_layer<L>(&self, layer: L)
    where
        L: Layer<Route> + Clone + Send + Sync + 'static,
        L::Service: Service<Request> + Clone + Send + Sync + 'static,
        <L::Service as Service<Request>>::Response: IntoResponse + 'static,
        <L::Service as Service<Request>>::Error: Into<Infallible> + 'static,
        <L::Service as Service<Request>>::Future: Send + 'static,
    {
        self.lock()
            .layers
            .push(Box::new(move |router: Router| router.layer(layer)));
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, GroupState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn take_router(&self) -> Router {
        let mut state = self.lock();
        let mut router = std::mem::take(&mut state.router);
        for layer in state.layers.drain(..).rev() {
            router = layer(router);
        }
        router
    }
}

struct TracingState {
    service: String,
    provider: TracerProvider,
    propagator: SharedPropagator,
}

/// An HTTP application: routes, middleware and optional tracing and OpenAPI.
///
/// Every route runs behind request logging, CORS and panic recovery. Layers
/// added with [`use_layer`](Self::use_layer) apply to every route, whether
/// registered before or after the layer.
pub struct WebEngine {
    root: Router,
    groups: Vec<RouteGroup>,
    layers: Vec<RouterLayer>,
    route_count: usize,
    tracing: Option<TracingState>,
    openapi: Option<Arc<RwLock<OpenApiDocument>>>,
    templates: Option<Templates>,
    on_shutdown: Vec<ShutdownCallback>,
}

impl WebEngine {
    /// Create an engine and apply `options`.
    ///
    /// Logging is initialized from the environment and the panic hook used
    /// for stack traces is installed. Tracing options are applied before
    /// OpenAPI options so the documentation routes are traced too.
    pub fn new(options: impl IntoIterator<Item = WebOption>) -> Result<Self> {
        commonlib_core::init_logging(&LoggingConfig::from_env());
        install_panic_hook();

        let mut engine = Self {
            root: Router::new(),
            groups: Vec::new(),
            layers: Vec::new(),
            route_count: 0,
            tracing: None,
            openapi: None,
            templates: None,
            on_shutdown: Vec::new(),
        };

        let (tracing, openapi): (Vec<_>, Vec<_>) = options
            .into_iter()
            .partition(|o| matches!(o, WebOption::Tracing { .. }));

        for option in tracing {
            if let WebOption::Tracing {
                service,
                provider,
                propagator,
            } = option
            {
                engine.enable_tracing(&service, provider, propagator)?;
            }
        }

        for option in openapi {
            if let WebOption::OpenApi {
                service,
                version,
                description,
                swagger_ui_dist_url,
            } = option
            {
                engine.enable_openapi(&service, &version, &description, &swagger_ui_dist_url);
            }
        }

        Ok(engine)
    }

    /// Configure request tracing.
    ///
    /// Must be called before any route is added. Without a provider an X-Ray
    /// provider exporting over OTLP is created; without a propagator the
    /// X-Ray propagator is used. Both are installed globally and the
    /// provider is shut down when the server stops.
    pub fn enable_tracing(
        &mut self,
        service: &str,
        provider: Option<TracerProvider>,
        propagator: Option<SharedPropagator>,
    ) -> Result<()> {
        if self.route_count > 0 {
            return Err(Error::TracingAfterRoutes);
        }
        if service.is_empty() {
            return Err(TelemetryError::MissingServiceName.into());
        }

        info!(service = service, "Enabling tracing");

        let provider = match provider {
            Some(provider) => provider,
            None => telemetry::xray_tracer_provider(&TracingConfig::from_env(service))?,
        };
        let propagator = propagator.unwrap_or_else(SharedPropagator::xray);

        telemetry::install_global(&provider, propagator.clone());

        let shutdown_provider = provider.clone();
        self.on_shutdown(move || telemetry::shutdown(&shutdown_provider));

        self.tracing = Some(TracingState {
            service: service.to_string(),
            provider,
            propagator,
        });
        Ok(())
    }

    fn enable_openapi(
        &mut self,
        service: &str,
        version: &str,
        description: &str,
        swagger_ui_dist_url: &str,
    ) {
        info!(
            "Enabling OpenAPI serving static files from {}",
            swagger_ui_dist_url
        );

        let doc = Arc::new(RwLock::new(OpenApiDocument::new(
            service,
            version,
            description,
            swagger_ui_dist_url,
        )));
        self.openapi = Some(Arc::clone(&doc));

        let spec_doc = Arc::clone(&doc);
        self.add_route(None, "/openapi.json", Method::Get, None, move || {
            let doc = Arc::clone(&spec_doc);
            async move { openapi_json(&doc) }
        });

        let ui_doc = doc;
        self.add_route(None, "/docs", Method::Get, None, move || {
            let doc = Arc::clone(&ui_doc);
            async move {
                let html = doc
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .swagger_ui_html()
                    .to_string();
                Html(html)
            }
        });
    }

    pub fn tracing_enabled(&self) -> bool {
        self.tracing.is_some()
    }

    pub fn openapi_enabled(&self) -> bool {
        self.openapi.is_some()
    }

    /// The tracer provider, when tracing is enabled.
    pub fn tracer_provider(&self) -> Option<&TracerProvider> {
        self.tracing.as_ref().map(|t| &t.provider)
    }

    /// Create a group of routes under `prefix`.
    pub fn new_group(&mut self, prefix: &str) -> RouteGroup {
        let group = RouteGroup::new(prefix);
        self.groups.push(group.clone());
        group
    }

    /// Register a handler.
    ///
    /// `path` may use `:name` and `*name` parameters as well as axum's
    /// `{name}` and `{*name}`. With OpenAPI enabled, routes carrying
    /// annotations are added to the document.
    pub fn add_route<H, T>(
        &mut self,
        group: Option<&RouteGroup>,
        path: &str,
        method: Method,
        annotations: Option<Annotations>,
        handler: H,
    ) where
        H: Handler<T, ()>,
        T: 'static,
    {
        let prefix = group.map(RouteGroup::prefix).unwrap_or_default();
        let full_path = axum_path(&join_paths(&prefix, path));

        if let (Some(doc), Some(annotations)) = (&self.openapi, annotations) {
            doc.write()
                .unwrap_or_else(PoisonError::into_inner)
                .add(method, &full_path, &annotations);
        }

        let method_router = on(method.filter(), handler);
        match group {
            Some(group) => {
                let mut state = group.lock();
                let router = std::mem::take(&mut state.router);
                state.router = router.route(&full_path, method_router);
            }
            None => {
                let router = std::mem::take(&mut self.root);
                self.root = router.route(&full_path, method_router);
            }
        }
        self.route_count += 1;
    }

    /// Add middleware applied to every route.
    ///
    /// Layers registered first run first.
    pub fn use_layer<L>(&mut self, layer: L)
    where
        L: Layer<Route> + Clone + Send + Sync + 'static,
        L::Service: Service<Request> + Clone + Send + Sync + 'static,
        <L::Service as Service<Request>>::Response: IntoResponse + 'static,
        <L::Service as Service<Request>>::Error: Into<Infallible> + 'static,
        <L::Service as Service<Request>>::Future: Send + 'static,
    {
        self.layers
            .push(Box::new(move |router: Router| router.layer(layer)));
    }

    /// Serve the files in `dir` under `/static`.
    pub fn static_directory(&mut self, dir: impl AsRef<Path>) {
        let router = std::mem::take(&mut self.root);
        self.root = router.nest_service("/static", ServeDir::new(dir));
        self.route_count += 1;
    }

    /// Load the HTML templates matching `pattern` and hand them to every
    /// handler as `Extension<Templates>`. A later call replaces the set.
    pub fn load_html_glob(&mut self, pattern: &str) -> Result<()> {
        let templates = Templates::from_glob(pattern)?;
        info!(pattern, templates = ?templates.names(), "loaded html templates");
        self.templates = Some(templates);
        Ok(())
    }

    /// Register a callback run when the server stops.
    ///
    /// Callbacks run once, last registered first.
    pub fn on_shutdown(&mut self, callback: impl FnOnce() + Send + 'static) {
        self.on_shutdown.push(Box::new(callback));
    }

    /// Build the router. Shutdown callbacks are dropped without running.
    pub fn into_router(self) -> Router {
        self.into_parts().router
    }

    pub(crate) fn into_parts(self) -> EngineParts {
        let mut router = self.root;
        for group in &self.groups {
            router = router.merge(group.take_router());
        }
        if let Some(templates) = self.templates {
            router = router.layer(Extension(templates));
        }
        for layer in self.layers.into_iter().rev() {
            router = layer(router);
        }

        router = router
            .layer(recovery_layer())
            .layer(cors_layer())
            .layer(RequestLogLayer);

        let provider = self.tracing.map(|t| {
            let tracer = t.provider.tracer(TRACER_NAME);
            router = std::mem::take(&mut router).layer(TracingLayer::new(
                tracer,
                t.propagator,
                &t.service,
            ));
            t.provider
        });

        EngineParts {
            router,
            provider,
            on_shutdown: self.on_shutdown,
        }
    }
}

pub(crate) struct EngineParts {
    pub router: Router,
    pub provider: Option<TracerProvider>,
    pub on_shutdown: Vec<ShutdownCallback>,
}

impl EngineParts {
    /// Run the shutdown callbacks, last registered first.
    pub fn run_shutdown_callbacks(&mut self) {
        while let Some(callback) = self.on_shutdown.pop() {
            callback();
        }
    }
}

fn openapi_json(doc: &RwLock<OpenApiDocument>) -> Response {
    let spec = doc.read().unwrap_or_else(PoisonError::into_inner).to_json();
    match spec {
        Ok(spec) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            spec,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to marshal OpenAPI spec");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                axum::Json(json!({ "error": "Failed to marshal OpenAPI spec" })),
            )
                .into_response()
        }
    }
}

/// Join a group prefix and a route path.
fn join_paths(prefix: &str, path: &str) -> String {
    if path.is_empty() {
        return if prefix.is_empty() {
            "/".to_string()
        } else {
            prefix.to_string()
        };
    }
    let joined = format!(
        "{}/{}",
        prefix.trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    if joined.starts_with('/') {
        joined
    } else {
        format!("/{joined}")
    }
}

/// Convert `:name` and `*name` segments to axum's `{name}` and `{*name}`.
fn axum_path(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if let Some(name) = segment.strip_prefix(':') {
                format!("{{{name}}}")
            } else if let Some(name) = segment.strip_prefix('*') {
                format!("{{*{name}}}")
            } else {
                segment.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}
