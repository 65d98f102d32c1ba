//! Server-side HTML rendering with tera.
//!
//! Templates are loaded once with [`WebEngine::load_html_glob`] and reach
//! handlers as an [`Extension`](axum::Extension):
//!
//! ```ignore
//! async fn index(Extension(templates): Extension<Templates>) -> Result<Html<String>, ApiError> {
//!     templates.render("index.html", &json!({ "title": "Orders" }))
//! }
//! ```
//!
//! [`WebEngine::load_html_glob`]: crate::WebEngine::load_html_glob

use std::sync::Arc;

use axum::response::Html;
use serde::Serialize;
use tera::{Context, Tera};
use tracing::error;

use crate::api_error::ApiError;
use crate::error::Result;

#[derive(Clone)]
pub struct Templates(Arc<Tera>);

impl std::fmt::Debug for Templates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Templates")
            .field(&self.0.get_template_names().collect::<Vec<_>>())
            .finish()
    }
}

impl Templates {
    /// Parse every file matching `pattern`. Names are relative to the
    /// directory the glob starts in.
    pub fn from_glob(pattern: &str) -> Result<Self> {
        Ok(Self(Arc::new(Tera::new(pattern)?)))
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.0.get_template_names().collect();
        names.sort_unstable();
        names
    }

    /// Render `name` with `context`. Failures become a 500.
    pub fn render<T: Serialize>(&self, name: &str, context: &T) -> std::result::Result<Html<String>, ApiError> {
        Context::from_serialize(context)
            .and_then(|context| self.0.render(name, &context))
            .map(Html)
            .map_err(|e| {
                error!(template = name, error = ?e, "failed to render template");
                ApiError::internal_server_error("internal server error").with_detail(e)
            })
    }
}
