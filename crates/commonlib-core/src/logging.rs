//! Structured logging shared by every commonlib runtime.
//!
//! This module provides:
//! - [`LoggingConfig`]: Configuration for the logging system
//! - [`init_logging`]: Initialize tracing with logstash-style JSON or text output
//! - [`LogstashFormat`]: The JSON event formatter
//!
//! # Environment Variables
//!
//! - `LOG_LEVEL`: `TRACE`, `DEBUG`, `INFO` (default), `WARN` or `ERROR`
//! - `RUST_LOG`: Full filter directive, overrides `LOG_LEVEL` when set
//! - `LOG_FORMAT`: `json` or `text`; defaults to `json` inside Lambda and `text` locally
//! - `APP_LABEL`: Added to every JSON entry as `app_label`
//!
//! # Example
//!
//! ```no_run
//! use commonlib_core::logging::{init_logging, LoggingConfig};
//!
//! let config = LoggingConfig::from_env();
//! init_logging(&config);
//! ```

use std::fmt;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::format::{JsonFields, Writer};
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields, FormattedFields};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{fmt as fmt_layer, prelude::*, EnvFilter};

use crate::env::{is_running_as_lambda, non_empty_var};

/// Field that carries a serialized stack trace.
pub const STACK_TRACE_FIELD: &str = "stack_trace";

/// Log verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Parse a level name case-insensitively. Unknown names fall back to `Info`.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_uppercase().as_str() {
            "TRACE" => LogLevel::Trace,
            "DEBUG" => LogLevel::Debug,
            "WARN" | "WARNING" => LogLevel::Warn,
            "ERROR" => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }

    /// Filter directive understood by [`EnvFilter`].
    pub fn as_directive(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Logstash-style JSON (Lambda, containers).
    #[default]
    Json,
    /// Human-readable text logging (local development).
    Text,
}

impl LogFormat {
    /// Parse log format from string.
    ///
    /// Accepts "json", "text", or "pretty" (alias for text).
    /// Returns `Json` for any other value.
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "text" | "pretty" | "console" => LogFormat::Text,
            _ => LogFormat::Json,
        }
    }

    fn detect() -> Self {
        if is_running_as_lambda() {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    }
}

/// Configuration for the logging system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Output format (json or text).
    pub format: LogFormat,
    /// Minimum level when `RUST_LOG` is not set.
    pub level: LogLevel,
    /// Application label added to JSON entries.
    pub app_label: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Json,
            level: LogLevel::Info,
            app_label: None,
        }
    }
}

impl LoggingConfig {
    /// Create configuration from environment variables.
    pub fn from_env() -> Self {
        let format = non_empty_var("LOG_FORMAT")
            .map(|v| LogFormat::parse(&v))
            .unwrap_or_else(LogFormat::detect);

        let level = non_empty_var("LOG_LEVEL")
            .map(|v| LogLevel::parse(&v))
            .unwrap_or_default();

        let app_label = non_empty_var("APP_LABEL");

        Self {
            format,
            level,
            app_label,
        }
    }

    /// Override the application label.
    pub fn with_app_label(mut self, label: impl Into<String>) -> Self {
        self.app_label = Some(label.into());
        self
    }
}

/// Initialize the global tracing subscriber.
///
/// Only the first call installs a subscriber; later calls are ignored so that
/// libraries and tests can call this freely.
///
/// # JSON Format
///
/// ```json
/// {"@timestamp":"2025-01-30T10:00:00.000Z","level":"INFO","message":"...","app_label":"my-app","target":"my_app"}
/// ```
pub fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_directive()));

    let registry = tracing_subscriber::registry().with(filter);

    let result = match config.format {
        LogFormat::Text => registry.with(fmt_layer::layer().pretty()).try_init(),
        LogFormat::Json => {
            let json_layer = fmt_layer::layer()
                .fmt_fields(JsonFields::new())
                .event_format(LogstashFormat::new(config.app_label.clone()));
            registry.with(json_layer).try_init()
        }
    };

    if result.is_err() {
        tracing::debug!("global subscriber already installed, keeping it");
    }
}

/// Formats events as single-line logstash JSON documents.
///
/// Fields of every span in the current scope are merged into the document, so
/// correlation ids recorded on a request span appear on each event.
#[derive(Debug, Clone, Default)]
pub struct LogstashFormat {
    app_label: Option<String>,
}

impl LogstashFormat {
    pub fn new(app_label: Option<String>) -> Self {
        Self { app_label }
    }

    /// Build the JSON document for an event with the given span fields.
    fn document(&self, event: &Event<'_>, span_fields: Map<String, Value>) -> Map<String, Value> {
        let mut doc = Map::new();
        doc.insert(
            "@timestamp".to_string(),
            Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        doc.insert(
            "level".to_string(),
            Value::String(event.metadata().level().as_str().to_string()),
        );
        doc.insert(
            "app_label".to_string(),
            Value::String(self.app_label.clone().unwrap_or_default()),
        );
        doc.insert(
            "target".to_string(),
            Value::String(event.metadata().target().to_string()),
        );
        doc.extend(span_fields);

        let mut visitor = JsonVisitor::default();
        event.record(&mut visitor);
        doc.extend(visitor.fields);

        doc.entry("message".to_string())
            .or_insert_with(|| Value::String(String::new()));
        doc
    }
}

impl<S, N> FormatEvent<S, N> for LogstashFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let mut span_fields = Map::new();
        if let Some(scope) = ctx.event_scope() {
            for span in scope.from_root() {
                let extensions = span.extensions();
                if let Some(fields) = extensions.get::<FormattedFields<N>>() {
                    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(fields.as_str())
                    {
                        span_fields.extend(map);
                    }
                }
            }
        }

        let doc = self.document(event, span_fields);
        writeln!(writer, "{}", Value::Object(doc))
    }
}

/// Collects event fields into a JSON map.
#[derive(Default)]
struct JsonVisitor {
    fields: Map<String, Value>,
}

impl JsonVisitor {
    fn insert(&mut self, field: &Field, value: Value) {
        self.fields.insert(field.name().to_string(), value);
    }
}

impl Visit for JsonVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        // Stack traces are recorded pre-serialized; keep them structured.
        if field.name() == STACK_TRACE_FIELD {
            if let Ok(parsed) = serde_json::from_str::<Value>(value) {
                self.insert(field, parsed);
                return;
            }
        }
        self.insert(field, Value::String(value.to_string()));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.insert(field, Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, Value::Bool(value));
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.insert(field, Value::String(value.to_string()));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        let rendered = format!("{:?}", value);
        if field.name() == STACK_TRACE_FIELD {
            if let Ok(parsed) = serde_json::from_str::<Value>(&rendered) {
                self.insert(field, parsed);
                return;
            }
        }
        self.insert(field, Value::String(rendered));
    }
}
