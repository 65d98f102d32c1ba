use aws_smithy_types::error::display::DisplayErrorContext;
use aws_smithy_types::error::metadata::ProvideErrorMetadata;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// An SDK call failed. `code` carries the service error code when the
    /// service returned one.
    #[error("{operation} failed: {message}")]
    Sdk {
        operation: &'static str,
        code: Option<String>,
        message: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A response lacked a value the wrapper needs.
    #[error("{0} missing from response")]
    MissingField(&'static str),

    #[error("failed to find container definition with image that contains string {0}")]
    ContainerNotFound(String),

    #[error("either parameter store value or environment variable {variable} must be set for {field}")]
    MissingConfiguration { field: String, variable: String },

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error(transparent)]
    Build(#[from] aws_smithy_types::error::operation::BuildError),

    #[error(transparent)]
    Extension(#[from] commonlib_httpcomm::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Dynamo(#[from] serde_dynamo::Error),

    #[error(transparent)]
    ByteStream(#[from] aws_smithy_types::byte_stream::error::Error),

    #[error("failed to decode secret: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("secret is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

impl Error {
    /// Service error code of a failed SDK call.
    pub fn code(&self) -> Option<&str> {
        match self {
            Error::Sdk { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}

/// Map an SDK error into [`Error::Sdk`] tagged with `operation`.
pub(crate) fn sdk_error<E>(operation: &'static str) -> impl FnOnce(E) -> Error
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    move |err| Error::Sdk {
        operation,
        code: err.code().map(str::to_string),
        message: DisplayErrorContext(&err).to_string(),
        source: Box::new(err),
    }
}
