use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("unknown time zone {0}")]
    UnknownTimeZone(String),

    #[error("failed to parse {input:?} as {format}: {source}")]
    Parse {
        input: String,
        format: &'static str,
        #[source]
        source: chrono::ParseError,
    },

    /// The wall-clock time falls in a gap of the local time zone.
    #[error("{0} does not exist in the local time zone")]
    NonexistentLocalTime(String),
}
