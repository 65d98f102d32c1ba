use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to execute sql query: {0}")]
    Query(#[from] sqlx::Error),

    #[error("postgres did not answer within {0:?}")]
    NotReady(Duration),

    #[cfg(feature = "testing")]
    #[error("postgres container failed: {0}")]
    Container(#[from] testcontainers_modules::testcontainers::TestcontainersError),
}
