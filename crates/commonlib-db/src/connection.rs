use sqlx::postgres::{PgArguments, PgPool, PgPoolOptions, PgRow};
use sqlx::FromRow;
use tracing::debug;

use crate::config::DbConf;
use crate::error::Result;

pub const DEFAULT_MAX_POOL_SIZE: u32 = 1;

/// Tunables applied by [`PostgresConnection::new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbOption {
    MaxPoolSize(u32),
}

impl DbOption {
    pub fn max_pool_size(size: u32) -> Self {
        DbOption::MaxPoolSize(size)
    }
}

/// A lazily connecting Postgres pool.
#[derive(Debug, Clone)]
pub struct PostgresConnection {
    pool: PgPool,
}

impl PostgresConnection {
    /// No connection is opened until the first query.
    pub fn new(conf: &DbConf, options: impl IntoIterator<Item = DbOption>) -> Self {
        let mut max_pool_size = DEFAULT_MAX_POOL_SIZE;
        for option in options {
            match option {
                DbOption::MaxPoolSize(size) => max_pool_size = size,
            }
        }

        debug!(host = %conf.host, port = conf.port, database = %conf.database, max_pool_size, "creating postgres pool");
        let pool = PgPoolOptions::new()
            .max_connections(max_pool_size)
            .connect_lazy_with(conf.connect_options());
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Wait for checked-out connections to return, then close them all.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Every row of `sql`. An empty result is an empty vector.
    pub async fn perform_select<T>(&self, sql: &str, args: PgArguments) -> Result<Vec<T>>
    where
        T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
    {
        debug!(sql, "executing query");
        sqlx::query_as_with::<_, T, _>(sql, args)
            .fetch_all(&self.pool)
            .await
            .inspect_err(|e| debug!(error = %e, "failed to execute sql query"))
            .map_err(Into::into)
    }

    /// The first row of `sql`, or `None` when there is none.
    pub async fn perform_get<T>(&self, sql: &str, args: PgArguments) -> Result<Option<T>>
    where
        T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
    {
        debug!(sql, "executing query");
        sqlx::query_as_with::<_, T, _>(sql, args)
            .fetch_optional(&self.pool)
            .await
            .inspect_err(|e| debug!(error = %e, "failed to execute sql query"))
            .map_err(Into::into)
    }

    /// Run a statement and return the number of rows it affected.
    pub async fn perform_exec(&self, sql: &str, args: PgArguments) -> Result<u64> {
        debug!(sql, "executing statement");
        let result = sqlx::query_with(sql, args)
            .execute(&self.pool)
            .await
            .inspect_err(|e| debug!(error = %e, "failed to execute sql query"))?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conf() -> DbConf {
        DbConf::new("app", "secret", "localhost", 5432, "orders")
    }

    #[tokio::test]
    async fn test_pool_defaults_to_single_connection() {
        let connection = PostgresConnection::new(&conf(), []);
        assert_eq!(connection.pool().options().get_max_connections(), 1);
        assert_eq!(connection.pool().size(), 0);
    }

    #[tokio::test]
    async fn test_max_pool_size_option() {
        let connection = PostgresConnection::new(&conf(), [DbOption::max_pool_size(8)]);
        assert_eq!(connection.pool().options().get_max_connections(), 8);
        connection.close().await;
        assert!(connection.pool().is_closed());
    }
}
