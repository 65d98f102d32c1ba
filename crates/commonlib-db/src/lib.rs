//! Postgres access through a small `sqlx` pool.
//!
//! The `testing` feature adds `testing::containerized_postgres` for
//! integration tests against a throwaway container.
//!
//! ```no_run
//! use commonlib_db::{Arguments, DbConf, PgArguments, PostgresConnection};
//!
//! #[derive(sqlx::FromRow)]
//! struct Order {
//!     id: i64,
//!     status: String,
//! }
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//! let conf = DbConf::new("app", "secret", "localhost", 5432, "orders");
//! let db = PostgresConnection::new(&conf, []);
//!
//! let mut args = PgArguments::default();
//! args.add("open")?;
//! let orders: Vec<Order> = db
//!     .perform_select("SELECT id, status FROM orders WHERE status = $1", args)
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod config;
mod connection;
mod error;
mod ready;
#[cfg(feature = "testing")]
pub mod testing;

pub use config::DbConf;
pub use connection::{DbOption, PostgresConnection, DEFAULT_MAX_POOL_SIZE};
pub use error::{Error, Result};
pub use ready::{wait_until_ready, STARTUP_TIMEOUT};
pub use sqlx::postgres::PgArguments;
pub use sqlx::Arguments;
