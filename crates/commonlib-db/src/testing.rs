//! Disposable Postgres for integration tests. Needs Docker.
//!
//! ```no_run
//! use commonlib_db::{testing, DbConf, PostgresConnection};
//!
//! # async fn run() -> commonlib_db::Result<()> {
//! let mut conf = DbConf::new("app", "secret", "localhost", 5432, "orders");
//! let _container = testing::containerized_postgres(&mut conf).await?;
//! let db = PostgresConnection::new(&conf, []);
//! # Ok(())
//! # }
//! ```

use testcontainers_modules::postgres::Postgres;
use testcontainers_modules::testcontainers::runners::AsyncRunner;
use testcontainers_modules::testcontainers::{ContainerAsync, ImageExt};
use tracing::info;

use crate::config::DbConf;
use crate::error::Result;
use crate::ready::{wait_until_ready, STARTUP_TIMEOUT};

pub const POSTGRES_TAG: &str = "14.2-alpine";

const POSTGRES_PORT: u16 = 5432;

/// Start a container with `conf`'s credentials, point `conf` at its mapped
/// port and wait until it answers queries.
///
/// The container is removed when the returned handle is dropped.
pub async fn containerized_postgres(conf: &mut DbConf) -> Result<ContainerAsync<Postgres>> {
    let container = Postgres::default()
        .with_user(&conf.username)
        .with_password(&conf.password)
        .with_db_name(&conf.database)
        .with_tag(POSTGRES_TAG)
        .start()
        .await?;

    let host = container.get_host().await?;
    let port = container.get_host_port_ipv4(POSTGRES_PORT).await?;
    conf.update_host_and_port(host.to_string(), port);
    info!(host = %conf.host, port, "postgres container started");

    wait_until_ready(conf, STARTUP_TIMEOUT).await?;
    Ok(container)
}
