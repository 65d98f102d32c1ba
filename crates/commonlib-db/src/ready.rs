use std::time::Duration;

use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::Connection;
use tracing::debug;

use crate::config::DbConf;
use crate::error::{Error, Result};

pub const STARTUP_TIMEOUT: Duration = Duration::from_secs(60);

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Poll `SELECT 1` until the database answers or `timeout` passes.
pub async fn wait_until_ready(conf: &DbConf, timeout: Duration) -> Result<()> {
    let options = conf.connect_options();
    let poll = async {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            tokio::time::sleep(POLL_INTERVAL).await;
            match select_one(&options).await {
                Ok(()) => return,
                Err(e) => debug!(attempt, error = %e, "postgres not ready"),
            }
        }
    };
    tokio::time::timeout(timeout, poll)
        .await
        .map_err(|_| Error::NotReady(timeout))
}

async fn select_one(options: &PgConnectOptions) -> std::result::Result<(), sqlx::Error> {
    let mut connection = PgConnection::connect_with(options).await?;
    sqlx::query("SELECT 1").execute(&mut connection).await?;
    connection.close().await
}
