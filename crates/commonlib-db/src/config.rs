use sqlx::postgres::{PgConnectOptions, PgSslMode};

/// Connection settings for a Postgres database.
#[derive(Clone, PartialEq, Eq)]
pub struct DbConf {
    pub username: String,
    pub password: String,
    pub database: String,
    pub host: String,
    pub port: u16,
}

impl std::fmt::Debug for DbConf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbConf")
            .field("username", &self.username)
            .field("password", &"***")
            .field("database", &self.database)
            .field("host", &self.host)
            .field("port", &self.port)
            .finish()
    }
}

impl DbConf {
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        database: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            database: database.into(),
            host: host.into(),
            port,
        }
    }

    /// Point at the host and port a container mapped the database to.
    pub fn update_host_and_port(&mut self, host: impl Into<String>, port: u16) -> &mut Self {
        self.host = host.into();
        self.port = port;
        self
    }

    /// Options for connecting without TLS.
    pub fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.username)
            .password(&self.password)
            .database(&self.database)
            .ssl_mode(PgSslMode::Disable)
    }
}
