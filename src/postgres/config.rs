use std::sync::Arc;

use async_trait::async_trait;
use deadpool_postgres::{Manager, Pool};
use tokio_postgres::NoTls;

use super::executor::PostgresClient;
use crate::config::DatabaseConfig;
use crate::driver::{DriverClient, DriverConnector};
use crate::error::SqlMiddlewareDbError;
use crate::types::DatabaseType;

/// Single-quote a libpq connection string value.
fn quote_value(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('\'', "\\'");
    format!("'{escaped}'")
}

/// Opens deadpool-postgres pools for one configured database.
pub struct PostgresConnector {
    pg_config: tokio_postgres::Config,
}

impl PostgresConnector {
    /// Parse the database settings into a tokio-postgres configuration.
    ///
    /// `connection_options` is appended verbatim as libpq `key=value` pairs
    /// (`connect_timeout=5 application_name=api`). TLS is not negotiated.
    ///
    /// # Errors
    /// `ConfigError` for missing fields or options tokio-postgres does not understand.
    pub fn new(config: &DatabaseConfig) -> Result<Self, SqlMiddlewareDbError> {
        config.validate()?;
        let (host, port) = config.host_port()?;
        let mut conninfo = format!(
            "host={} port={port} user={} password={} dbname={}",
            quote_value(&host),
            quote_value(config.user()),
            quote_value(config.password()),
            quote_value(config.database()),
        );
        let options = config.connection_options.trim();
        if !options.is_empty() {
            conninfo.push(' ');
            conninfo.push_str(options);
        }
        let pg_config = conninfo.parse::<tokio_postgres::Config>().map_err(|e| {
            SqlMiddlewareDbError::ConfigError(format!(
                "invalid postgres settings for database {}: {e}",
                config.nameid
            ))
        })?;
        Ok(Self { pg_config })
    }
}

#[async_trait]
impl DriverConnector for PostgresConnector {
    fn dialect(&self) -> DatabaseType {
        DatabaseType::Postgres
    }

    async fn connect(&self) -> Result<Arc<dyn DriverClient>, SqlMiddlewareDbError> {
        let manager = Manager::new(self.pg_config.clone(), NoTls);
        let pool = Pool::builder(manager).build().map_err(|e| {
            SqlMiddlewareDbError::ConnectionError(format!("Failed to create Postgres pool: {e}"))
        })?;
        // The pool is lazy; check out one session so an unreachable server fails here.
        drop(pool.get().await?);
        Ok(Arc::new(PostgresClient::new(pool)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(options: &str) -> DatabaseConfig {
        DatabaseConfig {
            nameid: "main".into(),
            database_type: Some("postgres".into()),
            address: Some("db.local:5433".into()),
            user_name: Some("app".into()),
            user_password: Some("p'w d".into()),
            database_name: Some("appdb".into()),
            connection_options: options.into(),
            ..DatabaseConfig::default()
        }
    }

    #[test]
    fn settings_survive_quoting() {
        let connector = PostgresConnector::new(&config("connect_timeout=5")).unwrap();
        let pg = &connector.pg_config;
        assert_eq!(pg.get_ports(), &[5433]);
        assert_eq!(pg.get_user(), Some("app"));
        assert_eq!(pg.get_password(), Some("p'w d".as_bytes()));
        assert_eq!(pg.get_dbname(), Some("appdb"));
        assert_eq!(pg.get_connect_timeout(), Some(&std::time::Duration::from_secs(5)));
    }

    #[test]
    fn unknown_option_is_a_config_error() {
        let err = PostgresConnector::new(&config("no_such_option=1")).err().unwrap();
        assert!(matches!(err, SqlMiddlewareDbError::ConfigError(_)));
    }
}
