use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use oracle::pool::PoolBuilder;

use super::executor::OracleClient;
use super::join_error;
use crate::config::DatabaseConfig;
use crate::driver::{DriverClient, DriverConnector};
use crate::error::SqlMiddlewareDbError;
use crate::types::DatabaseType;

const MAX_CONNECTIONS: u32 = 20;

/// Opens Oracle session pools for one configured database.
///
/// `connection_options` takes `;`-separated `key=value` pairs: `min_connections`,
/// `max_connections` and `stmt_cache_size`.
#[derive(Clone)]
pub struct OracleConnector {
    user: String,
    password: String,
    connect_string: String,
    min_connections: u32,
    max_connections: u32,
    stmt_cache_size: Option<u32>,
}

impl fmt::Debug for OracleConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OracleConnector")
            .field("user", &self.user)
            .field("connect_string", &self.connect_string)
            .field("max_connections", &self.max_connections)
            .finish_non_exhaustive()
    }
}

fn numeric_option(nameid: &str, key: &str, value: &str) -> Result<u32, SqlMiddlewareDbError> {
    value.parse().map_err(|_| {
        SqlMiddlewareDbError::ConfigError(format!(
            "oracle connection option {key} for database {nameid} must be a number, got {value:?}"
        ))
    })
}

impl OracleConnector {
    /// # Errors
    /// `ConfigError` for missing fields, an unknown option or a non-numeric option value.
    pub fn new(config: &DatabaseConfig) -> Result<Self, SqlMiddlewareDbError> {
        let connect_string = config.connection_string()?;
        let mut connector = Self {
            user: config.user().to_string(),
            password: config.password().to_string(),
            connect_string,
            min_connections: 1,
            max_connections: MAX_CONNECTIONS,
            stmt_cache_size: None,
        };
        for option in config.connection_options.split(';').map(str::trim).filter(|o| !o.is_empty()) {
            let (key, value) = option.split_once('=').unwrap_or((option, ""));
            let (key, value) = (key.trim().to_ascii_lowercase(), value.trim());
            match key.as_str() {
                "min_connections" => connector.min_connections = numeric_option(&config.nameid, &key, value)?,
                "max_connections" => connector.max_connections = numeric_option(&config.nameid, &key, value)?,
                "stmt_cache_size" => {
                    connector.stmt_cache_size = Some(numeric_option(&config.nameid, &key, value)?);
                }
                _ => {
                    return Err(SqlMiddlewareDbError::ConfigError(format!(
                        "unknown oracle connection option {key:?} for database {}",
                        config.nameid
                    )));
                }
            }
        }
        if connector.min_connections > connector.max_connections {
            return Err(SqlMiddlewareDbError::ConfigError(format!(
                "min_connections exceeds max_connections for database {}",
                config.nameid
            )));
        }
        Ok(connector)
    }

    fn build_pool(&self) -> Result<oracle::pool::Pool, SqlMiddlewareDbError> {
        let mut builder = PoolBuilder::new(&self.user, &self.password, &self.connect_string);
        builder
            .min_connections(self.min_connections)
            .max_connections(self.max_connections);
        if let Some(size) = self.stmt_cache_size {
            builder.stmt_cache_size(size);
        }
        Ok(builder.build()?)
    }
}

#[async_trait]
impl DriverConnector for OracleConnector {
    fn dialect(&self) -> DatabaseType {
        DatabaseType::Oracle
    }

    async fn connect(&self) -> Result<Arc<dyn DriverClient>, SqlMiddlewareDbError> {
        let connector = self.clone();
        let pool = tokio::task::spawn_blocking(move || {
            let pool = connector.build_pool()?;
            pool.get()?.ping()?;
            Ok::<_, SqlMiddlewareDbError>(pool)
        })
        .await
        .map_err(|e| join_error(&e))??;
        Ok(Arc::new(OracleClient::new(pool)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(options: &str) -> DatabaseConfig {
        DatabaseConfig {
            nameid: "ledger".into(),
            database_type: Some("oracle".into()),
            address: Some("ora.local".into()),
            user_name: Some("app".into()),
            user_password: Some("hunter2".into()),
            database_name: Some("FREEPDB1".into()),
            connection_options: options.into(),
            ..DatabaseConfig::default()
        }
    }

    #[test]
    fn easy_connect_string_and_options() {
        let connector = OracleConnector::new(&config("max_connections=5; stmt_cache_size=40")).unwrap();
        assert_eq!(connector.connect_string, "//ora.local:1521/FREEPDB1");
        assert_eq!(connector.max_connections, 5);
        assert_eq!(connector.stmt_cache_size, Some(40));
        assert!(!format!("{connector:?}").contains("hunter2"));
    }

    #[test]
    fn bad_options_are_config_errors() {
        for options in ["max_connections=lots", "edition=ORA$BASE", "min_connections=9;max_connections=2"] {
            let err = OracleConnector::new(&config(options)).unwrap_err();
            assert!(matches!(err, SqlMiddlewareDbError::ConfigError(_)), "{options}");
        }
    }
}
