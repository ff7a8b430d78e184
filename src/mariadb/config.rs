use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions};

use super::executor::MariaDbClient;
use crate::config::DatabaseConfig;
use crate::driver::{DriverClient, DriverConnector};
use crate::error::SqlMiddlewareDbError;
use crate::types::DatabaseType;

const MAX_CONNECTIONS: u32 = 20;
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

/// Opens sqlx MySQL pools for one configured database.
pub struct MariaDbConnector {
    options: MySqlConnectOptions,
}

impl MariaDbConnector {
    /// Build connect options from the database settings.
    ///
    /// `connection_options` uses the URL query form (`ssl-mode=disabled&charset=utf8mb4`).
    /// Credentials are set directly and never pass through URL parsing.
    ///
    /// # Errors
    /// `ConfigError` for missing fields or options sqlx rejects.
    pub fn new(config: &DatabaseConfig) -> Result<Self, SqlMiddlewareDbError> {
        config.validate()?;
        let (host, port) = config.host_port()?;
        let options = config.connection_options.trim();
        let base = if options.is_empty() {
            MySqlConnectOptions::new().host(&host).port(port).database(config.database())
        } else {
            MySqlConnectOptions::from_str(&format!("mysql://{host}:{port}/{}?{options}", config.database()))
                .map_err(|e| {
                    SqlMiddlewareDbError::ConfigError(format!(
                        "invalid mysql options for database {}: {e}",
                        config.nameid
                    ))
                })?
        };
        Ok(Self {
            options: base.username(config.user()).password(config.password()),
        })
    }
}

#[async_trait]
impl DriverConnector for MariaDbConnector {
    fn dialect(&self) -> DatabaseType {
        DatabaseType::MariaDb
    }

    async fn connect(&self) -> Result<Arc<dyn DriverClient>, SqlMiddlewareDbError> {
        let pool = MySqlPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect_with(self.options.clone())
            .await?;
        Ok(Arc::new(MariaDbClient::new(pool)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(options: &str) -> DatabaseConfig {
        DatabaseConfig {
            nameid: "shop".into(),
            database_type: Some("mariadb".into()),
            address: Some("maria.local".into()),
            user_name: Some("app".into()),
            user_password: Some("p@ss:word/1".into()),
            database_name: Some("shop".into()),
            connection_options: options.into(),
            ..DatabaseConfig::default()
        }
    }

    #[test]
    fn options_parse_with_awkward_passwords() {
        let connector = MariaDbConnector::new(&config("charset=utf8mb4")).unwrap();
        assert_eq!(connector.options.get_port(), 3306);
        assert_eq!(connector.options.get_host(), "maria.local");
        assert_eq!(connector.options.get_database(), Some("shop"));
        assert!(MariaDbConnector::new(&config("")).is_ok());
    }
}
