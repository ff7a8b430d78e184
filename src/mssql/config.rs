use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use deadpool::managed::{self, Metrics, Pool, RecycleError, RecycleResult};
use tiberius::{AuthMethod, Client, EncryptionLevel};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

use super::executor::MssqlClient;
use crate::config::DatabaseConfig;
use crate::driver::{DriverClient, DriverConnector};
use crate::error::SqlMiddlewareDbError;
use crate::types::DatabaseType;

/// Type alias for a single SQL Server session
pub type MssqlConnection = Client<Compat<TcpStream>>;

pub(crate) type MssqlPool = Pool<MssqlManager>;
pub(crate) type MssqlObject = managed::Object<MssqlManager>;

const MAX_POOL_SIZE: usize = 20;

/// Manager for SQL Server sessions (used with deadpool)
#[derive(Clone)]
pub struct MssqlManager {
    config: tiberius::Config,
    server: String,
    port: u16,
}

impl fmt::Debug for MssqlManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MssqlManager")
            .field("server", &self.server)
            .field("port", &self.port)
            .finish_non_exhaustive()
    }
}

impl MssqlManager {
    /// Build the tiberius configuration from the database settings.
    ///
    /// `connection_options` takes `;`-separated `key=value` pairs; `encrypt`
    /// (`disable`, `false`, `true`, `required`) and `trustservercertificate` are understood.
    ///
    /// # Errors
    /// `ConfigError` for missing fields or an unknown option.
    pub fn new(config: &DatabaseConfig) -> Result<Self, SqlMiddlewareDbError> {
        config.validate()?;
        let (server, port) = config.host_port()?;
        let mut tiberius_config = tiberius::Config::new();
        tiberius_config.host(&server);
        tiberius_config.port(port);
        tiberius_config.database(config.database());
        tiberius_config.authentication(AuthMethod::sql_server(config.user(), config.password()));
        tiberius_config.encryption(EncryptionLevel::NotSupported);
        for option in config.connection_options.split(';').map(str::trim).filter(|o| !o.is_empty()) {
            let (key, value) = option.split_once('=').unwrap_or((option, ""));
            match (key.trim().to_ascii_lowercase().as_str(), value.trim().to_ascii_lowercase().as_str()) {
                ("encrypt", "disable" | "false" | "no") => {
                    tiberius_config.encryption(EncryptionLevel::NotSupported);
                }
                ("encrypt", "true" | "yes" | "required") => {
                    tiberius_config.encryption(EncryptionLevel::Required);
                }
                ("trustservercertificate", "true" | "yes") => tiberius_config.trust_cert(),
                (key, _) => {
                    return Err(SqlMiddlewareDbError::ConfigError(format!(
                        "unknown sqlserver connection option {key:?} for database {}",
                        config.nameid
                    )));
                }
            }
        }
        Ok(Self {
            config: tiberius_config,
            server,
            port,
        })
    }
}

impl managed::Manager for MssqlManager {
    type Type = MssqlConnection;
    type Error = tiberius::error::Error;

    async fn create(&self) -> Result<Self::Type, Self::Error> {
        let tcp = TcpStream::connect((self.server.as_str(), self.port))
            .await
            .map_err(|e| tiberius::error::Error::Io {
                kind: e.kind(),
                message: format!("TCP connection error: {e}"),
            })?;
        tcp.set_nodelay(true).map_err(|e| tiberius::error::Error::Io {
            kind: e.kind(),
            message: e.to_string(),
        })?;
        Client::connect(self.config.clone(), tcp.compat_write()).await
    }

    async fn recycle(&self, client: &mut Self::Type, _metrics: &Metrics) -> RecycleResult<Self::Error> {
        client
            .simple_query(DatabaseType::Mssql.ping_statement())
            .await
            .map_err(RecycleError::Backend)?
            .into_results()
            .await
            .map_err(RecycleError::Backend)?;
        Ok(())
    }
}

pub(crate) fn pool_error(err: managed::PoolError<tiberius::error::Error>) -> SqlMiddlewareDbError {
    match err {
        managed::PoolError::Backend(e) => SqlMiddlewareDbError::MssqlError(e),
        other => SqlMiddlewareDbError::ConnectionError(format!("SQL Server pool error: {other}")),
    }
}

/// Opens SQL Server pools for one configured database.
pub struct MssqlConnector {
    manager: MssqlManager,
}

impl MssqlConnector {
    /// # Errors
    /// As [`MssqlManager::new`].
    pub fn new(config: &DatabaseConfig) -> Result<Self, SqlMiddlewareDbError> {
        Ok(Self {
            manager: MssqlManager::new(config)?,
        })
    }
}

#[async_trait]
impl DriverConnector for MssqlConnector {
    fn dialect(&self) -> DatabaseType {
        DatabaseType::Mssql
    }

    async fn connect(&self) -> Result<Arc<dyn DriverClient>, SqlMiddlewareDbError> {
        let pool = Pool::builder(self.manager.clone())
            .max_size(MAX_POOL_SIZE)
            .build()
            .map_err(|e| {
                SqlMiddlewareDbError::ConnectionError(format!("Failed to create SQL Server pool: {e}"))
            })?;
        drop(pool.get().await.map_err(pool_error)?);
        Ok(Arc::new(MssqlClient::new(pool)))
    }
}
