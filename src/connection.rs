//! Connection lifecycle for one logical database: lazy connect, health checks,
//! reconnect-and-retry.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::config::DatabaseConfig;
use crate::dialect::IsolationLevel;
use crate::driver::{DriverClient, DriverConnector};
use crate::error::SqlMiddlewareDbError;
use crate::transaction::Transaction;
use crate::types::DatabaseType;

/// Bounds for [`DatabaseConnection::with_retry`] and the health check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub attempts: usize,
    /// Sleep before reconnecting after a failed ping.
    pub backoff: Duration,
    pub ping_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 4,
            backoff: Duration::from_secs(1),
            ping_timeout: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "DISCONNECTED",
            ConnectionState::Connecting => "CONNECTING",
            ConnectionState::Connected => "CONNECTED",
        };
        f.write_str(s)
    }
}

struct Slot {
    state: ConnectionState,
    client: Option<Arc<dyn DriverClient>>,
}

/// Build the native connector for `config`'s dialect.
///
/// # Errors
/// `ConfigError` / `UnsupportedDialect` for invalid settings, `Unimplemented` when the
/// dialect's cargo feature is disabled.
pub fn connector_for(config: &DatabaseConfig) -> Result<Arc<dyn DriverConnector>, SqlMiddlewareDbError> {
    config.validate()?;
    match config.dialect()? {
        #[cfg(feature = "postgres")]
        DatabaseType::Postgres => Ok(Arc::new(crate::postgres::PostgresConnector::new(config)?)),
        #[cfg(feature = "mssql")]
        DatabaseType::Mssql => Ok(Arc::new(crate::mssql::MssqlConnector::new(config)?)),
        #[cfg(feature = "mariadb")]
        DatabaseType::MariaDb => Ok(Arc::new(crate::mariadb::MariaDbConnector::new(config)?)),
        #[cfg(feature = "oracle")]
        DatabaseType::Oracle => Ok(Arc::new(crate::oracle::OracleConnector::new(config)?)),
        #[allow(unreachable_patterns)]
        other => Err(SqlMiddlewareDbError::Unimplemented(format!(
            "{other} support requires the `{}` feature",
            match other {
                DatabaseType::Postgres => "postgres",
                DatabaseType::Mssql => "mssql",
                DatabaseType::Oracle => "oracle",
                DatabaseType::MariaDb => "mariadb",
            }
        ))),
    }
}

/// One configured database and its connection state.
///
/// The state and the driver client sit behind one async mutex, so concurrent
/// connect/disconnect calls are serialised. Statement execution only holds the lock long
/// enough to clone the client handle.
pub struct DatabaseConnection {
    name_id: String,
    dialect: DatabaseType,
    must_connect: bool,
    connect_at_start: bool,
    display_target: String,
    create_script_files: Vec<String>,
    connector: Arc<dyn DriverConnector>,
    retry: RetryPolicy,
    slot: Mutex<Slot>,
}

impl fmt::Debug for DatabaseConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConnection")
            .field("name_id", &self.name_id)
            .field("dialect", &self.dialect)
            .field("target", &self.display_target)
            .field("must_connect", &self.must_connect)
            .finish_non_exhaustive()
    }
}

impl DatabaseConnection {
    /// Wrap an existing connector. Nothing is connected yet.
    #[must_use]
    pub fn new(name_id: impl Into<String>, connector: Arc<dyn DriverConnector>) -> Self {
        let name_id = name_id.into();
        let dialect = connector.dialect();
        Self {
            display_target: format!("{}://{name_id}", dialect.driver_name()),
            name_id,
            dialect,
            must_connect: false,
            connect_at_start: false,
            create_script_files: Vec::new(),
            connector,
            retry: RetryPolicy::default(),
            slot: Mutex::new(Slot {
                state: ConnectionState::Disconnected,
                client: None,
            }),
        }
    }

    /// Build from configuration with the matching native driver.
    ///
    /// # Errors
    /// See [`connector_for`].
    pub fn from_config(config: &DatabaseConfig) -> Result<Self, SqlMiddlewareDbError> {
        let connector = connector_for(config)?;
        Ok(Self::new(config.nameid.clone(), connector)
            .must_connect(config.must_connected)
            .connect_at_start(config.is_connect_at_start)
            .display_target(config.non_sensitive_connection_string())
            .create_script_files(config.create_script_files.clone()))
    }

    #[must_use]
    pub fn must_connect(mut self, must_connect: bool) -> Self {
        self.must_connect = must_connect;
        self
    }

    #[must_use]
    pub fn connect_at_start(mut self, connect_at_start: bool) -> Self {
        self.connect_at_start = connect_at_start;
        self
    }

    /// Credential-free description used in log lines.
    #[must_use]
    pub fn display_target(mut self, target: impl Into<String>) -> Self {
        self.display_target = target.into();
        self
    }

    #[must_use]
    pub fn create_script_files(mut self, files: Vec<String>) -> Self {
        self.create_script_files = files;
        self
    }

    #[must_use]
    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn name_id(&self) -> &str {
        &self.name_id
    }

    #[must_use]
    pub fn dialect(&self) -> DatabaseType {
        self.dialect
    }

    #[must_use]
    pub fn is_must_connect(&self) -> bool {
        self.must_connect
    }

    #[must_use]
    pub fn is_connect_at_start(&self) -> bool {
        self.connect_at_start
    }

    #[must_use]
    pub fn script_files(&self) -> &[String] {
        &self.create_script_files
    }

    pub async fn state(&self) -> ConnectionState {
        self.slot.lock().await.state
    }

    /// Open the driver client, replacing any previous one.
    ///
    /// # Errors
    /// A must-connect database reports failure as `MustConnectFailed`, which callers should
    /// treat as fatal. Others return the driver error.
    pub async fn connect(&self) -> Result<(), SqlMiddlewareDbError> {
        let mut slot = self.slot.lock().await;
        tracing::info!(database = %self.name_id, target = %self.display_target, "connecting");
        slot.state = ConnectionState::Connecting;
        if let Some(old) = slot.client.take() {
            old.close().await;
        }
        match self.connector.connect().await {
            Ok(client) => {
                slot.client = Some(client);
                slot.state = ConnectionState::Connected;
                tracing::info!(database = %self.name_id, target = %self.display_target, "connected");
                Ok(())
            }
            Err(err) => {
                slot.state = ConnectionState::Disconnected;
                if self.must_connect {
                    tracing::error!(
                        database = %self.name_id,
                        target = %self.display_target,
                        error = %err,
                        "cannot connect to mandatory database"
                    );
                    Err(SqlMiddlewareDbError::MustConnectFailed {
                        name: self.name_id.clone(),
                        reason: err.to_string(),
                    })
                } else {
                    tracing::warn!(
                        database = %self.name_id,
                        target = %self.display_target,
                        error = %err,
                        "cannot connect to database"
                    );
                    Err(err)
                }
            }
        }
    }

    pub async fn disconnect(&self) {
        let mut slot = self.slot.lock().await;
        if let Some(client) = slot.client.take() {
            client.close().await;
            tracing::info!(database = %self.name_id, target = %self.display_target, "disconnected");
        }
        slot.state = ConnectionState::Disconnected;
    }

    /// The current client, connecting first when needed.
    ///
    /// # Errors
    /// Propagates [`DatabaseConnection::connect`] failures.
    pub async fn ensure_connection(&self) -> Result<Arc<dyn DriverClient>, SqlMiddlewareDbError> {
        {
            let slot = self.slot.lock().await;
            if slot.state == ConnectionState::Connected
                && let Some(client) = &slot.client
            {
                return Ok(Arc::clone(client));
            }
        }
        self.connect().await?;
        let slot = self.slot.lock().await;
        slot.client.clone().ok_or_else(|| {
            SqlMiddlewareDbError::ConnectionError(format!("database {} is not connected", self.name_id))
        })
    }

    /// Ping within the policy timeout. A failed ping marks the connection disconnected.
    pub async fn check_connection(&self) -> bool {
        let client = {
            let slot = self.slot.lock().await;
            match (&slot.state, &slot.client) {
                (ConnectionState::Connected, Some(client)) => Arc::clone(client),
                _ => return false,
            }
        };
        let outcome = tokio::time::timeout(self.retry.ping_timeout, client.ping()).await;
        let failure = match outcome {
            Ok(Ok(())) => {
                tracing::trace!(database = %self.name_id, "ping ok");
                return true;
            }
            Ok(Err(err)) => err.to_string(),
            Err(_) => format!("ping timed out after {:?}", self.retry.ping_timeout),
        };
        tracing::warn!(database = %self.name_id, error = %failure, "ping failed");
        let mut slot = self.slot.lock().await;
        if let Some(current) = &slot.client
            && Arc::ptr_eq(current, &client)
        {
            slot.state = ConnectionState::Disconnected;
        }
        false
    }

    /// Ping; when that fails, wait the backoff and connect once.
    ///
    /// # Errors
    /// Returns the reconnect error.
    pub async fn check_connection_and_reconnect(&self) -> Result<(), SqlMiddlewareDbError> {
        if self.check_connection().await {
            return Ok(());
        }
        tracing::warn!(
            database = %self.name_id,
            backoff = ?self.retry.backoff,
            "connection lost, reconnecting"
        );
        tokio::time::sleep(self.retry.backoff).await;
        self.connect().await
    }

    /// Run `op` against the client, retrying connection-classified failures.
    ///
    /// At most `attempts` runs; between runs the connection is checked and re-established.
    /// Any other error is returned at once.
    ///
    /// # Errors
    /// The last connection error once attempts are exhausted, or the first non-connection
    /// error.
    pub async fn with_retry<T, F, Fut>(&self, mut op: F) -> Result<T, SqlMiddlewareDbError>
    where
        F: FnMut(Arc<dyn DriverClient>) -> Fut,
        Fut: Future<Output = Result<T, SqlMiddlewareDbError>>,
    {
        let attempts = self.retry.attempts.max(1);
        let mut attempt = 1;
        loop {
            let outcome = match self.ensure_connection().await {
                Ok(client) => op(client).await,
                Err(err) => Err(err),
            };
            match outcome {
                Ok(value) => return Ok(value),
                Err(err) if err.is_connection_error() && attempt < attempts => {
                    tracing::warn!(
                        database = %self.name_id,
                        attempt,
                        attempts,
                        error = %err,
                        "connection error, retrying"
                    );
                    if let Err(reconnect) = self.check_connection_and_reconnect().await {
                        tracing::warn!(database = %self.name_id, error = %reconnect, "reconnect failed");
                    }
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Open a transaction on the current client.
    ///
    /// # Errors
    /// Connection or driver errors from BEGIN.
    pub async fn begin_tx(&self, isolation: IsolationLevel) -> Result<Transaction, SqlMiddlewareDbError> {
        let client = self.ensure_connection().await?;
        let effective = self.dialect.effective_isolation(isolation);
        tracing::debug!(database = %self.name_id, isolation = %effective, "begin transaction");
        let native = client.begin(effective).await?;
        Ok(Transaction::new(self.dialect, effective, native))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::QueryAndParams;
    use crate::test_utils::{ScriptedDriver, connection_error};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::runtime::Runtime;

    fn quick() -> RetryPolicy {
        RetryPolicy {
            backoff: Duration::from_millis(1),
            ..RetryPolicy::default()
        }
    }

    #[test]
    fn lazy_connect_and_disconnect() {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let driver = ScriptedDriver::new(DatabaseType::Postgres);
            let conn = DatabaseConnection::new("main", Arc::new(driver.clone()));
            assert_eq!(conn.state().await, ConnectionState::Disconnected);
            conn.ensure_connection().await.unwrap();
            conn.ensure_connection().await.unwrap();
            assert_eq!(driver.connect_attempts(), 1);
            assert_eq!(conn.state().await, ConnectionState::Connected);
            conn.disconnect().await;
            assert_eq!(conn.state().await, ConnectionState::Disconnected);
            assert_eq!(driver.events(), vec!["connect", "close"]);
        });
    }

    #[test]
    fn must_connect_failure_is_reported() {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let driver = ScriptedDriver::new(DatabaseType::Mssql).fail_connects(1);
            let conn = DatabaseConnection::new("billing", Arc::new(driver)).must_connect(true);
            let err = conn.connect().await.unwrap_err();
            assert_eq!(err.code(), "MUST_CONNECT_FAILED:billing");
            assert_eq!(conn.state().await, ConnectionState::Disconnected);
        });
    }

    #[test]
    fn failed_ping_reconnects_once() {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let driver = ScriptedDriver::new(DatabaseType::Oracle).fail_pings(1);
            let conn = DatabaseConnection::new("ora", Arc::new(driver.clone())).retry_policy(quick());
            conn.connect().await.unwrap();
            conn.check_connection_and_reconnect().await.unwrap();
            assert_eq!(driver.connect_attempts(), 2);
            assert!(conn.check_connection().await);
        });
    }

    #[test]
    fn non_connection_errors_are_not_retried() {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let driver = ScriptedDriver::new(DatabaseType::Postgres);
            let conn = DatabaseConnection::new("main", Arc::new(driver)).retry_policy(quick());
            let calls = AtomicUsize::new(0);
            let result: Result<(), _> = conn
                .with_retry(|_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err(SqlMiddlewareDbError::ExecutionError("syntax error".into())) }
                })
                .await;
            assert!(result.is_err());
            assert_eq!(calls.load(Ordering::SeqCst), 1);
        });
    }

    #[test]
    fn connection_errors_retry_until_attempts_run_out() {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let driver = ScriptedDriver::new(DatabaseType::MariaDb);
            let conn = DatabaseConnection::new("main", Arc::new(driver)).retry_policy(quick());
            let calls = AtomicUsize::new(0);
            let result: Result<(), _> = conn
                .with_retry(|_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err(connection_error("broken pipe")) }
                })
                .await;
            assert!(result.unwrap_err().is_connection_error());
            assert_eq!(calls.load(Ordering::SeqCst), 4);
        });
    }

    #[test]
    fn three_connection_failures_then_success_takes_four_calls() {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let driver = ScriptedDriver::new(DatabaseType::Postgres);
            for _ in 0..3 {
                driver.fail_next(connection_error("connection reset by peer"));
            }
            driver.push_affected(2);
            let conn = DatabaseConnection::new("main", Arc::new(driver.clone())).retry_policy(quick());
            let query = QueryAndParams::new_without_params("UPDATE jobs SET done = true");
            let affected = conn
                .with_retry(|client| {
                    let query = query.clone();
                    async move { client.execute_dml(&query).await }
                })
                .await
                .unwrap();
            assert_eq!(affected, 2);
            assert_eq!(driver.statements().len(), 4);
        });
    }

    #[test]
    fn driver_error_of_another_kind_stops_after_one_call() {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let driver = ScriptedDriver::new(DatabaseType::Mssql);
            driver.fail_next(crate::test_utils::duplicate_key_error("Violation of PRIMARY KEY"));
            let conn = DatabaseConnection::new("main", Arc::new(driver.clone())).retry_policy(quick());
            let query = QueryAndParams::new_without_params("INSERT INTO jobs (id) VALUES (1)");
            let err = conn
                .with_retry(|client| {
                    let query = query.clone();
                    async move { client.execute_dml(&query).await }
                })
                .await
                .unwrap_err();
            assert!(err.is_duplicate_key_error());
            assert_eq!(driver.statements().len(), 1);
            assert_eq!(driver.connect_attempts(), 1);
        });
    }
}
