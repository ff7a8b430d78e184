use std::collections::BTreeSet;
use std::fmt;

use futures_util::future::BoxFuture;

use crate::connection::DatabaseConnection;
use crate::dialect::IsolationLevel;
use crate::driver::DriverTransaction;
use crate::encryption::keys::{session_key_clear_statement, session_key_statement};
use crate::error::SqlMiddlewareDbError;
use crate::query::QueryAndParams;
use crate::results::ResultSet;
use crate::types::DatabaseType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    Open,
    Committed,
    RolledBack,
}

impl fmt::Display for TxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TxState::Open => "open",
            TxState::Committed => "committed",
            TxState::RolledBack => "rolled back",
        };
        f.write_str(s)
    }
}

/// An open database transaction.
///
/// Exactly one of commit or rollback takes effect. After that every call fails with
/// `TX_ALREADY_FINISHED`. Dropping an open transaction leaves cleanup to the driver, which
/// discards the uncommitted work when the session is released.
pub struct Transaction {
    dialect: DatabaseType,
    isolation: IsolationLevel,
    native: Box<dyn DriverTransaction>,
    state: TxState,
    session_keys: BTreeSet<String>,
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("dialect", &self.dialect)
            .field("isolation", &self.isolation)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Transaction {
    pub(crate) fn new(
        dialect: DatabaseType,
        isolation: IsolationLevel,
        native: Box<dyn DriverTransaction>,
    ) -> Self {
        Self {
            dialect,
            isolation,
            native,
            state: TxState::Open,
            session_keys: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn dialect(&self) -> DatabaseType {
        self.dialect
    }

    #[must_use]
    pub fn isolation(&self) -> IsolationLevel {
        self.isolation
    }

    #[must_use]
    pub fn state(&self) -> TxState {
        self.state
    }

    fn ensure_open(&self) -> Result<(), SqlMiddlewareDbError> {
        if self.state == TxState::Open {
            Ok(())
        } else {
            Err(SqlMiddlewareDbError::TransactionError(format!(
                "TX_ALREADY_FINISHED: transaction already {}",
                self.state
            )))
        }
    }

    /// # Errors
    /// `TX_ALREADY_FINISHED` or the driver error.
    pub async fn execute_select(
        &mut self,
        query: &QueryAndParams,
    ) -> Result<ResultSet, SqlMiddlewareDbError> {
        self.ensure_open()?;
        tracing::debug!(dialect = %self.dialect, sql = %query.query, "tx select");
        self.native.execute_select(query).await
    }

    /// # Errors
    /// `TX_ALREADY_FINISHED` or the driver error.
    pub async fn execute_dml(&mut self, query: &QueryAndParams) -> Result<usize, SqlMiddlewareDbError> {
        self.ensure_open()?;
        tracing::debug!(dialect = %self.dialect, sql = %query.query, "tx dml");
        self.native.execute_dml(query).await
    }

    /// # Errors
    /// `TX_ALREADY_FINISHED` or the driver error.
    pub async fn execute_batch(&mut self, sql: &str) -> Result<(), SqlMiddlewareDbError> {
        self.ensure_open()?;
        self.native.execute_batch(sql).await
    }

    /// Commit. When the commit itself fails a rollback is attempted and the commit error is
    /// returned.
    ///
    /// # Errors
    /// `TX_ALREADY_FINISHED` or the commit error.
    pub async fn commit(&mut self) -> Result<(), SqlMiddlewareDbError> {
        self.ensure_open()?;
        self.clear_session_keys().await;
        match self.native.commit().await {
            Ok(()) => {
                self.state = TxState::Committed;
                Ok(())
            }
            Err(commit_err) => {
                tracing::warn!(dialect = %self.dialect, error = %commit_err, "commit failed, rolling back");
                if let Err(rollback_err) = self.native.rollback().await {
                    tracing::error!(
                        dialect = %self.dialect,
                        error = %rollback_err,
                        "rollback after failed commit also failed"
                    );
                }
                self.state = TxState::RolledBack;
                Err(commit_err)
            }
        }
    }

    /// Roll back. The transaction is finished whether or not the driver call succeeds.
    ///
    /// # Errors
    /// `TX_ALREADY_FINISHED` or the rollback error.
    pub async fn rollback(&mut self) -> Result<(), SqlMiddlewareDbError> {
        self.ensure_open()?;
        self.clear_session_keys().await;
        let result = self.native.rollback().await;
        self.state = TxState::RolledBack;
        result
    }

    /// Commit on `Ok`, roll back on `Err`.
    ///
    /// On `Err` the caller's error is returned even if the rollback fails too; the rollback
    /// failure is logged. A transaction the caller already finished is left alone.
    ///
    /// # Errors
    /// The caller's error, or the commit error.
    pub async fn finish<T>(
        &mut self,
        outcome: Result<T, SqlMiddlewareDbError>,
    ) -> Result<T, SqlMiddlewareDbError> {
        if self.state != TxState::Open {
            tracing::debug!(state = %self.state, "finish on a transaction that is already finished");
            return outcome;
        }
        match outcome {
            Ok(value) => {
                self.commit().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = self.rollback().await {
                    tracing::error!(
                        dialect = %self.dialect,
                        error = %rollback_err,
                        original = %err,
                        "rollback failed"
                    );
                }
                Err(err)
            }
        }
    }

    /// Publish an encryption key to the database session, once per key name.
    ///
    /// Returns `false` when the key was already set in this transaction.
    ///
    /// # Errors
    /// `TX_ALREADY_FINISHED`, an invalid key name, or the driver error.
    pub async fn set_session_key(
        &mut self,
        key_name: &str,
        value: &str,
    ) -> Result<bool, SqlMiddlewareDbError> {
        self.ensure_open()?;
        if self.session_keys.contains(key_name) {
            return Ok(false);
        }
        let statement = session_key_statement(self.dialect, key_name, value)?;
        if statement.returns_rows {
            self.native.execute_select(&statement.query).await?;
        } else {
            self.native.execute_dml(&statement.query).await?;
        }
        tracing::debug!(dialect = %self.dialect, key = key_name, "session key set");
        self.session_keys.insert(key_name.to_string());
        Ok(true)
    }

    #[must_use]
    pub fn has_session_key(&self, key_name: &str) -> bool {
        self.session_keys.contains(key_name)
    }

    /// Withdraw published keys so they do not outlive the transaction on a pooled session.
    /// Failures are logged; they never block the commit or rollback that follows.
    async fn clear_session_keys(&mut self) {
        for key in std::mem::take(&mut self.session_keys) {
            let cleared = match session_key_clear_statement(self.dialect, &key) {
                Ok(Some(statement)) => self.native.execute_dml(&statement).await.map(|_| ()),
                Ok(None) => Ok(()),
                Err(err) => Err(err),
            };
            if let Err(err) = cleared {
                tracing::warn!(dialect = %self.dialect, key = %key, error = %err, "could not clear session key");
            }
        }
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.state == TxState::Open {
            tracing::warn!(dialect = %self.dialect, "transaction dropped without commit or rollback");
        }
    }
}

impl DatabaseConnection {
    /// Run `callback` inside a transaction: commit when it succeeds, roll back when it fails.
    ///
    /// ```rust,no_run
    /// use sql_dialect_middleware::prelude::*;
    ///
    /// # async fn demo(db: &DatabaseConnection) -> Result<(), SqlMiddlewareDbError> {
    /// let moved = db
    ///     .tx(IsolationLevel::Serializable, |tx| {
    ///         Box::pin(async move {
    ///             let q = QueryAndParams::new_without_params("UPDATE accounts SET balance = 0");
    ///             tx.execute_dml(&q).await
    ///         })
    ///     })
    ///     .await?;
    /// # let _ = moved;
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    /// The callback's error (after rollback), the commit error, or a BEGIN failure.
    pub async fn tx<T, F>(&self, isolation: IsolationLevel, callback: F) -> Result<T, SqlMiddlewareDbError>
    where
        F: for<'t> FnOnce(&'t mut Transaction) -> BoxFuture<'t, Result<T, SqlMiddlewareDbError>>,
    {
        let mut tx = self.begin_tx(isolation).await?;
        let outcome = callback(&mut tx).await;
        tx.finish(outcome).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{ScriptedDriver, connection_error};
    use std::sync::Arc;
    use tokio::runtime::Runtime;

    fn connection(driver: &ScriptedDriver) -> DatabaseConnection {
        DatabaseConnection::new("main", Arc::new(driver.clone()))
    }

    #[test]
    fn finish_ok_commits() {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let driver = ScriptedDriver::new(DatabaseType::Postgres);
            let db = connection(&driver);
            let mut tx = db.begin_tx(IsolationLevel::ReadCommitted).await.unwrap();
            let value = tx.finish(Ok(5)).await.unwrap();
            assert_eq!(value, 5);
            assert_eq!(tx.state(), TxState::Committed);
            assert_eq!(driver.events(), vec!["connect", "begin:READ COMMITTED", "commit"]);
        });
    }

    #[test]
    fn finish_err_rolls_back_and_keeps_the_original_error() {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let driver = ScriptedDriver::new(DatabaseType::Mssql);
            driver.fail_rollback(connection_error("rollback lost"));
            let db = connection(&driver);
            let mut tx = db.begin_tx(IsolationLevel::Default).await.unwrap();
            let err = tx
                .finish::<()>(Err(SqlMiddlewareDbError::ExecutionError("some error".into())))
                .await
                .unwrap_err();
            assert_eq!(err.to_string(), "SQL execution error: some error");
            assert_eq!(tx.state(), TxState::RolledBack);
            assert!(driver.events().contains(&"rollback".to_string()));
        });
    }

    #[test]
    fn commit_failure_rolls_back_and_returns_commit_error() {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let driver = ScriptedDriver::new(DatabaseType::Oracle);
            driver.fail_commit(SqlMiddlewareDbError::ExecutionError("ORA-02091".into()));
            let db = connection(&driver);
            let err = db
                .tx(IsolationLevel::Serializable, |tx| {
                    Box::pin(async move {
                        tx.execute_dml(&QueryAndParams::new_without_params("DELETE FROM t")).await
                    })
                })
                .await
                .unwrap_err();
            assert!(err.to_string().contains("ORA-02091"));
            let events = driver.events();
            assert_eq!(events[events.len() - 2..], ["commit".to_string(), "rollback".to_string()]);
        });
    }

    #[test]
    fn finished_transaction_rejects_further_work() {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let driver = ScriptedDriver::new(DatabaseType::MariaDb);
            let db = connection(&driver);
            let mut tx = db.begin_tx(IsolationLevel::Default).await.unwrap();
            tx.commit().await.unwrap();
            let err = tx.rollback().await.unwrap_err();
            assert!(err.to_string().contains("TX_ALREADY_FINISHED"));
            assert_eq!(err.code(), "TX_ALREADY_FINISHED");
            let select = QueryAndParams::new_without_params("SELECT 1");
            assert!(tx.execute_select(&select).await.is_err());
        });
    }

    #[test]
    fn session_key_is_injected_once() {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let driver = ScriptedDriver::new(DatabaseType::Postgres);
            let db = connection(&driver);
            let mut tx = db.begin_tx(IsolationLevel::Default).await.unwrap();
            assert!(tx.set_session_key("app.enc_key", "s3cret").await.unwrap());
            assert!(!tx.set_session_key("app.enc_key", "s3cret").await.unwrap());
            tx.commit().await.unwrap();
            let statements = driver.statements();
            assert_eq!(statements.len(), 1);
            assert_eq!(statements[0].query, "SELECT set_config($1, $2, true)");
        });
    }
}
