use std::sync::Arc;

use async_trait::async_trait;

use super::{SharedOracleConnection, query, run_blocking};
use crate::driver::DriverTransaction;
use crate::error::SqlMiddlewareDbError;
use crate::query::QueryAndParams;
use crate::results::ResultSet;

/// An Oracle session with autocommit off. Oracle opens the transaction with the first
/// statement; `commit`/`rollback` end it and release the session to the pool.
pub struct OracleTransaction {
    conn: Option<SharedOracleConnection>,
}

impl OracleTransaction {
    pub(crate) fn new(conn: oracle::Connection) -> Self {
        Self {
            conn: Some(Arc::new(tokio::sync::Mutex::new(conn))),
        }
    }

    fn conn(&self) -> Result<SharedOracleConnection, SqlMiddlewareDbError> {
        self.conn.as_ref().map(Arc::clone).ok_or_else(|| {
            SqlMiddlewareDbError::TransactionError("TX_ALREADY_FINISHED".to_string())
        })
    }

    async fn finish(&mut self, commit: bool) -> Result<(), SqlMiddlewareDbError> {
        let conn = self.conn.take().ok_or_else(|| {
            SqlMiddlewareDbError::TransactionError("TX_ALREADY_FINISHED".to_string())
        })?;
        run_blocking(conn, move |c| {
            if commit {
                c.commit()?;
            } else {
                c.rollback()?;
            }
            c.set_autocommit(true);
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl DriverTransaction for OracleTransaction {
    async fn execute_select(
        &mut self,
        query: &QueryAndParams,
    ) -> Result<ResultSet, SqlMiddlewareDbError> {
        let query = query.clone();
        run_blocking(self.conn()?, move |c| query::select(c, &query)).await
    }

    async fn execute_dml(&mut self, query: &QueryAndParams) -> Result<usize, SqlMiddlewareDbError> {
        let query = query.clone();
        run_blocking(self.conn()?, move |c| query::dml(c, &query)).await
    }

    async fn execute_batch(&mut self, sql: &str) -> Result<(), SqlMiddlewareDbError> {
        let sql = sql.to_string();
        run_blocking(self.conn()?, move |c| query::batch(c, &sql)).await
    }

    async fn commit(&mut self) -> Result<(), SqlMiddlewareDbError> {
        self.finish(true).await
    }

    async fn rollback(&mut self) -> Result<(), SqlMiddlewareDbError> {
        self.finish(false).await
    }
}

impl Drop for OracleTransaction {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        tracing::warn!("oracle transaction dropped while open; rolling back");
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(move || {
                    let guard = conn.blocking_lock();
                    if let Err(err) = guard.rollback() {
                        tracing::warn!(error = %err, "rollback of dropped oracle transaction failed");
                    }
                });
            }
            // Outside a runtime the session is released as is; the pool rolls it back.
            Err(_) => drop(conn),
        }
    }
}
