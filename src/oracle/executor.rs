use std::sync::Arc;

use async_trait::async_trait;
use oracle::Connection;
use oracle::pool::{CloseMode, Pool};

use super::transaction::OracleTransaction;
use super::{join_error, query};
use crate::dialect::IsolationLevel;
use crate::driver::{DriverClient, DriverTransaction};
use crate::error::SqlMiddlewareDbError;
use crate::query::QueryAndParams;
use crate::results::ResultSet;
use crate::types::DatabaseType;

/// A pooled Oracle client. Every call checks out a session with autocommit on.
pub struct OracleClient {
    pool: Arc<Pool>,
}

impl OracleClient {
    pub(crate) fn new(pool: Pool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    async fn with_session<F, R>(&self, func: F) -> Result<R, SqlMiddlewareDbError>
    where
        F: FnOnce(&Connection) -> Result<R, SqlMiddlewareDbError> + Send + 'static,
        R: Send + 'static,
    {
        let pool = Arc::clone(&self.pool);
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            conn.set_autocommit(true);
            func(&conn)
        })
        .await
        .map_err(|e| join_error(&e))?
    }
}

#[async_trait]
impl DriverClient for OracleClient {
    async fn execute_select(&self, query: &QueryAndParams) -> Result<ResultSet, SqlMiddlewareDbError> {
        let query = query.clone();
        self.with_session(move |conn| query::select(conn, &query)).await
    }

    async fn execute_dml(&self, query: &QueryAndParams) -> Result<usize, SqlMiddlewareDbError> {
        let query = query.clone();
        self.with_session(move |conn| query::dml(conn, &query)).await
    }

    async fn execute_batch(&self, sql: &str) -> Result<(), SqlMiddlewareDbError> {
        let sql = sql.to_string();
        self.with_session(move |conn| query::batch(conn, &sql)).await
    }

    async fn ping(&self) -> Result<(), SqlMiddlewareDbError> {
        self.with_session(|conn| Ok(conn.ping()?)).await
    }

    async fn begin(
        &self,
        isolation: IsolationLevel,
    ) -> Result<Box<dyn DriverTransaction>, SqlMiddlewareDbError> {
        let pool = Arc::clone(&self.pool);
        let conn = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            conn.set_autocommit(false);
            for stmt in DatabaseType::Oracle.begin_statements(isolation) {
                conn.execute(&stmt, &[])?;
            }
            Ok::<_, SqlMiddlewareDbError>(conn)
        })
        .await
        .map_err(|e| join_error(&e))??;
        Ok(Box::new(OracleTransaction::new(conn)))
    }

    async fn close(&self) {
        let pool = Arc::clone(&self.pool);
        let closed = tokio::task::spawn_blocking(move || pool.close(&CloseMode::Default)).await;
        match closed {
            Ok(Ok(())) => {}
            Ok(Err(err)) => tracing::warn!(error = %err, "closing oracle pool failed"),
            Err(err) => tracing::warn!(error = %err, "closing oracle pool panicked"),
        }
    }
}
