use async_trait::async_trait;
use deadpool_postgres::Object;

use super::executor::affected_rows;
use super::{Params, build_result_set};
use crate::driver::DriverTransaction;
use crate::error::SqlMiddlewareDbError;
use crate::query::QueryAndParams;
use crate::results::ResultSet;
use crate::types::DatabaseType;

/// A pooled session with an open transaction.
///
/// Dropped while still open, the session is detached from the pool and closed so the server
/// discards the uncommitted work instead of handing a mid-transaction session to the next
/// caller.
pub struct PostgresTransaction {
    conn: Option<Object>,
}

impl PostgresTransaction {
    pub(crate) fn new(conn: Object) -> Self {
        Self { conn: Some(conn) }
    }

    fn conn(&self) -> Result<&Object, SqlMiddlewareDbError> {
        self.conn.as_ref().ok_or_else(|| {
            SqlMiddlewareDbError::TransactionError("TX_ALREADY_FINISHED".to_string())
        })
    }

    async fn finish(&mut self, statement: &str) -> Result<(), SqlMiddlewareDbError> {
        let conn = self.conn.take().ok_or_else(|| {
            SqlMiddlewareDbError::TransactionError("TX_ALREADY_FINISHED".to_string())
        })?;
        // A failed COMMIT/ROLLBACK leaves the session state unknown; it is not reused.
        if let Err(err) = conn.batch_execute(statement).await {
            drop(Object::take(conn));
            return Err(err.into());
        }
        Ok(())
    }
}

#[async_trait]
impl DriverTransaction for PostgresTransaction {
    async fn execute_select(
        &mut self,
        query: &QueryAndParams,
    ) -> Result<ResultSet, SqlMiddlewareDbError> {
        let conn = self.conn()?;
        let stmt = conn.prepare_cached(&query.query).await?;
        let params = Params::convert(&query.params)?;
        let rows = conn.query(&stmt, params.as_refs()).await?;
        build_result_set(&stmt, &rows)
    }

    async fn execute_dml(&mut self, query: &QueryAndParams) -> Result<usize, SqlMiddlewareDbError> {
        let conn = self.conn()?;
        let stmt = conn.prepare_cached(&query.query).await?;
        let params = Params::convert(&query.params)?;
        affected_rows(conn.execute(&stmt, params.as_refs()).await?)
    }

    async fn execute_batch(&mut self, sql: &str) -> Result<(), SqlMiddlewareDbError> {
        self.conn()?.batch_execute(sql).await?;
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), SqlMiddlewareDbError> {
        self.finish(DatabaseType::Postgres.commit_statement()).await
    }

    async fn rollback(&mut self) -> Result<(), SqlMiddlewareDbError> {
        self.finish(DatabaseType::Postgres.rollback_statement()).await
    }
}

impl Drop for PostgresTransaction {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            tracing::warn!("postgres transaction dropped while open; closing its session");
            drop(Object::take(conn));
        }
    }
}
