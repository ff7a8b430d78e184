use async_trait::async_trait;
use sqlx::MySql;
use sqlx::pool::PoolConnection;

use super::executor::affected_rows;
use super::{bind_query_params, build_result_set};
use crate::driver::DriverTransaction;
use crate::error::SqlMiddlewareDbError;
use crate::query::QueryAndParams;
use crate::results::ResultSet;
use crate::types::DatabaseType;

/// A pooled MariaDB session inside `START TRANSACTION`. Dropped while open, the session is
/// detached from the pool and closed, and the server rolls the work back.
pub struct MariaDbTransaction {
    conn: Option<PoolConnection<MySql>>,
}

impl MariaDbTransaction {
    pub(crate) fn new(conn: PoolConnection<MySql>) -> Self {
        Self { conn: Some(conn) }
    }

    fn conn(&mut self) -> Result<&mut PoolConnection<MySql>, SqlMiddlewareDbError> {
        self.conn.as_mut().ok_or_else(|| {
            SqlMiddlewareDbError::TransactionError("TX_ALREADY_FINISHED".to_string())
        })
    }

    async fn finish(&mut self, statement: &str) -> Result<(), SqlMiddlewareDbError> {
        let mut conn = self.conn.take().ok_or_else(|| {
            SqlMiddlewareDbError::TransactionError("TX_ALREADY_FINISHED".to_string())
        })?;
        if let Err(err) = sqlx::raw_sql(statement).execute(&mut *conn).await {
            drop(conn.detach());
            return Err(err.into());
        }
        Ok(())
    }
}

#[async_trait]
impl DriverTransaction for MariaDbTransaction {
    async fn execute_select(
        &mut self,
        query: &QueryAndParams,
    ) -> Result<ResultSet, SqlMiddlewareDbError> {
        let conn = self.conn()?;
        let rows = bind_query_params(&query.query, &query.params)?
            .fetch_all(&mut **conn)
            .await?;
        Ok(build_result_set(&rows))
    }

    async fn execute_dml(&mut self, query: &QueryAndParams) -> Result<usize, SqlMiddlewareDbError> {
        let conn = self.conn()?;
        let result = bind_query_params(&query.query, &query.params)?
            .execute(&mut **conn)
            .await?;
        affected_rows(result.rows_affected())
    }

    async fn execute_batch(&mut self, sql: &str) -> Result<(), SqlMiddlewareDbError> {
        let conn = self.conn()?;
        sqlx::raw_sql(sql).execute(&mut **conn).await?;
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), SqlMiddlewareDbError> {
        self.finish(DatabaseType::MariaDb.commit_statement()).await
    }

    async fn rollback(&mut self) -> Result<(), SqlMiddlewareDbError> {
        self.finish(DatabaseType::MariaDb.rollback_statement()).await
    }
}

impl Drop for MariaDbTransaction {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            tracing::warn!("mariadb transaction dropped while open; closing its session");
            drop(conn.detach());
        }
    }
}
