use async_trait::async_trait;
use deadpool_postgres::Pool;

use super::transaction::PostgresTransaction;
use super::{Params, build_result_set};
use crate::dialect::IsolationLevel;
use crate::driver::{DriverClient, DriverTransaction};
use crate::error::SqlMiddlewareDbError;
use crate::query::QueryAndParams;
use crate::results::ResultSet;
use crate::types::DatabaseType;

pub(crate) fn affected_rows(rows: u64) -> Result<usize, SqlMiddlewareDbError> {
    usize::try_from(rows).map_err(|e| {
        SqlMiddlewareDbError::ExecutionError(format!("Invalid rows affected count: {e}"))
    })
}

/// A pooled PostgreSQL client. Each call checks out a session for its duration and runs
/// under the server's autocommit.
pub struct PostgresClient {
    pool: Pool,
}

impl PostgresClient {
    pub(crate) fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DriverClient for PostgresClient {
    async fn execute_select(&self, query: &QueryAndParams) -> Result<ResultSet, SqlMiddlewareDbError> {
        let conn = self.pool.get().await?;
        let stmt = conn.prepare_cached(&query.query).await?;
        let params = Params::convert(&query.params)?;
        let rows = conn.query(&stmt, params.as_refs()).await?;
        build_result_set(&stmt, &rows)
    }

    async fn execute_dml(&self, query: &QueryAndParams) -> Result<usize, SqlMiddlewareDbError> {
        let conn = self.pool.get().await?;
        let stmt = conn.prepare_cached(&query.query).await?;
        let params = Params::convert(&query.params)?;
        affected_rows(conn.execute(&stmt, params.as_refs()).await?)
    }

    async fn execute_batch(&self, sql: &str) -> Result<(), SqlMiddlewareDbError> {
        let conn = self.pool.get().await?;
        conn.batch_execute(sql).await?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), SqlMiddlewareDbError> {
        let conn = self.pool.get().await?;
        conn.simple_query(DatabaseType::Postgres.ping_statement()).await?;
        Ok(())
    }

    async fn begin(
        &self,
        isolation: IsolationLevel,
    ) -> Result<Box<dyn DriverTransaction>, SqlMiddlewareDbError> {
        let conn = self.pool.get().await?;
        for stmt in DatabaseType::Postgres.begin_statements(isolation) {
            conn.batch_execute(&stmt).await?;
        }
        Ok(Box::new(PostgresTransaction::new(conn)))
    }

    async fn close(&self) {
        self.pool.close();
    }
}
