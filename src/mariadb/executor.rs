use async_trait::async_trait;
use sqlx::MySqlPool;

use super::transaction::MariaDbTransaction;
use super::{bind_query_params, build_result_set};
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

/// A pooled MariaDB client running each statement on whichever session sqlx hands out.
pub struct MariaDbClient {
    pool: MySqlPool,
}

impl MariaDbClient {
    pub(crate) fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DriverClient for MariaDbClient {
    async fn execute_select(&self, query: &QueryAndParams) -> Result<ResultSet, SqlMiddlewareDbError> {
        let rows = bind_query_params(&query.query, &query.params)?
            .fetch_all(&self.pool)
            .await?;
        Ok(build_result_set(&rows))
    }

    async fn execute_dml(&self, query: &QueryAndParams) -> Result<usize, SqlMiddlewareDbError> {
        let result = bind_query_params(&query.query, &query.params)?
            .execute(&self.pool)
            .await?;
        affected_rows(result.rows_affected())
    }

    async fn execute_batch(&self, sql: &str) -> Result<(), SqlMiddlewareDbError> {
        sqlx::raw_sql(sql).execute(&self.pool).await?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), SqlMiddlewareDbError> {
        sqlx::raw_sql(DatabaseType::MariaDb.ping_statement())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn begin(
        &self,
        isolation: IsolationLevel,
    ) -> Result<Box<dyn DriverTransaction>, SqlMiddlewareDbError> {
        let mut conn = self.pool.acquire().await?;
        // SET TRANSACTION applies to the next transaction only, so it needs no reset.
        for stmt in DatabaseType::MariaDb.begin_statements(isolation) {
            sqlx::raw_sql(&stmt).execute(&mut *conn).await?;
        }
        Ok(Box::new(MariaDbTransaction::new(conn)))
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
