use async_trait::async_trait;

use super::config::{MssqlPool, pool_error};
use super::query::{build_result_set, execute_batch, execute_dml};
use super::transaction::MssqlTransaction;
use crate::dialect::IsolationLevel;
use crate::driver::{DriverClient, DriverTransaction};
use crate::error::SqlMiddlewareDbError;
use crate::query::QueryAndParams;
use crate::results::ResultSet;
use crate::types::DatabaseType;

/// A pooled SQL Server client; each call checks out a session for its duration.
pub struct MssqlClient {
    pool: MssqlPool,
}

impl MssqlClient {
    pub(crate) fn new(pool: MssqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DriverClient for MssqlClient {
    async fn execute_select(&self, query: &QueryAndParams) -> Result<ResultSet, SqlMiddlewareDbError> {
        let mut conn = self.pool.get().await.map_err(pool_error)?;
        build_result_set(&mut conn, query).await
    }

    async fn execute_dml(&self, query: &QueryAndParams) -> Result<usize, SqlMiddlewareDbError> {
        let mut conn = self.pool.get().await.map_err(pool_error)?;
        execute_dml(&mut conn, query).await
    }

    async fn execute_batch(&self, sql: &str) -> Result<(), SqlMiddlewareDbError> {
        let mut conn = self.pool.get().await.map_err(pool_error)?;
        execute_batch(&mut conn, sql).await
    }

    async fn ping(&self) -> Result<(), SqlMiddlewareDbError> {
        let mut conn = self.pool.get().await.map_err(pool_error)?;
        execute_batch(&mut conn, DatabaseType::Mssql.ping_statement()).await
    }

    async fn begin(
        &self,
        isolation: IsolationLevel,
    ) -> Result<Box<dyn DriverTransaction>, SqlMiddlewareDbError> {
        let mut conn = self.pool.get().await.map_err(pool_error)?;
        for stmt in DatabaseType::Mssql.begin_statements(isolation) {
            execute_batch(&mut conn, &stmt).await?;
        }
        Ok(Box::new(MssqlTransaction::new(conn, isolation)))
    }

    async fn close(&self) {
        self.pool.close();
    }
}
