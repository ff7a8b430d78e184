use async_trait::async_trait;
use deadpool::managed::Object;

use super::config::MssqlObject;
use super::query::{build_result_set, execute_batch, execute_dml};
use crate::dialect::IsolationLevel;
use crate::driver::DriverTransaction;
use crate::error::SqlMiddlewareDbError;
use crate::query::QueryAndParams;
use crate::results::ResultSet;
use crate::types::DatabaseType;

/// A pooled SQL Server session inside `BEGIN TRANSACTION`.
///
/// The isolation level set for the transaction outlives it on SQL Server sessions, so it is
/// reset to READ COMMITTED before the session returns to the pool. A transaction dropped while
/// open detaches and closes its session.
pub struct MssqlTransaction {
    conn: Option<MssqlObject>,
    isolation: IsolationLevel,
}

impl MssqlTransaction {
    pub(crate) fn new(conn: MssqlObject, isolation: IsolationLevel) -> Self {
        Self {
            conn: Some(conn),
            isolation,
        }
    }

    fn conn(&mut self) -> Result<&mut MssqlObject, SqlMiddlewareDbError> {
        self.conn.as_mut().ok_or_else(|| {
            SqlMiddlewareDbError::TransactionError("TX_ALREADY_FINISHED".to_string())
        })
    }

    async fn finish(&mut self, statement: &str) -> Result<(), SqlMiddlewareDbError> {
        let mut conn = self.conn.take().ok_or_else(|| {
            SqlMiddlewareDbError::TransactionError("TX_ALREADY_FINISHED".to_string())
        })?;
        let mut sql = statement.to_string();
        if self.isolation != IsolationLevel::Default {
            sql.push_str("; SET TRANSACTION ISOLATION LEVEL READ COMMITTED");
        }
        if let Err(err) = execute_batch(&mut conn, &sql).await {
            drop(Object::take(conn));
            return Err(err);
        }
        Ok(())
    }
}

#[async_trait]
impl DriverTransaction for MssqlTransaction {
    async fn execute_select(
        &mut self,
        query: &QueryAndParams,
    ) -> Result<ResultSet, SqlMiddlewareDbError> {
        build_result_set(self.conn()?, query).await
    }

    async fn execute_dml(&mut self, query: &QueryAndParams) -> Result<usize, SqlMiddlewareDbError> {
        execute_dml(self.conn()?, query).await
    }

    async fn execute_batch(&mut self, sql: &str) -> Result<(), SqlMiddlewareDbError> {
        execute_batch(self.conn()?, sql).await
    }

    async fn commit(&mut self) -> Result<(), SqlMiddlewareDbError> {
        self.finish(DatabaseType::Mssql.commit_statement()).await
    }

    async fn rollback(&mut self) -> Result<(), SqlMiddlewareDbError> {
        self.finish(DatabaseType::Mssql.rollback_statement()).await
    }
}

impl Drop for MssqlTransaction {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            tracing::warn!("sqlserver transaction dropped while open; closing its session");
            drop(Object::take(conn));
        }
    }
}
