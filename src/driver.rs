//! The seam between the dialect-neutral layers and the native drivers.
//!
//! Statements reaching these traits are already translated to the dialect's positional form
//! and validated; implementations only execute them.

use std::sync::Arc;

use async_trait::async_trait;

use crate::dialect::IsolationLevel;
use crate::error::SqlMiddlewareDbError;
use crate::query::QueryAndParams;
use crate::results::ResultSet;
use crate::types::DatabaseType;

/// Opens clients for one configured database.
#[async_trait]
pub trait DriverConnector: Send + Sync {
    fn dialect(&self) -> DatabaseType;

    /// Establish a client (a pool or a dedicated session, depending on the driver).
    async fn connect(&self) -> Result<Arc<dyn DriverClient>, SqlMiddlewareDbError>;
}

/// A connected handle able to run statements and open transactions.
#[async_trait]
pub trait DriverClient: Send + Sync {
    /// Executes a single statement that returns rows.
    async fn execute_select(&self, query: &QueryAndParams) -> Result<ResultSet, SqlMiddlewareDbError>;

    /// Executes a single DML statement and returns the number of rows affected.
    async fn execute_dml(&self, query: &QueryAndParams) -> Result<usize, SqlMiddlewareDbError>;

    /// Executes parameterless SQL text, possibly several statements.
    async fn execute_batch(&self, sql: &str) -> Result<(), SqlMiddlewareDbError>;

    /// Round trip used by the connection health check.
    async fn ping(&self) -> Result<(), SqlMiddlewareDbError>;

    async fn begin(
        &self,
        isolation: IsolationLevel,
    ) -> Result<Box<dyn DriverTransaction>, SqlMiddlewareDbError>;

    /// Release the underlying resources. Further use fails.
    async fn close(&self);
}

/// A native transaction bound to one session.
#[async_trait]
pub trait DriverTransaction: Send {
    async fn execute_select(
        &mut self,
        query: &QueryAndParams,
    ) -> Result<ResultSet, SqlMiddlewareDbError>;

    async fn execute_dml(&mut self, query: &QueryAndParams) -> Result<usize, SqlMiddlewareDbError>;

    async fn execute_batch(&mut self, sql: &str) -> Result<(), SqlMiddlewareDbError>;

    async fn commit(&mut self) -> Result<(), SqlMiddlewareDbError>;

    async fn rollback(&mut self) -> Result<(), SqlMiddlewareDbError>;
}
