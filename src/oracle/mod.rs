// Oracle backend - the blocking `oracle` crate (ODPI-C) driven from `spawn_blocking`
//
// Needs Oracle Instant Client (or a full client) on the library path at runtime.
//
// - config: credentials, session pool and the connector
// - params: binding `RowValues` and `RETURNING ... INTO` rewriting
// - query: statement execution and row extraction
// - executor: the pooled client (autocommitted statements)
// - transaction: a dedicated session with autocommit off

pub mod config;
pub mod executor;
pub mod params;
pub mod query;
pub mod transaction;

use std::sync::Arc;

use crate::error::SqlMiddlewareDbError;

pub use config::OracleConnector;
pub use executor::OracleClient;
pub use params::{ReturningInto, returning_into};
pub use query::split_statements;
pub use transaction::OracleTransaction;

pub(crate) type SharedOracleConnection = Arc<tokio::sync::Mutex<oracle::Connection>>;

pub(crate) fn join_error(e: &tokio::task::JoinError) -> SqlMiddlewareDbError {
    SqlMiddlewareDbError::ExecutionError(format!("oracle spawn_blocking join error: {e}"))
}

/// Run `func` against a shared session on the blocking pool.
pub(crate) async fn run_blocking<F, R>(
    conn: SharedOracleConnection,
    func: F,
) -> Result<R, SqlMiddlewareDbError>
where
    F: FnOnce(&mut oracle::Connection) -> Result<R, SqlMiddlewareDbError> + Send + 'static,
    R: Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut guard = conn.blocking_lock();
        func(&mut guard)
    })
    .await
    .map_err(|e| join_error(&e))?
}
