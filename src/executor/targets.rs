use crate::connection::DatabaseConnection;
use crate::error::SqlMiddlewareDbError;
use crate::query::QueryAndParams;
use crate::results::ResultSet;
use crate::transaction::Transaction;
use crate::types::DatabaseType;

/// Where an [`super::Executor`] sends its statements: a managed connection (with reconnect
/// and retry) or an open transaction (no retry; a lost session fails the transaction).
pub enum QueryTarget<'a> {
    Connection(&'a DatabaseConnection),
    Transaction(&'a mut Transaction),
}

impl<'a> From<&'a DatabaseConnection> for QueryTarget<'a> {
    fn from(conn: &'a DatabaseConnection) -> Self {
        QueryTarget::Connection(conn)
    }
}

impl<'a> From<&'a mut Transaction> for QueryTarget<'a> {
    fn from(tx: &'a mut Transaction) -> Self {
        QueryTarget::Transaction(tx)
    }
}

impl QueryTarget<'_> {
    #[must_use]
    pub fn dialect(&self) -> DatabaseType {
        match self {
            QueryTarget::Connection(conn) => conn.dialect(),
            QueryTarget::Transaction(tx) => tx.dialect(),
        }
    }

    pub(crate) async fn select(&mut self, query: &QueryAndParams) -> Result<ResultSet, SqlMiddlewareDbError> {
        match self {
            QueryTarget::Connection(conn) => {
                conn.with_retry(|client| {
                    let query = query.clone();
                    async move { client.execute_select(&query).await }
                })
                .await
            }
            QueryTarget::Transaction(tx) => tx.execute_select(query).await,
        }
    }

    pub(crate) async fn dml(&mut self, query: &QueryAndParams) -> Result<usize, SqlMiddlewareDbError> {
        match self {
            QueryTarget::Connection(conn) => {
                conn.with_retry(|client| {
                    let query = query.clone();
                    async move { client.execute_dml(&query).await }
                })
                .await
            }
            QueryTarget::Transaction(tx) => tx.execute_dml(query).await,
        }
    }

    pub(crate) async fn batch(&mut self, sql: &str) -> Result<(), SqlMiddlewareDbError> {
        match self {
            QueryTarget::Connection(conn) => {
                conn.with_retry(|client| {
                    let sql = sql.to_string();
                    async move { client.execute_batch(&sql).await }
                })
                .await
            }
            QueryTarget::Transaction(tx) => tx.execute_batch(sql).await,
        }
    }
}
