// PostgreSQL backend - tokio-postgres behind a deadpool-postgres pool
//
// - config: connection settings and pool setup
// - params: binding `RowValues` as tokio-postgres parameters
// - query: row extraction into `ResultSet`
// - executor: the pooled client (non-transactional statements)
// - transaction: a dedicated session with an open transaction

pub mod config;
pub mod executor;
pub mod params;
pub mod query;
pub mod transaction;

pub use config::PostgresConnector;
pub use executor::PostgresClient;
pub use params::Params;
pub use query::build_result_set;
pub use transaction::PostgresTransaction;
