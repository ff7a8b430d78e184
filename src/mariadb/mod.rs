// MariaDB / MySQL backend - sqlx's MySQL driver and pool
//
// - config: connect options and the connector
// - params: binding `RowValues` to sqlx queries
// - query: row extraction into `ResultSet`
// - executor: the pooled client (non-transactional statements)
// - transaction: a dedicated session with an open transaction

pub mod config;
pub mod executor;
pub mod params;
pub mod query;
pub mod transaction;

pub use config::MariaDbConnector;
pub use executor::MariaDbClient;
pub use params::bind_query_params;
pub use query::build_result_set;
pub use transaction::MariaDbTransaction;
