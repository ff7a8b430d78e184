// SQL Server backend - tiberius behind a deadpool managed pool
//
// - config: connection settings, the pool manager and the connector
// - params: binding `RowValues` to tiberius queries
// - query: result extraction into `ResultSet`
// - executor: the pooled client (non-transactional statements)
// - transaction: a dedicated session with an open transaction

pub mod config;
pub mod executor;
pub mod params;
pub mod query;
pub mod transaction;

pub use config::{MssqlConnection, MssqlConnector, MssqlManager};
pub use executor::MssqlClient;
pub use params::bind_query_params;
pub use query::build_result_set;
pub use transaction::MssqlTransaction;
