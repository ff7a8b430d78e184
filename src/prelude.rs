//! Convenient imports for common functionality.
//!
//! This module re-exports the most commonly used types and functions
//! to make it easier to get started with the library.

pub use crate::classify::ErrorKind;
pub use crate::config::{ConfigStore, DatabaseConfig, StorageConfig};
pub use crate::connection::{ConnectionState, DatabaseConnection, RetryPolicy};
pub use crate::dialect::IsolationLevel;
pub use crate::encryption::{
    DecryptedColumnDef, DecryptedSelect, EncryptedColumnDef, KeyResolver, KeySource, SchemaRegistry,
    TableSpec,
};
pub use crate::error::SqlMiddlewareDbError;
pub use crate::executor::{Executor, QueryOptions, QueryTarget};
pub use crate::injection::InjectionPolicy;
pub use crate::query::QueryAndParams;
pub use crate::query_builder::{
    BuiltQuery, ConditionGroup, CountQuery, DeleteQuery, InsertQuery, JoinType, NullPlacement,
    OrderDirection, SelectQuery, UpdateQuery,
};
pub use crate::registry::DatabaseRegistry;
pub use crate::results::{CustomDbRow, FieldType, FieldTypeMapping, ResultSet};
pub use crate::secure_memory::{SecureMemoryStore, StorageMode};
pub use crate::transaction::{Transaction, TxState};
pub use crate::translation::to_positional;
pub use crate::types::{DatabaseType, NamedArgs, RowValues, SqlExpression};
