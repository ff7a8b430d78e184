//! Async SQL middleware for PostgreSQL, SQL Server, Oracle and MariaDB.
//!
//! Statements are written once with `:name` parameters, checked for injection, translated to
//! the dialect's positional placeholders and run through a per-database connection that
//! reconnects and retries on connection failures. On top sit dialect-aware builders, a
//! transaction wrapper and column encryption (DDL, session keys, encrypted CRUD).
//!
//! Backends are cargo features: `postgres` (default), `mssql`, `mariadb`, `oracle`.

pub mod classify;
pub mod config;
pub mod connection;
pub mod dialect;
pub mod driver;
pub mod encryption;
pub mod error;
pub mod executor;
pub mod injection;
pub mod prelude;
pub mod query;
pub mod query_builder;
pub mod registry;
pub mod results;
pub mod secure_memory;
pub mod transaction;
pub mod translation;
pub mod types;

#[cfg(feature = "mariadb")]
pub mod mariadb;
#[cfg(feature = "mssql")]
pub mod mssql;
#[cfg(feature = "oracle")]
pub mod oracle;
#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use error::SqlMiddlewareDbError;
