//! Error classification.
//!
//! Each driver's native error codes are mapped to an [`ErrorKind`] where the error is first
//! observed. Message matching ([`kind_from_message`]) is kept only for errors that carry no
//! typed code.

use lazy_static::lazy_static;
use regex::Regex;

/// Coarse error category used for retry and conflict decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Connection,
    DuplicateKey,
    Injection,
    Configuration,
    Parameter,
    RowNotFound,
    Builder,
    Transaction,
    Encryption,
    SecureMemory,
    UnsupportedDialect,
    Execution,
    Other,
}

impl ErrorKind {
    /// Stable identifier for callers that match on strings.
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::Connection => "ERROR_DB_NOT_CONNECTED",
            ErrorKind::DuplicateKey => "ERROR_DB_DUPLICATE_KEY",
            ErrorKind::Injection => "SQL_INJECTION_DETECTED",
            ErrorKind::Configuration => "ERROR_DB_CONFIGURATION",
            ErrorKind::Parameter => "ERROR_DB_PARAMETER",
            ErrorKind::RowNotFound => "ROW_MUST_EXIST",
            ErrorKind::Builder => "ERROR_QUERY_BUILDER",
            ErrorKind::Transaction => "ERROR_DB_TRANSACTION",
            ErrorKind::Encryption => "ERROR_DB_ENCRYPTION",
            ErrorKind::SecureMemory => "ERROR_SECURE_MEMORY",
            ErrorKind::UnsupportedDialect => "UNSUPPORTED_DIALECT",
            ErrorKind::Execution => "ERROR_DB_EXECUTION",
            ErrorKind::Other => "ERROR_DB_OTHER",
        }
    }
}

/// MySQL / MariaDB server and client error numbers.
#[must_use]
pub fn mysql_code_kind(number: u16) -> Option<ErrorKind> {
    match number {
        1062 => Some(ErrorKind::DuplicateKey),
        1040 | 1042 | 1043 | 1047 | 1053 | 1077 | 1129 | 1130 | 2002 | 2003 | 2005 | 2006
        | 2013 => Some(ErrorKind::Connection),
        _ => None,
    }
}

/// SQL Server error numbers (`-2` is the client-side timeout).
#[must_use]
pub fn mssql_code_kind(number: i64) -> Option<ErrorKind> {
    match number {
        2627 | 2601 => Some(ErrorKind::DuplicateKey),
        53 | 233 | 10053 | 10054 | 10060 | 10061 | -2 => Some(ErrorKind::Connection),
        _ => None,
    }
}

/// PostgreSQL SQLSTATE codes.
#[must_use]
pub fn sqlstate_kind(sqlstate: &str) -> Option<ErrorKind> {
    if sqlstate == "23505" {
        Some(ErrorKind::DuplicateKey)
    } else if sqlstate.starts_with("08") {
        Some(ErrorKind::Connection)
    } else {
        None
    }
}

lazy_static! {
    static ref ORA_CODE: Regex = Regex::new(r"(?i)ORA-(\d{5})").expect("valid ORA code regex");
}

/// Oracle reports its codes as `ORA-nnnnn`; the first one in the message decides.
#[must_use]
pub fn oracle_code_kind(message: &str) -> Option<ErrorKind> {
    let caps = ORA_CODE.captures(message)?;
    match caps.get(1)?.as_str() {
        "00001" => Some(ErrorKind::DuplicateKey),
        "03113" | "03114" | "03135" | "12541" | "12170" | "12224" => Some(ErrorKind::Connection),
        _ => None,
    }
}

const CONNECTION_PHRASES: &[&str] = &[
    "connection refused",
    "connection reset",
    "connection timed out",
    "connection closed",
    "connection lost",
    "broken pipe",
    "no connection",
    "cannot connect",
    "network error",
    "timeout",
    "timed out",
    "server has gone away",
    "lost connection",
    "socket",
    "server closed",
    "driver closed",
    "unexpected eof",
];

const DUPLICATE_PHRASES: &[&str] = &[
    "duplicate key",
    "violates unique constraint",
    "duplicate entry",
    "violation of unique key constraint",
    "unique constraint",
];

/// Last-resort classification for errors without a typed code.
#[must_use]
pub fn kind_from_message(message: &str) -> ErrorKind {
    if let Some(kind) = oracle_code_kind(message) {
        return kind;
    }
    let lower = message.to_lowercase();
    if DUPLICATE_PHRASES.iter().any(|p| lower.contains(p))
        || (lower.contains("duplicate") && (lower.contains("key") || lower.contains("unique")))
    {
        return ErrorKind::DuplicateKey;
    }
    if lower.trim() == "eof" || CONNECTION_PHRASES.iter().any(|p| lower.contains(p)) {
        return ErrorKind::Connection;
    }
    ErrorKind::Execution
}

#[cfg(feature = "postgres")]
pub(crate) fn postgres_error_kind(err: &tokio_postgres::Error) -> Option<ErrorKind> {
    if err.is_closed() {
        return Some(ErrorKind::Connection);
    }
    if let Some(state) = err.code() {
        return sqlstate_kind(state.code());
    }
    let io = std::error::Error::source(err).and_then(|src| src.downcast_ref::<std::io::Error>());
    io.map(|_| ErrorKind::Connection)
}

#[cfg(feature = "postgres")]
pub(crate) fn postgres_pool_error_kind(err: &deadpool_postgres::PoolError) -> ErrorKind {
    match err {
        deadpool_postgres::PoolError::Backend(inner) => postgres_error_kind(inner)
            .unwrap_or_else(|| kind_from_message(&inner.to_string())),
        _ => ErrorKind::Connection,
    }
}

#[cfg(feature = "mssql")]
pub(crate) fn mssql_error_kind(err: &tiberius::error::Error) -> Option<ErrorKind> {
    match err {
        tiberius::error::Error::Server(token) => mssql_code_kind(i64::from(token.code())),
        tiberius::error::Error::Io { .. } => Some(ErrorKind::Connection),
        _ => None,
    }
}

#[cfg(feature = "mariadb")]
pub(crate) fn mariadb_error_kind(err: &sqlx::Error) -> Option<ErrorKind> {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => Some(ErrorKind::Connection),
        sqlx::Error::Database(db) => db
            .try_downcast_ref::<sqlx::mysql::MySqlDatabaseError>()
            .and_then(|my| mysql_code_kind(my.number())),
        _ => None,
    }
}
