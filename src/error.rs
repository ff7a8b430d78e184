use std::fmt;

use thiserror::Error;

#[cfg(feature = "postgres")]
use deadpool_postgres::PoolError as PostgresPoolError;

use crate::classify::{self, ErrorKind};

/// Stage of the injection defense that rejected an input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectionStage {
    Query,
    Value,
    LikePattern,
    OrderBy,
    Identifier,
    Operator,
}

impl InjectionStage {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            InjectionStage::Query => "QUERY_VALIDATION_FAILED",
            InjectionStage::Value => "VALUE_VALIDATION_FAILED",
            InjectionStage::LikePattern => "LIKE_PATTERN_VALIDATION_FAILED",
            InjectionStage::OrderBy => "ORDER_BY_VALIDATION_FAILED",
            InjectionStage::Identifier => "IDENTIFIER_VALIDATION_FAILED",
            InjectionStage::Operator => "OPERATOR_VALIDATION_FAILED",
        }
    }
}

impl fmt::Display for InjectionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum SqlMiddlewareDbError {
    #[cfg(feature = "postgres")]
    #[error(transparent)]
    PostgresError(#[from] tokio_postgres::Error),

    #[cfg(feature = "postgres")]
    #[error(transparent)]
    PoolErrorPostgres(#[from] PostgresPoolError),

    #[cfg(feature = "mssql")]
    #[error(transparent)]
    MssqlError(#[from] tiberius::error::Error),

    #[cfg(feature = "mariadb")]
    #[error(transparent)]
    MariaDbError(#[from] sqlx::Error),

    #[cfg(feature = "oracle")]
    #[error(transparent)]
    OracleError(#[from] oracle::Error),

    /// An error raised by a driver that has already been classified where it was observed.
    #[error("Driver error ({}): {message}", kind.code())]
    Driver { kind: ErrorKind, message: String },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("MUST_CONNECT_FAILED:{name}: {reason}")]
    MustConnectFailed { name: String, reason: String },

    #[error("Parameter conversion error: {0}")]
    ParameterError(String),

    #[error("NAMED_PARAMETER_NOT_FOUND:{0}")]
    ParameterNotFound(String),

    #[error("SQL execution error: {0}")]
    ExecutionError(String),

    #[error("SQL_INJECTION_DETECTED:{stage}: {detail}")]
    InjectionDetected {
        stage: InjectionStage,
        detail: String,
    },

    #[error("{code}: {detail}")]
    BuilderError { code: &'static str, detail: String },

    #[error("ROW_MUST_EXIST:{0}")]
    RowMustExist(String),

    #[error("ROWS_MUST_EXIST:{0}")]
    RowsMustExist(String),

    #[error("ERROR_DB_DUPLICATE_KEY: {0}")]
    DuplicateKey(String),

    #[error("UNSUPPORTED_DIALECT:{0}")]
    UnsupportedDialect(String),

    #[error("Transaction error: {0}")]
    TransactionError(String),

    #[error("Encryption error: {0}")]
    EncryptionError(String),

    #[error("Secure memory error: {0}")]
    SecureMemoryError(String),

    #[error("Unimplemented feature: {0}")]
    Unimplemented(String),

    #[error("Other database error: {0}")]
    Other(String),
}

impl SqlMiddlewareDbError {
    pub(crate) fn builder(code: &'static str, detail: impl Into<String>) -> Self {
        SqlMiddlewareDbError::BuilderError {
            code,
            detail: detail.into(),
        }
    }

    pub(crate) fn injection(stage: InjectionStage, detail: impl Into<String>) -> Self {
        SqlMiddlewareDbError::InjectionDetected {
            stage,
            detail: detail.into(),
        }
    }

    /// Classify this error.
    ///
    /// Driver errors are classified from their native codes first; message matching is only
    /// used when the driver gives nothing typed to go on.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            #[cfg(feature = "postgres")]
            SqlMiddlewareDbError::PostgresError(err) => classify::postgres_error_kind(err)
                .unwrap_or_else(|| classify::kind_from_message(&err.to_string())),
            #[cfg(feature = "postgres")]
            SqlMiddlewareDbError::PoolErrorPostgres(err) => classify::postgres_pool_error_kind(err),
            #[cfg(feature = "mssql")]
            SqlMiddlewareDbError::MssqlError(err) => classify::mssql_error_kind(err)
                .unwrap_or_else(|| classify::kind_from_message(&err.to_string())),
            #[cfg(feature = "mariadb")]
            SqlMiddlewareDbError::MariaDbError(err) => classify::mariadb_error_kind(err)
                .unwrap_or_else(|| classify::kind_from_message(&err.to_string())),
            #[cfg(feature = "oracle")]
            SqlMiddlewareDbError::OracleError(err) => {
                let message = err.to_string();
                classify::oracle_code_kind(&message)
                    .unwrap_or_else(|| classify::kind_from_message(&message))
            }
            SqlMiddlewareDbError::Driver { kind, .. } => *kind,
            SqlMiddlewareDbError::ConfigError(_) => ErrorKind::Configuration,
            SqlMiddlewareDbError::ConnectionError(_)
            | SqlMiddlewareDbError::MustConnectFailed { .. } => ErrorKind::Connection,
            SqlMiddlewareDbError::ParameterError(_) | SqlMiddlewareDbError::ParameterNotFound(_) => {
                ErrorKind::Parameter
            }
            SqlMiddlewareDbError::InjectionDetected { .. } => ErrorKind::Injection,
            SqlMiddlewareDbError::BuilderError { .. } => ErrorKind::Builder,
            SqlMiddlewareDbError::RowMustExist(_) | SqlMiddlewareDbError::RowsMustExist(_) => {
                ErrorKind::RowNotFound
            }
            SqlMiddlewareDbError::DuplicateKey(_) => ErrorKind::DuplicateKey,
            SqlMiddlewareDbError::UnsupportedDialect(_) => ErrorKind::UnsupportedDialect,
            SqlMiddlewareDbError::TransactionError(_) => ErrorKind::Transaction,
            SqlMiddlewareDbError::EncryptionError(_) => ErrorKind::Encryption,
            SqlMiddlewareDbError::SecureMemoryError(_) => ErrorKind::SecureMemory,
            SqlMiddlewareDbError::ExecutionError(message) | SqlMiddlewareDbError::Other(message) => {
                classify::kind_from_message(message)
            }
            SqlMiddlewareDbError::Unimplemented(_) => ErrorKind::Other,
        }
    }

    /// Stable, machine-matchable identifier for this error.
    #[must_use]
    pub fn code(&self) -> String {
        match self {
            SqlMiddlewareDbError::InjectionDetected { stage, .. } => {
                format!("SQL_INJECTION_DETECTED:{}", stage.as_str())
            }
            SqlMiddlewareDbError::BuilderError { code, .. } => (*code).to_string(),
            SqlMiddlewareDbError::ParameterNotFound(name) => {
                format!("NAMED_PARAMETER_NOT_FOUND:{name}")
            }
            SqlMiddlewareDbError::RowMustExist(table) => format!("ROW_MUST_EXIST:{table}"),
            SqlMiddlewareDbError::RowsMustExist(table) => format!("ROWS_MUST_EXIST:{table}"),
            SqlMiddlewareDbError::UnsupportedDialect(name) => format!("UNSUPPORTED_DIALECT:{name}"),
            SqlMiddlewareDbError::MustConnectFailed { name, .. } => {
                format!("MUST_CONNECT_FAILED:{name}")
            }
            SqlMiddlewareDbError::ConfigError(message)
            | SqlMiddlewareDbError::EncryptionError(message)
            | SqlMiddlewareDbError::SecureMemoryError(message)
            | SqlMiddlewareDbError::TransactionError(message) => leading_code(message)
                .map_or_else(|| self.kind().code().to_string(), str::to_string),
            other => other.kind().code().to_string(),
        }
    }

    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        self.kind() == ErrorKind::Connection
    }

    /// Fold a unique-violation driver error into [`SqlMiddlewareDbError::DuplicateKey`],
    /// naming the table written to. Other errors pass through.
    #[must_use]
    pub fn into_duplicate_key(self, target: &str) -> Self {
        match self {
            SqlMiddlewareDbError::DuplicateKey(_) => self,
            err if err.is_duplicate_key_error() => {
                SqlMiddlewareDbError::DuplicateKey(format!("{target}: {err}"))
            }
            err => err,
        }
    }

    #[must_use]
    pub fn is_duplicate_key_error(&self) -> bool {
        self.kind() == ErrorKind::DuplicateKey
    }
}

/// `FOO_BAR` from messages shaped `FOO_BAR` or `FOO_BAR:detail`.
fn leading_code(message: &str) -> Option<&str> {
    let head = message.split(':').next().unwrap_or_default().trim();
    let is_code = !head.is_empty()
        && head.contains('_')
        && head.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_');
    is_code.then_some(head)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn injection_code_carries_stage() {
        let err = SqlMiddlewareDbError::injection(InjectionStage::Query, "semicolon");
        assert_eq!(err.code(), "SQL_INJECTION_DETECTED:QUERY_VALIDATION_FAILED");
        assert!(err.to_string().starts_with("SQL_INJECTION_DETECTED:QUERY_VALIDATION_FAILED"));
        assert_eq!(err.kind(), ErrorKind::Injection);
    }

    #[test]
    fn row_must_exist_code() {
        let err = SqlMiddlewareDbError::RowMustExist("users".into());
        assert_eq!(err.code(), "ROW_MUST_EXIST:users");
        assert_eq!(err.kind(), ErrorKind::RowNotFound);
    }

    #[test]
    fn execution_message_falls_back_to_string_classification() {
        let err = SqlMiddlewareDbError::ExecutionError("read: connection reset by peer".into());
        assert!(err.is_connection_error());
        assert_eq!(err.code(), "ERROR_DB_NOT_CONNECTED");

        let dup = SqlMiddlewareDbError::ExecutionError(
            "duplicate key value violates unique constraint \"users_pkey\"".into(),
        );
        assert!(dup.is_duplicate_key_error());
        assert_eq!(dup.code(), "ERROR_DB_DUPLICATE_KEY");
    }

    #[test]
    fn driver_variant_keeps_its_kind() {
        let err = SqlMiddlewareDbError::Driver {
            kind: ErrorKind::Connection,
            message: "scripted".into(),
        };
        assert!(err.is_connection_error());
    }

    #[test]
    fn message_codes_are_extracted() {
        let err = SqlMiddlewareDbError::SecureMemoryError("SECURE_MEMORY_KEY_NOT_FOUND:db.key".into());
        assert_eq!(err.code(), "SECURE_MEMORY_KEY_NOT_FOUND");
        let plain = SqlMiddlewareDbError::EncryptionError("cipher failed".into());
        assert_eq!(plain.code(), "ERROR_DB_ENCRYPTION");
    }
}
