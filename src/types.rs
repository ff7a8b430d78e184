use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::SqlMiddlewareDbError;

/// A raw SQL fragment that is spliced into statement text instead of being bound.
///
/// Only build these from trusted, program-controlled text (column defaults, `NOW()`, key
/// expressions). User input belongs in a bound [`RowValues`] variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlExpression(String);

impl SqlExpression {
    #[must_use]
    pub fn new(sql: impl Into<String>) -> Self {
        Self(sql.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SqlExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Values that can be stored in a database row or used as query parameters.
///
/// ```rust
/// use sql_dialect_middleware::prelude::*;
///
/// let params = vec![
///     RowValues::Int(1),
///     RowValues::Text("alice".into()),
///     RowValues::Bool(true),
///     RowValues::Expression(SqlExpression::new("CURRENT_TIMESTAMP")),
/// ];
/// # let _ = params;
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum RowValues {
    /// Integer value (64-bit)
    Int(i64),
    /// Floating point value (64-bit)
    Float(f64),
    /// Text/string value
    Text(String),
    /// Boolean value
    Bool(bool),
    /// Timestamp value
    Timestamp(NaiveDateTime),
    /// NULL value
    Null,
    /// JSON value; objects and arrays are validated recursively before binding
    JSON(JsonValue),
    /// Binary data
    Blob(Vec<u8>),
    /// Raw SQL rendered in place of a placeholder
    Expression(SqlExpression),
}

impl RowValues {
    /// Check if this value is NULL
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_int(&self) -> Option<&i64> {
        if let RowValues::Int(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        if let RowValues::Text(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<&bool> {
        if let RowValues::Bool(value) = self {
            return Some(value);
        } else if let Some(i) = self.as_int() {
            if *i == 1 {
                return Some(&true);
            } else if *i == 0 {
                return Some(&false);
            }
        }
        None
    }

    #[must_use]
    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        if let RowValues::Timestamp(value) = self {
            return Some(*value);
        } else if let Some(s) = self.as_text() {
            for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
                if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
                    return Some(dt);
                }
            }
        }
        None
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        if let RowValues::Float(value) = self {
            Some(*value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_blob(&self) -> Option<&[u8]> {
        if let RowValues::Blob(bytes) = self {
            Some(bytes)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_json(&self) -> Option<&JsonValue> {
        if let RowValues::JSON(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_expression(&self) -> Option<&SqlExpression> {
        if let RowValues::Expression(expr) = self {
            Some(expr)
        } else {
            None
        }
    }

    /// Short type name used in validation messages.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            RowValues::Int(_) => "int64",
            RowValues::Float(_) => "float64",
            RowValues::Text(_) => "string",
            RowValues::Bool(_) => "bool",
            RowValues::Timestamp(_) => "timestamp",
            RowValues::Null => "null",
            RowValues::JSON(_) => "json",
            RowValues::Blob(_) => "bytes",
            RowValues::Expression(_) => "expression",
        }
    }

    /// JSON rendering of the value; timestamps use `YYYY-MM-DD HH:MM:SS[.f]`, blobs an array
    /// of bytes.
    #[must_use]
    pub fn to_json(&self) -> JsonValue {
        match self {
            RowValues::Int(i) => JsonValue::from(*i),
            RowValues::Float(f) => JsonValue::from(*f),
            RowValues::Text(s) => JsonValue::from(s.as_str()),
            RowValues::Bool(b) => JsonValue::from(*b),
            RowValues::Timestamp(ts) => {
                JsonValue::from(ts.format("%Y-%m-%d %H:%M:%S%.f").to_string())
            }
            RowValues::Null => JsonValue::Null,
            RowValues::JSON(v) => v.clone(),
            RowValues::Blob(bytes) => JsonValue::from(bytes.clone()),
            RowValues::Expression(expr) => JsonValue::from(expr.as_str()),
        }
    }
}

impl From<i64> for RowValues {
    fn from(value: i64) -> Self {
        RowValues::Int(value)
    }
}

impl From<i32> for RowValues {
    fn from(value: i32) -> Self {
        RowValues::Int(i64::from(value))
    }
}

impl From<f64> for RowValues {
    fn from(value: f64) -> Self {
        RowValues::Float(value)
    }
}

impl From<bool> for RowValues {
    fn from(value: bool) -> Self {
        RowValues::Bool(value)
    }
}

impl From<&str> for RowValues {
    fn from(value: &str) -> Self {
        RowValues::Text(value.to_string())
    }
}

impl From<String> for RowValues {
    fn from(value: String) -> Self {
        RowValues::Text(value)
    }
}

impl From<NaiveDateTime> for RowValues {
    fn from(value: NaiveDateTime) -> Self {
        RowValues::Timestamp(value)
    }
}

impl From<Vec<u8>> for RowValues {
    fn from(value: Vec<u8>) -> Self {
        RowValues::Blob(value)
    }
}

impl From<SqlExpression> for RowValues {
    fn from(value: SqlExpression) -> Self {
        RowValues::Expression(value)
    }
}

impl<T: Into<RowValues>> From<Option<T>> for RowValues {
    fn from(value: Option<T>) -> Self {
        value.map_or(RowValues::Null, Into::into)
    }
}

/// Named arguments for a `:name` template.
pub type NamedArgs = BTreeMap<String, RowValues>;

/// The database type supported by this middleware
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
pub enum DatabaseType {
    /// `PostgreSQL` database
    #[value(alias = "postgresql", alias = "pg")]
    #[serde(alias = "postgresql", alias = "pg", rename = "postgres")]
    Postgres,
    /// SQL Server database
    #[value(alias = "sqlserver")]
    #[serde(alias = "mssql", rename = "sqlserver")]
    Mssql,
    /// Oracle database
    #[serde(rename = "oracle")]
    Oracle,
    /// MariaDB / MySQL database
    #[value(name = "mariadb", alias = "mysql")]
    #[serde(alias = "mysql", rename = "mariadb")]
    MariaDb,
}

impl DatabaseType {
    /// Dialect used by [`DatabaseType::parse_or_fallback`] for unrecognised names.
    pub const FALLBACK: DatabaseType = DatabaseType::Postgres;

    pub const ALL: [DatabaseType; 4] = [
        DatabaseType::Postgres,
        DatabaseType::Mssql,
        DatabaseType::Oracle,
        DatabaseType::MariaDb,
    ];

    /// Parse a dialect name, substituting [`DatabaseType::FALLBACK`] for unknown names.
    #[must_use]
    pub fn parse_or_fallback(name: &str) -> DatabaseType {
        match name.parse() {
            Ok(db) => db,
            Err(_) => {
                tracing::warn!(name, fallback = %Self::FALLBACK, "unknown database type, using fallback dialect");
                Self::FALLBACK
            }
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            DatabaseType::Postgres => "postgres",
            DatabaseType::Mssql => "sqlserver",
            DatabaseType::Oracle => "oracle",
            DatabaseType::MariaDb => "mariadb",
        }
    }
}

impl fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DatabaseType {
    type Err = SqlMiddlewareDbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(DatabaseType::Postgres),
            "sqlserver" | "mssql" => Ok(DatabaseType::Mssql),
            "oracle" => Ok(DatabaseType::Oracle),
            "mariadb" | "mysql" => Ok(DatabaseType::MariaDb),
            other => Err(SqlMiddlewareDbError::UnsupportedDialect(other.to_string())),
        }
    }
}
