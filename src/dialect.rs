//! Per-dialect syntax facts.
//!
//! Everything here is a pure function of [`DatabaseType`]; nothing touches a connection.

use std::fmt;

use crate::types::DatabaseType;

/// Where a dialect puts the columns returned from INSERT/UPDATE/DELETE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturningStyle {
    /// `... RETURNING a, b` at the end of the statement.
    Returning,
    /// SQL Server `OUTPUT INSERTED.a` before `VALUES` / `WHERE`.
    Output,
}

/// Transaction isolation level requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationLevel {
    /// Leave the server default in place.
    #[default]
    Default,
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Snapshot,
    Serializable,
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IsolationLevel::Default => "DEFAULT",
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Snapshot => "SNAPSHOT",
            IsolationLevel::Serializable => "SERIALIZABLE",
        };
        f.write_str(name)
    }
}

const COMMON_OPERATORS: &[&str] = &[
    "=",
    "!=",
    ">",
    "<",
    ">=",
    "<=",
    "like",
    "in",
    "not in",
    "is null",
    "is not null",
];

impl DatabaseType {
    /// Name of the native driver family.
    #[must_use]
    pub fn driver_name(self) -> &'static str {
        match self {
            DatabaseType::Postgres => "postgres",
            DatabaseType::Mssql => "sqlserver",
            DatabaseType::Oracle => "oracle",
            DatabaseType::MariaDb => "mysql",
        }
    }

    /// Quote a single identifier, doubling the closing quote character.
    #[must_use]
    pub fn quote_identifier(self, name: &str) -> String {
        match self {
            DatabaseType::Mssql => format!("[{}]", name.replace(']', "]]")),
            DatabaseType::MariaDb => format!("`{}`", name.replace('`', "``")),
            _ => format!("\"{}\"", name.replace('"', "\"\"")),
        }
    }

    /// Quote a possibly dotted name (`schema.table`, `alias.column`) segment by segment.
    /// A bare `*` segment is left as is.
    #[must_use]
    pub fn quote_field(self, name: &str) -> String {
        name.split('.')
            .map(|part| {
                if part == "*" {
                    part.to_string()
                } else {
                    self.quote_identifier(part)
                }
            })
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Positional placeholder for the 1-based argument index `n`.
    #[must_use]
    pub fn placeholder(self, n: usize) -> String {
        match self {
            DatabaseType::Postgres => format!("${n}"),
            DatabaseType::Mssql => format!("@p{n}"),
            DatabaseType::Oracle => format!(":{n}"),
            DatabaseType::MariaDb => "?".to_string(),
        }
    }

    /// Whether a repeated named parameter can reuse its first positional index.
    #[must_use]
    pub fn reuses_placeholders(self) -> bool {
        matches!(self, DatabaseType::Postgres | DatabaseType::Mssql)
    }

    #[must_use]
    pub fn returning_style(self) -> ReturningStyle {
        match self {
            DatabaseType::Mssql => ReturningStyle::Output,
            _ => ReturningStyle::Returning,
        }
    }

    #[must_use]
    pub fn max_identifier_len(self) -> usize {
        match self {
            DatabaseType::Postgres => 63,
            DatabaseType::MariaDb => 64,
            DatabaseType::Mssql | DatabaseType::Oracle => 128,
        }
    }

    /// Comparison operators accepted in conditions, lower-case.
    #[must_use]
    pub fn operators(self) -> Vec<&'static str> {
        let mut ops = COMMON_OPERATORS.to_vec();
        if self == DatabaseType::Postgres {
            ops.push("ilike");
        }
        ops
    }

    #[must_use]
    pub fn is_valid_operator(self, op: &str) -> bool {
        let op = op.trim().to_lowercase();
        self.operators().iter().any(|allowed| *allowed == op)
    }

    /// SQL Server uses `SELECT TOP n` for a plain limit without offset or ordering.
    #[must_use]
    pub fn uses_top(self, limit: Option<u64>, offset: Option<u64>, has_order_by: bool) -> bool {
        self == DatabaseType::Mssql && limit.is_some() && offset.is_none() && !has_order_by
    }

    /// Pagination tail for a SELECT, without a leading space. Empty when nothing applies.
    #[must_use]
    pub fn pagination_clause(
        self,
        limit: Option<u64>,
        offset: Option<u64>,
        has_order_by: bool,
    ) -> String {
        match self {
            DatabaseType::Postgres | DatabaseType::MariaDb => {
                let mut parts = Vec::new();
                match (limit, offset) {
                    (Some(limit), _) => parts.push(format!("LIMIT {limit}")),
                    // MariaDB has no OFFSET without LIMIT.
                    (None, Some(_)) if self == DatabaseType::MariaDb => {
                        parts.push(format!("LIMIT {}", u64::MAX));
                    }
                    _ => {}
                }
                if let Some(offset) = offset {
                    parts.push(format!("OFFSET {offset}"));
                }
                parts.join(" ")
            }
            DatabaseType::Mssql => {
                if limit.is_none() && offset.is_none() {
                    return String::new();
                }
                if self.uses_top(limit, offset, has_order_by) {
                    return String::new();
                }
                let mut clause = String::new();
                if !has_order_by {
                    clause.push_str("ORDER BY (SELECT NULL) ");
                }
                clause.push_str(&format!("OFFSET {} ROWS", offset.unwrap_or(0)));
                if let Some(limit) = limit {
                    clause.push_str(&format!(" FETCH NEXT {limit} ROWS ONLY"));
                }
                clause
            }
            DatabaseType::Oracle => {
                let mut parts = Vec::new();
                if let Some(offset) = offset {
                    parts.push(format!("OFFSET {offset} ROWS"));
                }
                if let Some(limit) = limit {
                    parts.push(format!("FETCH NEXT {limit} ROWS ONLY"));
                }
                parts.join(" ")
            }
        }
    }

    /// The isolation level the dialect will actually run for a request.
    ///
    /// Oracle only offers READ COMMITTED and SERIALIZABLE; SNAPSHOT exists natively only on
    /// SQL Server and maps to the snapshot-based level elsewhere.
    #[must_use]
    pub fn effective_isolation(self, level: IsolationLevel) -> IsolationLevel {
        match (self, level) {
            (_, IsolationLevel::Default) => IsolationLevel::Default,
            (DatabaseType::Oracle, IsolationLevel::ReadUncommitted | IsolationLevel::ReadCommitted) => {
                IsolationLevel::ReadCommitted
            }
            (DatabaseType::Oracle, _) => IsolationLevel::Serializable,
            (DatabaseType::Postgres | DatabaseType::MariaDb, IsolationLevel::Snapshot) => {
                IsolationLevel::RepeatableRead
            }
            (_, level) => level,
        }
    }

    /// Statements that open a transaction at `level`, in order.
    #[must_use]
    pub fn begin_statements(self, level: IsolationLevel) -> Vec<String> {
        let level = self.effective_isolation(level);
        let set_level = (level != IsolationLevel::Default)
            .then(|| format!("SET TRANSACTION ISOLATION LEVEL {level}"));
        match self {
            DatabaseType::Postgres => {
                if level == IsolationLevel::Default {
                    vec!["BEGIN".to_string()]
                } else {
                    vec![format!("BEGIN ISOLATION LEVEL {level}")]
                }
            }
            DatabaseType::Mssql => set_level
                .into_iter()
                .chain(std::iter::once("BEGIN TRANSACTION".to_string()))
                .collect(),
            DatabaseType::MariaDb => set_level
                .into_iter()
                .chain(std::iter::once("START TRANSACTION".to_string()))
                .collect(),
            // Oracle opens transactions implicitly; SET TRANSACTION must come first.
            DatabaseType::Oracle => set_level.into_iter().collect(),
        }
    }

    #[must_use]
    pub fn commit_statement(self) -> &'static str {
        match self {
            DatabaseType::Mssql => "COMMIT TRANSACTION",
            _ => "COMMIT",
        }
    }

    #[must_use]
    pub fn rollback_statement(self) -> &'static str {
        match self {
            DatabaseType::Mssql => "ROLLBACK TRANSACTION",
            _ => "ROLLBACK",
        }
    }

    /// Lightweight statement used to check a connection.
    #[must_use]
    pub fn ping_statement(self) -> &'static str {
        match self {
            DatabaseType::Oracle => "SELECT 1 FROM DUAL",
            _ => "SELECT 1",
        }
    }

    /// Normalise an identifier coming back from the driver: strip quoting and lower-case it.
    #[must_use]
    pub fn deformat_identifier(self, name: &str) -> String {
        let trimmed = name.trim();
        let unquoted = match self {
            DatabaseType::Mssql => trimmed
                .strip_prefix('[')
                .and_then(|s| s.strip_suffix(']'))
                .unwrap_or(trimmed),
            DatabaseType::MariaDb => trimmed
                .strip_prefix('`')
                .and_then(|s| s.strip_suffix('`'))
                .unwrap_or(trimmed),
            _ => trimmed,
        };
        unquoted.replace('"', "").to_lowercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoting_per_dialect() {
        assert_eq!(DatabaseType::Postgres.quote_identifier("user"), "\"user\"");
        assert_eq!(DatabaseType::Mssql.quote_identifier("we]ird"), "[we]]ird]");
        assert_eq!(DatabaseType::Oracle.quote_field("app.users"), "\"app\".\"users\"");
        assert_eq!(DatabaseType::MariaDb.quote_field("u.*"), "`u`.*");
    }

    #[test]
    fn placeholders() {
        assert_eq!(DatabaseType::Postgres.placeholder(3), "$3");
        assert_eq!(DatabaseType::Mssql.placeholder(3), "@p3");
        assert_eq!(DatabaseType::Oracle.placeholder(3), ":3");
        assert_eq!(DatabaseType::MariaDb.placeholder(3), "?");
    }

    #[test]
    fn pagination() {
        assert_eq!(
            DatabaseType::Postgres.pagination_clause(Some(10), Some(20), false),
            "LIMIT 10 OFFSET 20"
        );
        assert_eq!(
            DatabaseType::Mssql.pagination_clause(Some(10), Some(20), false),
            "ORDER BY (SELECT NULL) OFFSET 20 ROWS FETCH NEXT 10 ROWS ONLY"
        );
        assert_eq!(
            DatabaseType::Mssql.pagination_clause(Some(10), None, true),
            "OFFSET 0 ROWS FETCH NEXT 10 ROWS ONLY"
        );
        assert!(DatabaseType::Mssql.uses_top(Some(1), None, false));
        assert_eq!(DatabaseType::Mssql.pagination_clause(Some(1), None, false), "");
        assert_eq!(
            DatabaseType::Oracle.pagination_clause(Some(5), Some(0), true),
            "OFFSET 0 ROWS FETCH NEXT 5 ROWS ONLY"
        );
        assert_eq!(DatabaseType::Postgres.pagination_clause(None, None, false), "");
    }

    #[test]
    fn isolation_mapping() {
        assert_eq!(
            DatabaseType::Oracle.effective_isolation(IsolationLevel::ReadUncommitted),
            IsolationLevel::ReadCommitted
        );
        assert_eq!(
            DatabaseType::Postgres.begin_statements(IsolationLevel::Serializable),
            vec!["BEGIN ISOLATION LEVEL SERIALIZABLE".to_string()]
        );
        assert_eq!(
            DatabaseType::Mssql.begin_statements(IsolationLevel::Snapshot),
            vec![
                "SET TRANSACTION ISOLATION LEVEL SNAPSHOT".to_string(),
                "BEGIN TRANSACTION".to_string()
            ]
        );
        assert!(DatabaseType::Oracle.begin_statements(IsolationLevel::Default).is_empty());
    }

    #[test]
    fn operator_whitelist() {
        assert!(DatabaseType::Postgres.is_valid_operator(" ILIKE "));
        assert!(!DatabaseType::MariaDb.is_valid_operator("ilike"));
        assert!(DatabaseType::Oracle.is_valid_operator("IS NOT NULL"));
        assert!(!DatabaseType::Mssql.is_valid_operator("; drop"));
    }

    #[test]
    fn deformat() {
        assert_eq!(DatabaseType::Oracle.deformat_identifier("\"USER_ID\""), "user_id");
        assert_eq!(DatabaseType::Mssql.deformat_identifier("[Name]"), "name");
    }
}
