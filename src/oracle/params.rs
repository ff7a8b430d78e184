use oracle::sql_type::{OracleType, ToSql};

use crate::error::SqlMiddlewareDbError;
use crate::types::RowValues;

/// Largest value a `RETURNING ... INTO` column hands back.
const RETURNING_WIDTH: u32 = 4000;

/// Owned Oracle bind values for one statement.
pub(crate) struct OracleParams {
    values: Vec<Box<dyn ToSql + Send>>,
}

impl OracleParams {
    /// # Errors
    /// `ParameterError` for a [`RowValues::Expression`], which belongs in the statement text.
    pub(crate) fn convert(params: &[RowValues]) -> Result<Self, SqlMiddlewareDbError> {
        let mut values: Vec<Box<dyn ToSql + Send>> = Vec::with_capacity(params.len());
        for (idx, param) in params.iter().enumerate() {
            let value: Box<dyn ToSql + Send> = match param {
                RowValues::Int(i) => Box::new(*i),
                RowValues::Float(f) => Box::new(*f),
                RowValues::Text(s) => Box::new(s.clone()),
                RowValues::Bool(b) => Box::new(i64::from(*b)),
                RowValues::Timestamp(dt) => Box::new(*dt),
                RowValues::Null => Box::new(Option::<String>::None),
                RowValues::JSON(jsval) => Box::new(jsval.to_string()),
                RowValues::Blob(bytes) => Box::new(bytes.clone()),
                RowValues::Expression(expr) => {
                    return Err(SqlMiddlewareDbError::ParameterError(format!(
                        "parameter :{} is a SQL expression ({expr}) and cannot be bound",
                        idx + 1
                    )));
                }
            };
            values.push(value);
        }
        Ok(Self { values })
    }

    /// Append `n` VARCHAR2 out binds for `RETURNING ... INTO`.
    pub(crate) fn with_out_binds(mut self, n: usize) -> Self {
        for _ in 0..n {
            self.values.push(Box::new(OracleType::Varchar2(RETURNING_WIDTH)));
        }
        self
    }

    pub(crate) fn as_refs(&self) -> Vec<&dyn ToSql> {
        self.values.iter().map(|v| v.as_ref() as &dyn ToSql).collect()
    }
}

/// A DML statement rewritten to hand its `RETURNING` columns back through out binds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReturningInto {
    pub sql: String,
    /// Result column names, unquoted, in order.
    pub columns: Vec<String>,
    /// Out bind names, in the same order.
    pub binds: Vec<String>,
}

fn find_keyword(upper: &str, keyword: &str) -> Option<usize> {
    let mut in_quote = false;
    let bytes = upper.as_bytes();
    let mut last = None;
    for (i, &b) in bytes.iter().enumerate() {
        if b == b'\'' {
            in_quote = !in_quote;
        } else if !in_quote
            && upper[i..].starts_with(keyword)
            && (i == 0 || bytes[i - 1].is_ascii_whitespace())
            && bytes.get(i + keyword.len()).is_none_or(u8::is_ascii_whitespace)
        {
            last = Some(i);
        }
    }
    last
}

/// Rewrite `INSERT/UPDATE/DELETE ... RETURNING a, b` into
/// `... RETURNING a, b INTO :RET_1, :RET_2`.
///
/// `None` when the statement is not DML, has no top-level `RETURNING`, or already binds
/// `INTO`.
#[must_use]
pub fn returning_into(sql: &str) -> Option<ReturningInto> {
    let upper = sql.to_ascii_uppercase();
    let head = upper.trim_start();
    if !["INSERT", "UPDATE", "DELETE"].iter().any(|kw| head.starts_with(kw)) {
        return None;
    }
    let at = find_keyword(&upper, "RETURNING")?;
    let list = sql[at + "RETURNING".len()..].trim();
    if list.is_empty() || find_keyword(&list.to_ascii_uppercase(), "INTO").is_some() {
        return None;
    }
    let columns: Vec<String> = list
        .split(',')
        .map(|c| {
            let c = c.trim();
            let name = c.rsplit_once('.').map_or(c, |(_, name)| name);
            name.trim_matches('"').to_string()
        })
        .collect();
    let binds: Vec<String> = (1..=columns.len()).map(|i| format!("RET_{i}")).collect();
    let placeholders: Vec<String> = binds.iter().map(|b| format!(":{b}")).collect();
    Some(ReturningInto {
        sql: format!("{} INTO {}", sql.trim_end(), placeholders.join(", ")),
        columns,
        binds,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SqlExpression;

    #[test]
    fn returning_gets_out_binds() {
        let r = returning_into("INSERT INTO \"users\" (\"name\") VALUES (:1) RETURNING \"id\", \"users\".\"name\"").unwrap();
        assert_eq!(r.sql, "INSERT INTO \"users\" (\"name\") VALUES (:1) RETURNING \"id\", \"users\".\"name\" INTO :RET_1, :RET_2");
        assert_eq!(r.columns, vec!["id", "name"]);
        assert_eq!(r.binds, vec!["RET_1", "RET_2"]);
    }

    #[test]
    fn plain_statements_are_left_alone() {
        assert!(returning_into("SELECT returning FROM t").is_none());
        assert!(returning_into("UPDATE t SET note = ' RETURNING x' WHERE id = :1").is_none());
        assert!(returning_into("DELETE FROM t RETURNING id INTO :out").is_none());
        assert!(returning_into("DELETE FROM t WHERE id = :1").is_none());
    }

    #[test]
    fn expressions_cannot_be_bound() {
        let err = OracleParams::convert(&[RowValues::Expression(SqlExpression::new("SYSDATE"))]).err().unwrap();
        assert!(err.to_string().contains(":1"));
        let params = OracleParams::convert(&[RowValues::Int(1), RowValues::Null]).unwrap().with_out_binds(2);
        assert_eq!(params.as_refs().len(), 4);
    }
}
