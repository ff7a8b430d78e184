use std::sync::Arc;

use chrono::NaiveDateTime;
use oracle::sql_type::OracleType;
use oracle::{Connection, SqlValue};

use super::params::{OracleParams, returning_into};
use crate::error::SqlMiddlewareDbError;
use crate::query::QueryAndParams;
use crate::results::ResultSet;
use crate::types::RowValues;

/// Run a row-returning statement. DML with a trailing `RETURNING` list is rewritten to bind
/// the returned columns into VARCHAR2 out parameters, so those values come back as text.
pub(crate) fn select(conn: &Connection, query: &QueryAndParams) -> Result<ResultSet, SqlMiddlewareDbError> {
    let params = OracleParams::convert(&query.params)?;
    if let Some(rewrite) = returning_into(&query.query) {
        let params = params.with_out_binds(rewrite.binds.len());
        let mut stmt = conn.statement(&rewrite.sql).build()?;
        stmt.execute(&params.as_refs())?;
        let mut columns = Vec::with_capacity(rewrite.binds.len());
        for bind in &rewrite.binds {
            columns.push(stmt.returned_values::<&str, Option<String>>(bind.as_str())?);
        }
        let row_count = columns.first().map_or(0, Vec::len);
        let mut result_set = ResultSet::with_capacity(row_count);
        result_set.set_column_names(Arc::new(rewrite.columns));
        for i in 0..row_count {
            let values = columns
                .iter()
                .map(|col| {
                    col.get(i)
                        .cloned()
                        .flatten()
                        .map_or(RowValues::Null, RowValues::Text)
                })
                .collect();
            result_set.add_row_values(values);
        }
        return Ok(result_set);
    }

    let mut stmt = conn.statement(&query.query).build()?;
    let rows = stmt.query(&params.as_refs())?;
    let column_names: Vec<String> = rows.column_info().iter().map(|c| c.name().to_string()).collect();
    let mut result_set = ResultSet::with_capacity(0);
    result_set.set_column_names(Arc::new(column_names));
    for row in rows {
        let row = row?;
        let values = row
            .sql_values()
            .iter()
            .map(extract_value)
            .collect::<Result<Vec<_>, _>>()?;
        result_set.add_row_values(values);
    }
    Ok(result_set)
}

pub(crate) fn dml(conn: &Connection, query: &QueryAndParams) -> Result<usize, SqlMiddlewareDbError> {
    let params = OracleParams::convert(&query.params)?;
    let mut stmt = conn.statement(&query.query).build()?;
    stmt.execute(&params.as_refs())?;
    usize::try_from(stmt.row_count()?).map_err(|e| {
        SqlMiddlewareDbError::ExecutionError(format!("Invalid rows affected count: {e}"))
    })
}

/// Oracle takes one statement per call, so scripts are split first.
pub(crate) fn batch(conn: &Connection, sql: &str) -> Result<(), SqlMiddlewareDbError> {
    for statement in split_statements(sql) {
        conn.execute(&statement, &[])?;
    }
    Ok(())
}

fn extract_value(value: &SqlValue) -> Result<RowValues, SqlMiddlewareDbError> {
    if value.is_null()? {
        return Ok(RowValues::Null);
    }
    let extracted = match value.oracle_type()? {
        OracleType::Number(_, _) | OracleType::Float(_) => {
            let text: String = value.get()?;
            text.parse::<i64>().map_or_else(
                |_| text.parse::<f64>().map_or(RowValues::Text(text.clone()), RowValues::Float),
                RowValues::Int,
            )
        }
        OracleType::Int64 => RowValues::Int(value.get()?),
        OracleType::BinaryFloat | OracleType::BinaryDouble => RowValues::Float(value.get()?),
        OracleType::Boolean => RowValues::Bool(value.get()?),
        OracleType::Date
        | OracleType::Timestamp(_)
        | OracleType::TimestampTZ(_)
        | OracleType::TimestampLTZ(_) => RowValues::Timestamp(value.get::<NaiveDateTime>()?),
        OracleType::Raw(_) | OracleType::BLOB | OracleType::LongRaw => RowValues::Blob(value.get()?),
        _ => RowValues::Text(value.get()?),
    };
    Ok(extracted)
}

fn is_plsql_block(statement: &str) -> bool {
    let upper = statement.trim_start().to_ascii_uppercase();
    let words: Vec<&str> = upper.split_whitespace().take(5).collect();
    match words.as_slice() {
        ["BEGIN" | "DECLARE", ..] => true,
        ["CREATE", rest @ ..] => {
            let rest = match rest {
                ["OR", "REPLACE", tail @ ..] => tail,
                other => other,
            };
            let rest = match rest {
                ["EDITIONABLE" | "NONEDITIONABLE", tail @ ..] => tail,
                other => other,
            };
            matches!(
                rest.first(),
                Some(&("FUNCTION" | "PROCEDURE" | "PACKAGE" | "TRIGGER" | "TYPE"))
            )
        }
        _ => false,
    }
}

/// Split a script into single statements.
///
/// A line holding only `/` ends a block. PL/SQL blocks are kept whole, including their
/// inner semicolons; anything else is split on `;` outside string literals, and the
/// terminating `;` is dropped since Oracle rejects it in plain SQL.
#[must_use]
pub fn split_statements(script: &str) -> Vec<String> {
    let mut blocks = vec![String::new()];
    for line in script.lines() {
        if line.trim() == "/" {
            blocks.push(String::new());
        } else if let Some(block) = blocks.last_mut() {
            block.push_str(line);
            block.push('\n');
        }
    }

    let mut statements = Vec::new();
    for block in blocks {
        let trimmed = block.trim();
        if trimmed.is_empty() {
            continue;
        }
        let mut rest = trimmed;
        'block: while !rest.is_empty() {
            // a PL/SQL unit runs to the end of its block
            if is_plsql_block(rest) {
                statements.push(rest.to_string());
                break;
            }
            let mut in_quote = false;
            for (i, ch) in rest.char_indices() {
                match ch {
                    '\'' => in_quote = !in_quote,
                    ';' if !in_quote => {
                        let statement = rest[..i].trim();
                        if !statement.is_empty() {
                            statements.push(statement.to_string());
                        }
                        rest = rest[i + 1..].trim_start();
                        continue 'block;
                    }
                    _ => {}
                }
            }
            statements.push(rest.to_string());
            break;
        }
    }
    statements
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_sql_splits_on_semicolons() {
        let script = "CREATE TABLE t (id NUMBER, note VARCHAR2(20));\nINSERT INTO t VALUES (1, 'a;b');\n\n";
        assert_eq!(
            split_statements(script),
            vec![
                "CREATE TABLE t (id NUMBER, note VARCHAR2(20))",
                "INSERT INTO t VALUES (1, 'a;b')",
            ]
        );
    }

    #[test]
    fn plsql_blocks_stay_whole() {
        let script = "CREATE OR REPLACE TRIGGER t_bi BEFORE INSERT ON t FOR EACH ROW\nBEGIN\n  :new.id := 1;\nEND;\n/\nDROP TABLE x;\nBEGIN NULL; END;\n/\n";
        let statements = split_statements(script);
        assert_eq!(statements.len(), 3);
        assert!(statements[0].starts_with("CREATE OR REPLACE TRIGGER"));
        assert!(statements[0].ends_with("END;"));
        assert_eq!(statements[1], "DROP TABLE x");
        assert_eq!(statements[2], "BEGIN NULL; END;");
    }
}
