use std::collections::HashMap;

mod parsers;
mod scanner;

use parsers::{
    is_block_comment_end, is_block_comment_start, is_line_comment_start, matches_tag,
    try_start_dollar_quote,
};
use scanner::{State, scan_name};

use crate::error::SqlMiddlewareDbError;
use crate::query::QueryAndParams;
use crate::types::{DatabaseType, NamedArgs};

/// Walk `sql` and report every `:name` parameter outside literals, quoted identifiers and
/// comments as `(start, end, name)`, `start` pointing at the colon.
fn scan_parameters<F>(sql: &str, db: DatabaseType, mut on_param: F) -> Result<(), SqlMiddlewareDbError>
where
    F: FnMut(usize, usize, &str) -> Result<(), SqlMiddlewareDbError>,
{
    let mut state = State::Normal;
    let mut idx = 0;
    let bytes = sql.as_bytes();

    while idx < bytes.len() {
        let b = bytes[idx];
        match state {
            State::Normal => match b {
                b'\'' => state = State::SingleQuoted,
                b'"' => state = State::DoubleQuoted,
                _ if is_line_comment_start(bytes, idx) => state = State::LineComment,
                _ if is_block_comment_start(bytes, idx) => state = State::BlockComment(1),
                b'$' if db == DatabaseType::Postgres => {
                    if let Some((tag, advance)) = try_start_dollar_quote(bytes, idx) {
                        state = State::DollarQuoted(tag);
                        idx = advance;
                    }
                }
                b':' => {
                    if bytes.get(idx + 1) == Some(&b':') {
                        idx += 1; // `::` cast
                    } else if let Some(end) = scan_name(bytes, idx + 1) {
                        on_param(idx, end, &sql[idx + 1..end])?;
                        idx = end - 1;
                    }
                }
                _ => {}
            },
            State::SingleQuoted => {
                if b == b'\'' {
                    if bytes.get(idx + 1) == Some(&b'\'') {
                        idx += 1; // skip escaped quote
                    } else {
                        state = State::Normal;
                    }
                }
            }
            State::DoubleQuoted => {
                if b == b'"' {
                    if bytes.get(idx + 1) == Some(&b'"') {
                        idx += 1; // skip escaped quote
                    } else {
                        state = State::Normal;
                    }
                }
            }
            State::LineComment => {
                if b == b'\n' {
                    state = State::Normal;
                }
            }
            State::BlockComment(depth) => {
                if is_block_comment_start(bytes, idx) {
                    state = State::BlockComment(depth + 1);
                    idx += 1;
                } else if is_block_comment_end(bytes, idx) {
                    idx += 1;
                    if depth == 1 {
                        state = State::Normal;
                    } else {
                        state = State::BlockComment(depth - 1);
                    }
                }
            }
            State::DollarQuoted(ref tag) => {
                if b == b'$' && matches_tag(bytes, idx, tag) {
                    let tag_len = tag.len();
                    state = State::Normal;
                    idx += tag_len + 1;
                }
            }
        }

        idx += 1;
    }
    Ok(())
}

/// Distinct parameter names in first-occurrence order.
#[must_use]
pub fn named_parameters(sql: &str, db: DatabaseType) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    // The callback never fails.
    let _ = scan_parameters(sql, db, |_, _, name| {
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
        Ok(())
    });
    names
}

/// Rewrite a `:name` template into the dialect's positional placeholders.
///
/// Arguments come out in first-occurrence order. PostgreSQL and SQL Server reuse the first
/// index for a repeated name; MariaDB and Oracle bind by position of occurrence, so a
/// repeated name is emitted once per occurrence.
///
/// ```rust
/// use sql_dialect_middleware::prelude::*;
///
/// let mut args = NamedArgs::new();
/// args.insert("id".into(), RowValues::Int(7));
/// let qp = to_positional(DatabaseType::Mssql, "SELECT id::text FROM t WHERE id = :id", &args)?;
/// assert_eq!(qp.query, "SELECT id::text FROM t WHERE id = @p1");
/// # Ok::<(), SqlMiddlewareDbError>(())
/// ```
///
/// # Errors
///
/// Returns `ParameterNotFound` for the first name missing from `args`; nothing is rewritten
/// in that case.
pub fn to_positional(
    db: DatabaseType,
    named_query: &str,
    args: &NamedArgs,
) -> Result<QueryAndParams, SqlMiddlewareDbError> {
    let mut out = String::with_capacity(named_query.len());
    let mut params = Vec::new();
    let mut assigned: HashMap<String, usize> = HashMap::new();
    let mut copied_until = 0;

    scan_parameters(named_query, db, |start, end, name| {
        let value = args
            .get(name)
            .ok_or_else(|| SqlMiddlewareDbError::ParameterNotFound(name.to_string()))?;
        let index = match assigned.get(name) {
            Some(index) if db.reuses_placeholders() => *index,
            _ => {
                params.push(value.clone());
                assigned.insert(name.to_string(), params.len());
                params.len()
            }
        };
        out.push_str(&named_query[copied_until..start]);
        out.push_str(&db.placeholder(index));
        copied_until = end;
        Ok(())
    })?;

    out.push_str(&named_query[copied_until..]);
    Ok(QueryAndParams::new(out, params))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RowValues;

    fn args() -> NamedArgs {
        let mut args = NamedArgs::new();
        args.insert("name".into(), RowValues::Text("alice".into()));
        args.insert("id".into(), RowValues::Int(1));
        args
    }

    #[test]
    fn placeholders_per_dialect() {
        let sql = "SELECT * FROM t WHERE name = :name AND id = :id";
        let expected = [
            (DatabaseType::Postgres, "SELECT * FROM t WHERE name = $1 AND id = $2"),
            (DatabaseType::Mssql, "SELECT * FROM t WHERE name = @p1 AND id = @p2"),
            (DatabaseType::Oracle, "SELECT * FROM t WHERE name = :1 AND id = :2"),
            (DatabaseType::MariaDb, "SELECT * FROM t WHERE name = ? AND id = ?"),
        ];
        for (db, query) in expected {
            let qp = to_positional(db, sql, &args()).unwrap();
            assert_eq!(qp.query, query);
            assert_eq!(
                qp.params,
                vec![RowValues::Text("alice".into()), RowValues::Int(1)]
            );
        }
    }

    #[test]
    fn literals_casts_and_comments_are_left_alone() {
        let sql = "SELECT ':name', id::text, \"a:b\" -- :id\n/* :id */ FROM t WHERE id = :id";
        let qp = to_positional(DatabaseType::Postgres, sql, &args()).unwrap();
        assert_eq!(
            qp.query,
            "SELECT ':name', id::text, \"a:b\" -- :id\n/* :id */ FROM t WHERE id = $1"
        );
        assert_eq!(qp.params, vec![RowValues::Int(1)]);
    }

    #[test]
    fn escaped_quotes_stay_inside_literal() {
        let sql = "SELECT 'it''s :name' FROM t WHERE id = :id";
        let qp = to_positional(DatabaseType::Oracle, sql, &args()).unwrap();
        assert_eq!(qp.query, "SELECT 'it''s :name' FROM t WHERE id = :1");
    }

    #[test]
    fn repeated_names() {
        let sql = "SELECT * FROM t WHERE a = :id OR b = :id";
        let pg = to_positional(DatabaseType::Postgres, sql, &args()).unwrap();
        assert_eq!(pg.query, "SELECT * FROM t WHERE a = $1 OR b = $1");
        assert_eq!(pg.params.len(), 1);
        let my = to_positional(DatabaseType::MariaDb, sql, &args()).unwrap();
        assert_eq!(my.query, "SELECT * FROM t WHERE a = ? OR b = ?");
        assert_eq!(my.params.len(), 2);
    }

    #[test]
    fn missing_parameter_fails_whole_translation() {
        let err = to_positional(DatabaseType::MariaDb, "SELECT :id, :nope", &args()).unwrap_err();
        assert_eq!(err.code(), "NAMED_PARAMETER_NOT_FOUND:nope");
    }

    #[test]
    fn dollar_quoted_body_skipped_on_postgres() {
        let sql = "SELECT $fn$ :name $fn$, :id";
        let qp = to_positional(DatabaseType::Postgres, sql, &args()).unwrap();
        assert_eq!(qp.query, "SELECT $fn$ :name $fn$, $1");
    }

    #[test]
    fn multibyte_text_preserved() {
        let sql = "SELECT 'héllo wörld' AS gruß, :name AS n";
        let qp = to_positional(DatabaseType::Oracle, sql, &args()).unwrap();
        assert_eq!(qp.query, "SELECT 'héllo wörld' AS gruß, :1 AS n");
    }

    #[test]
    fn names_in_first_occurrence_order() {
        let names = named_parameters("a = :b AND c = :a AND d = :b", DatabaseType::Postgres);
        assert_eq!(names, vec!["b".to_string(), "a".to_string()]);
    }
}
