//! SQL injection defense.
//!
//! Every statement text and bound value passes through [`check_all`] before it reaches a
//! driver. The individual checks are public so builders can validate identifiers and
//! operators as they are accumulated.

mod patterns;

use serde_json::Value as JsonValue;

use crate::error::{InjectionStage, SqlMiddlewareDbError};
use crate::types::{DatabaseType, NamedArgs, RowValues};

use patterns::{
    IDENTIFIER, LIKE_KEYWORD, MAX_LIKE_WILDCARDS, ORDER_BY_KEYWORD, SUSPICIOUS_VALUE_TOKENS,
    first_suspicious_match,
};

/// Whether a call runs the injection checks.
///
/// `AllowRisk` is meant for statements the program assembles itself (DDL scripts, session
/// key injection). It applies to a single call only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InjectionPolicy {
    #[default]
    Enforce,
    AllowRisk,
}

/// Validate a possibly dotted identifier.
///
/// # Errors
///
/// Returns `InjectionDetected` (identifier stage) for empty names or segments, segments that
/// are not plain identifiers, segments longer than the dialect allows, and segments that
/// look like SQL keywords used in attacks.
pub fn check_identifier(db: DatabaseType, identifier: &str) -> Result<(), SqlMiddlewareDbError> {
    if identifier.is_empty() {
        return Err(SqlMiddlewareDbError::injection(
            InjectionStage::Identifier,
            "identifier cannot be empty",
        ));
    }
    for part in identifier.split('.') {
        if part.is_empty() {
            return Err(SqlMiddlewareDbError::injection(
                InjectionStage::Identifier,
                format!("empty part in identifier {identifier:?}"),
            ));
        }
        if !IDENTIFIER.is_match(part) {
            return Err(SqlMiddlewareDbError::injection(
                InjectionStage::Identifier,
                format!("invalid identifier format: {part:?}"),
            ));
        }
        let max = db.max_identifier_len();
        if part.len() > max {
            return Err(SqlMiddlewareDbError::injection(
                InjectionStage::Identifier,
                format!("identifier {part:?} exceeds maximum length of {max} for {db}"),
            ));
        }
        if let Some(pattern) = first_suspicious_match(part) {
            return Err(SqlMiddlewareDbError::injection(
                InjectionStage::Identifier,
                format!("identifier {part:?} matches suspicious pattern {pattern}"),
            ));
        }
    }
    Ok(())
}

/// Validate a comparison operator against the dialect whitelist.
///
/// # Errors
///
/// Returns `InjectionDetected` (operator stage) for anything not on the list.
pub fn check_operator(db: DatabaseType, operator: &str) -> Result<(), SqlMiddlewareDbError> {
    if db.is_valid_operator(operator) {
        Ok(())
    } else {
        Err(SqlMiddlewareDbError::injection(
            InjectionStage::Operator,
            format!("operator {operator:?} not supported for {db}"),
        ))
    }
}

fn check_string_value(value: &str) -> Result<(), SqlMiddlewareDbError> {
    match SUSPICIOUS_VALUE_TOKENS.iter().find(|token| value.contains(*token)) {
        Some(token) => Err(SqlMiddlewareDbError::injection(
            InjectionStage::Value,
            format!("value contains suspicious token {token:?}"),
        )),
        None => Ok(()),
    }
}

fn check_json_value(db: DatabaseType, value: &JsonValue) -> Result<(), SqlMiddlewareDbError> {
    match value {
        JsonValue::String(s) => check_string_value(s),
        JsonValue::Array(items) => items.iter().try_for_each(|item| check_json_value(db, item)),
        JsonValue::Object(map) => {
            for (key, item) in map {
                check_identifier(db, key).map_err(|err| {
                    SqlMiddlewareDbError::injection(
                        InjectionStage::Value,
                        format!("invalid JSON key: {err}"),
                    )
                })?;
                check_json_value(db, item)?;
            }
            Ok(())
        }
        JsonValue::Null | JsonValue::Bool(_) | JsonValue::Number(_) => Ok(()),
    }
}

/// Validate a value about to be bound.
///
/// # Errors
///
/// Returns `InjectionDetected` (value stage) for strings carrying statement separators or
/// comment markers, for JSON objects with non-identifier keys, and for raw SQL expressions,
/// which are never bindable.
pub fn check_value(db: DatabaseType, value: &RowValues) -> Result<(), SqlMiddlewareDbError> {
    match value {
        RowValues::Text(s) => check_string_value(s),
        RowValues::JSON(json) => check_json_value(db, json),
        RowValues::Int(_)
        | RowValues::Float(_)
        | RowValues::Bool(_)
        | RowValues::Timestamp(_)
        | RowValues::Blob(_)
        | RowValues::Null => Ok(()),
        RowValues::Expression(expr) => Err(SqlMiddlewareDbError::injection(
            InjectionStage::Value,
            format!("raw SQL expression {:?} cannot be bound as a value", expr.as_str()),
        )),
    }
}

/// Validate one LIKE pattern, bound or literal.
///
/// # Errors
///
/// Returns `InjectionDetected` (LIKE stage) for suspicious tokens or more than five `%`.
pub fn check_like_value(pattern: &str) -> Result<(), SqlMiddlewareDbError> {
    check_string_value(pattern).map_err(|err| {
        SqlMiddlewareDbError::injection(InjectionStage::LikePattern, err.to_string())
    })?;
    let wildcards = pattern.matches('%').count();
    if wildcards > MAX_LIKE_WILDCARDS {
        return Err(SqlMiddlewareDbError::injection(
            InjectionStage::LikePattern,
            format!("too many wildcards in LIKE pattern ({wildcards} > {MAX_LIKE_WILDCARDS})"),
        ));
    }
    Ok(())
}

/// Validate every literal LIKE / ILIKE pattern in a statement.
///
/// # Errors
///
/// See [`check_like_value`].
pub fn check_like_pattern(query: &str) -> Result<(), SqlMiddlewareDbError> {
    let lower = query.to_ascii_lowercase();
    for found in LIKE_KEYWORD.find_iter(&lower) {
        let rest = &query[found.end()..];
        let Some(open) = rest.find('\'') else {
            continue;
        };
        let after_open = &rest[open + 1..];
        let Some(close) = after_open.find('\'') else {
            continue;
        };
        check_like_value(&after_open[..close])?;
    }
    Ok(())
}

fn unquote_order_field(field: &str) -> String {
    field.chars().filter(|c| !matches!(c, '"' | '[' | ']' | '`')).collect()
}

/// Validate an ORDER BY list (`field [ASC|DESC] [NULLS FIRST|LAST], ...`).
///
/// # Errors
///
/// Returns `InjectionDetected` (ORDER BY stage) for empty items, invalid field names,
/// unknown directions or malformed NULLS placement.
pub fn check_order_by(db: DatabaseType, order_by: &str) -> Result<(), SqlMiddlewareDbError> {
    let fail = |detail: String| SqlMiddlewareDbError::injection(InjectionStage::OrderBy, detail);
    for item in order_by.split(',') {
        let item = item.trim();
        if item.is_empty() {
            return Err(fail("empty ORDER BY item".to_string()));
        }
        if item.eq_ignore_ascii_case("(select null)") {
            continue;
        }
        let tokens: Vec<&str> = item.split_whitespace().collect();
        check_identifier(db, &unquote_order_field(tokens[0]))
            .map_err(|err| fail(format!("invalid ORDER BY field: {err}")))?;
        let mut rest = &tokens[1..];
        if let Some(direction) = rest.first()
            && !direction.eq_ignore_ascii_case("nulls")
        {
            if !(direction.eq_ignore_ascii_case("asc") || direction.eq_ignore_ascii_case("desc")) {
                return Err(fail(format!("invalid ORDER BY direction {direction:?}")));
            }
            rest = &rest[1..];
        }
        match rest {
            [] => {}
            [nulls, placement]
                if nulls.eq_ignore_ascii_case("nulls")
                    && (placement.eq_ignore_ascii_case("first")
                        || placement.eq_ignore_ascii_case("last")) => {}
            _ => return Err(fail(format!("invalid ORDER BY item {item:?}"))),
        }
    }
    Ok(())
}

/// Slice out the ORDER BY lists in a statement, each ending at the pagination/locking tail
/// or at the parenthesis closing the enclosing subquery.
fn order_by_clauses(query: &str) -> Vec<&str> {
    let lower = query.to_ascii_lowercase();
    let mut clauses = Vec::new();
    for found in ORDER_BY_KEYWORD.find_iter(&lower) {
        let start = found.end();
        let mut depth = 0usize;
        let mut end = query.len();
        for (offset, ch) in lower[start..].char_indices() {
            let pos = start + offset;
            match ch {
                '(' => depth += 1,
                ')' if depth == 0 => {
                    end = pos;
                    break;
                }
                ')' => depth -= 1,
                c if depth == 0 && c.is_whitespace() => {
                    let tail = lower[pos..].trim_start();
                    if ["offset ", "limit ", "fetch ", "for "]
                        .iter()
                        .any(|kw| tail.starts_with(kw))
                    {
                        end = pos;
                        break;
                    }
                }
                _ => {}
            }
        }
        clauses.push(query[start..end].trim());
    }
    clauses
}

/// Reject empty statements, multi-statement text and known attack patterns.
///
/// # Errors
///
/// Returns `InjectionDetected` (query stage).
pub fn check_base_query(query: &str) -> Result<(), SqlMiddlewareDbError> {
    if query.trim().is_empty() {
        return Err(SqlMiddlewareDbError::injection(
            InjectionStage::Query,
            "query cannot be empty",
        ));
    }
    if query.contains(';') {
        return Err(SqlMiddlewareDbError::injection(
            InjectionStage::Query,
            "multiple statements are not allowed",
        ));
    }
    if let Some(pattern) = first_suspicious_match(query) {
        return Err(SqlMiddlewareDbError::injection(
            InjectionStage::Query,
            format!("query matches suspicious pattern {pattern}"),
        ));
    }
    Ok(())
}

/// Run every check on a statement and its arguments, in order: statement text, values,
/// LIKE literals, ORDER BY lists.
///
/// # Errors
///
/// Returns the first `InjectionDetected` error found. With [`InjectionPolicy::AllowRisk`]
/// nothing is checked.
pub fn check_all(
    db: DatabaseType,
    query: &str,
    args: &NamedArgs,
    policy: InjectionPolicy,
) -> Result<(), SqlMiddlewareDbError> {
    if policy == InjectionPolicy::AllowRisk {
        tracing::warn!(dialect = %db, "injection checks bypassed for trusted statement");
        return Ok(());
    }
    check_base_query(query)?;
    for (name, value) in args {
        check_value(db, value).map_err(|err| match err {
            SqlMiddlewareDbError::InjectionDetected { stage, detail } => {
                SqlMiddlewareDbError::InjectionDetected {
                    stage,
                    detail: format!("argument {name:?}: {detail}"),
                }
            }
            other => other,
        })?;
    }
    let lower = query.to_ascii_lowercase();
    if lower.contains("like") {
        check_like_pattern(query)?;
    }
    if ORDER_BY_KEYWORD.is_match(&lower) {
        for clause in order_by_clauses(query) {
            check_order_by(db, clause)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(pairs: &[(&str, RowValues)]) -> NamedArgs {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn identifier_rules() {
        let pg = DatabaseType::Postgres;
        assert!(check_identifier(pg, "users").is_ok());
        assert!(check_identifier(pg, "app.users.id").is_ok());
        assert!(check_identifier(pg, "users'; DROP TABLE users; --").is_err());
        assert!(check_identifier(pg, "").is_err());
        assert!(check_identifier(pg, "app..users").is_err());
        assert!(check_identifier(pg, "1users").is_err());
        assert!(check_identifier(pg, "drop").is_err());
        assert!(check_identifier(pg, &"a".repeat(63)).is_ok());
        assert!(check_identifier(pg, &"a".repeat(64)).is_err());
        assert!(check_identifier(DatabaseType::MariaDb, &"a".repeat(64)).is_ok());
        assert!(check_identifier(DatabaseType::Mssql, &"a".repeat(128)).is_ok());
        assert!(check_identifier(DatabaseType::Oracle, &"a".repeat(129)).is_err());
    }

    #[test]
    fn value_rules() {
        let pg = DatabaseType::Postgres;
        assert!(check_value(pg, &RowValues::Text("alice".into())).is_ok());
        assert!(check_value(pg, &RowValues::Text("a; drop".into())).is_err());
        assert!(check_value(pg, &RowValues::Text("x -- y".into())).is_err());
        assert!(check_value(pg, &RowValues::Int(7)).is_ok());
        assert!(check_value(pg, &RowValues::Blob(b";--".to_vec())).is_ok());
        let nested = serde_json::json!({"name": "ok", "tags": ["a", "b"], "inner": {"k": 1}});
        assert!(check_value(pg, &RowValues::JSON(nested)).is_ok());
        let bad_key = serde_json::json!({"bad key": 1});
        assert!(check_value(pg, &RowValues::JSON(bad_key)).is_err());
        let bad_nested = serde_json::json!({"k": ["fine", "no;pe"]});
        assert!(check_value(pg, &RowValues::JSON(bad_nested)).is_err());
    }

    #[test]
    fn like_wildcard_limit() {
        assert!(check_like_pattern("SELECT * FROM t WHERE a LIKE '%a%b%c%d%'").is_ok());
        let err = check_like_pattern("SELECT * FROM t WHERE a LIKE '%a%b%c%d%e%'").unwrap_err();
        assert_eq!(err.code(), "SQL_INJECTION_DETECTED:LIKE_PATTERN_VALIDATION_FAILED");
        assert!(check_like_value("%%%%%").is_ok());
        assert!(check_like_value("%%%%%%").is_err());
    }

    #[test]
    fn order_by_rules() {
        let pg = DatabaseType::Postgres;
        assert!(check_order_by(pg, "name ASC, \"created_at\" DESC NULLS LAST").is_ok());
        assert!(check_order_by(pg, "u.id nulls first").is_ok());
        assert!(check_order_by(pg, "(SELECT NULL)").is_ok());
        assert!(check_order_by(pg, "name sideways").is_err());
        assert!(check_order_by(pg, "name ASC NULLS MIDDLE").is_err());
        assert!(check_order_by(pg, "name,").is_err());
        assert!(check_order_by(pg, "LOWER(name)").is_err());
    }

    #[test]
    fn order_by_clause_extraction() {
        let clauses = order_by_clauses(
            "SELECT * FROM (SELECT a FROM t ORDER BY a) x ORDER BY (SELECT NULL) OFFSET 0 ROWS",
        );
        assert_eq!(clauses, vec!["a", "(SELECT NULL)"]);
    }

    #[test]
    fn check_all_accepts_and_rejects() {
        let pg = DatabaseType::Postgres;
        let ok_args = args(&[("id", RowValues::Int(1))]);
        assert!(
            check_all(pg, "SELECT * FROM users WHERE id = :id", &ok_args, InjectionPolicy::Enforce)
                .is_ok()
        );
        let err = check_all(
            pg,
            "SELECT * FROM users; DROP TABLE users",
            &NamedArgs::new(),
            InjectionPolicy::Enforce,
        )
        .unwrap_err();
        assert_eq!(err.code(), "SQL_INJECTION_DETECTED:QUERY_VALIDATION_FAILED");

        let bad_args = args(&[("name", RowValues::Text("x'; --".into()))]);
        let err = check_all(
            pg,
            "SELECT * FROM users WHERE name = :name",
            &bad_args,
            InjectionPolicy::Enforce,
        )
        .unwrap_err();
        assert_eq!(err.code(), "SQL_INJECTION_DETECTED:VALUE_VALIDATION_FAILED");

        let err = check_all(
            pg,
            "SELECT * FROM users ORDER BY name sideways",
            &NamedArgs::new(),
            InjectionPolicy::Enforce,
        )
        .unwrap_err();
        assert_eq!(err.code(), "SQL_INJECTION_DETECTED:ORDER_BY_VALIDATION_FAILED");
    }

    #[test]
    fn allow_risk_is_per_call() {
        let pg = DatabaseType::Postgres;
        let script = "CREATE TABLE t (id INT); DROP TABLE t";
        assert!(check_all(pg, script, &NamedArgs::new(), InjectionPolicy::AllowRisk).is_ok());
        assert!(check_all(pg, script, &NamedArgs::new(), InjectionPolicy::Enforce).is_err());
    }

    #[test]
    fn operators() {
        assert!(check_operator(DatabaseType::Postgres, "ilike").is_ok());
        assert!(check_operator(DatabaseType::Oracle, "ilike").is_err());
    }
}
