use crate::error::SqlMiddlewareDbError;
use crate::injection::{InjectionPolicy, check_all};
use crate::query::QueryAndParams;
use crate::results::{FieldTypeMapping, ResultSet, apply_field_types};
use crate::translation::to_positional;
use crate::types::{DatabaseType, NamedArgs, RowValues};

/// Validate a `:name` template and its arguments, then bind it positionally.
///
/// # Errors
/// Injection, translation or parameter errors; nothing reaches a driver on failure.
pub fn prepare(
    db: DatabaseType,
    sql: &str,
    args: &NamedArgs,
    policy: InjectionPolicy,
) -> Result<QueryAndParams, SqlMiddlewareDbError> {
    check_all(db, sql, args, policy)?;
    let mut bound = to_positional(db, sql, args)?;
    if matches!(db, DatabaseType::Oracle | DatabaseType::Mssql) {
        for param in &mut bound.params {
            if let RowValues::Bool(flag) = param {
                *param = RowValues::Int(i64::from(*flag));
            }
        }
    }
    tracing::debug!(dialect = %db, sql = %bound.query, params = bound.params.len(), "prepared");
    Ok(bound)
}

/// Normalise column names and apply the caller's type mapping.
pub(crate) fn finish_rows(
    db: DatabaseType,
    mut rows: ResultSet,
    field_types: Option<&FieldTypeMapping>,
) -> Result<ResultSet, SqlMiddlewareDbError> {
    rows.map_column_names(|name| db.deformat_identifier(name));
    if let Some(mapping) = field_types {
        apply_field_types(&mut rows, mapping)?;
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(pairs: &[(&str, RowValues)]) -> NamedArgs {
        pairs.iter().map(|(k, v)| ((*k).to_string(), v.clone())).collect()
    }

    #[test]
    fn bools_become_bits_where_needed() {
        let a = args(&[("active", RowValues::Bool(true))]);
        let sql = "SELECT id FROM users WHERE active = :active";
        let mssql = prepare(DatabaseType::Mssql, sql, &a, InjectionPolicy::Enforce).unwrap();
        assert_eq!(mssql.query, "SELECT id FROM users WHERE active = @p1");
        assert_eq!(mssql.params, vec![RowValues::Int(1)]);
        let pg = prepare(DatabaseType::Postgres, sql, &a, InjectionPolicy::Enforce).unwrap();
        assert_eq!(pg.params, vec![RowValues::Bool(true)]);
    }

    #[test]
    fn injection_is_checked_before_binding() {
        let a = args(&[("name", RowValues::Text("x'; DROP TABLE users; --".into()))]);
        let err = prepare(
            DatabaseType::Postgres,
            "SELECT * FROM users WHERE name = :name",
            &a,
            InjectionPolicy::Enforce,
        )
        .unwrap_err();
        assert_eq!(err.code(), "SQL_INJECTION_DETECTED:VALUE_VALIDATION_FAILED");
    }

    #[test]
    fn column_names_are_deformatted() {
        let rows = crate::test_utils::result_set(&["\"ID\"", "NAME"], vec![vec![RowValues::Int(1), RowValues::Text("a".into())]]);
        let rows = finish_rows(DatabaseType::Oracle, rows, None).unwrap();
        assert_eq!(rows.results[0].get("id"), Some(&RowValues::Int(1)));
        assert_eq!(rows.results[0].get("name"), Some(&RowValues::Text("a".into())));
    }
}
