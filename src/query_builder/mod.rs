//! Dialect-aware SQL builders.
//!
//! Builders accumulate into an internal `Result`: the first failing call records its error,
//! every later call is a no-op, and `build()` returns that error. Chains can therefore be
//! written unconditionally and checked once.
//!
//! ```rust
//! use sql_dialect_middleware::prelude::*;
//!
//! let built = SelectQuery::new(DatabaseType::Postgres)
//!     .from("users")
//!     .fields(&["id", "name"])
//!     .where_eq("status", "active")
//!     .order_by("name", OrderDirection::Asc)
//!     .limit(10)
//!     .build()?;
//! assert_eq!(
//!     built.sql,
//!     "SELECT \"id\", \"name\" FROM \"users\" WHERE \"status\" = :w_status ORDER BY \"name\" ASC LIMIT 10"
//! );
//! # Ok::<(), SqlMiddlewareDbError>(())
//! ```

mod conditions;
mod count;
mod dml;
mod select;

pub use conditions::ConditionGroup;
pub use count::CountQuery;
pub use dml::{DeleteQuery, InsertQuery, UpdateQuery};
pub use select::{JoinType, NullPlacement, OrderDirection, SelectQuery};

use serde_json::Value as JsonValue;

use crate::error::SqlMiddlewareDbError;
use crate::injection::{check_identifier, check_operator};
use crate::query::QueryAndParams;
use crate::translation::to_positional;
use crate::types::{DatabaseType, NamedArgs, RowValues};

/// A rendered statement: `:name` template plus the arguments it references.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltQuery {
    pub db: DatabaseType,
    pub sql: String,
    pub args: NamedArgs,
    /// Table or view the statement targets, used in "must exist" errors.
    pub source: String,
}

impl BuiltQuery {
    /// Translate into the dialect's positional form.
    ///
    /// # Errors
    /// Returns `ParameterNotFound` if the template references an argument that was never set.
    pub fn bind(&self) -> Result<QueryAndParams, SqlMiddlewareDbError> {
        to_positional(self.db, &self.sql, &self.args)
    }
}

/// Turn `base` into a parameter name not yet present in `args`.
pub(crate) fn allocate_param(args: &NamedArgs, base: &str) -> String {
    let base: String = base
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if !args.contains_key(&base) {
        return base;
    }
    let mut n = 2;
    loop {
        let candidate = format!("{base}_{n}");
        if !args.contains_key(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

/// Scalar JSON list elements become plain values; nested ones stay JSON.
fn list_item(item: JsonValue) -> RowValues {
    match item {
        JsonValue::Null => RowValues::Null,
        JsonValue::Bool(b) => RowValues::Bool(b),
        JsonValue::String(s) => RowValues::Text(s),
        JsonValue::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => RowValues::Int(i),
            (None, Some(f)) => RowValues::Float(f),
            (None, None) => RowValues::Text(n.to_string()),
        },
        other => RowValues::JSON(other),
    }
}

/// Validate an identifier, mapping any failure onto a builder error code.
pub(crate) fn valid_identifier(
    db: DatabaseType,
    name: &str,
    code: &'static str,
) -> Result<(), SqlMiddlewareDbError> {
    check_identifier(db, name).map_err(|err| SqlMiddlewareDbError::builder(code, err.to_string()))
}

/// AND-joined WHERE predicates with their arguments.
#[derive(Debug, Clone, Default)]
pub(crate) struct Filter {
    pub(crate) conditions: Vec<String>,
    pub(crate) args: NamedArgs,
}

impl Filter {
    /// `field <op> :param`, or an inline expression / `IS NULL` where no binding applies.
    ///
    /// `is null` / `is not null` ignore the value. `in` / `not in` take a JSON array, bound
    /// one parameter per element, or a parenthesised expression such as a subquery.
    pub(crate) fn compare(
        &mut self,
        db: DatabaseType,
        field: &str,
        op: &str,
        value: RowValues,
        param_base: &str,
    ) -> Result<(), SqlMiddlewareDbError> {
        valid_identifier(db, field, "INVALID_WHERE_FIELD_NAME")?;
        check_operator(db, op)?;
        let quoted = db.quote_field(field);
        let op = op.split_whitespace().collect::<Vec<_>>().join(" ").to_uppercase();
        let condition = match (op.as_str(), value) {
            ("IS NULL" | "IS NOT NULL", _) => format!("{quoted} {op}"),
            ("IN" | "NOT IN", value) => match self.in_list(&quoted, &op, value, param_base)? {
                Some(condition) => condition,
                None => return Ok(()),
            },
            ("=", RowValues::Null) => format!("{quoted} IS NULL"),
            ("!=", RowValues::Null) => format!("{quoted} IS NOT NULL"),
            (_, RowValues::Expression(expr)) => format!("{quoted} {op} {expr}"),
            (_, value) => {
                let param = allocate_param(&self.args, param_base);
                let condition = format!("{quoted} {op} :{param}");
                self.args.insert(param, value);
                condition
            }
        };
        self.conditions.push(condition);
        Ok(())
    }

    /// `None` for `NOT IN` over an empty list, which filters nothing; an empty `IN` matches
    /// no row.
    fn in_list(
        &mut self,
        quoted: &str,
        op: &str,
        value: RowValues,
        param_base: &str,
    ) -> Result<Option<String>, SqlMiddlewareDbError> {
        let items = match value {
            RowValues::Expression(expr) if expr.as_str().trim_start().starts_with('(') => {
                return Ok(Some(format!("{quoted} {op} {expr}")));
            }
            RowValues::Expression(expr) => return Ok(Some(format!("{quoted} {op} ({expr})"))),
            RowValues::JSON(JsonValue::Array(items)) => items,
            other => {
                return Err(SqlMiddlewareDbError::builder(
                    "INVALID_OPERATOR",
                    format!("{op} needs a list, got {}", other.type_name()),
                ));
            }
        };
        if items.is_empty() {
            return Ok((op == "IN").then(|| "1 <> 1".to_string()));
        }
        let mut placeholders = Vec::with_capacity(items.len());
        for item in items {
            let param = allocate_param(&self.args, param_base);
            placeholders.push(format!(":{param}"));
            self.args.insert(param, list_item(item));
        }
        Ok(Some(format!("{quoted} {op} ({})", placeholders.join(", "))))
    }

    pub(crate) fn raw(&mut self, expr: &str) {
        let expr = expr.trim();
        if !expr.is_empty() {
            self.conditions.push(expr.to_string());
        }
    }

    pub(crate) fn merge(&mut self, group: ConditionGroup) -> Result<(), SqlMiddlewareDbError> {
        let (conditions, args) = group.into_parts()?;
        for (name, value) in args {
            if self.args.contains_key(&name) {
                return Err(SqlMiddlewareDbError::builder(
                    "DUPLICATE_PARAMETER_NAME",
                    format!("parameter {name:?} is already bound"),
                ));
            }
            self.args.insert(name, value);
        }
        self.conditions.extend(conditions);
        Ok(())
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// ` WHERE a AND b`, or nothing.
    pub(crate) fn render(&self) -> String {
        if self.conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.conditions.join(" AND "))
        }
    }
}

/// Columns named in RETURNING / OUTPUT, with an optional `INSERTED.` / `DELETED.` prefix.
pub(crate) fn returning_field(
    db: DatabaseType,
    field: &str,
    default_prefix: &str,
) -> Result<String, SqlMiddlewareDbError> {
    let (prefix, name) = match field.split_once('.') {
        Some((prefix, name)) => {
            let upper = prefix.to_uppercase();
            if upper != "INSERTED" && upper != "DELETED" {
                return Err(SqlMiddlewareDbError::builder(
                    "INVALID_OUTPUT_PREFIX",
                    format!("{prefix:?} is not INSERTED or DELETED"),
                ));
            }
            (upper, name)
        }
        None => (default_prefix.to_string(), field),
    };
    valid_identifier(db, name, "INVALID_RETURNING_FIELD_NAME")?;
    Ok(match db.returning_style() {
        crate::dialect::ReturningStyle::Output => format!("{prefix}.{}", db.quote_identifier(name)),
        crate::dialect::ReturningStyle::Returning => db.quote_identifier(name),
    })
}
