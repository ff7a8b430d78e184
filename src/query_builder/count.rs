use crate::error::SqlMiddlewareDbError;
use crate::types::{DatabaseType, RowValues};

use super::select::merge_args;
use super::{BuiltQuery, ConditionGroup, Filter, valid_identifier};

const SUBQUERY_KEYWORDS: &[&str] = &[
    "select ", "with ", "union ", "from ", "join ", "where ", "group by ", "order by ",
];

/// Heuristic: does `source` look like a query rather than a table name?
#[must_use]
pub fn is_subquery(source: &str) -> bool {
    let normalized = source.trim().to_lowercase();
    if normalized.starts_with('(') && normalized.ends_with(')') {
        return true;
    }
    if SUBQUERY_KEYWORDS.iter().any(|kw| normalized.contains(kw)) {
        return true;
    }
    normalized.matches(' ').count() > 2 || normalized.contains('(')
}

fn subquery_alias(db: DatabaseType, n: usize) -> String {
    if db == DatabaseType::Oracle {
        format!("subquery__sq_{n}")
    } else {
        format!("AS subquery__sq_{n}")
    }
}

/// Strip one pair of parentheses when the opening one closes at the very end.
fn strip_enclosing_parens(sql: &str) -> &str {
    let Some(inner) = sql.strip_prefix('(').and_then(|s| s.strip_suffix(')')) else {
        return sql;
    };
    let mut depth = 0i32;
    for c in inner.chars() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 {
                    return sql;
                }
            }
            _ => {}
        }
    }
    if depth == 0 { inner } else { sql }
}

fn wrap_subquery(db: DatabaseType, sql: &str, n: usize) -> String {
    let inner = strip_enclosing_parens(sql.trim());
    format!("({inner}) {}", subquery_alias(db, n))
}

#[derive(Debug, Clone)]
struct CountState {
    db: DatabaseType,
    source: Option<String>,
    source_name: String,
    from_subquery: bool,
    expression: Option<String>,
    ctes: Vec<String>,
    joins: Vec<String>,
    filter: Filter,
    group_by: Vec<String>,
    /// Derived tables wrapped so far; numbers the `subquery__sq_<n>` aliases.
    subqueries: usize,
}

impl CountState {
    fn wrap(&mut self, sql: &str) -> String {
        self.subqueries += 1;
        wrap_subquery(self.db, sql, self.subqueries)
    }
}

/// Builder for `SELECT COUNT(*) AS count FROM ...`.
///
/// Sources that look like queries are wrapped as a derived table. With GROUP BY the grouped
/// query itself becomes the derived table, so the result is the number of groups.
#[derive(Debug)]
pub struct CountQuery {
    state: Result<CountState, SqlMiddlewareDbError>,
}

impl CountQuery {
    #[must_use]
    pub fn new(db: DatabaseType) -> Self {
        Self {
            state: Ok(CountState {
                db,
                source: None,
                source_name: String::new(),
                from_subquery: false,
                expression: None,
                ctes: Vec::new(),
                joins: Vec::new(),
                filter: Filter::default(),
                group_by: Vec::new(),
                subqueries: 0,
            }),
        }
    }

    fn apply<F>(mut self, f: F) -> Self
    where
        F: FnOnce(&mut CountState) -> Result<(), SqlMiddlewareDbError>,
    {
        if let Ok(state) = &mut self.state
            && let Err(err) = f(state)
        {
            self.state = Err(err);
        }
        self
    }

    /// Table, view, or a program-controlled subquery text.
    #[must_use]
    pub fn from(self, source: &str) -> Self {
        self.apply(|s| {
            if source.trim().is_empty() {
                return Err(SqlMiddlewareDbError::builder(
                    "QUERY_BUILDER_SOURCE_NAME_NOT_SET",
                    "count source is empty",
                ));
            }
            if is_subquery(source) {
                s.source = Some(s.wrap(source));
                s.source_name = "subquery".to_string();
                s.from_subquery = true;
            } else {
                valid_identifier(s.db, source, "INVALID_SOURCE_NAME")?;
                s.source = Some(s.db.quote_field(source));
                s.source_name = source.to_string();
            }
            Ok(())
        })
    }

    /// Count the rows of a built query; its arguments are carried along.
    #[must_use]
    pub fn from_query(self, query: BuiltQuery) -> Self {
        self.apply(|s| {
            merge_args(&mut s.filter.args, query.args)?;
            s.source = Some(s.wrap(&query.sql));
            s.source_name = query.source;
            s.from_subquery = true;
            Ok(())
        })
    }

    /// Replace `COUNT(*)`, e.g. `COUNT(DISTINCT user_id)`. Program-controlled SQL only.
    #[must_use]
    pub fn expression(self, expr: &str) -> Self {
        self.apply(|s| {
            s.expression = Some(expr.trim().to_string());
            Ok(())
        })
    }

    #[must_use]
    pub fn with_cte<S: AsRef<str>>(self, name: &str, columns: &[S], query: BuiltQuery) -> Self {
        self.apply(|s| {
            valid_identifier(s.db, name, "INVALID_CTE_NAME")?;
            if query.sql.trim().is_empty() {
                return Err(SqlMiddlewareDbError::builder(
                    "CTE_SELECT_SQL_CANNOT_BE_EMPTY",
                    format!("CTE {name:?} has no query"),
                ));
            }
            let mut head = s.db.quote_identifier(name);
            if !columns.is_empty() {
                let mut cols = Vec::with_capacity(columns.len());
                for column in columns {
                    valid_identifier(s.db, column.as_ref(), "INVALID_CTE_NAME")?;
                    cols.push(s.db.quote_identifier(column.as_ref()));
                }
                head.push_str(&format!(" ({})", cols.join(", ")));
            }
            merge_args(&mut s.filter.args, query.args)?;
            s.ctes.push(format!("{head} AS ({})", query.sql));
            Ok(())
        })
    }

    #[must_use]
    pub fn join(self, table: &str, left: &str, right: &str) -> Self {
        self.apply(|s| {
            valid_identifier(s.db, table, "INVALID_JOIN_TABLE_NAME")?;
            valid_identifier(s.db, left, "INVALID_JOIN_CONDITION")?;
            valid_identifier(s.db, right, "INVALID_JOIN_CONDITION")?;
            s.joins.push(format!(
                "INNER JOIN {} ON {} = {}",
                s.db.quote_field(table),
                s.db.quote_field(left),
                s.db.quote_field(right)
            ));
            Ok(())
        })
    }

    #[must_use]
    pub fn where_eq(self, field: &str, value: impl Into<RowValues>) -> Self {
        self.where_op(field, "=", value)
    }

    #[must_use]
    pub fn where_op(self, field: &str, op: &str, value: impl Into<RowValues>) -> Self {
        let value = value.into();
        self.apply(|s| s.filter.compare(s.db, field, op, value, &format!("w_{field}")))
    }

    #[must_use]
    pub fn and_raw(self, expr: &str) -> Self {
        self.apply(|s| {
            s.filter.raw(expr);
            Ok(())
        })
    }

    #[must_use]
    pub fn conditions(self, group: ConditionGroup) -> Self {
        self.apply(|s| s.filter.merge(group))
    }

    #[must_use]
    pub fn group_by<S: AsRef<str>>(self, fields: &[S]) -> Self {
        self.apply(|s| {
            for field in fields {
                valid_identifier(s.db, field.as_ref(), "INVALID_GROUP_BY_FIELD")?;
                s.group_by.push(s.db.quote_field(field.as_ref()));
            }
            Ok(())
        })
    }

    /// Render the statement; the single result column is named `count`.
    ///
    /// # Errors
    /// Returns the first recorded builder error, `QUERY_BUILDER_SOURCE_NAME_NOT_SET`, or
    /// `SUBQUERY_WITH_OUTER_WHERE` when conditions were added to a subquery source.
    pub fn build(self) -> Result<BuiltQuery, SqlMiddlewareDbError> {
        let mut s = self.state?;
        let Some(source) = s.source.clone() else {
            return Err(SqlMiddlewareDbError::builder(
                "QUERY_BUILDER_SOURCE_NAME_NOT_SET",
                "call from() before build()",
            ));
        };
        if s.from_subquery && !s.filter.is_empty() {
            return Err(SqlMiddlewareDbError::builder(
                "SUBQUERY_WITH_OUTER_WHERE",
                "cannot apply WHERE conditions to outer level of a subquery; include them in the subquery instead",
            ));
        }
        let db = s.db;
        let count_expr = s.expression.clone().unwrap_or_else(|| "COUNT(*)".to_string());
        let mut body = String::new();
        for join in &s.joins {
            body.push(' ');
            body.push_str(join);
        }
        body.push_str(&s.filter.render());

        let mut sql = String::new();
        if !s.ctes.is_empty() {
            sql.push_str(&format!("WITH {} ", s.ctes.join(", ")));
        }
        if s.group_by.is_empty() {
            sql.push_str(&format!("SELECT {count_expr} AS count FROM {source}{body}"));
        } else {
            let grouped = format!(
                "SELECT 1 AS grouped FROM {source}{body} GROUP BY {}",
                s.group_by.join(", ")
            );
            let wrapped = s.wrap(&grouped);
            sql.push_str(&format!("SELECT COUNT(*) AS count FROM {wrapped}"));
        }
        Ok(BuiltQuery {
            db,
            sql,
            args: s.filter.args,
            source: s.source_name,
        })
    }
}
