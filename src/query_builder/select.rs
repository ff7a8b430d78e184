use crate::error::SqlMiddlewareDbError;
use crate::types::{DatabaseType, NamedArgs, RowValues};

use super::{BuiltQuery, ConditionGroup, Filter, allocate_param, valid_identifier};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDirection {
    Asc,
    Desc,
}

impl OrderDirection {
    /// Parse `asc` / `desc` (any case), e.g. from a request parameter.
    ///
    /// # Errors
    /// Returns `INVALID_ORDER_BY_DIRECTION` for anything else.
    pub fn parse(value: &str) -> Result<Self, SqlMiddlewareDbError> {
        match value.trim().to_lowercase().as_str() {
            "asc" => Ok(OrderDirection::Asc),
            "desc" => Ok(OrderDirection::Desc),
            other => Err(SqlMiddlewareDbError::builder(
                "INVALID_ORDER_BY_DIRECTION",
                format!("{other:?}"),
            )),
        }
    }

    fn as_sql(self) -> &'static str {
        match self {
            OrderDirection::Asc => "ASC",
            OrderDirection::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullPlacement {
    First,
    Last,
}

impl NullPlacement {
    /// Parse `first` / `last`; an empty string means no explicit placement.
    ///
    /// # Errors
    /// Returns `INVALID_ORDER_BY_NULL_PLACEMENT` for anything else.
    pub fn parse(value: &str) -> Result<Option<Self>, SqlMiddlewareDbError> {
        match value.trim().to_lowercase().as_str() {
            "" => Ok(None),
            "first" => Ok(Some(NullPlacement::First)),
            "last" => Ok(Some(NullPlacement::Last)),
            other => Err(SqlMiddlewareDbError::builder(
                "INVALID_ORDER_BY_NULL_PLACEMENT",
                format!("{other:?}"),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
}

impl JoinType {
    fn as_sql(self) -> &'static str {
        match self {
            JoinType::Inner => "INNER",
            JoinType::Left => "LEFT",
            JoinType::Right => "RIGHT",
            JoinType::Full => "FULL",
        }
    }
}

const HAVING_OPERATORS: &[&str] = &["=", "<>", "!=", ">", "<", ">=", "<="];

#[derive(Debug, Clone)]
struct SelectState {
    db: DatabaseType,
    source: Option<String>,
    source_name: String,
    fields: Vec<String>,
    distinct: bool,
    ctes: Vec<String>,
    joins: Vec<String>,
    filter: Filter,
    group_by: Vec<String>,
    having: Vec<String>,
    order_by: Vec<String>,
    limit: Option<u64>,
    offset: Option<u64>,
    for_update: bool,
}

/// Builder for `SELECT` statements.
#[derive(Debug)]
pub struct SelectQuery {
    state: Result<SelectState, SqlMiddlewareDbError>,
}

/// `AS` for table aliases; Oracle rejects the keyword there.
fn table_alias(db: DatabaseType, alias: &str) -> String {
    if db == DatabaseType::Oracle {
        format!(" {}", db.quote_identifier(alias))
    } else {
        format!(" AS {}", db.quote_identifier(alias))
    }
}

impl SelectQuery {
    #[must_use]
    pub fn new(db: DatabaseType) -> Self {
        Self {
            state: Ok(SelectState {
                db,
                source: None,
                source_name: String::new(),
                fields: Vec::new(),
                distinct: false,
                ctes: Vec::new(),
                joins: Vec::new(),
                filter: Filter::default(),
                group_by: Vec::new(),
                having: Vec::new(),
                order_by: Vec::new(),
                limit: None,
                offset: None,
                for_update: false,
            }),
        }
    }

    fn apply<F>(mut self, f: F) -> Self
    where
        F: FnOnce(&mut SelectState) -> Result<(), SqlMiddlewareDbError>,
    {
        if let Ok(state) = &mut self.state
            && let Err(err) = f(state)
        {
            self.state = Err(err);
        }
        self
    }

    #[must_use]
    pub fn from(self, table: &str) -> Self {
        self.apply(|s| {
            if table.is_empty() {
                return Err(SqlMiddlewareDbError::builder(
                    "QUERY_BUILDER_SOURCE_NAME_NOT_SET",
                    "source table or view is empty",
                ));
            }
            valid_identifier(s.db, table, "INVALID_SOURCE_NAME")?;
            s.source = Some(s.db.quote_field(table));
            s.source_name = table.to_string();
            Ok(())
        })
    }

    #[must_use]
    pub fn from_alias(self, table: &str, alias: &str) -> Self {
        self.from(table).apply(|s| {
            valid_identifier(s.db, alias, "INVALID_SOURCE_NAME")?;
            if let Some(source) = &mut s.source {
                source.push_str(&table_alias(s.db, alias));
            }
            Ok(())
        })
    }

    /// Projection list; `*` and `alias.*` are accepted. Defaults to `*`.
    #[must_use]
    pub fn fields<S: AsRef<str>>(self, fields: &[S]) -> Self {
        self.apply(|s| {
            for field in fields {
                let field = field.as_ref();
                if field == "*" {
                    s.fields.push("*".to_string());
                    continue;
                }
                let name = field.strip_suffix(".*").unwrap_or(field);
                valid_identifier(s.db, name, "INVALID_SELECT_FIELD_NAME")?;
                s.fields.push(s.db.quote_field(field));
            }
            Ok(())
        })
    }

    /// `field AS alias`
    #[must_use]
    pub fn field_as(self, field: &str, alias: &str) -> Self {
        self.apply(|s| {
            valid_identifier(s.db, field, "INVALID_SELECT_FIELD_NAME")?;
            valid_identifier(s.db, alias, "INVALID_SELECT_FIELD_NAME")?;
            s.fields.push(format!(
                "{} AS {}",
                s.db.quote_field(field),
                s.db.quote_identifier(alias)
            ));
            Ok(())
        })
    }

    /// Raw projection expression such as `COUNT(*) AS total`. Program-controlled SQL only.
    #[must_use]
    pub fn field_raw(self, expr: &str) -> Self {
        self.apply(|s| {
            s.fields.push(expr.to_string());
            Ok(())
        })
    }

    #[must_use]
    pub fn distinct(self) -> Self {
        self.apply(|s| {
            s.distinct = true;
            Ok(())
        })
    }

    /// `WITH "name" ("c1", ...) AS (<query>)`; the query's arguments are carried along.
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

    /// `<type> JOIN "table" [AS "alias"] ON left = right`
    #[must_use]
    pub fn join(
        self,
        join_type: JoinType,
        table: &str,
        alias: Option<&str>,
        left: &str,
        right: &str,
    ) -> Self {
        self.apply(|s| {
            valid_identifier(s.db, table, "INVALID_JOIN_TABLE_NAME")?;
            let mut clause = format!("{} JOIN {}", join_type.as_sql(), s.db.quote_field(table));
            if let Some(alias) = alias {
                valid_identifier(s.db, alias, "INVALID_JOIN_TABLE_NAME")?;
                clause.push_str(&table_alias(s.db, alias));
            }
            valid_identifier(s.db, left, "INVALID_JOIN_CONDITION")?;
            valid_identifier(s.db, right, "INVALID_JOIN_CONDITION")?;
            clause.push_str(&format!(
                " ON {} = {}",
                s.db.quote_field(left),
                s.db.quote_field(right)
            ));
            s.joins.push(clause);
            Ok(())
        })
    }

    #[must_use]
    pub fn left_join(self, table: &str, alias: Option<&str>, left: &str, right: &str) -> Self {
        self.join(JoinType::Left, table, alias, left, right)
    }

    #[must_use]
    pub fn right_join(self, table: &str, alias: Option<&str>, left: &str, right: &str) -> Self {
        self.join(JoinType::Right, table, alias, left, right)
    }

    #[must_use]
    pub fn full_join(self, table: &str, alias: Option<&str>, left: &str, right: &str) -> Self {
        self.join(JoinType::Full, table, alias, left, right)
    }

    /// `field = :w_field`; a NULL value renders `IS NULL`.
    #[must_use]
    pub fn where_eq(self, field: &str, value: impl Into<RowValues>) -> Self {
        self.where_op(field, "=", value)
    }

    #[must_use]
    pub fn where_op(self, field: &str, op: &str, value: impl Into<RowValues>) -> Self {
        let value = value.into();
        self.apply(|s| s.filter.compare(s.db, field, op, value, &format!("w_{field}")))
    }

    /// Raw predicate. Program-controlled SQL only.
    #[must_use]
    pub fn and_raw(self, expr: &str) -> Self {
        self.apply(|s| {
            s.filter.raw(expr);
            Ok(())
        })
    }

    /// Raw predicate with its own arguments.
    #[must_use]
    pub fn and_raw_with_args(self, expr: &str, args: NamedArgs) -> Self {
        self.apply(|s| {
            merge_args(&mut s.filter.args, args)?;
            s.filter.raw(expr);
            Ok(())
        })
    }

    #[must_use]
    pub fn conditions(self, group: ConditionGroup) -> Self {
        self.apply(|s| s.filter.merge(group))
    }

    /// `((g1) OR (g2) ...)`: each group's conditions AND-joined, the groups OR-ed.
    /// Empty groups are skipped; give each group its own prefix.
    #[must_use]
    pub fn or_groups(self, groups: Vec<ConditionGroup>) -> Self {
        self.apply(|s| {
            let mut alternatives = Vec::new();
            for group in groups {
                let (conditions, args) = group.into_parts()?;
                if conditions.is_empty() {
                    continue;
                }
                merge_args(&mut s.filter.args, args)?;
                alternatives.push(format!("({})", conditions.join(" AND ")));
            }
            if !alternatives.is_empty() {
                s.filter.raw(&format!("({})", alternatives.join(" OR ")));
            }
            Ok(())
        })
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

    /// `HAVING <expr> <op> :having_n`, e.g. `having("COUNT(*)", ">", 1)`.
    #[must_use]
    pub fn having(self, expr: &str, op: &str, value: impl Into<RowValues>) -> Self {
        let value = value.into();
        self.apply(|s| {
            if expr.trim().is_empty() {
                return Err(SqlMiddlewareDbError::builder(
                    "HAVING_EXPRESSION_CANNOT_BE_EMPTY",
                    "HAVING needs an expression",
                ));
            }
            let op = op.trim();
            if !HAVING_OPERATORS.contains(&op) {
                return Err(SqlMiddlewareDbError::builder(
                    "INVALID_HAVING_OPERATOR",
                    format!("{op:?}"),
                ));
            }
            let param = allocate_param(&s.filter.args, &format!("having_{}", s.having.len() + 1));
            s.having.push(format!("{} {op} :{param}", expr.trim()));
            s.filter.args.insert(param, value);
            Ok(())
        })
    }

    #[must_use]
    pub fn order_by(self, field: &str, direction: OrderDirection) -> Self {
        self.order_by_nulls(field, direction, None)
    }

    /// NULL placement is rendered on PostgreSQL and Oracle; SQL Server and MariaDB have no
    /// `NULLS FIRST|LAST` and use their native NULL ordering.
    #[must_use]
    pub fn order_by_nulls(
        self,
        field: &str,
        direction: OrderDirection,
        nulls: Option<NullPlacement>,
    ) -> Self {
        self.apply(|s| {
            valid_identifier(s.db, field, "INVALID_ORDER_BY_FIELD")?;
            let mut item = format!("{} {}", s.db.quote_field(field), direction.as_sql());
            match (s.db, nulls) {
                (DatabaseType::Postgres | DatabaseType::Oracle, Some(NullPlacement::First)) => {
                    item.push_str(" NULLS FIRST");
                }
                (DatabaseType::Postgres | DatabaseType::Oracle, Some(NullPlacement::Last)) => {
                    item.push_str(" NULLS LAST");
                }
                (_, Some(placement)) => {
                    tracing::debug!(dialect = %s.db, ?placement, "null placement not supported, ignored");
                }
                (_, None) => {}
            }
            s.order_by.push(item);
            Ok(())
        })
    }

    /// Ordering from untyped input (`"desc"`, `"last"`).
    #[must_use]
    pub fn order_by_str(self, field: &str, direction: &str, nulls: &str) -> Self {
        let parsed = OrderDirection::parse(direction)
            .and_then(|dir| NullPlacement::parse(nulls).map(|n| (dir, n)));
        match parsed {
            Ok((dir, nulls)) => self.order_by_nulls(field, dir, nulls),
            Err(err) => self.apply(|_| Err(err)),
        }
    }

    /// Raw ORDER BY item. Statements using it must run with injection checks relaxed.
    #[must_use]
    pub fn order_by_raw(self, expr: &str) -> Self {
        self.apply(|s| {
            if expr.trim().is_empty() {
                return Err(SqlMiddlewareDbError::builder(
                    "INVALID_ORDER_BY_FIELD",
                    "empty ORDER BY expression",
                ));
            }
            s.order_by.push(expr.trim().to_string());
            Ok(())
        })
    }

    #[must_use]
    pub fn limit(self, limit: u64) -> Self {
        self.apply(|s| {
            s.limit = Some(limit);
            Ok(())
        })
    }

    #[must_use]
    pub fn offset(self, offset: u64) -> Self {
        self.apply(|s| {
            s.offset = Some(offset);
            Ok(())
        })
    }

    #[must_use]
    pub fn for_update(self) -> Self {
        self.apply(|s| {
            s.for_update = true;
            Ok(())
        })
    }

    /// Render the statement.
    ///
    /// # Errors
    /// Returns the first error recorded by any builder call, or
    /// `QUERY_BUILDER_SOURCE_NAME_NOT_SET` when no source was given.
    pub fn build(self) -> Result<BuiltQuery, SqlMiddlewareDbError> {
        let s = self.state?;
        let Some(source) = s.source.as_deref() else {
            return Err(SqlMiddlewareDbError::builder(
                "QUERY_BUILDER_SOURCE_NAME_NOT_SET",
                "call from() before build()",
            ));
        };
        let db = s.db;
        let mut sql = String::new();
        if !s.ctes.is_empty() {
            sql.push_str(&format!("WITH {} ", s.ctes.join(", ")));
        }
        sql.push_str("SELECT ");
        if s.distinct {
            sql.push_str("DISTINCT ");
        }
        let has_order_by = !s.order_by.is_empty();
        if db.uses_top(s.limit, s.offset, has_order_by)
            && let Some(limit) = s.limit
        {
            sql.push_str(&format!("TOP {limit} "));
        }
        if s.fields.is_empty() {
            sql.push('*');
        } else {
            sql.push_str(&s.fields.join(", "));
        }
        sql.push_str(" FROM ");
        sql.push_str(source);
        if s.for_update && db == DatabaseType::Mssql {
            sql.push_str(" WITH (UPDLOCK, ROWLOCK)");
        }
        for join in &s.joins {
            sql.push(' ');
            sql.push_str(join);
        }
        sql.push_str(&s.filter.render());
        if !s.group_by.is_empty() {
            sql.push_str(&format!(" GROUP BY {}", s.group_by.join(", ")));
        }
        if !s.having.is_empty() {
            sql.push_str(&format!(" HAVING {}", s.having.join(" AND ")));
        }
        if has_order_by {
            sql.push_str(&format!(" ORDER BY {}", s.order_by.join(", ")));
        }
        let pagination = db.pagination_clause(s.limit, s.offset, has_order_by);
        if !pagination.is_empty() {
            sql.push(' ');
            sql.push_str(&pagination);
        }
        if s.for_update && db != DatabaseType::Mssql {
            sql.push_str(" FOR UPDATE");
        }
        Ok(BuiltQuery {
            db,
            sql,
            args: s.filter.args,
            source: s.source_name,
        })
    }
}

pub(crate) fn merge_args(into: &mut NamedArgs, args: NamedArgs) -> Result<(), SqlMiddlewareDbError> {
    for (name, value) in args {
        if into.contains_key(&name) {
            return Err(SqlMiddlewareDbError::builder(
                "DUPLICATE_PARAMETER_NAME",
                format!("parameter {name:?} is already bound"),
            ));
        }
        into.insert(name, value);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_select_on_postgres() {
        let active = SelectQuery::new(DatabaseType::Postgres)
            .from("orders")
            .fields(&["customer_id"])
            .where_eq("status", "paid")
            .build()
            .unwrap();
        let built = SelectQuery::new(DatabaseType::Postgres)
            .with_cte("paid", &["customer_id"], active)
            .from_alias("customers", "c")
            .fields(&["c.id", "c.name"])
            .join(JoinType::Inner, "paid", Some("p"), "p.customer_id", "c.id")
            .where_eq("c.region", "EU")
            .group_by(&["c.id", "c.name"])
            .having("COUNT(*)", ">", 2)
            .order_by_nulls("c.name", OrderDirection::Desc, Some(NullPlacement::Last))
            .limit(10)
            .offset(20)
            .for_update()
            .build()
            .unwrap();
        assert_eq!(
            built.sql,
            "WITH \"paid\" (\"customer_id\") AS (SELECT \"customer_id\" FROM \"orders\" WHERE \"status\" = :w_status) \
             SELECT \"c\".\"id\", \"c\".\"name\" FROM \"customers\" AS \"c\" \
             INNER JOIN \"paid\" AS \"p\" ON \"p\".\"customer_id\" = \"c\".\"id\" \
             WHERE \"c\".\"region\" = :w_c_region GROUP BY \"c\".\"id\", \"c\".\"name\" \
             HAVING COUNT(*) > :having_1 ORDER BY \"c\".\"name\" DESC NULLS LAST \
             LIMIT 10 OFFSET 20 FOR UPDATE"
        );
        assert_eq!(built.args.len(), 3);
        assert_eq!(built.source, "customers");
    }

    #[test]
    fn mssql_pagination_and_top() {
        let paged = SelectQuery::new(DatabaseType::Mssql)
            .from("users")
            .limit(5)
            .offset(10)
            .build()
            .unwrap();
        assert_eq!(
            paged.sql,
            "SELECT * FROM [users] ORDER BY (SELECT NULL) OFFSET 10 ROWS FETCH NEXT 5 ROWS ONLY"
        );
        let top = SelectQuery::new(DatabaseType::Mssql)
            .from("users")
            .limit(1)
            .build()
            .unwrap();
        assert_eq!(top.sql, "SELECT TOP 1 * FROM [users]");
    }

    #[test]
    fn oracle_aliases_have_no_as() {
        let built = SelectQuery::new(DatabaseType::Oracle)
            .from_alias("users", "u")
            .fields(&["u.*"])
            .order_by("u.id", OrderDirection::Asc)
            .limit(3)
            .build()
            .unwrap();
        assert_eq!(
            built.sql,
            "SELECT \"u\".* FROM \"users\" \"u\" ORDER BY \"u\".\"id\" ASC FETCH NEXT 3 ROWS ONLY"
        );
    }

    #[test]
    fn first_error_is_kept() {
        let err = SelectQuery::new(DatabaseType::Postgres)
            .from("users")
            .group_by(&["bad field"])
            .having("", "=", 1)
            .order_by_str("name", "sideways", "")
            .build()
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_GROUP_BY_FIELD");
    }

    #[test]
    fn builder_error_codes() {
        let code = |q: SelectQuery| q.build().unwrap_err().code();
        let pg = DatabaseType::Postgres;
        assert_eq!(code(SelectQuery::new(pg)), "QUERY_BUILDER_SOURCE_NAME_NOT_SET");
        assert_eq!(
            code(SelectQuery::new(pg).from("t").join(JoinType::Left, "x;y", None, "a", "b")),
            "INVALID_JOIN_TABLE_NAME"
        );
        assert_eq!(code(SelectQuery::new(pg).from("t").having("COUNT(*)", "~", 1)), "INVALID_HAVING_OPERATOR");
        assert_eq!(code(SelectQuery::new(pg).from("t").having(" ", "=", 1)), "HAVING_EXPRESSION_CANNOT_BE_EMPTY");
        assert_eq!(code(SelectQuery::new(pg).from("t").order_by_str("a", "up", "")), "INVALID_ORDER_BY_DIRECTION");
        assert_eq!(code(SelectQuery::new(pg).from("t").order_by_str("a", "asc", "middle")), "INVALID_ORDER_BY_NULL_PLACEMENT");
        assert_eq!(code(SelectQuery::new(pg).from("t").order_by("1a", OrderDirection::Asc)), "INVALID_ORDER_BY_FIELD");
        let empty_cte = BuiltQuery {
            db: pg,
            sql: String::new(),
            args: NamedArgs::new(),
            source: String::new(),
        };
        assert_eq!(code(SelectQuery::new(pg).from("t").with_cte::<&str>("c", &[], empty_cte)), "CTE_SELECT_SQL_CANNOT_BE_EMPTY");
    }

    #[test]
    fn or_groups_are_parenthesised() {
        let a = ConditionGroup::new(DatabaseType::Postgres, "a").eq("kind", "x").eq("level", 1);
        let b = ConditionGroup::new(DatabaseType::Postgres, "b").in_int64("id", &[4, 5]);
        let empty = ConditionGroup::new(DatabaseType::Postgres, "c");
        let built = SelectQuery::new(DatabaseType::Postgres)
            .from("items")
            .where_eq("active", true)
            .or_groups(vec![a, b, empty])
            .right_join("owners", Some("o"), "o.id", "items.owner_id")
            .build()
            .unwrap();
        assert_eq!(
            built.sql,
            "SELECT * FROM \"items\" RIGHT JOIN \"owners\" AS \"o\" ON \"o\".\"id\" = \"items\".\"owner_id\" \
             WHERE \"active\" = :w_active AND ((\"kind\" = :a_eq_1 AND \"level\" = :a_eq_2) OR (\"id\" IN (4, 5)))"
        );
        assert_eq!(built.args.len(), 3);
    }

    #[test]
    fn same_field_twice_gets_distinct_params() {
        let built = SelectQuery::new(DatabaseType::MariaDb)
            .from("events")
            .where_op("at", ">=", 1)
            .where_op("at", "<", 5)
            .build()
            .unwrap();
        assert_eq!(
            built.sql,
            "SELECT * FROM `events` WHERE `at` >= :w_at AND `at` < :w_at_2"
        );
        let bound = built.bind().unwrap();
        assert_eq!(bound.query, "SELECT * FROM `events` WHERE `at` >= ? AND `at` < ?");
        assert_eq!(bound.params, vec![RowValues::Int(1), RowValues::Int(5)]);
    }

    #[test]
    fn null_and_list_operators_render_valid_sql() {
        let built = SelectQuery::new(DatabaseType::Postgres)
            .from("t")
            .where_op("a", "is null", RowValues::Null)
            .where_op("b", "in", RowValues::JSON(serde_json::json!([1, 2])))
            .build()
            .unwrap();
        assert_eq!(
            built.sql,
            "SELECT * FROM \"t\" WHERE \"a\" IS NULL AND \"b\" IN (:w_b, :w_b_2)"
        );
        let bound = built.bind().unwrap();
        assert_eq!(bound.query, "SELECT * FROM \"t\" WHERE \"a\" IS NULL AND \"b\" IN ($1, $2)");

        let err = SelectQuery::new(DatabaseType::Postgres)
            .from("t")
            .where_op("a", "in", 1)
            .build()
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_OPERATOR");
    }
}
