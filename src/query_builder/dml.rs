use crate::dialect::ReturningStyle;
use crate::error::SqlMiddlewareDbError;
use crate::types::{DatabaseType, NamedArgs, RowValues};

use super::select::merge_args;
use super::{
    BuiltQuery, ConditionGroup, Filter, SelectQuery, allocate_param, returning_field,
    valid_identifier,
};

#[derive(Debug, Clone)]
struct DmlState {
    db: DatabaseType,
    table: Option<String>,
    table_name: String,
    /// `(quoted column, rendered value)`: a `:param` or an inline expression.
    set: Vec<(String, String)>,
    set_fields: Vec<String>,
    /// WHERE predicates; its argument map also holds the SET arguments so names never clash.
    filter: Filter,
    returning: Vec<String>,
    returning_fields: Vec<String>,
}

impl DmlState {
    fn new(db: DatabaseType) -> Self {
        Self {
            db,
            table: None,
            table_name: String::new(),
            set: Vec::new(),
            set_fields: Vec::new(),
            filter: Filter::default(),
            returning: Vec::new(),
            returning_fields: Vec::new(),
        }
    }

    fn table(&mut self, table: &str) -> Result<(), SqlMiddlewareDbError> {
        if table.is_empty() {
            return Err(SqlMiddlewareDbError::builder(
                "QUERY_BUILDER_SOURCE_NAME_NOT_SET",
                "target table is empty",
            ));
        }
        valid_identifier(self.db, table, "INVALID_SOURCE_NAME")?;
        self.table = Some(self.db.quote_field(table));
        self.table_name = table.to_string();
        Ok(())
    }

    fn set(
        &mut self,
        field: &str,
        value: RowValues,
        code: &'static str,
    ) -> Result<(), SqlMiddlewareDbError> {
        valid_identifier(self.db, field, code)?;
        let rendered = match value {
            RowValues::Expression(expr) => expr.as_str().to_string(),
            value => {
                let param = allocate_param(&self.filter.args, field);
                let rendered = format!(":{param}");
                self.filter.args.insert(param, value);
                rendered
            }
        };
        self.set.push((self.db.quote_field(field), rendered));
        self.set_fields.push(field.to_string());
        Ok(())
    }

    fn set_expr(
        &mut self,
        field: &str,
        expr: &str,
        args: NamedArgs,
        code: &'static str,
    ) -> Result<(), SqlMiddlewareDbError> {
        valid_identifier(self.db, field, code)?;
        merge_args(&mut self.filter.args, args)?;
        self.set.push((self.db.quote_field(field), expr.to_string()));
        self.set_fields.push(field.to_string());
        Ok(())
    }

    fn returning(&mut self, fields: &[&str], default_prefix: &str) -> Result<(), SqlMiddlewareDbError> {
        for &field in fields {
            self.returning.push(returning_field(self.db, field, default_prefix)?);
            let bare = field.rsplit('.').next().unwrap_or(field);
            self.returning_fields.push(bare.to_string());
        }
        Ok(())
    }

    fn require_table(&self) -> Result<&str, SqlMiddlewareDbError> {
        self.table.as_deref().ok_or_else(|| {
            SqlMiddlewareDbError::builder(
                "QUERY_BUILDER_SOURCE_NAME_NOT_SET",
                "no target table given",
            )
        })
    }

    fn output_clause(&self) -> String {
        if self.returning.is_empty() || self.db.returning_style() != ReturningStyle::Output {
            String::new()
        } else {
            format!(" OUTPUT {}", self.returning.join(", "))
        }
    }

    fn returning_clause(&self) -> String {
        if self.returning.is_empty() || self.db.returning_style() != ReturningStyle::Returning {
            String::new()
        } else {
            format!(" RETURNING {}", self.returning.join(", "))
        }
    }

    fn into_args(self) -> NamedArgs {
        self.filter.args
    }
}

macro_rules! dml_builder {
    ($name:ident) => {
        impl $name {
            #[must_use]
            pub fn new(db: DatabaseType) -> Self {
                Self {
                    state: Ok(DmlState::new(db)),
                }
            }

            /// Whether the built statement hands rows back (RETURNING or OUTPUT).
            #[must_use]
            pub fn returns_rows(&self) -> bool {
                self.state.as_ref().is_ok_and(|s| !s.returning.is_empty())
            }

            fn apply<F>(mut self, f: F) -> Self
            where
                F: FnOnce(&mut DmlState) -> Result<(), SqlMiddlewareDbError>,
            {
                if let Ok(state) = &mut self.state
                    && let Err(err) = f(state)
                {
                    self.state = Err(err);
                }
                self
            }
        }
    };
}

macro_rules! where_methods {
    ($name:ident) => {
        impl $name {
            /// `field = :w_field`; a NULL value renders `IS NULL`.
            #[must_use]
            pub fn where_eq(self, field: &str, value: impl Into<RowValues>) -> Self {
                self.where_op(field, "=", value)
            }

            #[must_use]
            pub fn where_op(self, field: &str, op: &str, value: impl Into<RowValues>) -> Self {
                let value = value.into();
                self.apply(|s| {
                    s.filter
                        .compare(s.db, field, op, value, &format!("w_{field}"))
                })
            }

            /// Raw predicate. Program-controlled SQL only.
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
        }
    };
}

/// Builder for `INSERT` statements.
#[derive(Debug)]
pub struct InsertQuery {
    state: Result<DmlState, SqlMiddlewareDbError>,
}

dml_builder!(InsertQuery);

impl InsertQuery {
    #[must_use]
    pub fn into(self, table: &str) -> Self {
        self.apply(|s| s.table(table))
    }

    /// Column value; [`RowValues::Expression`] is rendered inline instead of bound.
    #[must_use]
    pub fn set(self, field: &str, value: impl Into<RowValues>) -> Self {
        let value = value.into();
        self.apply(|s| s.set(field, value, "INVALID_INSERT_FIELD_NAME"))
    }

    #[must_use]
    pub fn set_all<I, K>(self, values: I) -> Self
    where
        I: IntoIterator<Item = (K, RowValues)>,
        K: AsRef<str>,
    {
        values
            .into_iter()
            .fold(self, |query, (field, value)| query.set(field.as_ref(), value))
    }

    /// Column set to an expression over its own named arguments, e.g. an encryption call
    /// wrapping a bound value. Program-controlled SQL only.
    #[must_use]
    pub fn set_expr(self, field: &str, expr: &str, args: NamedArgs) -> Self {
        self.apply(|s| s.set_expr(field, expr, args, "INVALID_INSERT_FIELD_NAME"))
    }

    /// Columns to hand back (`RETURNING` or SQL Server `OUTPUT INSERTED.`).
    #[must_use]
    pub fn returning(self, fields: &[&str]) -> Self {
        self.apply(|s| s.returning(fields, "INSERTED"))
    }

    /// # Errors
    /// Returns the first recorded builder error, `QUERY_BUILDER_SOURCE_NAME_NOT_SET`, or
    /// `NO_FIELDS_TO_INSERT`.
    pub fn build(self) -> Result<BuiltQuery, SqlMiddlewareDbError> {
        let s = self.state?;
        let table = s.require_table()?.to_string();
        if s.set.is_empty() {
            return Err(SqlMiddlewareDbError::builder(
                "NO_FIELDS_TO_INSERT",
                format!("nothing to insert into {}", s.table_name),
            ));
        }
        let columns: Vec<&str> = s.set.iter().map(|(c, _)| c.as_str()).collect();
        let values: Vec<&str> = s.set.iter().map(|(_, v)| v.as_str()).collect();
        let sql = format!(
            "INSERT INTO {table} ({}){} VALUES ({}){}",
            columns.join(", "),
            s.output_clause(),
            values.join(", "),
            s.returning_clause()
        );
        let db = s.db;
        let source = s.table_name.clone();
        Ok(BuiltQuery {
            db,
            sql,
            args: s.into_args(),
            source,
        })
    }
}

/// Builder for `UPDATE` statements.
#[derive(Debug)]
pub struct UpdateQuery {
    state: Result<DmlState, SqlMiddlewareDbError>,
}

dml_builder!(UpdateQuery);
where_methods!(UpdateQuery);

impl UpdateQuery {
    #[must_use]
    pub fn table(self, table: &str) -> Self {
        self.apply(|s| s.table(table))
    }

    #[must_use]
    pub fn set(self, field: &str, value: impl Into<RowValues>) -> Self {
        let value = value.into();
        self.apply(|s| s.set(field, value, "INVALID_UPDATE_FIELD_NAME"))
    }

    #[must_use]
    pub fn set_all<I, K>(self, values: I) -> Self
    where
        I: IntoIterator<Item = (K, RowValues)>,
        K: AsRef<str>,
    {
        values
            .into_iter()
            .fold(self, |query, (field, value)| query.set(field.as_ref(), value))
    }

    /// Column set to an expression over its own named arguments, e.g. an encryption call
    /// wrapping a bound value. Program-controlled SQL only.
    #[must_use]
    pub fn set_expr(self, field: &str, expr: &str, args: NamedArgs) -> Self {
        self.apply(|s| s.set_expr(field, expr, args, "INVALID_UPDATE_FIELD_NAME"))
    }

    #[must_use]
    pub fn returning(self, fields: &[&str]) -> Self {
        self.apply(|s| s.returning(fields, "INSERTED"))
    }

    /// MariaDB has no `UPDATE ... RETURNING`; there the returned columns are read back with a
    /// SELECT over the same conditions, run after the update inside the same transaction.
    #[must_use]
    pub fn needs_returning_select(&self) -> bool {
        self.state.as_ref().is_ok_and(|s| {
            s.db == DatabaseType::MariaDb && !s.returning_fields.is_empty()
        })
    }

    /// The read-back SELECT used on MariaDB. The conditions are re-evaluated after the update,
    /// so columns that were both SET and filtered on see their new values.
    ///
    /// # Errors
    /// Returns the first recorded builder error.
    pub fn returning_select(&self) -> Result<BuiltQuery, SqlMiddlewareDbError> {
        let s = self.state.as_ref().map_err(clone_builder_error)?;
        let mut built = SelectQuery::new(s.db)
            .from(&s.table_name)
            .fields(&s.returning_fields)
            .build()?;
        let filter = s.filter.render();
        built.sql.push_str(&filter);
        built.args = s.filter.args.clone();
        Ok(built)
    }

    /// # Errors
    /// Returns the first recorded builder error, `QUERY_BUILDER_SOURCE_NAME_NOT_SET`, or
    /// `NO_FIELDS_TO_UPDATE`.
    pub fn build(self) -> Result<BuiltQuery, SqlMiddlewareDbError> {
        let s = self.state?;
        let table = s.require_table()?.to_string();
        if s.set.is_empty() {
            return Err(SqlMiddlewareDbError::builder(
                "NO_FIELDS_TO_UPDATE",
                format!("nothing to update in {}", s.table_name),
            ));
        }
        if s.filter.is_empty() {
            tracing::warn!(table = %s.table_name, "UPDATE without WHERE conditions");
        }
        let assignments: Vec<String> = s.set.iter().map(|(c, v)| format!("{c} = {v}")).collect();
        let returning = if s.db == DatabaseType::MariaDb {
            String::new()
        } else {
            s.returning_clause()
        };
        let sql = format!(
            "UPDATE {table} SET {}{}{}{}",
            assignments.join(", "),
            s.output_clause(),
            s.filter.render(),
            returning
        );
        let db = s.db;
        let source = s.table_name.clone();
        Ok(BuiltQuery {
            db,
            sql,
            args: s.into_args(),
            source,
        })
    }
}

/// Builder for `DELETE` statements.
#[derive(Debug)]
pub struct DeleteQuery {
    state: Result<DmlState, SqlMiddlewareDbError>,
}

dml_builder!(DeleteQuery);
where_methods!(DeleteQuery);

impl DeleteQuery {
    #[must_use]
    pub fn from(self, table: &str) -> Self {
        self.apply(|s| s.table(table))
    }

    /// Columns of the deleted rows (`RETURNING` or SQL Server `OUTPUT DELETED.`).
    #[must_use]
    pub fn returning(self, fields: &[&str]) -> Self {
        self.apply(|s| s.returning(fields, "DELETED"))
    }

    /// # Errors
    /// Returns the first recorded builder error or `QUERY_BUILDER_SOURCE_NAME_NOT_SET`.
    pub fn build(self) -> Result<BuiltQuery, SqlMiddlewareDbError> {
        let s = self.state?;
        let table = s.require_table()?.to_string();
        if s.filter.is_empty() {
            tracing::warn!(table = %s.table_name, "DELETE without WHERE conditions");
        }
        let sql = format!(
            "DELETE FROM {table}{}{}{}",
            s.output_clause(),
            s.filter.render(),
            s.returning_clause()
        );
        let db = s.db;
        let source = s.table_name.clone();
        Ok(BuiltQuery {
            db,
            sql,
            args: s.into_args(),
            source,
        })
    }
}

fn clone_builder_error(err: &SqlMiddlewareDbError) -> SqlMiddlewareDbError {
    match err {
        SqlMiddlewareDbError::BuilderError { code, detail } => SqlMiddlewareDbError::BuilderError {
            code,
            detail: detail.clone(),
        },
        other => SqlMiddlewareDbError::builder("QUERY_BUILDER_ERROR", other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SqlExpression;

    #[test]
    fn insert_with_returning_per_dialect() {
        let build = |db| {
            InsertQuery::new(db)
                .into("users")
                .set("name", "alice")
                .set("created_at", SqlExpression::new("CURRENT_TIMESTAMP"))
                .returning(&["id"])
                .build()
                .unwrap()
        };
        assert_eq!(
            build(DatabaseType::Postgres).sql,
            "INSERT INTO \"users\" (\"name\", \"created_at\") VALUES (:name, CURRENT_TIMESTAMP) RETURNING \"id\""
        );
        assert_eq!(
            build(DatabaseType::Mssql).sql,
            "INSERT INTO [users] ([name], [created_at]) OUTPUT INSERTED.[id] VALUES (:name, CURRENT_TIMESTAMP)"
        );
        let pg = build(DatabaseType::Postgres);
        assert_eq!(pg.args.len(), 1);
        assert_eq!(pg.bind().unwrap().query, "INSERT INTO \"users\" (\"name\", \"created_at\") VALUES ($1, CURRENT_TIMESTAMP) RETURNING \"id\"");
    }

    #[test]
    fn update_set_and_where_on_same_field() {
        let built = UpdateQuery::new(DatabaseType::Mssql)
            .table("users")
            .set("status", "archived")
            .where_eq("status", "active")
            .where_eq("id", 7)
            .returning(&["id"])
            .build()
            .unwrap();
        assert_eq!(
            built.sql,
            "UPDATE [users] SET [status] = :status OUTPUT INSERTED.[id] WHERE [status] = :w_status AND [id] = :w_id"
        );
        assert_eq!(built.args.get("status"), Some(&RowValues::Text("archived".into())));
        assert_eq!(built.args.get("w_status"), Some(&RowValues::Text("active".into())));
        let bound = built.bind().unwrap();
        assert_eq!(
            bound.query,
            "UPDATE [users] SET [status] = @p1 OUTPUT INSERTED.[id] WHERE [status] = @p2 AND [id] = @p3"
        );
    }

    #[test]
    fn set_and_where_names_never_clash() {
        let built = UpdateQuery::new(DatabaseType::Postgres)
            .table("t")
            .set("w_id", 1)
            .where_eq("id", 2)
            .build()
            .unwrap();
        assert_eq!(built.sql, "UPDATE \"t\" SET \"w_id\" = :w_id WHERE \"id\" = :w_id_2");
        assert_eq!(built.args.get("w_id"), Some(&RowValues::Int(1)));
        assert_eq!(built.args.get("w_id_2"), Some(&RowValues::Int(2)));

        let reversed = UpdateQuery::new(DatabaseType::Postgres)
            .table("t")
            .where_eq("id", 2)
            .set("w_id", 1)
            .build()
            .unwrap();
        assert_eq!(reversed.sql, "UPDATE \"t\" SET \"w_id\" = :w_id_2 WHERE \"id\" = :w_id");
        assert_eq!(reversed.bind().unwrap().params, vec![RowValues::Int(1), RowValues::Int(2)]);
    }

    #[test]
    fn mariadb_update_returning_reads_back() {
        let query = UpdateQuery::new(DatabaseType::MariaDb)
            .table("users")
            .set("name", "bob")
            .where_eq("id", 3)
            .returning(&["id", "name"]);
        assert!(query.needs_returning_select());
        let select = query.returning_select().unwrap();
        assert_eq!(select.sql, "SELECT `id`, `name` FROM `users` WHERE `id` = :w_id");
        let update = query.build().unwrap();
        assert_eq!(update.sql, "UPDATE `users` SET `name` = :name WHERE `id` = :w_id");
    }

    #[test]
    fn delete_output_before_where() {
        let built = DeleteQuery::new(DatabaseType::Mssql)
            .from("sessions")
            .where_op("expires_at", "<", SqlExpression::new("SYSDATETIME()"))
            .returning(&["id"])
            .build()
            .unwrap();
        assert_eq!(
            built.sql,
            "DELETE FROM [sessions] OUTPUT DELETED.[id] WHERE [expires_at] < SYSDATETIME()"
        );
        let oracle = DeleteQuery::new(DatabaseType::Oracle)
            .from("sessions")
            .where_eq("id", 1)
            .returning(&["id"])
            .build()
            .unwrap();
        assert_eq!(
            oracle.sql,
            "DELETE FROM \"sessions\" WHERE \"id\" = :w_id RETURNING \"id\""
        );
    }

    #[test]
    fn dml_error_codes() {
        let pg = DatabaseType::Postgres;
        assert_eq!(InsertQuery::new(pg).into("t").build().unwrap_err().code(), "NO_FIELDS_TO_INSERT");
        assert_eq!(UpdateQuery::new(pg).table("t").build().unwrap_err().code(), "NO_FIELDS_TO_UPDATE");
        assert_eq!(InsertQuery::new(pg).set("a", 1).build().unwrap_err().code(), "QUERY_BUILDER_SOURCE_NAME_NOT_SET");
        assert_eq!(InsertQuery::new(pg).into("t").set("a b", 1).build().unwrap_err().code(), "INVALID_INSERT_FIELD_NAME");
        assert_eq!(UpdateQuery::new(pg).table("t").set("a;", 1).build().unwrap_err().code(), "INVALID_UPDATE_FIELD_NAME");
        assert_eq!(
            DeleteQuery::new(pg).from("t").where_eq("x--", 1).build().unwrap_err().code(),
            "INVALID_WHERE_FIELD_NAME"
        );
        assert_eq!(
            DeleteQuery::new(DatabaseType::Mssql).from("t").returning(&["foo.id"]).build().unwrap_err().code(),
            "INVALID_OUTPUT_PREFIX"
        );
    }

    #[test]
    fn set_all_keeps_iteration_order() {
        let values = vec![
            ("a".to_string(), RowValues::Int(1)),
            ("b".to_string(), RowValues::Null),
        ];
        let built = InsertQuery::new(DatabaseType::Oracle)
            .into("t")
            .set_all(values)
            .build()
            .unwrap();
        assert_eq!(built.sql, "INSERT INTO \"t\" (\"a\", \"b\") VALUES (:a, :b)");
        assert_eq!(built.bind().unwrap().query, "INSERT INTO \"t\" (\"a\", \"b\") VALUES (:1, :2)");
    }
}
