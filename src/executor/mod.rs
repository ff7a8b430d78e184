//! Runs templates and builders against a connection or a transaction.
//!
//! Every statement passes the same pipeline: injection checks on the `:name` template and
//! its arguments, translation to the dialect's placeholders, execution, then column-name
//! normalisation and optional type coercion of the returned rows.

mod dispatch;
mod targets;

pub use dispatch::prepare;
pub use targets::QueryTarget;

use dispatch::finish_rows;

use crate::error::SqlMiddlewareDbError;
use crate::injection::InjectionPolicy;
use crate::query_builder::{
    BuiltQuery, CountQuery, DeleteQuery, InsertQuery, SelectQuery, UpdateQuery,
};
use crate::results::{CustomDbRow, FieldType, FieldTypeMapping, ResultSet, coerce_value};
use crate::types::{DatabaseType, NamedArgs, RowValues};

/// Per-call execution options.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    pub policy: InjectionPolicy,
    pub field_types: Option<FieldTypeMapping>,
}

impl QueryOptions {
    /// Skip the injection checks for this call. Program-assembled SQL only.
    #[must_use]
    pub fn trusted() -> Self {
        Self {
            policy: InjectionPolicy::AllowRisk,
            field_types: None,
        }
    }

    #[must_use]
    pub fn with_field_types(mut self, mapping: FieldTypeMapping) -> Self {
        self.field_types = Some(mapping);
        self
    }
}

/// Statement runner bound to one [`QueryTarget`].
///
/// ```rust,no_run
/// use sql_dialect_middleware::prelude::*;
///
/// # async fn demo(db: &DatabaseConnection) -> Result<(), SqlMiddlewareDbError> {
/// let mut exec = Executor::new(db);
/// let active = SelectQuery::new(db.dialect())
///     .from("users")
///     .where_eq("active", true);
/// let rows = exec.select(active, &QueryOptions::default()).await?;
/// # let _ = rows;
/// # Ok(())
/// # }
/// ```
pub struct Executor<'a> {
    target: QueryTarget<'a>,
}

impl<'a> Executor<'a> {
    #[must_use]
    pub fn new(target: impl Into<QueryTarget<'a>>) -> Self {
        Self {
            target: target.into(),
        }
    }

    #[must_use]
    pub fn dialect(&self) -> DatabaseType {
        self.target.dialect()
    }

    /// Run a row-returning `:name` template.
    ///
    /// # Errors
    /// Injection, translation, driver or coercion errors.
    pub async fn query(
        &mut self,
        sql: &str,
        args: &NamedArgs,
        options: &QueryOptions,
    ) -> Result<ResultSet, SqlMiddlewareDbError> {
        let db = self.dialect();
        let bound = prepare(db, sql, args, options.policy)?;
        let rows = self.target.select(&bound).await?;
        finish_rows(db, rows, options.field_types.as_ref())
    }

    /// Run a `:name` DML template and return the affected-row count.
    ///
    /// # Errors
    /// Injection, translation or driver errors.
    pub async fn exec(
        &mut self,
        sql: &str,
        args: &NamedArgs,
        options: &QueryOptions,
    ) -> Result<usize, SqlMiddlewareDbError> {
        let bound = prepare(self.dialect(), sql, args, options.policy)?;
        self.target.dml(&bound).await
    }

    async fn query_built(
        &mut self,
        built: &BuiltQuery,
        options: &QueryOptions,
    ) -> Result<ResultSet, SqlMiddlewareDbError> {
        self.query(&built.sql, &built.args, options).await
    }

    /// # Errors
    /// Builder errors plus everything [`Executor::query`] can return.
    pub async fn select(
        &mut self,
        query: SelectQuery,
        options: &QueryOptions,
    ) -> Result<ResultSet, SqlMiddlewareDbError> {
        let built = query.build()?;
        self.query_built(&built, options).await
    }

    /// First row, or `None`. The query is limited to one row.
    ///
    /// # Errors
    /// As [`Executor::select`].
    pub async fn select_one(
        &mut self,
        query: SelectQuery,
        options: &QueryOptions,
    ) -> Result<Option<CustomDbRow>, SqlMiddlewareDbError> {
        let rows = self.select(query.limit(1), options).await?;
        Ok(rows.results.into_iter().next())
    }

    /// Like [`Executor::select_one`], but a missing row is an error.
    ///
    /// # Errors
    /// `ROW_MUST_EXIST:<source>` when nothing matches.
    pub async fn should_select_one(
        &mut self,
        query: SelectQuery,
        options: &QueryOptions,
    ) -> Result<CustomDbRow, SqlMiddlewareDbError> {
        let built = query.limit(1).build()?;
        let rows = self.query_built(&built, options).await?;
        rows.results
            .into_iter()
            .next()
            .ok_or(SqlMiddlewareDbError::RowMustExist(built.source))
    }

    /// # Errors
    /// `ROWS_MUST_EXIST:<source>` when nothing matches.
    pub async fn should_select_many(
        &mut self,
        query: SelectQuery,
        options: &QueryOptions,
    ) -> Result<ResultSet, SqlMiddlewareDbError> {
        let built = query.build()?;
        let rows = self.query_built(&built, options).await?;
        if rows.is_empty() {
            return Err(SqlMiddlewareDbError::RowsMustExist(built.source));
        }
        Ok(rows)
    }

    /// # Errors
    /// Builder errors, driver errors, or `ParameterError` when the driver hands back a
    /// count that is not a number.
    pub async fn count(&mut self, query: CountQuery) -> Result<i64, SqlMiddlewareDbError> {
        let built = query.build()?;
        let rows = self.query_built(&built, &QueryOptions::default()).await?;
        let Some(value) = rows.results.first().and_then(|row| row.get_by_index(0)) else {
            return Ok(0);
        };
        match coerce_value("count", value.clone(), FieldType::Int64)? {
            RowValues::Int(n) => Ok(n),
            _ => Ok(0),
        }
    }

    /// Insert. With `returning` the returned rows come back; otherwise an empty set whose
    /// `rows_affected` is the driver's count.
    ///
    /// # Errors
    /// Builder, injection, translation or driver errors.
    pub async fn insert(&mut self, query: InsertQuery) -> Result<ResultSet, SqlMiddlewareDbError> {
        let returns_rows = query.returns_rows();
        let built = query.build()?;
        self.write(&built, returns_rows).await
    }

    /// Update. On MariaDB, requested columns are read back with a SELECT over the same
    /// conditions after the update; run it in a transaction to keep the pair atomic.
    ///
    /// # Errors
    /// Builder, injection, translation or driver errors.
    pub async fn update(&mut self, query: UpdateQuery) -> Result<ResultSet, SqlMiddlewareDbError> {
        if query.needs_returning_select() {
            let read_back = query.returning_select()?;
            let built = query.build()?;
            let affected = self.exec(&built.sql, &built.args, &QueryOptions::default()).await?;
            let mut rows = self.query_built(&read_back, &QueryOptions::default()).await?;
            rows.rows_affected = affected;
            return Ok(rows);
        }
        let returns_rows = query.returns_rows();
        let built = query.build()?;
        self.write(&built, returns_rows).await
    }

    /// # Errors
    /// Builder, injection, translation or driver errors.
    pub async fn delete(&mut self, query: DeleteQuery) -> Result<ResultSet, SqlMiddlewareDbError> {
        let returns_rows = query.returns_rows();
        let built = query.build()?;
        self.write(&built, returns_rows).await
    }

    async fn write(
        &mut self,
        built: &BuiltQuery,
        returns_rows: bool,
    ) -> Result<ResultSet, SqlMiddlewareDbError> {
        let outcome = if returns_rows {
            self.query_built(built, &QueryOptions::default()).await
        } else {
            self.exec(&built.sql, &built.args, &QueryOptions::default())
                .await
                .map(ResultSet::affected)
        };
        outcome.map_err(|err| err.into_duplicate_key(&built.source))
    }

    /// Run parameterless, program-supplied SQL (DDL, multi-statement scripts) without
    /// injection checks.
    ///
    /// # Errors
    /// The driver error.
    pub async fn execute_script(&mut self, sql: &str) -> Result<(), SqlMiddlewareDbError> {
        tracing::warn!(dialect = %self.dialect(), bytes = sql.len(), "executing trusted script");
        self.target.batch(sql).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::runtime::Runtime;

    use super::*;
    use crate::connection::DatabaseConnection;
    use crate::dialect::IsolationLevel;
    use crate::test_utils::{ScriptedDriver, connection_error, duplicate_key_error, result_set};

    fn connection(driver: &ScriptedDriver) -> DatabaseConnection {
        DatabaseConnection::new("main", Arc::new(driver.clone()))
    }

    #[test]
    fn select_binds_and_normalises_columns() {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let driver = ScriptedDriver::new(DatabaseType::Oracle);
            driver.push_result(result_set(&["ID", "NAME"], vec![vec![RowValues::Int(7), "ann".into()]]));
            let db = connection(&driver);
            let mut exec = Executor::new(&db);
            let rows = exec
                .select(
                    SelectQuery::new(DatabaseType::Oracle).from("users").where_eq("name", "ann"),
                    &QueryOptions::default(),
                )
                .await
                .unwrap();
            assert_eq!(rows.results[0].get("id"), Some(&RowValues::Int(7)));
            let ran = driver.statements();
            assert_eq!(ran[0].query, "SELECT * FROM \"users\" WHERE \"name\" = :1");
            assert_eq!(ran[0].params, vec![RowValues::Text("ann".into())]);
        });
    }

    #[test]
    fn should_select_one_reports_missing_row() {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let driver = ScriptedDriver::new(DatabaseType::Postgres);
            let db = connection(&driver);
            let err = Executor::new(&db)
                .should_select_one(
                    SelectQuery::new(DatabaseType::Postgres).from("orders").where_eq("id", 9),
                    &QueryOptions::default(),
                )
                .await
                .unwrap_err();
            assert_eq!(err.code(), "ROW_MUST_EXIST:orders");
        });
    }

    #[test]
    fn should_select_many_reports_missing_rows() {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let driver = ScriptedDriver::new(DatabaseType::MariaDb);
            let db = connection(&driver);
            let err = Executor::new(&db)
                .should_select_many(
                    SelectQuery::new(DatabaseType::MariaDb).from("orders"),
                    &QueryOptions::default(),
                )
                .await
                .unwrap_err();
            assert_eq!(err.code(), "ROWS_MUST_EXIST:orders");
        });
    }

    #[test]
    fn count_reads_first_column() {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let driver = ScriptedDriver::new(DatabaseType::Oracle);
            driver.push_result(result_set(&["COUNT"], vec![vec![RowValues::Float(12.0)]]));
            let db = connection(&driver);
            let n = Executor::new(&db)
                .count(CountQuery::new(DatabaseType::Oracle).from("users"))
                .await
                .unwrap();
            assert_eq!(n, 12);
        });
    }

    #[test]
    fn mariadb_update_reads_back_returning_columns() {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let driver = ScriptedDriver::new(DatabaseType::MariaDb);
            driver.push_affected(1);
            driver.push_result(result_set(&["id", "status"], vec![vec![RowValues::Int(3), "done".into()]]));
            let db = connection(&driver);
            let mut tx = db.begin_tx(IsolationLevel::Default).await.unwrap();
            let rows = Executor::new(&mut tx)
                .update(
                    UpdateQuery::new(DatabaseType::MariaDb)
                        .table("jobs")
                        .set("status", "done")
                        .where_eq("id", 3)
                        .returning(&["id", "status"]),
                )
                .await
                .unwrap();
            tx.commit().await.unwrap();
            assert_eq!(rows.rows_affected, 1);
            assert_eq!(rows.results[0].get("status"), Some(&RowValues::Text("done".into())));
            let events = driver.events();
            assert!(events[2].starts_with("tx.dml:UPDATE `jobs` SET `status` = ?"));
            assert!(events[3].starts_with("tx.select:SELECT `id`, `status` FROM `jobs` WHERE `id` = ?"));
        });
    }

    #[test]
    fn insert_without_returning_reports_affected_rows() {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let driver = ScriptedDriver::new(DatabaseType::Mssql);
            driver.push_affected(1);
            let db = connection(&driver);
            let rows = Executor::new(&db)
                .insert(InsertQuery::new(DatabaseType::Mssql).into("t").set("flag", true))
                .await
                .unwrap();
            assert_eq!(rows.rows_affected, 1);
            let ran = driver.statements();
            assert_eq!(ran[0].query, "INSERT INTO [t] ([flag]) VALUES (@p1)");
            assert_eq!(ran[0].params, vec![RowValues::Int(1)]);
        });
    }

    #[test]
    fn connection_errors_are_retried_but_injection_is_not() {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let driver = ScriptedDriver::new(DatabaseType::Postgres);
            driver.fail_next(connection_error("reset by peer"));
            let db = connection(&driver);
            let mut exec = Executor::new(&db);
            exec.query("SELECT 1", &NamedArgs::new(), &QueryOptions::default())
                .await
                .unwrap();
            let runs = driver.events().iter().filter(|e| *e == "select:SELECT 1").count();
            assert_eq!(runs, 2);

            let mut args = NamedArgs::new();
            args.insert("q".into(), RowValues::Text("1; DROP TABLE t".into()));
            let before = driver.statements().len();
            let err = exec
                .query("SELECT * FROM t WHERE a = :q", &args, &QueryOptions::default())
                .await
                .unwrap_err();
            assert!(err.code().starts_with("SQL_INJECTION_DETECTED"));
            assert_eq!(driver.statements().len(), before);
        });
    }

    #[test]
    fn trusted_scripts_skip_checks() {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let driver = ScriptedDriver::new(DatabaseType::Postgres);
            let db = connection(&driver);
            Executor::new(&db)
                .execute_script("CREATE TABLE t (id INT); CREATE INDEX t_id ON t (id);")
                .await
                .unwrap();
            assert!(driver.events().iter().any(|e| e.starts_with("batch:CREATE TABLE t")));
        });
    }

    #[test]
    fn unique_violation_on_insert_is_a_duplicate_key_error() {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let driver = ScriptedDriver::new(DatabaseType::Postgres);
            driver.fail_next(duplicate_key_error("duplicate key value violates unique constraint"));
            let db = connection(&driver);
            let err = Executor::new(&db)
                .insert(InsertQuery::new(DatabaseType::Postgres).into("users").set("email", "a@b.c"))
                .await
                .unwrap_err();
            assert!(matches!(err, SqlMiddlewareDbError::DuplicateKey(ref target) if target.starts_with("users: ")));
            assert_eq!(err.code(), "ERROR_DB_DUPLICATE_KEY");
            assert_eq!(driver.statements().len(), 1);
        });
    }
}
