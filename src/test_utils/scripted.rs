use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::dialect::IsolationLevel;
use crate::driver::{DriverClient, DriverConnector, DriverTransaction};
use crate::error::SqlMiddlewareDbError;
use crate::query::QueryAndParams;
use crate::results::ResultSet;
use crate::types::DatabaseType;

#[derive(Default)]
struct Script {
    connect_failures: usize,
    ping_failures: usize,
    statement_failures: VecDeque<SqlMiddlewareDbError>,
    commit_failure: Option<SqlMiddlewareDbError>,
    rollback_failure: Option<SqlMiddlewareDbError>,
    results: VecDeque<ResultSet>,
    affected: VecDeque<usize>,
    events: Vec<String>,
    statements: Vec<QueryAndParams>,
}

struct Shared {
    dialect: DatabaseType,
    connect_attempts: AtomicUsize,
    script: Mutex<Script>,
}

impl Shared {
    fn script(&self) -> MutexGuard<'_, Script> {
        match self.script.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn next_failure(&self) -> Option<SqlMiddlewareDbError> {
        self.script().statement_failures.pop_front()
    }

    fn select(&self, label: &str, query: &QueryAndParams) -> Result<ResultSet, SqlMiddlewareDbError> {
        let mut script = self.script();
        script.events.push(format!("{label}:{}", query.query));
        script.statements.push(query.clone());
        if let Some(err) = script.statement_failures.pop_front() {
            return Err(err);
        }
        Ok(script.results.pop_front().unwrap_or_default())
    }

    fn dml(&self, label: &str, query: &QueryAndParams) -> Result<usize, SqlMiddlewareDbError> {
        let mut script = self.script();
        script.events.push(format!("{label}:{}", query.query));
        script.statements.push(query.clone());
        if let Some(err) = script.statement_failures.pop_front() {
            return Err(err);
        }
        Ok(script.affected.pop_front().unwrap_or(1))
    }

    fn batch(&self, label: &str, sql: &str) -> Result<(), SqlMiddlewareDbError> {
        let mut script = self.script();
        script.events.push(format!("{label}:{sql}"));
        match script.statement_failures.pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Scripted connector: queue failures and results, then inspect what ran.
///
/// Clones share the same script, so a test can keep one handle for inspection while the
/// connection owns another.
#[derive(Clone)]
pub struct ScriptedDriver {
    shared: Arc<Shared>,
}

impl ScriptedDriver {
    #[must_use]
    pub fn new(dialect: DatabaseType) -> Self {
        Self {
            shared: Arc::new(Shared {
                dialect,
                connect_attempts: AtomicUsize::new(0),
                script: Mutex::new(Script::default()),
            }),
        }
    }

    /// The next `n` connect calls fail with a connection error.
    #[must_use]
    pub fn fail_connects(self, n: usize) -> Self {
        self.shared.script().connect_failures = n;
        self
    }

    /// The next `n` pings fail with a connection error.
    #[must_use]
    pub fn fail_pings(self, n: usize) -> Self {
        self.shared.script().ping_failures = n;
        self
    }

    /// Queue an error for the next statement (select, DML or batch).
    pub fn fail_next(&self, err: SqlMiddlewareDbError) {
        self.shared.script().statement_failures.push_back(err);
    }

    pub fn fail_commit(&self, err: SqlMiddlewareDbError) {
        self.shared.script().commit_failure = Some(err);
    }

    pub fn fail_rollback(&self, err: SqlMiddlewareDbError) {
        self.shared.script().rollback_failure = Some(err);
    }

    /// Queue the rows returned by the next select.
    pub fn push_result(&self, rows: ResultSet) {
        self.shared.script().results.push_back(rows);
    }

    /// Queue the affected-row count of the next DML statement (default 1).
    pub fn push_affected(&self, rows: usize) {
        self.shared.script().affected.push_back(rows);
    }

    #[must_use]
    pub fn connect_attempts(&self) -> usize {
        self.shared.connect_attempts.load(Ordering::SeqCst)
    }

    /// Everything that reached the driver, e.g. `select:SELECT ...`, `begin:SERIALIZABLE`,
    /// `commit`.
    #[must_use]
    pub fn events(&self) -> Vec<String> {
        self.shared.script().events.clone()
    }

    /// Translated statements with their positional parameters, in execution order.
    #[must_use]
    pub fn statements(&self) -> Vec<QueryAndParams> {
        self.shared.script().statements.clone()
    }
}

#[async_trait]
impl DriverConnector for ScriptedDriver {
    fn dialect(&self) -> DatabaseType {
        self.shared.dialect
    }

    async fn connect(&self) -> Result<Arc<dyn DriverClient>, SqlMiddlewareDbError> {
        self.shared.connect_attempts.fetch_add(1, Ordering::SeqCst);
        {
            let mut script = self.shared.script();
            script.events.push("connect".to_string());
            if script.connect_failures > 0 {
                script.connect_failures -= 1;
                return Err(super::connection_error("scripted connect failure"));
            }
        }
        Ok(Arc::new(ScriptedClient {
            shared: Arc::clone(&self.shared),
        }))
    }
}

pub struct ScriptedClient {
    shared: Arc<Shared>,
}

#[async_trait]
impl DriverClient for ScriptedClient {
    async fn execute_select(&self, query: &QueryAndParams) -> Result<ResultSet, SqlMiddlewareDbError> {
        self.shared.select("select", query)
    }

    async fn execute_dml(&self, query: &QueryAndParams) -> Result<usize, SqlMiddlewareDbError> {
        self.shared.dml("dml", query)
    }

    async fn execute_batch(&self, sql: &str) -> Result<(), SqlMiddlewareDbError> {
        self.shared.batch("batch", sql)
    }

    async fn ping(&self) -> Result<(), SqlMiddlewareDbError> {
        let mut script = self.shared.script();
        script.events.push("ping".to_string());
        if script.ping_failures > 0 {
            script.ping_failures -= 1;
            return Err(super::connection_error("scripted ping failure"));
        }
        Ok(())
    }

    async fn begin(
        &self,
        isolation: IsolationLevel,
    ) -> Result<Box<dyn DriverTransaction>, SqlMiddlewareDbError> {
        self.shared.script().events.push(format!("begin:{isolation}"));
        if let Some(err) = self.shared.next_failure() {
            return Err(err);
        }
        Ok(Box::new(ScriptedTransaction {
            shared: Arc::clone(&self.shared),
        }))
    }

    async fn close(&self) {
        self.shared.script().events.push("close".to_string());
    }
}

struct ScriptedTransaction {
    shared: Arc<Shared>,
}

#[async_trait]
impl DriverTransaction for ScriptedTransaction {
    async fn execute_select(
        &mut self,
        query: &QueryAndParams,
    ) -> Result<ResultSet, SqlMiddlewareDbError> {
        self.shared.select("tx.select", query)
    }

    async fn execute_dml(&mut self, query: &QueryAndParams) -> Result<usize, SqlMiddlewareDbError> {
        self.shared.dml("tx.dml", query)
    }

    async fn execute_batch(&mut self, sql: &str) -> Result<(), SqlMiddlewareDbError> {
        self.shared.batch("tx.batch", sql)
    }

    async fn commit(&mut self) -> Result<(), SqlMiddlewareDbError> {
        let mut script = self.shared.script();
        script.events.push("commit".to_string());
        match script.commit_failure.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn rollback(&mut self) -> Result<(), SqlMiddlewareDbError> {
        let mut script = self.shared.script();
        script.events.push("rollback".to_string());
        match script.rollback_failure.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
