//! Named databases built from configuration.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::StorageConfig;
use crate::connection::DatabaseConnection;
use crate::error::SqlMiddlewareDbError;

/// Owns every configured [`DatabaseConnection`], keyed by `nameid`.
///
/// Instances are passed around explicitly; there is no process-wide registry.
#[derive(Debug, Default)]
pub struct DatabaseRegistry {
    databases: BTreeMap<String, Arc<DatabaseConnection>>,
}

impl DatabaseRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a connection per configured database. Nothing connects yet.
    ///
    /// # Errors
    /// The first invalid database configuration.
    pub fn from_config(storage: &StorageConfig) -> Result<Self, SqlMiddlewareDbError> {
        let mut registry = Self::new();
        for config in storage.iter() {
            registry.insert(DatabaseConnection::from_config(config)?);
        }
        Ok(registry)
    }

    /// Add a connection, replacing one with the same name.
    pub fn insert(&mut self, connection: DatabaseConnection) -> Arc<DatabaseConnection> {
        let connection = Arc::new(connection);
        self.databases
            .insert(connection.name_id().to_string(), Arc::clone(&connection));
        connection
    }

    /// # Errors
    /// `ConfigError` (`DATABASE_NOT_FOUND`) for an unknown name.
    pub fn get(&self, name: &str) -> Result<Arc<DatabaseConnection>, SqlMiddlewareDbError> {
        self.databases.get(name).cloned().ok_or_else(|| {
            SqlMiddlewareDbError::ConfigError(format!("DATABASE_NOT_FOUND:{name}"))
        })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.databases.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.databases.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.databases.is_empty()
    }

    /// Connect every database flagged `is_connect_at_start`.
    ///
    /// A failing must-connect database aborts startup; other failures are logged and the
    /// database stays disconnected until first use.
    ///
    /// # Errors
    /// `MustConnectFailed` for the first mandatory database that cannot connect.
    pub async fn connect_at_start(&self) -> Result<(), SqlMiddlewareDbError> {
        tracing::info!(databases = self.databases.len(), "connecting databases at start");
        for connection in self.databases.values().filter(|c| c.is_connect_at_start()) {
            if let Err(err) = connection.connect().await
                && connection.is_must_connect()
            {
                return Err(err);
            }
        }
        Ok(())
    }

    /// Connect every database regardless of its start flag.
    ///
    /// # Errors
    /// The first connection failure.
    pub async fn connect_all(&self) -> Result<(), SqlMiddlewareDbError> {
        for connection in self.databases.values() {
            connection.connect().await?;
        }
        Ok(())
    }

    pub async fn disconnect_all(&self) {
        for connection in self.databases.values() {
            connection.disconnect().await;
        }
    }

    /// Run the database's `create_script_files` in order, each as one batch.
    /// Stops at the first failing file. Returns how many files ran.
    ///
    /// # Errors
    /// `DATABASE_NOT_FOUND`, an unreadable file (`CREATE_SCRIPT_READ_FAILED`), or the
    /// driver error of the failing batch.
    pub async fn execute_create_scripts(&self, name: &str) -> Result<usize, SqlMiddlewareDbError> {
        let connection = self.get(name)?;
        let files = connection.script_files().to_vec();
        for (idx, file) in files.iter().enumerate() {
            tracing::info!(database = %name, file = %file, "executing create script");
            let sql = tokio::fs::read_to_string(file).await.map_err(|e| {
                SqlMiddlewareDbError::ConfigError(format!("CREATE_SCRIPT_READ_FAILED:{file}: {e}"))
            })?;
            if let Err(err) = connection
                .with_retry(|client| {
                    let sql = sql.clone();
                    async move { client.execute_batch(&sql).await }
                })
                .await
            {
                tracing::error!(database = %name, file = %file, index = idx, error = %err, "create script failed");
                return Err(err);
            }
        }
        Ok(files.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::ScriptedDriver;
    use crate::types::DatabaseType;
    use std::io::Write;
    use tokio::runtime::Runtime;

    #[test]
    fn start_skips_optional_failures_but_not_mandatory_ones() {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let optional = ScriptedDriver::new(DatabaseType::MariaDb).fail_connects(1);
            let idle = ScriptedDriver::new(DatabaseType::Postgres);
            let mut registry = DatabaseRegistry::new();
            registry.insert(DatabaseConnection::new("cache", Arc::new(optional.clone())).connect_at_start(true));
            registry.insert(DatabaseConnection::new("idle", Arc::new(idle.clone())));
            registry.connect_at_start().await.unwrap();
            assert_eq!(optional.connect_attempts(), 1);
            assert_eq!(idle.connect_attempts(), 0);

            let mandatory = ScriptedDriver::new(DatabaseType::Mssql).fail_connects(1);
            registry.insert(
                DatabaseConnection::new("billing", Arc::new(mandatory))
                    .connect_at_start(true)
                    .must_connect(true),
            );
            let err = registry.connect_at_start().await.unwrap_err();
            assert_eq!(err.code(), "MUST_CONNECT_FAILED:billing");
            assert_eq!(registry.names().collect::<Vec<_>>(), vec!["billing", "cache", "idle"]);
        });
    }

    #[test]
    fn create_scripts_run_in_order() {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let mut first = tempfile::NamedTempFile::new().unwrap();
            writeln!(first, "CREATE TABLE a (id INT);").unwrap();
            let mut second = tempfile::NamedTempFile::new().unwrap();
            writeln!(second, "CREATE TABLE b (id INT);").unwrap();
            let files = vec![
                first.path().to_string_lossy().into_owned(),
                second.path().to_string_lossy().into_owned(),
            ];
            let driver = ScriptedDriver::new(DatabaseType::Postgres);
            let mut registry = DatabaseRegistry::new();
            registry.insert(DatabaseConnection::new("main", Arc::new(driver.clone())).create_script_files(files));
            assert_eq!(registry.execute_create_scripts("main").await.unwrap(), 2);
            let batches: Vec<String> = driver
                .events()
                .into_iter()
                .filter_map(|e| e.strip_prefix("batch:").map(str::to_string))
                .collect();
            assert_eq!(batches, vec!["CREATE TABLE a (id INT);\n", "CREATE TABLE b (id INT);\n"]);
            assert!(registry.execute_create_scripts("nope").await.is_err());
        });
    }

    #[test]
    fn missing_script_file_is_reported() {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let driver = ScriptedDriver::new(DatabaseType::Oracle);
            let mut registry = DatabaseRegistry::new();
            registry.insert(
                DatabaseConnection::new("ora", Arc::new(driver))
                    .create_script_files(vec!["/nonexistent/ddl.sql".into()]),
            );
            let err = registry.execute_create_scripts("ora").await.unwrap_err();
            assert!(err.to_string().contains("CREATE_SCRIPT_READ_FAILED"));
        });
    }
}
