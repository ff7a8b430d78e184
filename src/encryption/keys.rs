//! Where encryption keys come from and how they reach the database session.

use zeroize::Zeroizing;

use super::expressions::{mariadb_variable, oracle_context};
use crate::config::ConfigStore;
use crate::error::SqlMiddlewareDbError;
use crate::query::QueryAndParams;
use crate::secure_memory::SecureMemoryStore;
use crate::types::{DatabaseType, RowValues};

/// Source of a key or salt value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySource {
    /// The value itself.
    Raw(String),
    /// Name of an environment variable.
    Env(String),
    /// `document.key.path` in a [`ConfigStore`].
    Config(String),
    /// Entry name in a [`SecureMemoryStore`].
    SecureMemory(String),
    /// Already present in the database session under this key; nothing to inject.
    DbSessionCurrentSetting(String),
}

/// Resolves [`KeySource`]s against the stores available to the caller.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeyResolver<'a> {
    config: Option<&'a ConfigStore>,
    memory: Option<&'a SecureMemoryStore>,
}

impl<'a> KeyResolver<'a> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_config(mut self, config: &'a ConfigStore) -> Self {
        self.config = Some(config);
        self
    }

    #[must_use]
    pub fn with_secure_memory(mut self, memory: &'a SecureMemoryStore) -> Self {
        self.memory = Some(memory);
        self
    }

    /// The key value for `source`.
    ///
    /// # Errors
    /// `ENVIRONMENT_VARIABLE_NOT_FOUND_OR_EMPTY`, the configuration lookup codes,
    /// `SECURE_MEMORY_KEY_NOT_FOUND`, `KEY_SOURCE_UNAVAILABLE` when the matching store was not
    /// supplied, or `INVALID_SOURCE_TYPE_FOR_SET_SESSION_KEY` for session-sourced keys.
    pub fn resolve(&self, source: &KeySource) -> Result<Zeroizing<String>, SqlMiddlewareDbError> {
        match source {
            KeySource::Raw(value) => Ok(Zeroizing::new(value.clone())),
            KeySource::Env(name) => match std::env::var(name) {
                Ok(value) if !value.is_empty() => Ok(Zeroizing::new(value)),
                _ => Err(SqlMiddlewareDbError::EncryptionError(format!(
                    "ENVIRONMENT_VARIABLE_NOT_FOUND_OR_EMPTY:{name}"
                ))),
            },
            KeySource::Config(path) => {
                if !path.contains('.') {
                    return Err(SqlMiddlewareDbError::ConfigError(format!(
                        "INVALID_CONFIG_KEY_FORMAT:{path} (expected document.key)"
                    )));
                }
                let config = self.config.ok_or_else(|| {
                    SqlMiddlewareDbError::EncryptionError("KEY_SOURCE_UNAVAILABLE:config".into())
                })?;
                config.lookup_string(path).map(Zeroizing::new)
            }
            KeySource::SecureMemory(key) => {
                let memory = self.memory.ok_or_else(|| {
                    SqlMiddlewareDbError::EncryptionError(
                        "KEY_SOURCE_UNAVAILABLE:secure_memory".into(),
                    )
                })?;
                memory.get_string(key)
            }
            KeySource::DbSessionCurrentSetting(_) => Err(SqlMiddlewareDbError::EncryptionError(
                "INVALID_SOURCE_TYPE_FOR_SET_SESSION_KEY:DbSessionCurrentSetting".into(),
            )),
        }
    }
}

/// Session key names: ASCII letters, digits, `.` and `_`, not starting with a digit.
///
/// # Errors
/// `INVALID_SESSION_KEY:<key>`.
pub fn validate_session_key(key: &str) -> Result<(), SqlMiddlewareDbError> {
    let valid = key
        .chars()
        .next()
        .is_some_and(|c| !c.is_ascii_digit())
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(SqlMiddlewareDbError::EncryptionError(format!(
            "INVALID_SESSION_KEY:{key}"
        )))
    }
}

/// A positional statement that publishes a session key.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionKeyStatement {
    pub query: QueryAndParams,
    /// Run as a query (PostgreSQL `SELECT set_config`) rather than as DML.
    pub returns_rows: bool,
}

/// The statement setting `key` to `value` for the current session or transaction.
///
/// The value is always bound, never spliced.
///
/// # Errors
/// `INVALID_SESSION_KEY` for key names that cannot be used safely.
pub fn session_key_statement(
    db: DatabaseType,
    key: &str,
    value: &str,
) -> Result<SessionKeyStatement, SqlMiddlewareDbError> {
    validate_session_key(key)?;
    let text = |s: &str| RowValues::Text(s.to_string());
    let statement = match db {
        DatabaseType::Postgres => SessionKeyStatement {
            query: QueryAndParams::new("SELECT set_config($1, $2, true)", vec![text(key), text(value)]),
            returns_rows: true,
        },
        DatabaseType::Mssql => SessionKeyStatement {
            query: QueryAndParams::new(
                "EXEC sp_set_session_context @key = @p1, @value = @p2",
                vec![text(key), text(value)],
            ),
            returns_rows: false,
        },
        DatabaseType::Oracle => {
            let (namespace, attribute) = oracle_context(key);
            SessionKeyStatement {
                query: QueryAndParams::new(
                    "BEGIN DBMS_SESSION.SET_CONTEXT(:1, :2, :3); END;",
                    vec![text(&namespace), text(&attribute), text(value)],
                ),
                returns_rows: false,
            }
        }
        DatabaseType::MariaDb => SessionKeyStatement {
            query: QueryAndParams::new(format!("SET {} = ?", mariadb_variable(key)), vec![text(value)]),
            returns_rows: false,
        },
    };
    Ok(statement)
}

/// The statement withdrawing `key` from a pooled session before it is handed back.
///
/// `None` on PostgreSQL, where keys are set transaction-local and vanish at COMMIT/ROLLBACK.
///
/// # Errors
/// `INVALID_SESSION_KEY`.
pub fn session_key_clear_statement(
    db: DatabaseType,
    key: &str,
) -> Result<Option<QueryAndParams>, SqlMiddlewareDbError> {
    validate_session_key(key)?;
    let text = |s: &str| RowValues::Text(s.to_string());
    let statement = match db {
        DatabaseType::Postgres => return Ok(None),
        DatabaseType::Mssql => QueryAndParams::new(
            "EXEC sp_set_session_context @key = @p1, @value = NULL",
            vec![text(key)],
        ),
        DatabaseType::Oracle => {
            let (namespace, attribute) = oracle_context(key);
            QueryAndParams::new(
                "BEGIN DBMS_SESSION.CLEAR_CONTEXT(:1, NULL, :2); END;",
                vec![text(&namespace), text(&attribute)],
            )
        }
        DatabaseType::MariaDb => {
            QueryAndParams::new_without_params(format!("SET {} = NULL", mariadb_variable(key)))
        }
    };
    Ok(Some(statement))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clear_statements_leave_postgres_alone() {
        assert!(session_key_clear_statement(DatabaseType::Postgres, "app.key").unwrap().is_none());
        let maria = session_key_clear_statement(DatabaseType::MariaDb, "app.key").unwrap().unwrap();
        assert_eq!(maria.query, "SET @app_key = NULL");
        let ora = session_key_clear_statement(DatabaseType::Oracle, "app.key").unwrap().unwrap();
        assert_eq!(ora.params, vec![RowValues::Text("APP_CTX".into()), RowValues::Text("key".into())]);
    }

    #[test]
    fn set_statements_per_dialect() {
        let pg = session_key_statement(DatabaseType::Postgres, "app.key", "v").unwrap();
        assert!(pg.returns_rows);
        assert_eq!(pg.query.params.len(), 2);

        let ora = session_key_statement(DatabaseType::Oracle, "app.key", "v").unwrap();
        assert_eq!(ora.query.query, "BEGIN DBMS_SESSION.SET_CONTEXT(:1, :2, :3); END;");
        assert_eq!(
            ora.query.params,
            vec![RowValues::Text("APP_CTX".into()), RowValues::Text("key".into()), RowValues::Text("v".into())]
        );

        let maria = session_key_statement(DatabaseType::MariaDb, "app.key", "v").unwrap();
        assert_eq!(maria.query.query, "SET @app_key = ?");

        let bad = session_key_statement(DatabaseType::Mssql, "app.key'; --", "v").unwrap_err();
        assert_eq!(bad.code(), "INVALID_SESSION_KEY");
        assert!(validate_session_key("1app").is_err());
    }

    #[test]
    fn resolve_sources() {
        let memory = SecureMemoryStore::new();
        memory.store_enclave("vault.db", b"from-memory").unwrap();
        let config = ConfigStore::new();
        config.insert("encryption", serde_json::json!({"db_key": "from-config"}));
        let resolver = KeyResolver::new().with_config(&config).with_secure_memory(&memory);

        assert_eq!(resolver.resolve(&KeySource::Raw("raw".into())).unwrap().as_str(), "raw");
        assert_eq!(
            resolver.resolve(&KeySource::SecureMemory("vault.db".into())).unwrap().as_str(),
            "from-memory"
        );
        assert_eq!(
            resolver.resolve(&KeySource::Config("encryption.db_key".into())).unwrap().as_str(),
            "from-config"
        );
        let env = resolver
            .resolve(&KeySource::Env("SQL_DIALECT_MIDDLEWARE_SURELY_UNSET".into()))
            .unwrap_err();
        assert_eq!(env.code(), "ENVIRONMENT_VARIABLE_NOT_FOUND_OR_EMPTY");
        let session = resolver
            .resolve(&KeySource::DbSessionCurrentSetting("app.key".into()))
            .unwrap_err();
        assert_eq!(session.code(), "INVALID_SOURCE_TYPE_FOR_SET_SESSION_KEY");
        let no_store = KeyResolver::new()
            .resolve(&KeySource::SecureMemory("vault.db".into()))
            .unwrap_err();
        assert_eq!(no_store.code(), "KEY_SOURCE_UNAVAILABLE");
    }
}
