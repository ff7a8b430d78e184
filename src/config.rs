//! Database configuration.
//!
//! One JSON object per logical database:
//!
//! ```json
//! {
//!   "main": {
//!     "database_type": "postgres",
//!     "address": "localhost:5432",
//!     "user_name": "app",
//!     "user_password": "secret",
//!     "database_name": "app",
//!     "connection_options": "sslmode=disable",
//!     "must_connected": true,
//!     "is_connect_at_start": true,
//!     "create_script_files": ["sql/01_schema.sql"]
//!   }
//! }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::SqlMiddlewareDbError;
use crate::types::DatabaseType;

/// Settings for one logical database.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Filled from the map key when loaded through [`StorageConfig`].
    #[serde(default)]
    pub nameid: String,
    pub database_type: Option<String>,
    /// `host` or `host:port`; the dialect's default port applies when omitted.
    pub address: Option<String>,
    pub user_name: Option<String>,
    pub user_password: Option<String>,
    pub database_name: Option<String>,
    #[serde(default)]
    pub connection_options: String,
    #[serde(default)]
    pub must_connected: bool,
    #[serde(default)]
    pub is_connect_at_start: bool,
    #[serde(default)]
    pub create_script_files: Vec<String>,
}

fn required<'a>(value: Option<&'a String>, field: &str, nameid: &str) -> Result<&'a str, SqlMiddlewareDbError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v.as_str()),
        _ => Err(SqlMiddlewareDbError::ConfigError(format!(
            "mandatory {field} field in database {nameid} configuration does not exist"
        ))),
    }
}

impl DatabaseConfig {
    /// Parsed `database_type`.
    ///
    /// # Errors
    /// `ConfigError` when missing, `UnsupportedDialect` for an unknown name.
    pub fn dialect(&self) -> Result<DatabaseType, SqlMiddlewareDbError> {
        required(self.database_type.as_ref(), "database_type", &self.nameid)?.parse()
    }

    /// Check every mandatory field.
    ///
    /// # Errors
    /// Returns the first missing field or an unsupported dialect.
    pub fn validate(&self) -> Result<(), SqlMiddlewareDbError> {
        if self.nameid.trim().is_empty() {
            return Err(SqlMiddlewareDbError::ConfigError(
                "nameid is required".to_string(),
            ));
        }
        self.dialect()?;
        self.host_port()?;
        required(self.user_name.as_ref(), "user_name", &self.nameid)?;
        required(self.user_password.as_ref(), "user_password", &self.nameid)?;
        required(self.database_name.as_ref(), "database_name", &self.nameid)?;
        Ok(())
    }

    /// Host and port from `address`, defaulting the port per dialect.
    ///
    /// # Errors
    /// `ConfigError` for a missing address or a port that is not a number.
    pub fn host_port(&self) -> Result<(String, u16), SqlMiddlewareDbError> {
        let address = required(self.address.as_ref(), "address", &self.nameid)?;
        let default_port = match self.dialect()? {
            DatabaseType::Postgres => 5432,
            DatabaseType::Mssql => 1433,
            DatabaseType::Oracle => 1521,
            DatabaseType::MariaDb => 3306,
        };
        match address.rsplit_once(':') {
            Some((host, port)) => {
                let port = port.parse().map_err(|_| {
                    SqlMiddlewareDbError::ConfigError(format!(
                        "invalid port {port:?} in address of database {}",
                        self.nameid
                    ))
                })?;
                Ok((host.to_string(), port))
            }
            None => Ok((address.to_string(), default_port)),
        }
    }

    pub(crate) fn user(&self) -> &str {
        self.user_name.as_deref().unwrap_or_default()
    }

    pub(crate) fn password(&self) -> &str {
        self.user_password.as_deref().unwrap_or_default()
    }

    pub(crate) fn database(&self) -> &str {
        self.database_name.as_deref().unwrap_or_default()
    }

    /// Driver connection string, including credentials.
    ///
    /// # Errors
    /// Fails like [`DatabaseConfig::validate`].
    pub fn connection_string(&self) -> Result<String, SqlMiddlewareDbError> {
        self.validate()?;
        let (host, port) = self.host_port()?;
        let (user, password, database) = (self.user(), self.password(), self.database());
        let options = self.connection_options.trim();
        let s = match self.dialect()? {
            DatabaseType::Postgres => {
                let base = format!(
                    "user={user} password={password} host={host} port={port} dbname={database}"
                );
                if options.is_empty() { base } else { format!("{base} {options}") }
            }
            DatabaseType::Mssql => {
                let base = format!(
                    "server={host};port={port};user id={user};password={password};database={database};encrypt=disable"
                );
                if options.is_empty() { base } else { format!("{base};{options}") }
            }
            DatabaseType::Oracle => format!("//{host}:{port}/{database}"),
            DatabaseType::MariaDb => {
                let base = format!("mysql://{user}:{password}@{host}:{port}/{database}");
                if options.is_empty() { base } else { format!("{base}?{options}") }
            }
        };
        Ok(s)
    }

    /// `<driver>://<address>/<database>`, safe to log.
    #[must_use]
    pub fn non_sensitive_connection_string(&self) -> String {
        let driver = self
            .dialect()
            .map_or("unknown", DatabaseType::driver_name);
        format!(
            "{driver}://{}/{}",
            self.address.as_deref().unwrap_or_default(),
            self.database()
        )
    }
}

/// Every configured database, keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageConfig {
    databases: BTreeMap<String, DatabaseConfig>,
}

impl StorageConfig {
    /// Parse and validate a JSON map of database configurations.
    ///
    /// # Errors
    /// `ConfigError` for malformed JSON or the first invalid database entry.
    pub fn from_json_str(json: &str) -> Result<Self, SqlMiddlewareDbError> {
        let mut databases: BTreeMap<String, DatabaseConfig> = serde_json::from_str(json)
            .map_err(|e| SqlMiddlewareDbError::ConfigError(format!("invalid storage configuration: {e}")))?;
        for (name, config) in &mut databases {
            if config.nameid.is_empty() {
                config.nameid.clone_from(name);
            }
            config.validate()?;
        }
        Ok(Self { databases })
    }

    /// # Errors
    /// `ConfigError` when the file cannot be read, otherwise as [`StorageConfig::from_json_str`].
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SqlMiddlewareDbError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            SqlMiddlewareDbError::ConfigError(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json_str(&json)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&DatabaseConfig> {
        self.databases.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DatabaseConfig> {
        self.databases.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.databases.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.databases.is_empty()
    }
}

/// Named JSON configuration documents, looked up by dotted path.
///
/// Backs configuration-sourced encryption keys: `"secrets.db.key"` reads the string at
/// `key` inside the `db` object of the `secrets` document.
#[derive(Debug, Default)]
pub struct ConfigStore {
    documents: RwLock<HashMap<String, JsonValue>>,
}

impl ConfigStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, name: impl Into<String>, document: JsonValue) {
        let mut documents = match self.documents.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        documents.insert(name.into(), document);
    }

    /// Resolve `document.key.path` to a string.
    ///
    /// # Errors
    /// `CONFIGURATION_NOT_FOUND` for an unknown document, `CONFIGURATION_KEY_NOT_FOUND` for a
    /// missing path segment, `CONFIGURATION_VALUE_NOT_STRING` when the value is not a string.
    pub fn lookup_string(&self, path: &str) -> Result<String, SqlMiddlewareDbError> {
        let mut segments = path.split('.');
        let name = segments.next().unwrap_or_default();
        let documents = match self.documents.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut node = documents.get(name).ok_or_else(|| {
            SqlMiddlewareDbError::ConfigError(format!("CONFIGURATION_NOT_FOUND:{name}"))
        })?;
        for segment in segments {
            node = node.get(segment).ok_or_else(|| {
                SqlMiddlewareDbError::ConfigError(format!("CONFIGURATION_KEY_NOT_FOUND:{path}"))
            })?;
        }
        node.as_str().map(str::to_string).ok_or_else(|| {
            SqlMiddlewareDbError::ConfigError(format!("CONFIGURATION_VALUE_NOT_STRING:{path}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(db: &str, address: &str) -> DatabaseConfig {
        DatabaseConfig {
            nameid: "main".into(),
            database_type: Some(db.into()),
            address: Some(address.into()),
            user_name: Some("app".into()),
            user_password: Some("pw".into()),
            database_name: Some("appdb".into()),
            ..DatabaseConfig::default()
        }
    }

    #[test]
    fn connection_strings_per_dialect() {
        assert_eq!(
            config("postgres", "db.local").connection_string().unwrap(),
            "user=app password=pw host=db.local port=5432 dbname=appdb"
        );
        assert_eq!(
            config("sqlserver", "db.local:1444").connection_string().unwrap(),
            "server=db.local;port=1444;user id=app;password=pw;database=appdb;encrypt=disable"
        );
        assert_eq!(
            config("oracle", "db.local").connection_string().unwrap(),
            "//db.local:1521/appdb"
        );
        assert_eq!(
            config("mysql", "db.local").connection_string().unwrap(),
            "mysql://app:pw@db.local:3306/appdb"
        );
        assert_eq!(
            config("mariadb", "db.local:3307").non_sensitive_connection_string(),
            "mysql://db.local:3307/appdb"
        );
    }

    #[test]
    fn missing_fields_are_config_errors() {
        let mut cfg = config("postgres", "db.local");
        cfg.user_password = None;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("user_password"));

        let bad_port = config("postgres", "db.local:abc");
        assert!(matches!(bad_port.validate(), Err(SqlMiddlewareDbError::ConfigError(_))));

        let unknown = config("db2", "db.local");
        assert_eq!(unknown.validate().unwrap_err().code(), "UNSUPPORTED_DIALECT:db2");
    }

    #[test]
    fn storage_fills_names_from_keys() {
        let storage = StorageConfig::from_json_str(
            r#"{"reports": {"database_type": "oracle", "address": "ora:1521",
                "user_name": "r", "user_password": "p", "database_name": "XE",
                "is_connect_at_start": true}}"#,
        )
        .unwrap();
        let reports = storage.get("reports").unwrap();
        assert_eq!(reports.nameid, "reports");
        assert!(reports.is_connect_at_start);
        assert!(!reports.must_connected);
        assert_eq!(storage.len(), 1);
    }

    #[test]
    fn config_store_lookup_errors() {
        let store = ConfigStore::new();
        store.insert("secrets", serde_json::json!({"db": {"key": "k1", "n": 3}}));
        assert_eq!(store.lookup_string("secrets.db.key").unwrap(), "k1");
        assert_eq!(store.lookup_string("other.db").unwrap_err().code(), "CONFIGURATION_NOT_FOUND");
        assert_eq!(
            store.lookup_string("secrets.db.missing").unwrap_err().code(),
            "CONFIGURATION_KEY_NOT_FOUND"
        );
        assert_eq!(
            store.lookup_string("secrets.db.n").unwrap_err().code(),
            "CONFIGURATION_VALUE_NOT_STRING"
        );
    }
}
