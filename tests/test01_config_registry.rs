#![cfg(feature = "postgres")]

use std::io::Write;

use sql_dialect_middleware::prelude::*;

const STORAGE: &str = r#"{
    "main": {
        "database_type": "postgres",
        "address": "db.internal",
        "user_name": "app",
        "user_password": "s3cret",
        "database_name": "app",
        "connection_options": "sslmode=disable",
        "must_connected": true,
        "is_connect_at_start": true,
        "create_script_files": ["sql/01_schema.sql"]
    },
    "reporting": {
        "database_type": "postgresql",
        "address": "reports.internal:6432",
        "user_name": "ro",
        "user_password": "pw",
        "database_name": "reports"
    }
}"#;

#[test]
fn storage_config_loads_from_file() -> Result<(), Box<dyn std::error::Error>> {
    let mut file = tempfile::NamedTempFile::new()?;
    file.write_all(STORAGE.as_bytes())?;
    let storage = StorageConfig::from_file(file.path())?;
    assert_eq!(storage.len(), 2);

    let main = storage.get("main").ok_or("main missing")?;
    assert_eq!(main.nameid, "main");
    assert_eq!(main.host_port()?, ("db.internal".to_string(), 5432));
    assert_eq!(main.non_sensitive_connection_string(), "postgres://db.internal/app");
    assert!(!main.non_sensitive_connection_string().contains("s3cret"));

    let reporting = storage.get("reporting").ok_or("reporting missing")?;
    assert_eq!(reporting.host_port()?.1, 6432);
    assert!(!reporting.must_connected);
    Ok(())
}

#[test]
fn missing_mandatory_field_is_rejected() {
    let err = StorageConfig::from_json_str(
        r#"{"main": {"database_type": "postgres", "address": "h", "user_name": "u", "database_name": "d"}}"#,
    )
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert!(err.to_string().contains("user_password"));

    let err = StorageConfig::from_json_str(
        r#"{"main": {"database_type": "db2", "address": "h", "user_name": "u", "user_password": "p", "database_name": "d"}}"#,
    )
    .unwrap_err();
    assert_eq!(err.code(), "UNSUPPORTED_DIALECT:db2");
}

#[test]
fn registry_builds_connections_without_connecting() -> Result<(), SqlMiddlewareDbError> {
    let storage = StorageConfig::from_json_str(STORAGE)?;
    let registry = DatabaseRegistry::from_config(&storage)?;
    assert_eq!(registry.names().collect::<Vec<_>>(), vec!["main", "reporting"]);

    let main = registry.get("main")?;
    assert_eq!(main.dialect(), DatabaseType::Postgres);
    assert!(main.is_must_connect());
    assert!(main.is_connect_at_start());
    assert_eq!(main.script_files(), ["sql/01_schema.sql".to_string()]);

    let err = registry.get("audit").unwrap_err();
    assert_eq!(err.code(), "DATABASE_NOT_FOUND");
    Ok(())
}

#[cfg(not(feature = "mariadb"))]
#[test]
fn disabled_backend_is_reported() {
    let storage = StorageConfig::from_json_str(
        r#"{"cache": {"database_type": "mariadb", "address": "h", "user_name": "u", "user_password": "p", "database_name": "d"}}"#,
    )
    .unwrap();
    let err = DatabaseRegistry::from_config(&storage).unwrap_err();
    assert!(err.to_string().contains("mariadb"));
}

#[test]
fn config_store_resolves_dotted_paths() {
    let store = ConfigStore::new();
    store.insert("secrets", serde_json::json!({"db": {"key": "k-123", "rounds": 4}}));
    assert_eq!(store.lookup_string("secrets.db.key").unwrap(), "k-123");
    assert_eq!(
        store.lookup_string("secrets.db.rounds").unwrap_err().code(),
        "CONFIGURATION_VALUE_NOT_STRING"
    );
    assert_eq!(
        store.lookup_string("vault.db.key").unwrap_err().code(),
        "CONFIGURATION_NOT_FOUND"
    );
}
