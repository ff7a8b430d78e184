//! CREATE statements for registered schemas.
//!
//! A table with encrypted fields is created with only the ciphertext (and hash) columns, and
//! a view over it decrypts them back under the field names.

use super::expressions::{
    decrypt_expr, mariadb_key_function, mariadb_key_function_ddl, session_key_expr,
};
use super::keys::validate_session_key;
use super::schema::{EntityField, FieldId, SchemaId, SchemaRegistry, TableId};
use crate::error::SqlMiddlewareDbError;
use crate::injection::check_identifier;
use crate::types::DatabaseType;

const PGCRYPTO: &str = "CREATE EXTENSION IF NOT EXISTS pgcrypto;\n\n";

fn column_ddl(
    registry: &SchemaRegistry,
    id: FieldId,
    db: DatabaseType,
) -> Result<String, SqlMiddlewareDbError> {
    let field = registry.field(id);
    check_identifier(db, &field.name)?;
    let mut ddl = format!("{} {}", field.name, field.logical_type.column_type(db));
    if field.primary_key {
        ddl.push_str(" PRIMARY KEY");
    } else {
        if field.not_null {
            ddl.push_str(" NOT NULL");
        }
        if field.unique {
            ddl.push_str(" UNIQUE");
        }
    }
    if let Some(default) = field.default_for_dialect(db) {
        ddl.push_str(" DEFAULT ");
        ddl.push_str(default);
    }
    if let Some(target) = registry.reference_target(id)? {
        ddl.push_str(&format!(
            " REFERENCES {} ({})",
            registry.full_table_name(target.table()),
            registry.field(target).name
        ));
    }
    Ok(ddl)
}

fn encrypted_columns_ddl(field: &EntityField, db: DatabaseType) -> Result<Vec<String>, SqlMiddlewareDbError> {
    check_identifier(db, &field.encrypted_column)?;
    let mut columns = vec![format!(
        "{} {}",
        field.encrypted_column,
        field.encrypted_type.column_type(db)
    )];
    if field.is_stored_hashed() {
        check_identifier(db, &field.hash_column)?;
        columns.push(format!("{} {}", field.hash_column, field.hash_type.column_type(db)));
    }
    Ok(columns)
}

/// `CREATE TABLE` for `table`, without the view.
///
/// # Errors
/// Invalid identifiers, or `UNRESOLVED_FIELD_REFERENCE`.
pub fn create_table_ddl(
    registry: &SchemaRegistry,
    table: TableId,
    db: DatabaseType,
) -> Result<String, SqlMiddlewareDbError> {
    let spec = registry.table(table);
    let full_name = registry.full_table_name(table);
    check_identifier(db, &full_name)?;
    let mut columns = Vec::with_capacity(spec.fields.len());
    for (id, field) in registry.field_ids(table).zip(&spec.fields) {
        if field.is_stored_encrypted() {
            columns.extend(encrypted_columns_ddl(field, db)?);
        } else {
            columns.push(column_ddl(registry, id, db)?);
        }
    }
    Ok(format!(
        "CREATE TABLE {full_name} (\n    {}\n){};\n",
        columns.join(",\n    "),
        spec.tde.clause(db)
    ))
}

/// The decrypting view over `table`, or `None` when it has no encrypted fields. On MariaDB the
/// view is preceded by the key functions it calls.
///
/// # Errors
/// Invalid identifiers or session key names.
pub fn create_view_ddl(
    registry: &SchemaRegistry,
    table: TableId,
    db: DatabaseType,
) -> Result<Option<String>, SqlMiddlewareDbError> {
    let spec = registry.table(table);
    if !spec.has_encrypted_fields() {
        return Ok(None);
    }
    let view = registry.full_view_name(table);
    check_identifier(db, &view)?;
    let schema_prefix = view
        .rsplit_once('.')
        .map(|(schema, _)| format!("{schema}."))
        .unwrap_or_default();
    let mut functions: Vec<String> = Vec::new();
    let mut columns = Vec::new();
    for field in &spec.fields {
        if field.is_stored_encrypted() {
            validate_session_key(&field.encryption_key)?;
            let key = if db == DatabaseType::MariaDb {
                let function = format!("{schema_prefix}{}", mariadb_key_function(&field.encryption_key));
                let ddl = mariadb_key_function_ddl(&function, &field.encryption_key);
                if !functions.contains(&ddl) {
                    functions.push(ddl);
                }
                format!("{function}()")
            } else {
                session_key_expr(db, &field.encryption_key)
            };
            columns.push(format!(
                "    {} AS {}",
                decrypt_expr(db, &field.encrypted_column, &key),
                field.name
            ));
            columns.push(format!("    {}", field.encrypted_column));
            if field.is_stored_hashed() {
                columns.push(format!("    {}", field.hash_column));
            }
        } else {
            columns.push(format!("    {}", field.name));
        }
    }
    Ok(Some(format!(
        "{}CREATE VIEW {view} AS\nSELECT\n{}\nFROM {};\n",
        functions.concat(),
        columns.join(",\n"),
        registry.full_table_name(table)
    )))
}

/// Table and view for one entity, preceded by the pgcrypto extension on PostgreSQL when
/// anything is encrypted.
///
/// # Errors
/// As [`create_table_ddl`] and [`create_view_ddl`].
pub fn create_ddl(
    registry: &SchemaRegistry,
    table: TableId,
    db: DatabaseType,
) -> Result<String, SqlMiddlewareDbError> {
    let mut ddl = String::new();
    if db == DatabaseType::Postgres && registry.table(table).has_encrypted_fields() {
        ddl.push_str(PGCRYPTO);
    }
    ddl.push_str(&create_table_ddl(registry, table, db)?);
    if let Some(view) = create_view_ddl(registry, table, db)? {
        ddl.push('\n');
        ddl.push_str(&view);
    }
    Ok(ddl)
}

fn create_schema_statement(name: &str, db: DatabaseType) -> String {
    match db {
        DatabaseType::Postgres => format!("CREATE SCHEMA IF NOT EXISTS {name};\n\n"),
        DatabaseType::Mssql => format!(
            "IF NOT EXISTS (SELECT * FROM sys.schemas WHERE name = '{name}')\nBEGIN\n    EXEC('CREATE SCHEMA {name}')\nEND;\n\n"
        ),
        DatabaseType::MariaDb => format!("CREATE DATABASE IF NOT EXISTS {name};\nUSE {name};\n\n"),
        // schemas are users on Oracle
        DatabaseType::Oracle => format!("-- Oracle: Schema {name} should be created by DBA\n\n"),
    }
}

/// The schema itself, then all its tables, then their views.
///
/// # Errors
/// As [`create_ddl`].
pub fn schema_ddl(
    registry: &SchemaRegistry,
    schema: SchemaId,
    db: DatabaseType,
) -> Result<String, SqlMiddlewareDbError> {
    let name = registry.schema_name(schema);
    check_identifier(db, name)?;
    let tables = registry.tables_of(schema);
    let mut ddl = create_schema_statement(name, db);
    if db == DatabaseType::Postgres && tables.iter().any(|t| registry.table(*t).has_encrypted_fields()) {
        ddl.push_str(PGCRYPTO);
    }
    for table in tables {
        ddl.push_str(&create_table_ddl(registry, *table, db)?);
        ddl.push('\n');
    }
    for table in tables {
        if let Some(view) = create_view_ddl(registry, *table, db)? {
            ddl.push_str(&view);
            ddl.push('\n');
        }
    }
    Ok(ddl)
}

/// Every registered schema, in registration order.
///
/// # Errors
/// As [`schema_ddl`].
pub fn create_all_ddl(registry: &SchemaRegistry, db: DatabaseType) -> Result<String, SqlMiddlewareDbError> {
    let mut ddl = String::new();
    for schema in registry.schema_ids() {
        ddl.push_str(&schema_ddl(registry, schema, db)?);
    }
    tracing::debug!(dialect = %db, bytes = ddl.len(), "generated schema DDL");
    Ok(ddl)
}
