//! Column encryption: entity model, table+view DDL, key injection and encrypted CRUD.

pub mod ddl;
pub mod expressions;
pub mod keys;
pub mod ops;
pub mod schema;

pub use ddl::{create_all_ddl, create_ddl, create_table_ddl, create_view_ddl, schema_ddl};
pub use keys::{
    KeyResolver, KeySource, SessionKeyStatement, session_key_clear_statement, session_key_statement,
};
pub use ops::{DecryptedColumnDef, DecryptedSelect, EncryptedColumnDef};
pub use schema::{
    EntityField, FieldId, FieldRef, LogicalType, PerDialect, SchemaId, SchemaRegistry, TableId,
    TableSpec, TdeConfig, ValueKind,
};
