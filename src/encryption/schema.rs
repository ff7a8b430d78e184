//! Entity model for encrypted tables.
//!
//! Schemas, tables and fields live in one [`SchemaRegistry`] arena and refer to each other by
//! id. Foreign-key references are given as `"schema.table.field"` and resolved through the
//! registry, so tables can be registered in any order.

use std::collections::HashSet;

use super::expressions::uid_default_expr;
use crate::error::SqlMiddlewareDbError;
use crate::types::{DatabaseType, NamedArgs, RowValues};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SchemaId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableId(usize);

/// A field, addressed by its table and position in that table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldId {
    table: TableId,
    index: usize,
}

impl FieldId {
    #[must_use]
    pub fn table(self) -> TableId {
        self.table
    }

    #[must_use]
    pub fn index(self) -> usize {
        self.index
    }
}

/// One value per dialect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PerDialect<T> {
    pub postgres: T,
    pub mssql: T,
    pub oracle: T,
    pub mariadb: T,
}

impl<T> PerDialect<T> {
    #[must_use]
    pub fn get(&self, db: DatabaseType) -> &T {
        match db {
            DatabaseType::Postgres => &self.postgres,
            DatabaseType::Mssql => &self.mssql,
            DatabaseType::Oracle => &self.oracle,
            DatabaseType::MariaDb => &self.mariadb,
        }
    }
}

impl PerDialect<String> {
    fn from_strs(postgres: &str, mssql: &str, oracle: &str, mariadb: &str) -> Self {
        Self {
            postgres: postgres.to_string(),
            mssql: mssql.to_string(),
            oracle: oracle.to_string(),
            mariadb: mariadb.to_string(),
        }
    }

    fn same(value: &str) -> Self {
        Self::from_strs(value, value, value, value)
    }
}

/// Kind of value a field accepts from callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    String,
    Int64,
    Float64,
    Bool,
    Timestamp,
    Bytes,
    Json,
}

impl ValueKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ValueKind::String => "string",
            ValueKind::Int64 => "int64",
            ValueKind::Float64 => "float64",
            ValueKind::Bool => "bool",
            ValueKind::Timestamp => "timestamp",
            ValueKind::Bytes => "bytes",
            ValueKind::Json => "json",
        }
    }

    /// Whether `value` may be stored in a field of this kind. `Null` always is; integral
    /// floats count as `int64` since JSON input carries every number as a float.
    #[must_use]
    pub fn accepts(self, value: &RowValues) -> bool {
        match (self, value) {
            (_, RowValues::Null) => true,
            (ValueKind::String, RowValues::Text(_))
            | (ValueKind::Int64, RowValues::Int(_))
            | (ValueKind::Float64, RowValues::Float(_) | RowValues::Int(_))
            | (ValueKind::Bool, RowValues::Bool(_))
            | (ValueKind::Bytes, RowValues::Blob(_))
            | (ValueKind::Json, RowValues::JSON(_))
            | (ValueKind::Timestamp, RowValues::Timestamp(_)) => true,
            (ValueKind::Int64, RowValues::Float(f)) => f.fract() == 0.0,
            (ValueKind::Timestamp, RowValues::Text(_)) => value.as_timestamp().is_some(),
            (ValueKind::Json, RowValues::Text(s)) => {
                serde_json::from_str::<serde_json::Value>(s).is_ok()
            }
            _ => false,
        }
    }
}

/// Reject `value` unless a field of `kind` accepts it.
///
/// # Errors
/// `FIELD_VALUE_TYPE_MISMATCH`.
pub fn check_value_kind(
    field: &str,
    kind: ValueKind,
    value: &RowValues,
) -> Result<(), SqlMiddlewareDbError> {
    if kind.accepts(value) {
        Ok(())
    } else {
        Err(SqlMiddlewareDbError::builder(
            "FIELD_VALUE_TYPE_MISMATCH",
            format!("field {field} expects {}, got {}", kind.as_str(), value.type_name()),
        ))
    }
}

/// A column type: the accepted value kind plus its rendering in each dialect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalType {
    pub name: String,
    pub kind: ValueKind,
    pub column_types: PerDialect<String>,
    /// Default applied to generated fields.
    pub generated_default: Option<PerDialect<String>>,
}

impl LogicalType {
    #[must_use]
    pub fn custom(name: &str, kind: ValueKind, column_types: PerDialect<String>) -> Self {
        Self {
            name: name.to_string(),
            kind,
            column_types,
            generated_default: None,
        }
    }

    fn preset(name: &str, kind: ValueKind, pg: &str, mssql: &str, oracle: &str, maria: &str) -> Self {
        Self::custom(name, kind, PerDialect::from_strs(pg, mssql, oracle, maria))
    }

    #[must_use]
    pub fn string() -> Self {
        Self::custom("string", ValueKind::String, PerDialect::same("VARCHAR(1024)"))
    }

    #[must_use]
    pub fn int64() -> Self {
        Self::preset("int64", ValueKind::Int64, "BIGINT", "BIGINT", "NUMBER(19)", "BIGINT")
    }

    #[must_use]
    pub fn float64() -> Self {
        Self::preset(
            "float64",
            ValueKind::Float64,
            "DOUBLE PRECISION",
            "FLOAT",
            "BINARY_DOUBLE",
            "DOUBLE",
        )
    }

    #[must_use]
    pub fn bool() -> Self {
        Self::preset("bool", ValueKind::Bool, "BOOLEAN", "BIT", "NUMBER(1)", "BOOLEAN")
    }

    #[must_use]
    pub fn timestamp() -> Self {
        Self::preset(
            "timestamp",
            ValueKind::Timestamp,
            "TIMESTAMP WITH TIME ZONE",
            "DATETIMEOFFSET",
            "TIMESTAMP WITH TIME ZONE",
            "DATETIME",
        )
    }

    #[must_use]
    pub fn json() -> Self {
        Self::preset("json", ValueKind::Json, "JSONB", "NVARCHAR(MAX)", "CLOB", "JSON")
    }

    #[must_use]
    pub fn bytes() -> Self {
        Self::preset("bytes", ValueKind::Bytes, "BYTEA", "VARBINARY(MAX)", "BLOB", "LONGBLOB")
    }

    /// Storage for ciphertext and hashes.
    #[must_use]
    pub fn encrypted_blob() -> Self {
        Self::preset(
            "encrypted_blob",
            ValueKind::Bytes,
            "BYTEA",
            "VARBINARY(MAX)",
            "BLOB",
            "LONGBLOB",
        )
    }

    /// Text id defaulting to hex microseconds followed by a random UUID when generated.
    #[must_use]
    pub fn uid() -> Self {
        let mut uid = Self::preset(
            "uid",
            ValueKind::String,
            "VARCHAR(1024)",
            "VARCHAR(1024)",
            "VARCHAR2(1024)",
            "VARCHAR(1024)",
        );
        uid.generated_default = Some(PerDialect::from_strs(
            uid_default_expr(DatabaseType::Postgres),
            uid_default_expr(DatabaseType::Mssql),
            uid_default_expr(DatabaseType::Oracle),
            uid_default_expr(DatabaseType::MariaDb),
        ));
        uid
    }

    #[must_use]
    pub fn serial() -> Self {
        Self::preset(
            "serial",
            ValueKind::Int64,
            "SERIAL",
            "INT IDENTITY(1,1)",
            "NUMBER GENERATED BY DEFAULT AS IDENTITY",
            "INT AUTO_INCREMENT",
        )
    }

    #[must_use]
    pub fn column_type(&self, db: DatabaseType) -> &str {
        self.column_types.get(db)
    }
}

pub const DEFAULT_ENCRYPTION_KEY: &str = "app.encryption_key";
pub const DEFAULT_HASH_SALT_KEY: &str = "app.hash_salt";

/// A field of an entity.
///
/// An encrypted field is stored only as `encrypted_column` (plus `hash_column` when hashed);
/// the view over the table exposes the decrypted value under `name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityField {
    pub name: String,
    pub logical_type: LogicalType,
    pub primary_key: bool,
    pub not_null: bool,
    pub unique: bool,
    /// Filled in by the database, using the logical type's generated default.
    pub generated: bool,
    pub default: Option<String>,
    pub default_by_dialect: Vec<(DatabaseType, String)>,
    pub encrypted: bool,
    pub encrypted_column: String,
    pub encrypted_type: LogicalType,
    pub hashed: bool,
    pub hash_column: String,
    pub hash_type: LogicalType,
    /// `"schema.table.field"`.
    pub references: Option<String>,
    /// Session key holding the encryption key.
    pub encryption_key: String,
    /// Session key holding the hash salt.
    pub hash_salt_key: String,
}

impl EntityField {
    #[must_use]
    pub fn new(name: &str, logical_type: LogicalType) -> Self {
        Self {
            name: name.to_string(),
            logical_type,
            primary_key: false,
            not_null: false,
            unique: false,
            generated: false,
            default: None,
            default_by_dialect: Vec::new(),
            encrypted: false,
            encrypted_column: String::new(),
            encrypted_type: LogicalType::encrypted_blob(),
            hashed: false,
            hash_column: String::new(),
            hash_type: LogicalType::encrypted_blob(),
            references: None,
            encryption_key: DEFAULT_ENCRYPTION_KEY.to_string(),
            hash_salt_key: DEFAULT_HASH_SALT_KEY.to_string(),
        }
    }

    #[must_use]
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    #[must_use]
    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    #[must_use]
    pub fn generated(mut self) -> Self {
        self.generated = true;
        self
    }

    #[must_use]
    pub fn default_value(mut self, expr: &str) -> Self {
        self.default = Some(expr.to_string());
        self
    }

    #[must_use]
    pub fn default_for(mut self, db: DatabaseType, expr: &str) -> Self {
        self.default_by_dialect.retain(|(d, _)| *d != db);
        self.default_by_dialect.push((db, expr.to_string()));
        self
    }

    /// Store this field encrypted in `column`.
    #[must_use]
    pub fn encrypted(mut self, column: &str) -> Self {
        self.encrypted = true;
        self.encrypted_column = column.to_string();
        self
    }

    #[must_use]
    pub fn encrypted_type(mut self, logical_type: LogicalType) -> Self {
        self.encrypted_type = logical_type;
        self
    }

    /// Keep a salted hash of the plaintext in `column` for equality lookups.
    #[must_use]
    pub fn hashed(mut self, column: &str) -> Self {
        self.hashed = true;
        self.hash_column = column.to_string();
        self
    }

    #[must_use]
    pub fn hash_type(mut self, logical_type: LogicalType) -> Self {
        self.hash_type = logical_type;
        self
    }

    #[must_use]
    pub fn references(mut self, target: &str) -> Self {
        self.references = Some(target.to_string());
        self
    }

    #[must_use]
    pub fn encryption_key(mut self, session_key: &str) -> Self {
        self.encryption_key = session_key.to_string();
        self
    }

    #[must_use]
    pub fn hash_salt_key(mut self, session_key: &str) -> Self {
        self.hash_salt_key = session_key.to_string();
        self
    }

    #[must_use]
    pub fn is_stored_encrypted(&self) -> bool {
        self.encrypted && !self.encrypted_column.is_empty()
    }

    #[must_use]
    pub fn is_stored_hashed(&self) -> bool {
        self.is_stored_encrypted() && self.hashed && !self.hash_column.is_empty()
    }

    /// The DEFAULT expression for `db`: the dialect-specific default, then the generic one,
    /// then the logical type's generated default for generated fields.
    #[must_use]
    pub fn default_for_dialect(&self, db: DatabaseType) -> Option<&str> {
        if let Some((_, expr)) = self.default_by_dialect.iter().find(|(d, _)| *d == db) {
            return Some(expr);
        }
        if let Some(expr) = &self.default {
            return Some(expr);
        }
        if self.generated
            && let Some(defaults) = &self.logical_type.generated_default
        {
            return Some(defaults.get(db));
        }
        None
    }

    /// # Errors
    /// `INVALID_ENTITY_FIELD` when the encryption flags and column names disagree.
    pub fn validate(&self) -> Result<(), SqlMiddlewareDbError> {
        let invalid = |detail: &str| {
            Err(SqlMiddlewareDbError::builder(
                "INVALID_ENTITY_FIELD",
                format!("{}: {detail}", self.name),
            ))
        };
        if self.name.is_empty() {
            return invalid("field name cannot be empty");
        }
        if self.hashed && !self.encrypted {
            return invalid("hashed fields must be encrypted");
        }
        if self.encrypted == self.encrypted_column.is_empty() {
            return invalid("encrypted fields need an encrypted column, and only they may have one");
        }
        if self.hashed && self.hash_column.is_empty() {
            return invalid("hashed fields need a hash column");
        }
        if self.encrypted && self.logical_type.kind == ValueKind::Bytes {
            return invalid("binary fields cannot be encrypted");
        }
        Ok(())
    }
}

/// Transparent data encryption options, rendered after `CREATE TABLE (...)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TdeConfig {
    /// PostgreSQL table access method, e.g. `tde_heap`.
    pub postgres_access_method: Option<String>,
    pub oracle_tablespace: Option<String>,
    /// SQL Server only supports TDE per database; this just marks the expectation.
    pub mssql_tde: bool,
    pub mariadb_encryption: bool,
}

impl TdeConfig {
    #[must_use]
    pub fn clause(&self, db: DatabaseType) -> String {
        match db {
            DatabaseType::Postgres => self
                .postgres_access_method
                .as_ref()
                .map(|am| format!(" USING {am}"))
                .unwrap_or_default(),
            DatabaseType::Oracle => self
                .oracle_tablespace
                .as_ref()
                .map(|ts| format!(" TABLESPACE {ts}"))
                .unwrap_or_default(),
            DatabaseType::Mssql if self.mssql_tde => " /* TDE enabled at database level */".into(),
            DatabaseType::MariaDb if self.mariadb_encryption => " ENCRYPTION='Y'".into(),
            _ => String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    pub name: String,
    pub fields: Vec<EntityField>,
    pub tde: TdeConfig,
    /// Name the table `<name>_t` and its view `<name>_v`.
    pub use_table_suffix: bool,
    /// Give the view the entity's own name.
    pub view_over_table: bool,
}

impl TableSpec {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            fields: Vec::new(),
            tde: TdeConfig::default(),
            use_table_suffix: false,
            view_over_table: false,
        }
    }

    #[must_use]
    pub fn field(mut self, field: EntityField) -> Self {
        self.fields.push(field);
        self
    }

    #[must_use]
    pub fn tde(mut self, tde: TdeConfig) -> Self {
        self.tde = tde;
        self
    }

    #[must_use]
    pub fn table_suffix(mut self) -> Self {
        self.use_table_suffix = true;
        self
    }

    #[must_use]
    pub fn view_over_table(mut self) -> Self {
        self.view_over_table = true;
        self
    }

    #[must_use]
    pub fn has_encrypted_fields(&self) -> bool {
        self.fields.iter().any(EntityField::is_stored_encrypted)
    }

    #[must_use]
    pub fn table_name(&self) -> String {
        if self.use_table_suffix {
            format!("{}_t", self.name)
        } else {
            self.name.clone()
        }
    }

    /// The name callers read through: the decrypting view when there is one.
    #[must_use]
    pub fn view_name(&self) -> String {
        if self.view_over_table {
            self.name.clone()
        } else if !self.has_encrypted_fields() {
            self.table_name()
        } else if self.use_table_suffix {
            format!("{}_v", self.name)
        } else {
            format!("{}_view", self.name)
        }
    }

    #[must_use]
    pub fn find_field(&self, name: &str) -> Option<&EntityField> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// A foreign-key target, resolved or still waiting for its table to be registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldRef {
    Resolved(FieldId),
    Pending(String),
}

#[derive(Debug)]
struct SchemaEntry {
    name: String,
    tables: Vec<TableId>,
}

#[derive(Debug)]
struct TableEntry {
    schema: SchemaId,
    spec: TableSpec,
    references: Vec<Option<FieldRef>>,
}

#[derive(Debug, Default)]
pub struct SchemaRegistry {
    schemas: Vec<SchemaEntry>,
    tables: Vec<TableEntry>,
}

impl SchemaRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a schema; an already registered name returns its existing id.
    pub fn add_schema(&mut self, name: &str) -> SchemaId {
        if let Some(id) = self.schema_id(name) {
            return id;
        }
        self.schemas.push(SchemaEntry {
            name: name.to_string(),
            tables: Vec::new(),
        });
        SchemaId(self.schemas.len() - 1)
    }

    #[must_use]
    pub fn schema_id(&self, name: &str) -> Option<SchemaId> {
        self.schemas.iter().position(|s| s.name == name).map(SchemaId)
    }

    /// # Errors
    /// `INVALID_ENTITY_FIELD` for invalid or duplicated fields, `DUPLICATE_TABLE_NAME` when
    /// the schema already has a table of that name.
    pub fn add_table(&mut self, schema: SchemaId, spec: TableSpec) -> Result<TableId, SqlMiddlewareDbError> {
        let mut seen = HashSet::new();
        for field in &spec.fields {
            field.validate()?;
            if !seen.insert(field.name.as_str()) {
                return Err(SqlMiddlewareDbError::builder(
                    "INVALID_ENTITY_FIELD",
                    format!("{}: duplicate field in {}", field.name, spec.name),
                ));
            }
        }
        let entry = self.schemas.get(schema.0).ok_or_else(|| {
            SqlMiddlewareDbError::builder("INVALID_ENTITY_FIELD", format!("unknown schema {schema:?}"))
        })?;
        if self.table_id(&entry.name, &spec.name).is_some() {
            return Err(SqlMiddlewareDbError::builder(
                "DUPLICATE_TABLE_NAME",
                format!("{}.{}", entry.name, spec.name),
            ));
        }
        let references = spec
            .fields
            .iter()
            .map(|f| f.references.clone().map(FieldRef::Pending))
            .collect();
        let id = TableId(self.tables.len());
        self.tables.push(TableEntry {
            schema,
            spec,
            references,
        });
        self.schemas[schema.0].tables.push(id);
        self.resolve_references();
        Ok(id)
    }

    /// Resolve every pending reference whose target is now registered. Returns how many
    /// remain pending.
    pub fn resolve_references(&mut self) -> usize {
        let mut pending = 0;
        for t in 0..self.tables.len() {
            for i in 0..self.tables[t].references.len() {
                let lookup = match &self.tables[t].references[i] {
                    Some(FieldRef::Pending(target)) => Some(self.field_id(target)),
                    _ => None,
                };
                match lookup {
                    Some(Some(id)) => self.tables[t].references[i] = Some(FieldRef::Resolved(id)),
                    Some(None) => pending += 1,
                    None => {}
                }
            }
        }
        pending
    }

    #[must_use]
    pub fn schema_ids(&self) -> Vec<SchemaId> {
        (0..self.schemas.len()).map(SchemaId).collect()
    }

    #[must_use]
    pub fn schema_name(&self, id: SchemaId) -> &str {
        &self.schemas[id.0].name
    }

    /// Tables of `schema` in registration order.
    #[must_use]
    pub fn tables_of(&self, schema: SchemaId) -> &[TableId] {
        &self.schemas[schema.0].tables
    }

    #[must_use]
    pub fn table(&self, id: TableId) -> &TableSpec {
        &self.tables[id.0].spec
    }

    #[must_use]
    pub fn table_schema(&self, id: TableId) -> SchemaId {
        self.tables[id.0].schema
    }

    #[must_use]
    pub fn table_id(&self, schema: &str, table: &str) -> Option<TableId> {
        let schema = self.schema_id(schema)?;
        self.schemas[schema.0]
            .tables
            .iter()
            .copied()
            .find(|t| self.tables[t.0].spec.name == table)
    }

    /// Look up `"schema.table.field"`.
    #[must_use]
    pub fn field_id(&self, path: &str) -> Option<FieldId> {
        let mut parts = path.splitn(3, '.');
        let (schema, table, field) = (parts.next()?, parts.next()?, parts.next()?);
        let table = self.table_id(schema, table)?;
        let index = self.tables[table.0]
            .spec
            .fields
            .iter()
            .position(|f| f.name == field)?;
        Some(FieldId { table, index })
    }

    /// Ids of `table`'s fields, in declaration order.
    pub fn field_ids(&self, table: TableId) -> impl Iterator<Item = FieldId> + use<> {
        (0..self.tables[table.0].spec.fields.len()).map(move |index| FieldId { table, index })
    }

    #[must_use]
    pub fn field(&self, id: FieldId) -> &EntityField {
        &self.tables[id.table.0].spec.fields[id.index]
    }

    /// The resolved target of `field`'s reference, if it has one.
    ///
    /// # Errors
    /// `UNRESOLVED_FIELD_REFERENCE` when the target is not registered.
    pub fn reference_target(&self, field: FieldId) -> Result<Option<FieldId>, SqlMiddlewareDbError> {
        match &self.tables[field.table.0].references[field.index] {
            None => Ok(None),
            Some(FieldRef::Resolved(id)) => Ok(Some(*id)),
            Some(FieldRef::Pending(target)) => self.field_id(target).map(Some).ok_or_else(|| {
                SqlMiddlewareDbError::builder(
                    "UNRESOLVED_FIELD_REFERENCE",
                    format!("{} references unknown field {target}", self.field(field).name),
                )
            }),
        }
    }

    fn qualify(&self, table: TableId, name: String) -> String {
        let schema = &self.schemas[self.tables[table.0].schema.0].name;
        if schema.is_empty() {
            name
        } else {
            format!("{schema}.{name}")
        }
    }

    #[must_use]
    pub fn full_table_name(&self, id: TableId) -> String {
        self.qualify(id, self.table(id).table_name())
    }

    #[must_use]
    pub fn full_view_name(&self, id: TableId) -> String {
        self.qualify(id, self.table(id).view_name())
    }

    /// Check the known fields of `record` against their logical types; other keys are left
    /// to the caller.
    ///
    /// # Errors
    /// `FIELD_VALUE_TYPE_MISMATCH`.
    pub fn validate_record(&self, table: TableId, record: &NamedArgs) -> Result<(), SqlMiddlewareDbError> {
        for field in &self.table(table).fields {
            if let Some(value) = record.get(&field.name) {
                check_value_kind(&field.name, field.logical_type.kind, value)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn customers() -> TableSpec {
        TableSpec::new("customers")
            .field(EntityField::new("id", LogicalType::uid()).primary_key().generated())
            .field(EntityField::new("ssn", LogicalType::string()).encrypted("ssn_enc").hashed("ssn_hash"))
    }

    #[test]
    fn field_invariants_are_enforced() {
        let mut hashed_only = EntityField::new("ssn", LogicalType::string());
        hashed_only.hashed = true;
        hashed_only.hash_column = "ssn_hash".into();
        assert_eq!(hashed_only.validate().unwrap_err().code(), "INVALID_ENTITY_FIELD");

        let mut no_column = EntityField::new("ssn", LogicalType::string());
        no_column.encrypted = true;
        assert!(no_column.validate().is_err());

        let mut stray_column = EntityField::new("ssn", LogicalType::string());
        stray_column.encrypted_column = "ssn_enc".into();
        assert!(stray_column.validate().is_err());

        let mut registry = SchemaRegistry::new();
        let app = registry.add_schema("app");
        let err = registry
            .add_table(app, TableSpec::new("bad").field(hashed_only))
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_ENTITY_FIELD");
        assert!(registry.add_table(app, customers()).is_ok());
    }

    #[test]
    fn names_follow_suffix_and_view_settings() {
        let mut registry = SchemaRegistry::new();
        let app = registry.add_schema("app");
        assert_eq!(registry.add_schema("app"), app);

        let plain = registry
            .add_table(app, TableSpec::new("tags").field(EntityField::new("tag", LogicalType::string())))
            .unwrap();
        let encrypted = registry.add_table(app, customers()).unwrap();
        let suffixed = registry.add_table(app, TableSpec { name: "people".into(), ..customers().table_suffix() }).unwrap();
        let over = registry
            .add_table(app, TableSpec { name: "cards".into(), ..customers().view_over_table().table_suffix() })
            .unwrap();

        assert_eq!(registry.full_view_name(plain), "app.tags");
        assert_eq!(registry.full_table_name(encrypted), "app.customers");
        assert_eq!(registry.full_view_name(encrypted), "app.customers_view");
        assert_eq!(registry.full_table_name(suffixed), "app.people_t");
        assert_eq!(registry.full_view_name(suffixed), "app.people_v");
        assert_eq!(registry.full_view_name(over), "app.cards");
    }

    #[test]
    fn references_resolve_in_any_order() {
        let mut registry = SchemaRegistry::new();
        let sales = registry.add_schema("sales");
        let orders = registry
            .add_table(
                sales,
                TableSpec::new("orders")
                    .field(EntityField::new("customer_id", LogicalType::uid()).references("crm.customers.id")),
            )
            .unwrap();
        assert_eq!(registry.resolve_references(), 1);
        let field = FieldId { table: orders, index: 0 };
        assert_eq!(registry.reference_target(field).unwrap_err().code(), "UNRESOLVED_FIELD_REFERENCE");

        let crm = registry.add_schema("crm");
        registry.add_table(crm, customers()).unwrap();
        assert_eq!(registry.resolve_references(), 0);
        let target = registry.reference_target(field).unwrap().unwrap();
        assert_eq!(registry.field(target).name, "id");
        assert_eq!(registry.field_id("crm.customers.ssn").map(FieldId::index), Some(1));
    }

    #[test]
    fn value_kinds() {
        assert!(ValueKind::Int64.accepts(&RowValues::Float(3.0)));
        assert!(!ValueKind::Int64.accepts(&RowValues::Float(3.5)));
        assert!(ValueKind::Timestamp.accepts(&RowValues::Text("2024-01-02 03:04:05".into())));
        assert!(ValueKind::Bool.accepts(&RowValues::Null));
        assert!(!ValueKind::String.accepts(&RowValues::Int(1)));
        let err = check_value_kind("age", ValueKind::Int64, &RowValues::Text("x".into())).unwrap_err();
        assert_eq!(err.code(), "FIELD_VALUE_TYPE_MISMATCH");
        assert!(err.to_string().contains("age expects int64, got string"));
    }

    #[test]
    fn defaults_prefer_dialect_then_generic_then_generated() {
        let id = EntityField::new("id", LogicalType::uid()).generated();
        assert!(id.default_for_dialect(DatabaseType::MariaDb).unwrap().starts_with("CONCAT(HEX("));
        let status = EntityField::new("status", LogicalType::string())
            .default_value("'new'")
            .default_for(DatabaseType::Oracle, "'NEW'");
        assert_eq!(status.default_for_dialect(DatabaseType::Oracle), Some("'NEW'"));
        assert_eq!(status.default_for_dialect(DatabaseType::Postgres), Some("'new'"));
        assert_eq!(EntityField::new("x", LogicalType::uid()).default_for_dialect(DatabaseType::Postgres), None);
    }
}
