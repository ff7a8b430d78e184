//! Encrypted writes and decrypted reads inside a [`Transaction`].
//!
//! Each operation first publishes the keys it needs to the session (once per transaction),
//! then runs an ordinary builder statement whose encrypted columns are set to encryption
//! expressions over a bound plaintext. Keys are never part of the statement text.

use super::expressions::{decrypt_expr, encrypt_expr, hash_expr, session_key_expr};
use super::keys::{KeyResolver, KeySource, validate_session_key};
use super::schema::{DEFAULT_ENCRYPTION_KEY, DEFAULT_HASH_SALT_KEY, EntityField, ValueKind, check_value_kind};
use crate::error::SqlMiddlewareDbError;
use crate::executor::{Executor, QueryOptions};
use crate::injection::check_identifier;
use crate::query_builder::{InsertQuery, OrderDirection, SelectQuery, UpdateQuery};
use crate::results::{CustomDbRow, ResultSet};
use crate::transaction::Transaction;
use crate::types::{DatabaseType, NamedArgs, RowValues};

/// How one field of the caller's data is written encrypted.
#[derive(Debug, Clone, PartialEq)]
pub struct EncryptedColumnDef {
    /// Key of the plaintext in the data map.
    pub field: String,
    /// Column receiving the ciphertext.
    pub column: String,
    pub session_key: String,
    pub key_source: KeySource,
    /// Column receiving the salted hash, if any.
    pub hash_column: Option<String>,
    pub salt_session_key: String,
    /// Unsalted hash when `None`.
    pub salt_source: Option<KeySource>,
    pub kind: ValueKind,
}

impl EncryptedColumnDef {
    #[must_use]
    pub fn new(field: &str, column: &str, key_source: KeySource) -> Self {
        Self {
            field: field.to_string(),
            column: column.to_string(),
            session_key: DEFAULT_ENCRYPTION_KEY.to_string(),
            key_source,
            hash_column: None,
            salt_session_key: DEFAULT_HASH_SALT_KEY.to_string(),
            salt_source: None,
            kind: ValueKind::String,
        }
    }

    /// The definition matching an encrypted entity field.
    #[must_use]
    pub fn for_field(field: &EntityField, key_source: KeySource, salt_source: Option<KeySource>) -> Self {
        Self {
            field: field.name.clone(),
            column: field.encrypted_column.clone(),
            session_key: field.encryption_key.clone(),
            key_source,
            hash_column: field.is_stored_hashed().then(|| field.hash_column.clone()),
            salt_session_key: field.hash_salt_key.clone(),
            salt_source,
            kind: field.logical_type.kind,
        }
    }

    #[must_use]
    pub fn session_key(mut self, key: &str) -> Self {
        self.session_key = key.to_string();
        self
    }

    #[must_use]
    pub fn hashed(mut self, column: &str, salt_source: Option<KeySource>) -> Self {
        self.hash_column = Some(column.to_string());
        self.salt_source = salt_source;
        self
    }

    #[must_use]
    pub fn salt_session_key(mut self, key: &str) -> Self {
        self.salt_session_key = key.to_string();
        self
    }

    #[must_use]
    pub fn kind(mut self, kind: ValueKind) -> Self {
        self.kind = kind;
        self
    }
}

/// How one encrypted column is read back.
#[derive(Debug, Clone, PartialEq)]
pub struct DecryptedColumnDef {
    /// Ciphertext column; unused when the view already decrypts.
    pub column: String,
    /// Name of the plaintext in the result.
    pub alias: String,
    pub session_key: String,
    pub key_source: KeySource,
    /// The source is a view exposing `alias` already decrypted; only the key is needed.
    pub view_has_decrypt: bool,
}

impl DecryptedColumnDef {
    #[must_use]
    pub fn new(column: &str, alias: &str, key_source: KeySource) -> Self {
        Self {
            column: column.to_string(),
            alias: alias.to_string(),
            session_key: DEFAULT_ENCRYPTION_KEY.to_string(),
            key_source,
            view_has_decrypt: false,
        }
    }

    #[must_use]
    pub fn for_field(field: &EntityField, key_source: KeySource) -> Self {
        Self::new(&field.encrypted_column, &field.name, key_source).session_key(&field.encryption_key)
    }

    #[must_use]
    pub fn session_key(mut self, key: &str) -> Self {
        self.session_key = key.to_string();
        self
    }

    #[must_use]
    pub fn through_view(mut self) -> Self {
        self.view_has_decrypt = true;
        self
    }
}

/// A SELECT with decrypted columns.
#[derive(Debug, Clone)]
pub struct DecryptedSelect {
    source: String,
    columns: Vec<String>,
    decrypted: Vec<DecryptedColumnDef>,
    filter: NamedArgs,
    order_by: Option<(String, OrderDirection)>,
    limit: Option<u64>,
}

impl DecryptedSelect {
    #[must_use]
    pub fn new(source: &str) -> Self {
        Self {
            source: source.to_string(),
            columns: Vec::new(),
            decrypted: Vec::new(),
            filter: NamedArgs::new(),
            order_by: None,
            limit: None,
        }
    }

    /// Plain columns to return. Without any, every column of the source is returned.
    #[must_use]
    pub fn columns(mut self, columns: &[&str]) -> Self {
        self.columns.extend(columns.iter().map(ToString::to_string));
        self
    }

    #[must_use]
    pub fn decrypt(mut self, def: DecryptedColumnDef) -> Self {
        self.decrypted.push(def);
        self
    }

    #[must_use]
    pub fn where_eq(mut self, field: &str, value: impl Into<RowValues>) -> Self {
        self.filter.insert(field.to_string(), value.into());
        self
    }

    #[must_use]
    pub fn order_by(mut self, field: &str, direction: OrderDirection) -> Self {
        self.order_by = Some((field.to_string(), direction));
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    fn to_query(&self, db: DatabaseType) -> Result<SelectQuery, SqlMiddlewareDbError> {
        let mut query = SelectQuery::new(db).from(&self.source);
        if self.columns.is_empty() {
            if self.decrypted.iter().all(|d| d.view_has_decrypt) {
                query = query.fields(&["*"]);
            } else {
                query = query.fields(&[format!("{}.*", self.source)]);
            }
        } else {
            query = query.fields(self.columns.as_slice());
        }
        for def in &self.decrypted {
            check_identifier(db, &def.alias)?;
            validate_session_key(&def.session_key)?;
            if def.view_has_decrypt {
                if !self.columns.is_empty() {
                    query = query.fields(&[def.alias.as_str()]);
                }
            } else {
                check_identifier(db, &def.column)?;
                let key = session_key_expr(db, &def.session_key);
                query = query.field_raw(&format!(
                    "{} AS {}",
                    decrypt_expr(db, &db.quote_field(&def.column), &key),
                    db.quote_identifier(&def.alias)
                ));
            }
        }
        for (field, value) in &self.filter {
            query = query.where_eq(field, value.clone());
        }
        if let Some((field, direction)) = &self.order_by {
            query = query.order_by(field, *direction);
        }
        if let Some(limit) = self.limit {
            query = query.limit(limit);
        }
        Ok(query)
    }
}

/// Text bound into an encryption or hash expression.
fn plaintext(field: &str, value: &RowValues) -> Result<RowValues, SqlMiddlewareDbError> {
    let text = match value {
        RowValues::Null => return Ok(RowValues::Null),
        RowValues::Text(s) => s.clone(),
        RowValues::Int(i) => i.to_string(),
        RowValues::Float(f) => f.to_string(),
        RowValues::Bool(b) => b.to_string(),
        RowValues::Timestamp(ts) => ts.format("%Y-%m-%d %H:%M:%S%.f").to_string(),
        RowValues::JSON(v) => v.to_string(),
        RowValues::Blob(_) | RowValues::Expression(_) => {
            return Err(SqlMiddlewareDbError::builder(
                "FIELD_VALUE_TYPE_MISMATCH",
                format!("field {field} cannot encrypt a {} value", value.type_name()),
            ));
        }
    };
    Ok(RowValues::Text(text))
}

/// Placeholder for the plaintext, typed as text where the encryption functions need it.
fn plaintext_placeholder(db: DatabaseType, param: &str) -> String {
    match db {
        DatabaseType::Postgres => format!(":{param}::text"),
        DatabaseType::Mssql => format!("CAST(:{param} AS VARCHAR(MAX))"),
        DatabaseType::Oracle | DatabaseType::MariaDb => format!(":{param}"),
    }
}

/// Encrypted (and hash) column assignments for the defs present in `data`.
fn encrypted_assignments(
    db: DatabaseType,
    data: &NamedArgs,
    defs: &[EncryptedColumnDef],
) -> Result<Vec<(String, String, NamedArgs)>, SqlMiddlewareDbError> {
    let mut assignments = Vec::new();
    for def in defs {
        let Some(value) = data.get(&def.field) else {
            continue;
        };
        check_value_kind(&def.field, def.kind, value)?;
        let param = format!("enc_{}", def.field);
        let mut args = NamedArgs::new();
        args.insert(param.clone(), plaintext(&def.field, value)?);
        let bound = plaintext_placeholder(db, &param);
        let key = session_key_expr(db, &def.session_key);
        assignments.push((def.column.clone(), encrypt_expr(db, &bound, &key), args.clone()));
        if let Some(hash_column) = &def.hash_column {
            let salt = def
                .salt_source
                .as_ref()
                .map(|_| session_key_expr(db, &def.salt_session_key));
            // the plaintext is already bound by the encryption assignment
            assignments.push((hash_column.clone(), hash_expr(db, &bound, salt.as_deref()), NamedArgs::new()));
        }
    }
    Ok(assignments)
}

fn plain_fields<'d>(
    data: &'d NamedArgs,
    defs: &[EncryptedColumnDef],
) -> impl Iterator<Item = (&'d String, &'d RowValues)> {
    data.iter().filter(|(name, _)| !defs.iter().any(|d| &d.field == *name))
}

impl Transaction {
    /// Publish each `(session key, source)` pair not yet set in this transaction.
    /// Session-sourced keys are expected to be present already and are skipped.
    ///
    /// # Errors
    /// Invalid key names, key resolution failures, or the driver error.
    pub async fn inject_keys<'k, I>(&mut self, keys: I, resolver: &KeyResolver<'_>) -> Result<(), SqlMiddlewareDbError>
    where
        I: IntoIterator<Item = (&'k str, &'k KeySource)>,
    {
        for (session_key, source) in keys {
            validate_session_key(session_key)?;
            if matches!(source, KeySource::DbSessionCurrentSetting(_)) || self.has_session_key(session_key) {
                continue;
            }
            let value = resolver.resolve(source)?;
            self.set_session_key(session_key, &value).await?;
        }
        Ok(())
    }

    async fn inject_encryption_keys(
        &mut self,
        defs: &[EncryptedColumnDef],
        resolver: &KeyResolver<'_>,
    ) -> Result<(), SqlMiddlewareDbError> {
        let mut keys: Vec<(&str, &KeySource)> = Vec::new();
        for def in defs {
            keys.push((&def.session_key, &def.key_source));
            if def.hash_column.is_some()
                && let Some(salt) = &def.salt_source
            {
                keys.push((&def.salt_session_key, salt));
            }
        }
        self.inject_keys(keys, resolver).await
    }

    /// Insert `data` into `table`, encrypting (and hashing) the fields named by `defs`.
    ///
    /// # Errors
    /// `FIELD_VALUE_TYPE_MISMATCH`, key resolution errors, builder, injection or driver
    /// errors.
    pub async fn insert_encrypted(
        &mut self,
        table: &str,
        data: &NamedArgs,
        defs: &[EncryptedColumnDef],
        returning: &[&str],
        resolver: &KeyResolver<'_>,
    ) -> Result<ResultSet, SqlMiddlewareDbError> {
        let db = self.dialect();
        let assignments = encrypted_assignments(db, data, defs)?;
        self.inject_encryption_keys(defs, resolver).await?;

        let mut query = InsertQuery::new(db).into(table);
        for (field, value) in plain_fields(data, defs) {
            query = query.set(field, value.clone());
        }
        for (column, expr, args) in assignments {
            query = query.set_expr(&column, &expr, args);
        }
        if !returning.is_empty() {
            query = query.returning(returning);
        }
        Executor::new(&mut *self).insert(query).await
    }

    /// Update `table` rows matching every `filter` pair, encrypting the fields named by
    /// `defs`.
    ///
    /// # Errors
    /// As [`Transaction::insert_encrypted`].
    pub async fn update_encrypted(
        &mut self,
        table: &str,
        data: &NamedArgs,
        defs: &[EncryptedColumnDef],
        filter: &NamedArgs,
        returning: &[&str],
        resolver: &KeyResolver<'_>,
    ) -> Result<ResultSet, SqlMiddlewareDbError> {
        let db = self.dialect();
        let assignments = encrypted_assignments(db, data, defs)?;
        self.inject_encryption_keys(defs, resolver).await?;

        let mut query = UpdateQuery::new(db).table(table);
        for (field, value) in plain_fields(data, defs) {
            query = query.set(field, value.clone());
        }
        for (column, expr, args) in assignments {
            query = query.set_expr(&column, &expr, args);
        }
        for (field, value) in filter {
            query = query.where_eq(field, value.clone());
        }
        if !returning.is_empty() {
            query = query.returning(returning);
        }
        Executor::new(&mut *self).update(query).await
    }

    /// Run `select`, returning decrypted columns as text.
    ///
    /// # Errors
    /// Key resolution errors, builder, injection or driver errors.
    pub async fn select_decrypted(
        &mut self,
        select: &DecryptedSelect,
        resolver: &KeyResolver<'_>,
    ) -> Result<ResultSet, SqlMiddlewareDbError> {
        let db = self.dialect();
        let query = select.to_query(db)?;
        let keys: Vec<(&str, &KeySource)> = select
            .decrypted
            .iter()
            .map(|d| (d.session_key.as_str(), &d.key_source))
            .collect();
        self.inject_keys(keys, resolver).await?;

        let mut rows = Executor::new(&mut *self).select(query, &QueryOptions::default()).await?;
        let aliases: Vec<String> = select
            .decrypted
            .iter()
            .map(|d| db.deformat_identifier(&d.alias))
            .collect();
        for row in &mut rows.results {
            for alias in &aliases {
                if let Some(index) = row.get_column_index(alias)
                    && let RowValues::Blob(bytes) = &row.rows[index]
                {
                    row.rows[index] = RowValues::Text(String::from_utf8_lossy(bytes).into_owned());
                }
            }
        }
        Ok(rows)
    }

    /// First row of [`Transaction::select_decrypted`], limited to one row.
    ///
    /// # Errors
    /// As [`Transaction::select_decrypted`].
    pub async fn select_one_decrypted(
        &mut self,
        select: DecryptedSelect,
        resolver: &KeyResolver<'_>,
    ) -> Result<Option<CustomDbRow>, SqlMiddlewareDbError> {
        let rows = self.select_decrypted(&select.limit(1), resolver).await?;
        Ok(rows.results.into_iter().next())
    }
}
