use crate::error::SqlMiddlewareDbError;
use crate::injection::check_like_value;
use crate::types::{DatabaseType, RowValues};

use super::{Filter, allocate_param, valid_identifier};

/// A reusable set of AND-joined predicates that can be attached to any builder with
/// `.conditions(group)`.
///
/// Parameter names are `<prefix>_<hint>_<n>`, so two groups with different prefixes never
/// collide.
#[derive(Debug)]
pub struct ConditionGroup {
    db: DatabaseType,
    prefix: String,
    counter: usize,
    state: Result<Filter, SqlMiddlewareDbError>,
}

impl ConditionGroup {
    #[must_use]
    pub fn new(db: DatabaseType, prefix: &str) -> Self {
        Self {
            db,
            prefix: prefix.to_string(),
            counter: 0,
            state: Ok(Filter::default()),
        }
    }

    fn next_param(&mut self, hint: &str) -> String {
        self.counter += 1;
        format!("{}_{hint}_{}", self.prefix, self.counter)
    }

    fn apply<F>(mut self, f: F) -> Self
    where
        F: FnOnce(DatabaseType, &mut Filter, &mut dyn FnMut(&str) -> String) -> Result<(), SqlMiddlewareDbError>,
    {
        let db = self.db;
        let mut state = std::mem::replace(&mut self.state, Ok(Filter::default()));
        if let Ok(filter) = &mut state {
            let mut names = |hint: &str| self.next_param(hint);
            if let Err(err) = f(db, filter, &mut names) {
                state = Err(err);
            }
        }
        self.state = state;
        self
    }

    /// `field = :p`
    #[must_use]
    pub fn eq(self, field: &str, value: impl Into<RowValues>) -> Self {
        self.compare(field, "=", value)
    }

    /// `field != :p`
    #[must_use]
    pub fn ne(self, field: &str, value: impl Into<RowValues>) -> Self {
        self.compare(field, "!=", value)
    }

    /// `field <op> :p` with `op` from the dialect whitelist.
    #[must_use]
    pub fn compare(self, field: &str, op: &str, value: impl Into<RowValues>) -> Self {
        let value = value.into();
        self.apply(|db, filter, names| {
            let param = names("eq");
            filter.compare(db, field, op, value, &param)
        })
    }

    /// `field IN (:p1, :p2, ...)`; an empty list adds nothing.
    #[must_use]
    pub fn in_strings<S: AsRef<str>>(self, field: &str, values: &[S]) -> Self {
        self.apply(|db, filter, names| {
            valid_identifier(db, field, "INVALID_WHERE_FIELD_NAME")?;
            if values.is_empty() {
                return Ok(());
            }
            let mut placeholders = Vec::with_capacity(values.len());
            for value in values {
                let param = allocate_param(&filter.args, &names("in"));
                placeholders.push(format!(":{param}"));
                filter
                    .args
                    .insert(param, RowValues::Text(value.as_ref().to_string()));
            }
            filter.conditions.push(format!(
                "{} IN ({})",
                db.quote_field(field),
                placeholders.join(", ")
            ));
            Ok(())
        })
    }

    /// `field IN (1, 2, 3)` with the integers inlined; an empty list adds nothing.
    #[must_use]
    pub fn in_int64(self, field: &str, values: &[i64]) -> Self {
        self.apply(|db, filter, _| {
            valid_identifier(db, field, "INVALID_WHERE_FIELD_NAME")?;
            if values.is_empty() {
                return Ok(());
            }
            let list = values
                .iter()
                .map(i64::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            filter
                .conditions
                .push(format!("{} IN ({list})", db.quote_field(field)));
            Ok(())
        })
    }

    /// `(f1 IN (:p1, :p2) OR f2 IN (:p1, :p2))`, one shared parameter per value.
    #[must_use]
    pub fn or_in_strings<F: AsRef<str>, S: AsRef<str>>(self, fields: &[F], values: &[S]) -> Self {
        self.apply(|db, filter, names| {
            if fields.is_empty() || values.is_empty() {
                return Ok(());
            }
            let mut placeholders = Vec::with_capacity(values.len());
            for value in values {
                let param = allocate_param(&filter.args, &names("in"));
                placeholders.push(format!(":{param}"));
                filter
                    .args
                    .insert(param, RowValues::Text(value.as_ref().to_string()));
            }
            let list = placeholders.join(", ");
            let mut parts = Vec::with_capacity(fields.len());
            for field in fields {
                valid_identifier(db, field.as_ref(), "INVALID_WHERE_FIELD_NAME")?;
                parts.push(format!("{} IN ({list})", db.quote_field(field.as_ref())));
            }
            filter.conditions.push(format!("({})", parts.join(" OR ")));
            Ok(())
        })
    }

    /// `(f1 = :p OR f2 = :p ...)`: the value matches any of the fields.
    #[must_use]
    pub fn or_eq_any<S: AsRef<str>>(self, fields: &[S], value: impl Into<RowValues>) -> Self {
        let value = value.into();
        self.apply(|db, filter, names| {
            if fields.is_empty() {
                return Ok(());
            }
            let param = allocate_param(&filter.args, &names("any"));
            let mut parts = Vec::with_capacity(fields.len());
            for field in fields {
                valid_identifier(db, field.as_ref(), "INVALID_WHERE_FIELD_NAME")?;
                parts.push(format!("{} = :{param}", db.quote_field(field.as_ref())));
            }
            filter.args.insert(param, value);
            filter.conditions.push(format!("({})", parts.join(" OR ")));
            Ok(())
        })
    }

    /// Case-insensitive substring search across fields:
    /// `(LOWER(f1) LIKE LOWER(:p) OR ...)` bound to `%value%`. An empty value adds nothing.
    #[must_use]
    pub fn search_like<S: AsRef<str>>(self, value: &str, fields: &[S]) -> Self {
        self.apply(|db, filter, names| {
            if value.is_empty() || fields.is_empty() {
                return Ok(());
            }
            let pattern = format!("%{value}%");
            check_like_value(&pattern)?;
            let param = allocate_param(&filter.args, &names("search"));
            let mut parts = Vec::with_capacity(fields.len());
            for field in fields {
                valid_identifier(db, field.as_ref(), "INVALID_WHERE_FIELD_NAME")?;
                parts.push(format!(
                    "LOWER({}) LIKE LOWER(:{param})",
                    db.quote_field(field.as_ref())
                ));
            }
            filter.args.insert(param, RowValues::Text(pattern));
            filter.conditions.push(format!("({})", parts.join(" OR ")));
            Ok(())
        })
    }

    /// Raw predicate, appended as is. Only for program-controlled SQL.
    #[must_use]
    pub fn and_raw(self, expr: &str) -> Self {
        self.apply(|_, filter, _| {
            filter.raw(expr);
            Ok(())
        })
    }

    /// `true` when nothing has been added (or an error was recorded).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.as_ref().map_or(true, Filter::is_empty)
    }

    pub(crate) fn into_parts(
        self,
    ) -> Result<(Vec<String>, crate::types::NamedArgs), SqlMiddlewareDbError> {
        self.state.map(|filter| (filter.conditions, filter.args))
    }
}
