use std::collections::HashMap;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::ResultSet;
use crate::error::SqlMiddlewareDbError;
use crate::types::RowValues;

/// Target type for a result column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FieldType {
    Int64,
    Float64,
    Bool,
    String,
    Timestamp,
    /// A PostgreSQL array literal (`{a,b}`) or JSON array text, as a JSON array of strings.
    ArrayString,
    Json,
}

impl FromStr for FieldType {
    type Err = SqlMiddlewareDbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "int64" => Ok(FieldType::Int64),
            "float64" => Ok(FieldType::Float64),
            "bool" => Ok(FieldType::Bool),
            "string" => Ok(FieldType::String),
            "timestamp" => Ok(FieldType::Timestamp),
            "array-string" => Ok(FieldType::ArrayString),
            "json" => Ok(FieldType::Json),
            other => Err(SqlMiddlewareDbError::ConfigError(format!(
                "unknown field type {other:?}"
            ))),
        }
    }
}

/// Column name (after deformatting) to target type.
pub type FieldTypeMapping = HashMap<String, FieldType>;

const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
];

fn mismatch(column: &str, target: FieldType, value: &RowValues) -> SqlMiddlewareDbError {
    SqlMiddlewareDbError::ParameterError(format!(
        "column {column:?}: cannot convert {} to {target:?}",
        value.type_name()
    ))
}

fn parse_array_string(text: &str) -> Option<Vec<String>> {
    let trimmed = text.trim();
    if let Ok(JsonValue::Array(items)) = serde_json::from_str::<JsonValue>(trimmed) {
        return Some(
            items
                .into_iter()
                .map(|item| match item {
                    JsonValue::String(s) => s,
                    other => other.to_string(),
                })
                .collect(),
        );
    }
    let inner = trimmed.strip_prefix('{')?.strip_suffix('}')?;
    if inner.is_empty() {
        return Some(Vec::new());
    }
    Some(
        inner
            .split(',')
            .map(|item| item.trim().trim_matches('"').to_string())
            .collect(),
    )
}

/// Convert one value to `target`. NULL stays NULL.
///
/// # Errors
/// Returns `ParameterError` when the value cannot be represented as `target`.
pub fn coerce_value(
    column: &str,
    value: RowValues,
    target: FieldType,
) -> Result<RowValues, SqlMiddlewareDbError> {
    if value.is_null() {
        return Ok(value);
    }
    let converted = match (target, &value) {
        (FieldType::Int64, RowValues::Int(_))
        | (FieldType::Float64, RowValues::Float(_))
        | (FieldType::Bool, RowValues::Bool(_))
        | (FieldType::String, RowValues::Text(_))
        | (FieldType::Timestamp, RowValues::Timestamp(_))
        | (FieldType::Json, RowValues::JSON(_)) => Some(value.clone()),
        (FieldType::Int64, RowValues::Text(s)) => s.trim().parse().ok().map(RowValues::Int),
        (FieldType::Int64, RowValues::Float(f)) if f.fract() == 0.0 => {
            // Oracle NUMBER columns arrive as floats
            #[allow(clippy::cast_possible_truncation)]
            let i = *f as i64;
            Some(RowValues::Int(i))
        }
        (FieldType::Int64, RowValues::Bool(b)) => Some(RowValues::Int(i64::from(*b))),
        #[allow(clippy::cast_precision_loss)]
        (FieldType::Float64, RowValues::Int(i)) => {
            let f = *i as f64;
            Some(RowValues::Float(f))
        }
        (FieldType::Float64, RowValues::Text(s)) => s.trim().parse().ok().map(RowValues::Float),
        (FieldType::Bool, RowValues::Int(_)) => value.as_bool().copied().map(RowValues::Bool),
        (FieldType::Bool, RowValues::Text(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "t" | "1" | "y" => Some(RowValues::Bool(true)),
            "false" | "f" | "0" | "n" => Some(RowValues::Bool(false)),
            _ => None,
        },
        (FieldType::String, RowValues::Blob(bytes)) => {
            String::from_utf8(bytes.clone()).ok().map(RowValues::Text)
        }
        (FieldType::String, RowValues::Int(i)) => Some(RowValues::Text(i.to_string())),
        (FieldType::String, RowValues::Float(f)) => Some(RowValues::Text(f.to_string())),
        (FieldType::String, RowValues::Bool(b)) => Some(RowValues::Text(b.to_string())),
        (FieldType::String, RowValues::Timestamp(ts)) => {
            Some(RowValues::Text(ts.format("%Y-%m-%d %H:%M:%S%.f").to_string()))
        }
        (FieldType::String, RowValues::JSON(v)) => Some(RowValues::Text(v.to_string())),
        (FieldType::Timestamp, RowValues::Text(s)) => TIMESTAMP_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(s.trim(), fmt).ok())
            .map(RowValues::Timestamp),
        (FieldType::ArrayString, RowValues::Text(s)) => parse_array_string(s)
            .map(|items| RowValues::JSON(JsonValue::from(items))),
        (FieldType::ArrayString, RowValues::JSON(JsonValue::Array(_))) => Some(value.clone()),
        (FieldType::Json, RowValues::Text(s)) => {
            serde_json::from_str(s).ok().map(RowValues::JSON)
        }
        (FieldType::Json, RowValues::Blob(bytes)) => {
            serde_json::from_slice(bytes).ok().map(RowValues::JSON)
        }
        _ => None,
    };
    converted.ok_or_else(|| mismatch(column, target, &value))
}

/// Apply `mapping` to every row of `result`; unmapped columns are left alone.
///
/// # Errors
/// Returns the first conversion failure.
pub fn apply_field_types(
    result: &mut ResultSet,
    mapping: &FieldTypeMapping,
) -> Result<(), SqlMiddlewareDbError> {
    if mapping.is_empty() {
        return Ok(());
    }
    let Some(columns) = result.get_column_names().cloned() else {
        return Ok(());
    };
    let targets: Vec<Option<FieldType>> = columns.iter().map(|c| mapping.get(c).copied()).collect();
    for row in &mut result.results {
        for (idx, target) in targets.iter().enumerate() {
            let Some(target) = target else { continue };
            if let Some(slot) = row.rows.get_mut(idx) {
                let value = std::mem::replace(slot, RowValues::Null);
                *slot = coerce_value(&columns[idx], value, *target)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn array_string_forms() {
        let pg = coerce_value("tags", RowValues::Text("{a,\"b c\"}".into()), FieldType::ArrayString).unwrap();
        assert_eq!(pg, RowValues::JSON(serde_json::json!(["a", "b c"])));
        let js = coerce_value("tags", RowValues::Text("[\"x\", 1]".into()), FieldType::ArrayString).unwrap();
        assert_eq!(js, RowValues::JSON(serde_json::json!(["x", "1"])));
        let empty = coerce_value("tags", RowValues::Text("{}".into()), FieldType::ArrayString).unwrap();
        assert_eq!(empty, RowValues::JSON(serde_json::json!([])));
    }

    #[test]
    fn scalar_conversions() {
        assert_eq!(coerce_value("n", RowValues::Float(3.0), FieldType::Int64).unwrap(), RowValues::Int(3));
        assert_eq!(coerce_value("b", RowValues::Int(0), FieldType::Bool).unwrap(), RowValues::Bool(false));
        assert_eq!(
            coerce_value("s", RowValues::Blob(b"hi".to_vec()), FieldType::String).unwrap(),
            RowValues::Text("hi".into())
        );
        assert!(coerce_value("t", RowValues::Text("2024-02-01 10:00:00".into()), FieldType::Timestamp).is_ok());
        assert!(coerce_value("n", RowValues::Text("abc".into()), FieldType::Int64).is_err());
        assert_eq!(coerce_value("n", RowValues::Null, FieldType::Int64).unwrap(), RowValues::Null);
    }

    #[test]
    fn mapping_applies_by_column() {
        let mut rs = ResultSet::with_capacity(1);
        rs.set_column_names(Arc::new(vec!["id".into(), "tags".into()]));
        rs.add_row_values(vec![RowValues::Text("7".into()), RowValues::Text("{a}".into())]);
        let mapping: FieldTypeMapping = [
            ("id".to_string(), "int64".parse().unwrap()),
            ("tags".to_string(), FieldType::ArrayString),
        ]
        .into_iter()
        .collect();
        apply_field_types(&mut rs, &mapping).unwrap();
        assert_eq!(rs.results[0].get("id"), Some(&RowValues::Int(7)));
        assert_eq!(rs.results[0].get("tags"), Some(&RowValues::JSON(serde_json::json!(["a"]))));
    }
}
