use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde_json::Value;
use sqlx::mysql::MySqlRow;
use sqlx::{Column, Row, TypeInfo};

use crate::results::ResultSet;
use crate::types::RowValues;

/// Build a result set from fetched rows. Column names come from the first row, so an empty
/// result has none.
#[must_use]
pub fn build_result_set(rows: &[MySqlRow]) -> ResultSet {
    let mut result_set = ResultSet::with_capacity(rows.len());
    let column_names: Vec<String> = rows
        .first()
        .map(|row| row.columns().iter().map(|c| c.name().to_string()).collect())
        .unwrap_or_default();
    result_set.set_column_names(Arc::new(column_names));
    for row in rows {
        let values = (0..row.columns().len()).map(|idx| extract_value(row, idx)).collect();
        result_set.add_row_values(values);
    }
    result_set
}

/// Probe the typed decoders in order of likelihood. sqlx refuses a decoder whose type is
/// incompatible with the column and accepts any decoder for NULL.
fn extract_value(row: &MySqlRow, idx: usize) -> RowValues {
    // JSON decodes from any text column, so only columns declared JSON are parsed.
    if row.columns()[idx].type_info().name() == "JSON"
        && let Ok(v) = row.try_get::<Option<Value>, _>(idx)
    {
        return v.map_or(RowValues::Null, RowValues::JSON);
    }
    if let Ok(v) = row.try_get::<Option<i64>, _>(idx) {
        return v.map_or(RowValues::Null, RowValues::Int);
    }
    if let Ok(v) = row.try_get::<Option<u64>, _>(idx) {
        return v.map_or(RowValues::Null, |n| {
            i64::try_from(n).map_or_else(|_| RowValues::Text(n.to_string()), RowValues::Int)
        });
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(idx) {
        return v.map_or(RowValues::Null, RowValues::Float);
    }
    if let Ok(v) = row.try_get::<Option<f32>, _>(idx) {
        return v.map_or(RowValues::Null, |f| RowValues::Float(f64::from(f)));
    }
    if let Ok(v) = row.try_get::<Option<bool>, _>(idx) {
        return v.map_or(RowValues::Null, RowValues::Bool);
    }
    if let Ok(v) = row.try_get::<Option<NaiveDateTime>, _>(idx) {
        return v.map_or(RowValues::Null, RowValues::Timestamp);
    }
    if let Ok(v) = row.try_get::<Option<NaiveDate>, _>(idx) {
        return v.map_or(RowValues::Null, |d| RowValues::Timestamp(d.and_time(NaiveTime::MIN)));
    }
    if let Ok(v) = row.try_get::<Option<String>, _>(idx) {
        return v.map_or(RowValues::Null, RowValues::Text);
    }
    if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(idx) {
        return v.map_or(RowValues::Null, RowValues::Blob);
    }
    // DECIMAL and other textual wire types without a compatible decoder
    match row.try_get_unchecked::<Option<String>, _>(idx) {
        Ok(Some(text)) => text.parse::<f64>().map_or(RowValues::Text(text), RowValues::Float),
        _ => RowValues::Null,
    }
}
