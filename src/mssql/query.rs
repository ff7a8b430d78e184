use std::sync::Arc;

use chrono::NaiveDateTime;
use futures_util::TryStreamExt;

use super::config::MssqlConnection;
use super::params::bind_query_params;
use crate::error::SqlMiddlewareDbError;
use crate::query::QueryAndParams;
use crate::results::ResultSet;
use crate::types::RowValues;

/// Run a row-returning statement (SELECT, or DML with `OUTPUT`) and collect its first
/// result set. A statement that produces no result set yields an empty `ResultSet`.
///
/// # Errors
/// Parameter binding or tiberius errors.
pub async fn build_result_set(
    client: &mut MssqlConnection,
    query: &QueryAndParams,
) -> Result<ResultSet, SqlMiddlewareDbError> {
    let query_builder = bind_query_params(&query.query, &query.params)?;
    let mut stream = query_builder.query(client).await?;

    let Some(columns) = stream.columns().await? else {
        stream.into_results().await?;
        return Ok(ResultSet::default());
    };
    let column_names: Vec<String> = columns.iter().map(|col| col.name().to_string()).collect();
    let col_count = column_names.len();

    let mut result_set = ResultSet::with_capacity(10);
    result_set.set_column_names(Arc::new(column_names));

    let mut rows_stream = stream.into_row_stream();
    while let Some(row) = rows_stream.try_next().await? {
        let mut row_values = Vec::with_capacity(col_count);
        for i in 0..col_count {
            row_values.push(extract_value(&row, i));
        }
        result_set.add_row_values(row_values);
    }

    Ok(result_set)
}

/// Run a statement that returns no rows and sum the affected counts.
///
/// # Errors
/// Parameter binding or tiberius errors.
pub async fn execute_dml(
    client: &mut MssqlConnection,
    query: &QueryAndParams,
) -> Result<usize, SqlMiddlewareDbError> {
    let exec_result = bind_query_params(&query.query, &query.params)?
        .execute(client)
        .await?;
    let rows_affected: u64 = exec_result.rows_affected().iter().sum();
    convert_affected_rows(rows_affected)
}

/// Run parameterless SQL, possibly several statements, draining every result.
///
/// # Errors
/// tiberius errors.
pub async fn execute_batch(client: &mut MssqlConnection, sql: &str) -> Result<(), SqlMiddlewareDbError> {
    client.simple_query(sql).await?.into_results().await?;
    Ok(())
}

pub(crate) fn convert_affected_rows(rows: u64) -> Result<usize, SqlMiddlewareDbError> {
    usize::try_from(rows).map_err(|e| {
        SqlMiddlewareDbError::ExecutionError(format!("Invalid rows affected count: {e}"))
    })
}

/// Extract a value by probing the typed getters; tiberius rejects a getter whose type does
/// not match the column, and yields `Ok(None)` for NULL.
fn extract_value(row: &tiberius::Row, idx: usize) -> RowValues {
    if let Ok(val) = row.try_get::<i32, _>(idx) {
        return val.map_or(RowValues::Null, |v| RowValues::Int(i64::from(v)));
    }
    if let Ok(val) = row.try_get::<i64, _>(idx) {
        return val.map_or(RowValues::Null, RowValues::Int);
    }
    if let Ok(val) = row.try_get::<i16, _>(idx) {
        return val.map_or(RowValues::Null, |v| RowValues::Int(i64::from(v)));
    }
    if let Ok(val) = row.try_get::<u8, _>(idx) {
        return val.map_or(RowValues::Null, |v| RowValues::Int(i64::from(v)));
    }
    if let Ok(val) = row.try_get::<f64, _>(idx) {
        return val.map_or(RowValues::Null, RowValues::Float);
    }
    if let Ok(val) = row.try_get::<f32, _>(idx) {
        return val.map_or(RowValues::Null, |v| RowValues::Float(f64::from(v)));
    }
    if let Ok(val) = row.try_get::<bool, _>(idx) {
        return val.map_or(RowValues::Null, RowValues::Bool);
    }
    if let Ok(val) = row.try_get::<NaiveDateTime, _>(idx) {
        return val.map_or(RowValues::Null, RowValues::Timestamp);
    }
    if let Ok(val) = row.try_get::<&str, _>(idx) {
        return val.map_or(RowValues::Null, |v| RowValues::Text(v.to_string()));
    }
    if let Ok(val) = row.try_get::<&[u8], _>(idx) {
        return val.map_or(RowValues::Null, |v| RowValues::Blob(v.to_vec()));
    }
    RowValues::Null
}
