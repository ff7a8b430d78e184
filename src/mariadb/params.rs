use sqlx::MySql;
use sqlx::mysql::MySqlArguments;
use sqlx::query::Query;
use sqlx::types::Json;

use crate::error::SqlMiddlewareDbError;
use crate::types::RowValues;

/// Bind positional values to a sqlx MySQL query, one per `?`.
///
/// # Errors
/// `ParameterError` for a [`RowValues::Expression`], which belongs in the statement text.
pub fn bind_query_params<'q>(
    sql: &'q str,
    params: &[RowValues],
) -> Result<Query<'q, MySql, MySqlArguments>, SqlMiddlewareDbError> {
    let mut query = sqlx::query(sql);
    for (idx, param) in params.iter().enumerate() {
        query = match param {
            RowValues::Int(i) => query.bind(*i),
            RowValues::Float(f) => query.bind(*f),
            RowValues::Text(s) => query.bind(s.clone()),
            RowValues::Bool(b) => query.bind(*b),
            RowValues::Timestamp(dt) => query.bind(*dt),
            RowValues::Null => query.bind(Option::<String>::None),
            RowValues::JSON(jsval) => query.bind(Json(jsval.clone())),
            RowValues::Blob(bytes) => query.bind(bytes.clone()),
            RowValues::Expression(expr) => {
                return Err(SqlMiddlewareDbError::ParameterError(format!(
                    "parameter {} is a SQL expression ({expr}) and cannot be bound",
                    idx + 1
                )));
            }
        };
    }
    Ok(query)
}
