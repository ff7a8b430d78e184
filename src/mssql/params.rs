use tiberius::Query;

use crate::error::SqlMiddlewareDbError;
use crate::types::RowValues;

/// Bind positional values to a tiberius query (`@P1`, `@P2`, ...).
///
/// Timestamps bind as `datetime2`, JSON as its serialized text.
///
/// # Errors
/// `ParameterError` for a [`RowValues::Expression`], which belongs in the statement text.
pub fn bind_query_params<'a>(query: &'a str, params: &[RowValues]) -> Result<Query<'a>, SqlMiddlewareDbError> {
    let mut query_builder = Query::new(query);
    for (idx, param) in params.iter().enumerate() {
        match param {
            RowValues::Int(i) => query_builder.bind(*i),
            RowValues::Float(f) => query_builder.bind(*f),
            RowValues::Text(s) => query_builder.bind(s.clone()),
            RowValues::Bool(b) => query_builder.bind(*b),
            RowValues::Timestamp(dt) => query_builder.bind(*dt),
            RowValues::Null => query_builder.bind(Option::<String>::None),
            RowValues::JSON(jsval) => query_builder.bind(jsval.to_string()),
            RowValues::Blob(bytes) => query_builder.bind(bytes.clone()),
            RowValues::Expression(expr) => {
                return Err(SqlMiddlewareDbError::ParameterError(format!(
                    "parameter @p{} is a SQL expression ({expr}) and cannot be bound",
                    idx + 1
                )));
            }
        }
    }
    Ok(query_builder)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SqlExpression;

    #[test]
    fn expressions_are_rejected_before_execution() {
        let params = vec![RowValues::Text("a".into()), RowValues::Expression(SqlExpression::new("GETDATE()"))];
        let err = bind_query_params("SELECT @p1, @p2", &params).err().unwrap();
        assert!(err.to_string().contains("@p2"));
        assert!(bind_query_params("SELECT @p1", &params[..1]).is_ok());
    }
}
