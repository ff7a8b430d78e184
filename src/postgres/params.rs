use std::error::Error;

use crate::error::SqlMiddlewareDbError;
use crate::types::RowValues;
use tokio_postgres::types::{IsNull, ToSql, Type, to_sql_checked};
use tokio_util::bytes;

/// Container for Postgres parameters with lifetime tracking
pub struct Params<'a> {
    references: Vec<&'a (dyn ToSql + Sync)>,
}

impl<'a> Params<'a> {
    /// Borrow positional values as tokio-postgres parameters.
    ///
    /// # Errors
    /// `ParameterError` for an [`RowValues::Expression`], which belongs in the statement text.
    pub fn convert(params: &'a [RowValues]) -> Result<Params<'a>, SqlMiddlewareDbError> {
        let mut references = Vec::with_capacity(params.len());
        for (idx, p) in params.iter().enumerate() {
            if let RowValues::Expression(expr) = p {
                return Err(SqlMiddlewareDbError::ParameterError(format!(
                    "parameter ${} is a SQL expression ({expr}) and cannot be bound",
                    idx + 1
                )));
            }
            references.push(p as &(dyn ToSql + Sync));
        }
        Ok(Params { references })
    }

    #[must_use]
    pub fn as_refs(&self) -> &[&(dyn ToSql + Sync)] {
        &self.references
    }
}

fn narrowing_error(value: i64, ty: &Type) -> Box<dyn Error + Sync + Send> {
    format!("integer {value} does not fit postgres type {ty}").into()
}

impl ToSql for RowValues {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut bytes::BytesMut,
    ) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
        match self {
            // i64 only binds to INT8 natively; narrow for smaller integer columns.
            RowValues::Int(i) => match *ty {
                Type::INT2 => i16::try_from(*i)
                    .map_err(|_| narrowing_error(*i, ty))?
                    .to_sql(ty, out),
                Type::INT4 => i32::try_from(*i)
                    .map_err(|_| narrowing_error(*i, ty))?
                    .to_sql(ty, out),
                _ => (*i).to_sql(ty, out),
            },
            RowValues::Float(f) => {
                if *ty == Type::FLOAT4 {
                    #[allow(clippy::cast_possible_truncation)]
                    (*f as f32).to_sql(ty, out)
                } else {
                    (*f).to_sql(ty, out)
                }
            }
            RowValues::Text(s) => s.to_sql(ty, out),
            RowValues::Bool(b) => (*b).to_sql(ty, out),
            RowValues::Timestamp(dt) => dt.to_sql(ty, out),
            RowValues::Null => Ok(IsNull::Yes),
            RowValues::JSON(jsval) => jsval.to_sql(ty, out),
            RowValues::Blob(bytes) => bytes.to_sql(ty, out),
            RowValues::Expression(expr) => {
                Err(format!("SQL expression {expr} cannot be bound as a parameter").into())
            }
        }
    }

    fn accepts(ty: &Type) -> bool {
        matches!(
            *ty,
            Type::INT2
                | Type::INT4
                | Type::INT8
                | Type::FLOAT4
                | Type::FLOAT8
                | Type::TEXT
                | Type::VARCHAR
                | Type::BPCHAR
                | Type::NAME
                | Type::UNKNOWN
                | Type::BOOL
                | Type::TIMESTAMP
                | Type::TIMESTAMPTZ
                | Type::DATE
                | Type::JSON
                | Type::JSONB
                | Type::BYTEA
        )
    }

    to_sql_checked!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SqlExpression;

    #[test]
    fn expressions_are_not_bindable() {
        let values = vec![RowValues::Int(1), RowValues::Expression(SqlExpression::new("NOW()"))];
        let err = Params::convert(&values).err().unwrap();
        assert!(err.to_string().contains("$2"));
        let values = vec![RowValues::Int(1), RowValues::Null];
        assert_eq!(Params::convert(&values).unwrap().as_refs().len(), 2);
    }

    #[test]
    fn integers_narrow_to_smaller_columns() {
        let mut out = bytes::BytesMut::new();
        assert!(RowValues::Int(7).to_sql(&Type::INT4, &mut out).is_ok());
        assert_eq!(out.len(), 4);
        let mut out = bytes::BytesMut::new();
        assert!(RowValues::Int(i64::from(i32::MAX) + 1).to_sql(&Type::INT4, &mut out).is_err());
    }
}
