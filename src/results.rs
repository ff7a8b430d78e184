mod field_types;
mod result_set;
mod row;

pub use field_types::{FieldType, FieldTypeMapping, apply_field_types, coerce_value};
pub use result_set::ResultSet;
pub use row::CustomDbRow;
