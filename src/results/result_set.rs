use std::collections::HashMap;
use std::sync::Arc;

use super::row::{CustomDbRow, index_columns};
use crate::types::RowValues;

/// Rows returned by a statement plus the affected-row count.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    pub results: Vec<CustomDbRow>,
    /// Rows returned for queries; rows changed for DML without RETURNING/OUTPUT.
    pub rows_affected: usize,
    column_names: Option<Arc<Vec<String>>>,
    column_index: Option<Arc<HashMap<String, usize>>>,
}

impl ResultSet {
    #[must_use]
    pub fn with_capacity(capacity: usize) -> ResultSet {
        ResultSet {
            results: Vec::with_capacity(capacity),
            ..ResultSet::default()
        }
    }

    /// Result of a statement that returns no rows.
    #[must_use]
    pub fn affected(rows_affected: usize) -> ResultSet {
        ResultSet {
            rows_affected,
            ..ResultSet::default()
        }
    }

    /// Set the column names shared by every row added afterwards.
    pub fn set_column_names(&mut self, column_names: Arc<Vec<String>>) {
        self.column_index = Some(index_columns(&column_names));
        self.column_names = Some(column_names);
    }

    #[must_use]
    pub fn get_column_names(&self) -> Option<&Arc<Vec<String>>> {
        self.column_names.as_ref()
    }

    /// Append a row in column order. Ignored until column names are set.
    pub fn add_row_values(&mut self, row_values: Vec<RowValues>) {
        if let (Some(column_names), Some(column_index)) = (&self.column_names, &self.column_index) {
            self.results.push(CustomDbRow {
                column_names: Arc::clone(column_names),
                rows: row_values,
                column_index: Arc::clone(column_index),
            });
            self.rows_affected += 1;
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.results.len()
    }

    #[must_use]
    pub fn first(&self) -> Option<&CustomDbRow> {
        self.results.first()
    }

    /// Rewrite column names with `f`, keeping row order and values.
    pub(crate) fn map_column_names(&mut self, f: impl Fn(&str) -> String) {
        let Some(names) = &self.column_names else {
            return;
        };
        let renamed: Arc<Vec<String>> = Arc::new(names.iter().map(|n| f(n)).collect());
        let index = index_columns(&renamed);
        for row in &mut self.results {
            row.column_names = Arc::clone(&renamed);
            row.column_index = Arc::clone(&index);
        }
        self.column_names = Some(renamed);
        self.column_index = Some(index);
    }

    /// Every row as a JSON object.
    #[must_use]
    pub fn to_json_rows(&self) -> Vec<serde_json::Value> {
        self.results.iter().map(CustomDbRow::to_json).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_share_columns_and_keep_order() {
        let mut rs = ResultSet::with_capacity(2);
        rs.add_row_values(vec![RowValues::Int(0)]);
        assert!(rs.is_empty());
        rs.set_column_names(Arc::new(vec!["ID".into(), "\"Name\"".into()]));
        rs.add_row_values(vec![RowValues::Int(1), RowValues::Text("a".into())]);
        rs.add_row_values(vec![RowValues::Int(2), RowValues::Text("b".into())]);
        rs.map_column_names(|n| n.trim_matches('"').to_lowercase());
        assert_eq!(rs.len(), 2);
        assert_eq!(rs.rows_affected, 2);
        assert_eq!(rs.results[1].get("name"), Some(&RowValues::Text("b".into())));
        assert_eq!(rs.first().and_then(|r| r.get("id")), Some(&RowValues::Int(1)));
        assert_eq!(rs.to_json_rows()[0], serde_json::json!({"id": 1, "name": "a"}));
    }
}
