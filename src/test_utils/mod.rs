//! In-memory driver for exercising the connection, transaction and executor layers without a
//! database server.

mod scripted;

use std::sync::Arc;

pub use scripted::{ScriptedClient, ScriptedDriver};

use crate::classify::ErrorKind;
use crate::error::SqlMiddlewareDbError;
use crate::results::ResultSet;
use crate::types::RowValues;

/// A connection-classified error, as a driver would report a dropped socket.
#[must_use]
pub fn connection_error(message: &str) -> SqlMiddlewareDbError {
    SqlMiddlewareDbError::Driver {
        kind: ErrorKind::Connection,
        message: message.to_string(),
    }
}

/// A unique-violation error.
#[must_use]
pub fn duplicate_key_error(message: &str) -> SqlMiddlewareDbError {
    SqlMiddlewareDbError::Driver {
        kind: ErrorKind::DuplicateKey,
        message: message.to_string(),
    }
}

/// Build a result set from column names and rows.
#[must_use]
pub fn result_set(columns: &[&str], rows: Vec<Vec<RowValues>>) -> ResultSet {
    let mut rs = ResultSet::with_capacity(rows.len());
    rs.set_column_names(Arc::new(columns.iter().map(|c| (*c).to_string()).collect()));
    for row in rows {
        rs.add_row_values(row);
    }
    rs
}
