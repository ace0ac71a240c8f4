//! Error taxonomy for the adapter.
//!
//! Request and schema problems are detected before any SQL reaches the
//! driver. Driver failures pass through untouched as [`DataError::Execution`].

use thiserror::Error;

/// A logical name that does not resolve against the current schema snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaMismatch {
    #[error("table '{name}' not found")]
    Table { name: String },

    #[error("column '{column}' not found in table '{table}'")]
    Column { table: String, column: String },
}

#[derive(Debug, Error)]
pub enum DataError {
    #[error("schema mismatch: {0}")]
    SchemaMismatch(#[from] SchemaMismatch),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid criteria: {0}")]
    InvalidCriteria(String),

    #[error(transparent)]
    Execution(#[from] anyhow::Error),
}

impl DataError {
    pub(crate) fn unknown_table(name: &str) -> Self {
        SchemaMismatch::Table {
            name: name.to_string(),
        }
        .into()
    }

    pub(crate) fn unknown_column(table: &str, column: &str) -> Self {
        SchemaMismatch::Column {
            table: table.to_string(),
            column: column.to_string(),
        }
        .into()
    }

    pub fn is_schema_mismatch(&self) -> bool {
        matches!(self, DataError::SchemaMismatch(_))
    }
}

pub type Result<T, E = DataError> = std::result::Result<T, E>;
