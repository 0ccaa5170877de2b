//! Error type for event-table access.

use thiserror::Error;

/// Errors raised while compiling expressions or scanning event tables.
#[derive(Error, Debug)]
pub enum NtupleError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Parquet decoding/encoding error
    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    /// Arrow error (casting, batch construction)
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Expression could not be parsed
    #[error("expression error: {0}")]
    Expression(String),

    /// Column referenced by an expression is not in the table
    #[error("missing column '{0}'")]
    MissingColumn(String),

    /// Column cannot be read as a number
    #[error("column '{col}' has unsupported type {actual}")]
    UnsupportedType {
        /// Column name.
        col: String,
        /// Arrow data type found in the file.
        actual: String,
    },

    /// Column contains nulls
    #[error("column '{0}' contains null values")]
    NullValues(String),
}

/// Result alias for ns-ntuple
pub type Result<T> = std::result::Result<T, NtupleError>;
