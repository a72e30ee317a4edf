use thiserror::Error;

/// Precondition violations detected while building or querying the index.
#[derive(Debug, Error, PartialEq)]
pub enum IndexError {
    #[error("embedding matrix has {vectors} rows but triple table has {rows}")]
    RowCountMismatch { vectors: usize, rows: usize },

    #[error("triple table is missing required column `{0}`")]
    MissingColumn(String),

    #[error("query vector has dimension {actual}, index expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}
