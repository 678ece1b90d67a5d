//! Store error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("malformed row: {0}")]
    MalformedRow(String),
}

pub type StoreResult<T> = Result<T, StoreError>;
