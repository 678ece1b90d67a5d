//! Backfill error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackfillError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("malformed snapshot page: {0}")]
    MalformedPage(String),
}

pub type BackfillResult<T> = Result<T, BackfillError>;
