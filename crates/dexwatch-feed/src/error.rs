//! Feed error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("missing field: {0}")]
    MissingField(&'static str),

    #[error("bad amount: {0}")]
    BadAmount(String),

    #[error("core error: {0}")]
    Core(#[from] dexwatch_core::CoreError),
}

pub type FeedResult<T> = Result<T, FeedError>;
