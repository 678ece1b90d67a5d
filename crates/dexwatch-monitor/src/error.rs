//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("store error: {0}")]
    Store(#[from] dexwatch_store::StoreError),

    #[error("registry error: {0}")]
    Registry(#[from] dexwatch_registry::RegistryError),

    #[error("backfill error: {0}")]
    Backfill(#[from] dexwatch_backfill::BackfillError),

    #[error("stream error: {0}")]
    Stream(#[from] dexwatch_ws::WsError),
}

pub type AppResult<T> = Result<T, AppError>;
