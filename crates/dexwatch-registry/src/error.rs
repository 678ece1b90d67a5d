//! Registry error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("store error: {0}")]
    Store(#[from] dexwatch_store::StoreError),
}

pub type RegistryResult<T> = Result<T, RegistryError>;
