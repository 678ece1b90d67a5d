//! Connection manager error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WsError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("connection closed: code={code}, reason={reason}")]
    ConnectionClosed { code: u16, reason: String },

    #[error("subscription failed: {0}")]
    SubscriptionFailed(String),

    #[error("no response to request {0} within timeout")]
    ResponseTimeout(u64),

    #[error("registry error: {0}")]
    Registry(#[from] dexwatch_registry::RegistryError),

    #[error("tungstenite error: {0}")]
    Tungstenite(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type WsResult<T> = Result<T, WsError>;
