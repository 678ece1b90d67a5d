//! Ledger streaming client for the dexwatch monitor.
//!
//! Provides one resilient WebSocket connection with:
//! - automatic reconnection with exponential backoff (floor 1s, cap 30s,
//!   reset on going live)
//! - order-book subscriptions per tracked pair plus the global
//!   transaction stream
//! - periodic registry refresh with incremental subscription
//! - channel-based hand-off of inbound transactions to one consumer task

pub mod connection;
pub mod error;
pub mod message;
pub mod subscription;

pub use connection::{ConnectionConfig, ConnectionManager, ConnectionState};
pub use error::{WsError, WsResult};
pub use message::{subscribe_books_request, subscribe_stream_request, LedgerMessage};
pub use subscription::SubscribedBooks;

use std::sync::Once;

static INIT_CRYPTO: Once = Once::new();

/// Initialize the TLS crypto provider.
/// Must be called before any WebSocket connections are made.
pub fn init_crypto() {
    INIT_CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
