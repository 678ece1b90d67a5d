//! Ledger connection manager.
//!
//! Owns one streaming connection. A session walks
//! `Disconnected -> Connecting -> Subscribing -> Live`; any transport error
//! or close drops back to `Disconnected` and schedules a reconnect with
//! exponential backoff (floor doubled per consecutive failure, capped,
//! reset on the next successful `Live` transition).
//!
//! Subscribing is two-phase: the global transaction stream first (its
//! failure is fatal to the attempt), then one best-effort book
//! subscription per tracked pair. While live, a periodic tick reloads the
//! registry and subscribes newcomers; removed pairs are left subscribed
//! until the next reconnect (accepted staleness, see DESIGN.md).

use crate::error::{WsError, WsResult};
use crate::message::{subscribe_books_request, subscribe_stream_request, LedgerMessage};
use crate::subscription::SubscribedBooks;
use dexwatch_registry::PairRegistry;
use dexwatch_telemetry::metrics;
use dexwatch_telemetry::ProcessState;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

type WsWrite = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsRead = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Ledger WebSocket URL.
    pub url: String,
    /// Maximum reconnection attempts (0 = infinite).
    pub max_reconnect_attempts: u32,
    /// Reconnect backoff floor.
    pub reconnect_floor_ms: u64,
    /// Reconnect backoff ceiling.
    pub reconnect_ceiling_ms: u64,
    /// Tracked-pair registry refresh cadence.
    pub refresh_interval_secs: u64,
    /// How long to wait for a subscribe response.
    pub response_timeout_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_reconnect_attempts: 0, // Infinite
            reconnect_floor_ms: 1_000,
            reconnect_ceiling_ms: 30_000,
            refresh_interval_secs: 60,
            response_timeout_ms: 10_000,
        }
    }
}

/// Connection state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Subscribing,
    Live,
}

struct ResponseInfo {
    success: bool,
    result: Value,
}

/// The ledger connection manager.
pub struct ConnectionManager {
    config: ConnectionConfig,
    state: RwLock<ConnectionState>,
    registry: Arc<PairRegistry>,
    subscribed: SubscribedBooks,
    process_state: Arc<ProcessState>,
    /// Raw transaction messages, handed to the single consumer task.
    message_tx: mpsc::Sender<Value>,
    request_id: AtomicU64,
    reconnect_delay_ms: Mutex<u64>,
    shutdown_token: CancellationToken,
}

impl ConnectionManager {
    pub fn new(
        config: ConnectionConfig,
        registry: Arc<PairRegistry>,
        process_state: Arc<ProcessState>,
        message_tx: mpsc::Sender<Value>,
    ) -> Self {
        let floor = config.reconnect_floor_ms;
        Self {
            config,
            state: RwLock::new(ConnectionState::Disconnected),
            registry,
            subscribed: SubscribedBooks::new(),
            process_state,
            message_tx,
            request_id: AtomicU64::new(1),
            reconnect_delay_ms: Mutex::new(floor),
            shutdown_token: CancellationToken::new(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Number of books subscribed on the current connection.
    pub fn subscribed_books(&self) -> usize {
        self.subscribed.count()
    }

    /// Signal graceful shutdown; the run loop exits promptly.
    pub fn shutdown(&self) {
        info!("connection manager shutdown requested");
        self.shutdown_token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }

    /// Child token for tasks that should stop with this connection.
    pub fn shutdown_child_token(&self) -> CancellationToken {
        self.shutdown_token.child_token()
    }

    /// Connect and keep the stream alive until shutdown.
    pub async fn run(&self) -> WsResult<()> {
        let mut attempt = 0u32;

        loop {
            if self.is_shutdown() {
                self.set_state(ConnectionState::Disconnected);
                return Ok(());
            }

            self.set_state(ConnectionState::Connecting);

            match self.session().await {
                Ok(()) => info!("ledger stream session ended"),
                Err(e) => {
                    error!(error = %e, "ledger stream session failed");
                    self.process_state.record_error(e.to_string());
                }
            }

            self.set_state(ConnectionState::Disconnected);
            self.process_state.set_stream_connected(false);
            metrics::STREAM_CONNECTED.set(0.0);
            self.subscribed.reset();

            if self.is_shutdown() {
                return Ok(());
            }

            attempt += 1;
            metrics::STREAM_RECONNECT_TOTAL.inc();
            if self.config.max_reconnect_attempts > 0
                && attempt >= self.config.max_reconnect_attempts
            {
                error!(attempt, "max reconnection attempts reached");
                return Err(WsError::ConnectionFailed(
                    "max reconnection attempts reached".to_string(),
                ));
            }

            let delay = self.next_backoff_delay();
            warn!(attempt, delay_ms = delay.as_millis(), "reconnecting to ledger");

            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = self.shutdown_token.cancelled() => {
                    self.set_state(ConnectionState::Disconnected);
                    return Ok(());
                }
            }
        }
    }

    async fn session(&self) -> WsResult<()> {
        info!(url = %self.config.url, "connecting to ledger stream");
        let (ws_stream, _response) = connect_async(&self.config.url).await?;
        let (mut write, mut read) = ws_stream.split();

        self.set_state(ConnectionState::Subscribing);

        let pairs = self.registry.load()?;

        // The transaction stream is the system's pulse: without it no
        // reconciliation happens, so a failed subscribe kills the attempt.
        let id = self.next_request_id();
        write
            .send(Message::Text(subscribe_stream_request(id)))
            .await?;
        let response = self.await_response(&mut write, &mut read, id).await?;
        if !response.success {
            return Err(WsError::SubscriptionFailed(format!(
                "transaction stream rejected: {}",
                response.result
            )));
        }
        debug!("transaction stream subscribed");

        // Book subscriptions are best-effort: one pair failing must not
        // abort startup for the rest.
        for pair in &pairs {
            if self.subscribed.contains(pair) {
                continue;
            }
            match self.subscribe_book(&mut write, &mut read, pair).await {
                Ok(()) => {}
                Err(e @ (WsError::ResponseTimeout(_) | WsError::SubscriptionFailed(_))) => {
                    warn!(pair = %pair, error = %e, "book subscription failed, continuing");
                }
                Err(fatal) => return Err(fatal),
            }
        }

        self.set_state(ConnectionState::Live);
        *self.reconnect_delay_ms.lock() = self.config.reconnect_floor_ms;
        self.process_state.set_stream_connected(true);
        metrics::STREAM_CONNECTED.set(1.0);
        info!(books = self.subscribed.count(), "ledger stream live");

        let mut refresh =
            tokio::time::interval(Duration::from_secs(self.config.refresh_interval_secs.max(1)));
        refresh.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        refresh.tick().await; // the first tick fires immediately; skip it

        loop {
            tokio::select! {
                () = self.shutdown_token.cancelled() => {
                    if let Err(e) = write.send(Message::Close(None)).await {
                        warn!(error = %e, "failed to send close frame during shutdown");
                    }
                    return Ok(());
                }

                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => self.handle_text(&text).await,
                        Some(Ok(Message::Ping(data))) => {
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let (code, reason) = frame
                                .map(|f| (f.code.into(), f.reason.to_string()))
                                .unwrap_or((1000, "normal close".to_string()));
                            warn!(code, %reason, "ledger stream closed by server");
                            return Err(WsError::ConnectionClosed { code, reason });
                        }
                        Some(Err(e)) => {
                            error!(error = %e, "ledger stream read error");
                            return Err(e.into());
                        }
                        None => {
                            warn!("ledger stream ended");
                            return Ok(());
                        }
                        _ => {}
                    }
                }

                _ = refresh.tick() => {
                    self.refresh_subscriptions(&mut write).await?;
                }
            }
        }
    }

    /// Handle one inbound text frame while live.
    async fn handle_text(&self, text: &str) {
        let value: Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "undecodable frame from ledger, skipping");
                return;
            }
        };

        match LedgerMessage::classify(value) {
            LedgerMessage::Transaction(tx) => {
                if self.message_tx.send(tx).await.is_err() {
                    warn!("transaction consumer dropped");
                }
            }
            LedgerMessage::LedgerClosed { ledger_index } => {
                debug!(ledger_index, "ledger closed");
            }
            LedgerMessage::Response { id, success, .. } => {
                // Late reply to a refresh-time subscribe
                debug!(id, success, "subscription response");
            }
            LedgerMessage::Other(value) => {
                trace!(?value, "unhandled stream message");
            }
        }
    }

    /// Subscribe one order book and wait for the acknowledgement.
    async fn subscribe_book(
        &self,
        write: &mut WsWrite,
        read: &mut WsRead,
        pair: &dexwatch_core::TrackedPair,
    ) -> WsResult<()> {
        let id = self.next_request_id();
        write
            .send(Message::Text(subscribe_books_request(
                id,
                std::slice::from_ref(pair),
            )))
            .await?;

        let response = self.await_response(write, read, id).await?;
        if !response.success {
            return Err(WsError::SubscriptionFailed(format!(
                "book rejected: {}",
                response.result
            )));
        }

        self.subscribed.insert(pair);
        let bids = response.result["bids"].as_array().map_or(0, Vec::len);
        let asks = response.result["asks"].as_array().map_or(0, Vec::len);
        info!(pair = %pair, bids, asks, "order book subscribed");
        Ok(())
    }

    /// Read frames until the response with `id` arrives or the timeout
    /// elapses. Transactions and pings received meanwhile are handled
    /// normally, not dropped.
    async fn await_response(
        &self,
        write: &mut WsWrite,
        read: &mut WsRead,
        id: u64,
    ) -> WsResult<ResponseInfo> {
        let deadline = tokio::time::Instant::now()
            + Duration::from_millis(self.config.response_timeout_ms);

        loop {
            let msg = tokio::time::timeout_at(deadline, read.next())
                .await
                .map_err(|_| WsError::ResponseTimeout(id))?;

            match msg {
                Some(Ok(Message::Text(text))) => {
                    let value: Value = match serde_json::from_str(&text) {
                        Ok(v) => v,
                        Err(e) => {
                            warn!(error = %e, "undecodable frame during subscribe");
                            continue;
                        }
                    };
                    match LedgerMessage::classify(value) {
                        LedgerMessage::Response {
                            id: got,
                            success,
                            result,
                        } if got == id => return Ok(ResponseInfo { success, result }),
                        LedgerMessage::Transaction(tx) => {
                            if self.message_tx.send(tx).await.is_err() {
                                warn!("transaction consumer dropped");
                            }
                        }
                        other => trace!(?other, "frame while awaiting response"),
                    }
                }
                Some(Ok(Message::Ping(data))) => {
                    write.send(Message::Pong(data)).await?;
                }
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = frame
                        .map(|f| (f.code.into(), f.reason.to_string()))
                        .unwrap_or((1000, "close during subscribe".to_string()));
                    return Err(WsError::ConnectionClosed { code, reason });
                }
                Some(Err(e)) => return Err(e.into()),
                None => {
                    return Err(WsError::ConnectionClosed {
                        code: 1006,
                        reason: "stream ended during subscribe".to_string(),
                    })
                }
                _ => {}
            }
        }
    }

    /// Reload the registry and subscribe any newcomers, fire-and-forget.
    ///
    /// A registry read failure is logged and retried on the next tick; it
    /// never drops a healthy connection.
    async fn refresh_subscriptions(&self, write: &mut WsWrite) -> WsResult<()> {
        let newcomers = match self.registry.refresh() {
            Ok(pairs) => pairs,
            Err(e) => {
                warn!(error = %e, "tracked-pair refresh failed");
                return Ok(());
            }
        };

        for pair in &newcomers {
            if self.subscribed.contains(pair) {
                continue;
            }
            let id = self.next_request_id();
            write
                .send(Message::Text(subscribe_books_request(
                    id,
                    std::slice::from_ref(pair),
                )))
                .await?;
            self.subscribed.insert(pair);
            info!(pair = %pair, "subscribed newly tracked pair");
        }
        Ok(())
    }

    fn set_state(&self, state: ConnectionState) {
        debug!(?state, "connection state");
        *self.state.write() = state;
    }

    fn next_request_id(&self) -> u64 {
        self.request_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Current backoff delay; doubles (capped) for the next failure.
    fn next_backoff_delay(&self) -> Duration {
        let mut delay = self.reconnect_delay_ms.lock();
        let current = *delay;
        *delay = (current * 2).min(self.config.reconnect_ceiling_ms);
        Duration::from_millis(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dexwatch_store::OfferDb;

    fn manager(config: ConnectionConfig) -> ConnectionManager {
        let db = Arc::new(OfferDb::open_in_memory().unwrap());
        let registry = Arc::new(PairRegistry::new(db));
        let (tx, _rx) = mpsc::channel(8);
        ConnectionManager::new(config, registry, Arc::new(ProcessState::new()), tx)
    }

    #[test]
    fn test_default_config() {
        let config = ConnectionConfig::default();
        assert_eq!(config.max_reconnect_attempts, 0); // Infinite
        assert_eq!(config.reconnect_floor_ms, 1_000);
        assert_eq!(config.reconnect_ceiling_ms, 30_000);
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let m = manager(ConnectionConfig::default());
        let delays: Vec<u64> = (0..7)
            .map(|_| m.next_backoff_delay().as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![1_000, 2_000, 4_000, 8_000, 16_000, 30_000, 30_000]);
    }

    #[test]
    fn test_backoff_resets_via_floor() {
        let m = manager(ConnectionConfig::default());
        m.next_backoff_delay();
        m.next_backoff_delay();
        // Simulate the Live transition
        *m.reconnect_delay_ms.lock() = m.config.reconnect_floor_ms;
        assert_eq!(m.next_backoff_delay(), Duration::from_millis(1_000));
    }

    #[test]
    fn test_initial_state_disconnected() {
        let m = manager(ConnectionConfig::default());
        assert_eq!(m.state(), ConnectionState::Disconnected);
        assert!(!m.is_shutdown());
        m.shutdown();
        assert!(m.is_shutdown());
    }
}
