//! Main application orchestration.
//!
//! Startup order matters: the backfill gate is set, the snapshot load runs
//! to completion, the gate clears, and only then do the read facade and
//! the live connection start. The live stream may buffer events while the
//! facade is still blocked, but reads are never served from a store the
//! backfill has not finished populating.
//!
//! Event flow is one bounded channel from the connection manager to a
//! single consumer task (parser -> reconciler -> tracker), so side effects
//! for a single event are sequential and deterministic.

use crate::config::AppConfig;
use crate::error::AppResult;
use dexwatch_backfill::{BackfillLoader, SnapshotConfig};
use dexwatch_feed::EventParser;
use dexwatch_http::AppState;
use dexwatch_pipeline::Reconciler;
use dexwatch_registry::PairRegistry;
use dexwatch_store::OfferDb;
use dexwatch_telemetry::{metrics, ProcessState};
use dexwatch_tracker::{PairTracker, Window};
use dexwatch_ws::{ConnectionConfig, ConnectionManager};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// The assembled service.
pub struct Application {
    config: AppConfig,
    db: Arc<OfferDb>,
    registry: Arc<PairRegistry>,
    tracker: Arc<PairTracker>,
    process_state: Arc<ProcessState>,
}

impl Application {
    pub fn new(config: AppConfig) -> AppResult<Self> {
        let db = Arc::new(OfferDb::open(&config.db_path)?);
        let registry = Arc::new(PairRegistry::new(db.clone()));
        let tracker = Arc::new(PairTracker::new());
        let process_state = Arc::new(ProcessState::new());
        process_state.set_store_connected(db.ping());

        Ok(Self {
            config,
            db,
            registry,
            tracker,
            process_state,
        })
    }

    /// Shared process state (facade gating, health).
    pub fn process_state(&self) -> Arc<ProcessState> {
        self.process_state.clone()
    }

    /// Run until Ctrl-C.
    pub async fn run(self) -> AppResult<()> {
        // Phase 1: backfill, gated. The facade is not even listening yet,
        // but the flag also guards against races once it is.
        self.process_state.set_backfill_in_progress(true);
        let pairs = self.registry.load()?;

        let loader = BackfillLoader::new(
            SnapshotConfig {
                url: self.config.snapshot_url.clone(),
                page_limit: self.config.backfill.page_limit,
                request_timeout_ms: self.config.backfill.request_timeout_ms,
            },
            self.db.clone(),
        )?;
        let report = loader.run(&pairs).await;
        info!(
            offers = report.offers_upserted,
            failed_pairs = report.pairs_failed,
            "backfill finished, opening reads"
        );
        self.process_state.set_backfill_in_progress(false);

        // Phase 2: read facade.
        let http_state = AppState {
            db: self.db.clone(),
            tracker: self.tracker.clone(),
            process_state: self.process_state.clone(),
        };
        let http_port = self.config.http.port;
        tokio::spawn(async move {
            if let Err(e) = dexwatch_http::run_server(http_state, http_port).await {
                error!(error = %e, "read facade exited");
            }
        });

        // Phase 3: live stream.
        let (message_tx, mut message_rx) = mpsc::channel(self.config.channel_capacity);
        let mut ws_config: ConnectionConfig = (&self.config.websocket).into();
        ws_config.url = self.config.ws_url.clone();

        let manager = Arc::new(ConnectionManager::new(
            ws_config,
            self.registry.clone(),
            self.process_state.clone(),
            message_tx,
        ));

        spawn_sweepers(self.tracker.clone(), manager.shutdown_child_token());

        let ctrlc_manager = manager.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown signal received");
                ctrlc_manager.shutdown();
            }
        });

        let run_manager = manager.clone();
        let stream_handle = tokio::spawn(async move { run_manager.run().await });

        // The single consumer: every inbound message walks parser ->
        // reconciler -> tracker in order.
        let parser = EventParser::new();
        let reconciler = Reconciler::new(
            self.db.clone(),
            self.registry.clone(),
            self.tracker.clone(),
            self.process_state.clone(),
            self.config.activity.clone(),
        );

        let consumer_shutdown = manager.shutdown_child_token();
        loop {
            tokio::select! {
                () = consumer_shutdown.cancelled() => break,
                msg = message_rx.recv() => {
                    match msg {
                        Some(raw) => {
                            let events = parser.parse_transaction(&raw);
                            reconciler.apply_all(&events);
                        }
                        None => break,
                    }
                }
            }
        }

        match stream_handle.await {
            Ok(result) => result?,
            Err(e) => warn!(error = %e, "stream task aborted"),
        }
        info!("dexwatch monitor stopped");
        Ok(())
    }
}

/// One eviction sweep task per window, each on the window's own cadence.
fn spawn_sweepers(tracker: Arc<PairTracker>, shutdown: CancellationToken) {
    for window in Window::ALL {
        let tracker = tracker.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(window.sweep_interval());
            tick.tick().await; // immediate first tick; nothing to sweep yet
            loop {
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    _ = tick.tick() => {
                        tracker.sweep(window);
                        for stats in tracker.memory_stats() {
                            metrics::TRACKER_ENTRIES
                                .with_label_values(&[stats.window.as_str()])
                                .set(stats.entries as f64);
                        }
                    }
                }
            }
        });
    }
}
