//! Shared process state.
//!
//! One injectable object owned by the top-level service and passed by
//! `Arc` to the connection manager, the pipeline and the read facade,
//! deliberately not a set of module-level globals. The facade gates reads
//! on `backfill_in_progress`; the health endpoint reports the three
//! status axes independently so an operator can tell "starting up" from
//! "degraded" from "down".

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};

/// Health snapshot for the introspection endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub backfill_in_progress: bool,
    pub stream_connected: bool,
    pub store_connected: bool,
    pub last_event_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// Mutable status flags shared across the service.
#[derive(Debug, Default)]
pub struct ProcessState {
    backfill_in_progress: AtomicBool,
    stream_connected: AtomicBool,
    store_connected: AtomicBool,
    last_event_at: RwLock<Option<DateTime<Utc>>>,
    last_error: RwLock<Option<String>>,
}

impl ProcessState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_backfill_in_progress(&self, value: bool) {
        self.backfill_in_progress.store(value, Ordering::SeqCst);
    }

    pub fn backfill_in_progress(&self) -> bool {
        self.backfill_in_progress.load(Ordering::SeqCst)
    }

    pub fn set_stream_connected(&self, value: bool) {
        self.stream_connected.store(value, Ordering::SeqCst);
    }

    pub fn stream_connected(&self) -> bool {
        self.stream_connected.load(Ordering::SeqCst)
    }

    pub fn set_store_connected(&self, value: bool) {
        self.store_connected.store(value, Ordering::SeqCst);
    }

    pub fn store_connected(&self) -> bool {
        self.store_connected.load(Ordering::SeqCst)
    }

    pub fn record_event(&self, at: DateTime<Utc>) {
        *self.last_event_at.write() = Some(at);
    }

    pub fn record_error(&self, error: impl Into<String>) {
        *self.last_error.write() = Some(error.into());
    }

    pub fn health(&self) -> HealthSnapshot {
        HealthSnapshot {
            backfill_in_progress: self.backfill_in_progress(),
            stream_connected: self.stream_connected(),
            store_connected: self.store_connected(),
            last_event_at: *self.last_event_at.read(),
            last_error: self.last_error.read().clone(),
        }
    }
}
