//! Historical backfill loader.
//!
//! Runs once at startup, before the system is considered live: for each
//! tracked pair it pages through the ledger's `book_offers` snapshot API
//! and upserts every resting order into the offer store exactly as a
//! "created" event would be: same upsert, no history row (backfill is
//! snapshot reconciliation, not a lifecycle event).
//!
//! Failure containment: a malformed page aborts pagination for that pair
//! only; the loader logs it and proceeds to the next pair. Re-running
//! backfill, or racing it with early live events for the same offer, is
//! idempotent (last writer wins per offer id).

pub mod error;
pub mod loader;

pub use error::{BackfillError, BackfillResult};
pub use loader::{BackfillLoader, BackfillReport, SnapshotConfig};
