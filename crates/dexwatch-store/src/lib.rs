//! SQLite-backed persistence for the dexwatch monitor.
//!
//! Three tables: `offers` (live order-book rows, one per offer id),
//! `offer_history` (append-only lifecycle log) and `tracked_pairs`
//! (operator configuration). All access is parameterized SQL through a
//! single mutex-guarded connection; single-row upsert/delete is the only
//! transactional granularity the pipeline needs.

pub mod db;
pub mod error;

pub use db::{HistoryFilter, OfferDb, OfferFilter};
pub use error::{StoreError, StoreResult};
