//! Event normalization for the dexwatch monitor.
//!
//! Turns raw ledger transaction messages into canonical offer lifecycle
//! events consumed by the reconciliation pipeline and the pair tracker.

pub mod error;
pub mod parser;

pub use error::{FeedError, FeedResult};
pub use parser::{EventParser, EventSource, OfferLifecycleEvent, ParserStats};
