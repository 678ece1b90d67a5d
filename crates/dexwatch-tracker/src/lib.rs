//! Windowed trading-pair aggregator.
//!
//! Maintains independent sliding-window aggregates (10m / 1h / 24h) per
//! canonical currency pair and answers top-k and single-pair queries.
//! Writes come from the event-processing path; queries come from the read
//! facade. Each window has its own lock so eviction sweeps on one window
//! never block hot-path writes to another.

pub mod aggregate;
pub mod tracker;
pub mod window;

pub use aggregate::{PairAggregate, PricePoint, Trend, XrpPairSummary};
pub use tracker::{PairStats, PairTracker, WindowMemoryStats, WindowStats, DEFAULT_TOP_K};
pub use window::Window;
