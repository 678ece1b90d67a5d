//! Logging, prometheus metrics and shared process state.

pub mod error;
pub mod logging;
pub mod metrics;
pub mod process_state;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use process_state::{HealthSnapshot, ProcessState};
