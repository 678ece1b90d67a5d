//! HTTP read facade.
//!
//! A thin axum server over the tracker and the offer store. Every `/api/*`
//! route answers 503 while backfill is in progress, so callers get an
//! explicit "not ready yet", never partial or empty data. `/health` is
//! always served and reports the backfill, stream and store status axes
//! independently.

pub mod server;

pub use server::{create_router, run_server, AppState};
