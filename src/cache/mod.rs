//! Metrics cache with last-known-good fallback.
//!
//! This module holds exactly one metric set at a time:
//! - Serves it without network access while it is fresh
//! - Revalidates it once the freshness window has passed
//! - Serves the expired set when revalidation fails (offline mode)
//! - Optionally persists the last good set so a restart is not a cold start

mod layer;
mod storage;
mod traits;

pub use layer::MetricsCache;
pub use storage::{NoopStorage, SnapshotStorage, SqliteStorage};
pub use traits::{CacheResult, CacheSource};
