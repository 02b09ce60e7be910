use std::sync::Arc;
use tracing::debug;

use crate::cache::{CacheResult, MetricsCache};
use crate::error::NoData;
use crate::stats::{MetricSet, StatsCollector};

/// Shared by every request handler.
pub struct AppState {
  pub cache: MetricsCache,
  pub collector: StatsCollector,
}

impl AppState {
  pub fn new(cache: MetricsCache, collector: StatsCollector) -> Self {
    Self { cache, collector }
  }

  /// Current metric set, refreshed through the collector when the cache
  /// says so.
  pub async fn metrics(&self) -> Result<CacheResult<Arc<MetricSet>>, NoData> {
    let result = self
      .cache
      .get_or_refresh(|| self.collector.collect())
      .await?;
    debug!(
      source = result.source.as_str(),
      as_of = %result.data.as_of,
      cached_at = ?result.cached_at,
      "metrics served"
    );
    Ok(result)
  }
}
