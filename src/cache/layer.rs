//! Cache layer that orchestrates revalidation with the refresh source.

use chrono::{DateTime, Duration, Utc};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use super::storage::{CachedSnapshot, SnapshotStorage};
use super::traits::CacheResult;
use crate::error::{NoData, RefreshError};
use crate::stats::MetricSet;

/// The single cached value. Never mutated; a refresh swaps in a new one.
#[derive(Debug)]
struct CacheEntry {
  metrics: Arc<MetricSet>,
  produced_at: DateTime<Utc>,
}

/// Holds at most one metric set and decides when to refresh it.
///
/// No lock is held while a refresh runs, so concurrent callers that find
/// the entry expired may each refresh; the last one to finish wins.
pub struct MetricsCache {
  entry: RwLock<Option<Arc<CacheEntry>>>,
  storage: Arc<dyn SnapshotStorage>,
  /// Storage key of the card configuration this cache serves
  key: String,
  /// How long a fetched set is served without revalidation
  freshness: Duration,
}

impl MetricsCache {
  /// Create a cache, seeding it from `storage` when a snapshot exists for
  /// `key`. A seeded entry keeps its original timestamp.
  pub fn new(storage: Arc<dyn SnapshotStorage>, key: impl Into<String>) -> Self {
    let key = key.into();

    let seeded = match storage.load(&key) {
      Ok(Some(snapshot)) => {
        info!(produced_at = %snapshot.produced_at, "loaded last good metrics from disk");
        Some(Arc::new(CacheEntry {
          metrics: Arc::new(snapshot.metrics),
          produced_at: snapshot.produced_at,
        }))
      }
      Ok(None) => None,
      Err(e) => {
        warn!(error = %e, "could not load metrics snapshot");
        None
      }
    };

    Self {
      entry: RwLock::new(seeded),
      storage,
      key,
      freshness: Duration::minutes(15),
    }
  }

  /// Set the freshness window.
  pub fn with_freshness(mut self, freshness: Duration) -> Self {
    self.freshness = freshness;
    self
  }

  /// Check if an entry produced at `produced_at` is past the window.
  fn is_stale(&self, produced_at: DateTime<Utc>) -> bool {
    Utc::now() - produced_at >= self.freshness
  }

  async fn current(&self) -> Option<Arc<CacheEntry>> {
    self.entry.read().await.clone()
  }

  /// Return the metric set, refreshing it when needed.
  ///
  /// 1. Fresh entry - return it, `refresh` is not called
  /// 2. No entry or expired entry - call `refresh` once
  /// 3. Refresh succeeded - replace the entry and return the new set
  /// 4. Refresh failed - return the expired entry unchanged (offline mode),
  ///    or `NoData` when there is nothing to fall back to
  pub async fn get_or_refresh<F, Fut>(&self, refresh: F) -> Result<CacheResult<Arc<MetricSet>>, NoData>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<MetricSet, RefreshError>>,
  {
    let current = self.current().await;

    if let Some(entry) = &current {
      if !self.is_stale(entry.produced_at) {
        return Ok(CacheResult::from_cache(
          Arc::clone(&entry.metrics),
          entry.produced_at,
        ));
      }
    }

    match refresh().await {
      Ok(metrics) => {
        let entry = self.replace(metrics).await;
        Ok(CacheResult::from_network(Arc::clone(&entry.metrics)))
      }
      Err(e) => match current {
        Some(entry) => {
          warn!(error = %e, produced_at = %entry.produced_at, "refresh failed, serving last good metrics");
          Ok(CacheResult::offline(
            Arc::clone(&entry.metrics),
            entry.produced_at,
          ))
        }
        None => Err(NoData(e)),
      },
    }
  }

  async fn replace(&self, metrics: MetricSet) -> Arc<CacheEntry> {
    let entry = Arc::new(CacheEntry {
      metrics: Arc::new(metrics),
      produced_at: Utc::now(),
    });

    *self.entry.write().await = Some(Arc::clone(&entry));

    // SQLite writes block, keep them off the async workers
    let snapshot = CachedSnapshot {
      metrics: (*entry.metrics).clone(),
      produced_at: entry.produced_at,
    };
    let storage = Arc::clone(&self.storage);
    let key = self.key.clone();
    match tokio::task::spawn_blocking(move || storage.store(&key, &snapshot)).await {
      Ok(Ok(())) => {}
      Ok(Err(e)) => warn!(error = %e, "could not persist metrics snapshot"),
      Err(e) => warn!(error = %e, "snapshot write task failed"),
    }

    entry
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{CacheSource, NoopStorage, SqliteStorage};
  use crate::error::FetchError;
  use crate::metabase::CardRef;
  use crate::testutil::sample_metric_set;
  use std::sync::atomic::{AtomicUsize, Ordering};

  fn cache() -> MetricsCache {
    MetricsCache::new(Arc::new(NoopStorage), "test")
  }

  fn outage() -> RefreshError {
    RefreshError::Fetch(FetchError::Status {
      card: CardRef(860),
      status: 503,
    })
  }

  fn numbered(n: usize) -> MetricSet {
    MetricSet {
      total_orders: n.to_string(),
      ..sample_metric_set()
    }
  }

  #[tokio::test]
  async fn test_cold_start_fetches_and_stores() {
    let cache = cache();
    let result = cache
      .get_or_refresh(|| async { Ok(sample_metric_set()) })
      .await
      .unwrap();

    assert_eq!(result.source, CacheSource::Network);
    assert_eq!(*result.data, sample_metric_set());
  }

  #[tokio::test]
  async fn test_cold_start_failure_is_no_data() {
    let cache = cache();
    let result = cache.get_or_refresh(|| async { Err(outage()) }).await;

    assert!(matches!(result, Err(NoData(RefreshError::Fetch(_)))));
  }

  #[tokio::test]
  async fn test_fresh_hit_skips_refresh() {
    let cache = cache();
    let calls = AtomicUsize::new(0);

    let first = cache
      .get_or_refresh(|| async {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(numbered(1))
      })
      .await
      .unwrap();
    let second = cache
      .get_or_refresh(|| async {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(numbered(2))
      })
      .await
      .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(second.source, CacheSource::CacheFresh);
    assert_eq!(first.data, second.data);
    assert!(Arc::ptr_eq(&first.data, &second.data));
  }

  #[tokio::test]
  async fn test_expired_entry_is_replaced() {
    let cache = cache().with_freshness(Duration::zero());

    cache
      .get_or_refresh(|| async { Ok(numbered(1)) })
      .await
      .unwrap();
    let result = cache
      .get_or_refresh(|| async { Ok(numbered(2)) })
      .await
      .unwrap();

    assert_eq!(result.source, CacheSource::Network);
    assert_eq!(result.data.total_orders, "2");
  }

  #[tokio::test]
  async fn test_expired_entry_survives_failed_refresh() {
    let cache = cache().with_freshness(Duration::zero());

    let good = cache
      .get_or_refresh(|| async { Ok(numbered(1)) })
      .await
      .unwrap();
    let stale = cache.get_or_refresh(|| async { Err(outage()) }).await.unwrap();

    assert_eq!(stale.source, CacheSource::Offline);
    assert_eq!(*stale.data, *good.data);

    // Expiry was not reset: the next call tries again
    let calls = AtomicUsize::new(0);
    let again = cache
      .get_or_refresh(|| async {
        calls.fetch_add(1, Ordering::SeqCst);
        Err(outage())
      })
      .await
      .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(again.source, CacheSource::Offline);
    assert_eq!(again.cached_at, stale.cached_at);
  }

  /// Remembers which thread each `store` ran on.
  #[derive(Default)]
  struct ThreadRecordingStorage {
    threads: std::sync::Mutex<Vec<std::thread::ThreadId>>,
  }

  impl SnapshotStorage for ThreadRecordingStorage {
    fn load(&self, _key: &str) -> color_eyre::Result<Option<CachedSnapshot>> {
      Ok(None)
    }

    fn store(&self, _key: &str, _snapshot: &CachedSnapshot) -> color_eyre::Result<()> {
      self.threads.lock().unwrap().push(std::thread::current().id());
      Ok(())
    }
  }

  #[tokio::test]
  async fn test_snapshot_is_stored_off_the_runtime_thread() {
    let storage = Arc::new(ThreadRecordingStorage::default());
    let cache = MetricsCache::new(storage.clone(), "test");

    cache
      .get_or_refresh(|| async { Ok(numbered(1)) })
      .await
      .unwrap();

    // The current-thread test runtime drives this future on this thread
    let threads = storage.threads.lock().unwrap();
    assert_eq!(threads.len(), 1);
    assert_ne!(threads[0], std::thread::current().id());
  }

  #[tokio::test]
  async fn test_persisted_snapshot_seeds_a_new_cache() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("snapshot.db");

    {
      let storage = Arc::new(SqliteStorage::open(Some(&path)).unwrap());
      let cache = MetricsCache::new(storage, "cards-a");
      cache
        .get_or_refresh(|| async { Ok(numbered(7)) })
        .await
        .unwrap();
    }

    // Restarted process: upstream is down, the disk copy is served
    let storage = Arc::new(SqliteStorage::open(Some(&path)).unwrap());
    let cache = MetricsCache::new(storage.clone(), "cards-a").with_freshness(Duration::zero());
    let result = cache.get_or_refresh(|| async { Err(outage()) }).await.unwrap();
    assert_eq!(result.source, CacheSource::Offline);
    assert_eq!(result.data.total_orders, "7");

    // A different card configuration does not see it
    let other = MetricsCache::new(storage, "cards-b");
    assert!(other.get_or_refresh(|| async { Err(outage()) }).await.is_err());
  }
}
