//! Snapshot storage trait and SQLite implementation.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::stats::MetricSet;

/// A persisted metric set.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedSnapshot {
  pub metrics: MetricSet,
  /// When the metric set was fetched, not when it was written
  pub produced_at: DateTime<Utc>,
}

/// Trait for snapshot storage backends.
///
/// `key` identifies the card configuration the snapshot was produced under.
pub trait SnapshotStorage: Send + Sync {
  /// Get the last stored snapshot for `key`.
  fn load(&self, key: &str) -> Result<Option<CachedSnapshot>>;

  /// Replace the stored snapshot for `key`.
  fn store(&self, key: &str, snapshot: &CachedSnapshot) -> Result<()>;
}

/// Storage implementation that doesn't persist anything.
/// Used when snapshot persistence is disabled - all operations are no-ops.
pub struct NoopStorage;

impl SnapshotStorage for NoopStorage {
  fn load(&self, _key: &str) -> Result<Option<CachedSnapshot>> {
    Ok(None) // Always miss
  }

  fn store(&self, _key: &str, _snapshot: &CachedSnapshot) -> Result<()> {
    Ok(()) // Discard
  }
}

/// SQLite-based snapshot storage implementation.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open (or create) the snapshot database at `path`, or at the default
  /// location when `path` is None.
  pub fn open(path: Option<&Path>) -> Result<Self> {
    let path = match path {
      Some(p) => p.to_path_buf(),
      None => Self::default_path()?,
    };

    // Ensure parent directory exists
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(&path)
      .map_err(|e| eyre!("Failed to open snapshot database at {}: {}", path.display(), e))?;

    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;

    Ok(storage)
  }

  /// Get the default database path.
  fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("trmnl-orders").join("snapshot.db"))
  }

  /// Run database migrations for the snapshot table.
  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(SNAPSHOT_SCHEMA)
      .map_err(|e| eyre!("Failed to run snapshot migrations: {}", e))?;

    Ok(())
  }
}

/// Schema for the snapshot table.
const SNAPSHOT_SCHEMA: &str = r#"
-- Last good metric set per card configuration (serialized JSON)
CREATE TABLE IF NOT EXISTS snapshot (
    config_key TEXT PRIMARY KEY,
    data BLOB NOT NULL,
    produced_at TEXT NOT NULL,
    stored_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

impl SnapshotStorage for SqliteStorage {
  fn load(&self, key: &str) -> Result<Option<CachedSnapshot>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let row: Option<(Vec<u8>, String)> = conn
      .query_row(
        "SELECT data, produced_at FROM snapshot WHERE config_key = ?",
        params![key],
        |row| Ok((row.get(0)?, row.get(1)?)),
      )
      .optional()
      .map_err(|e| eyre!("Failed to query snapshot: {}", e))?;

    match row {
      Some((data, produced_at)) => {
        let metrics: MetricSet = serde_json::from_slice(&data)
          .map_err(|e| eyre!("Failed to deserialize snapshot: {}", e))?;
        let produced_at = DateTime::parse_from_rfc3339(&produced_at)
          .map_err(|e| eyre!("Failed to parse datetime '{}': {}", produced_at, e))?
          .with_timezone(&Utc);
        Ok(Some(CachedSnapshot {
          metrics,
          produced_at,
        }))
      }
      None => Ok(None),
    }
  }

  fn store(&self, key: &str, snapshot: &CachedSnapshot) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    let data = serde_json::to_vec(&snapshot.metrics)
      .map_err(|e| eyre!("Failed to serialize snapshot: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO snapshot (config_key, data, produced_at, stored_at)
         VALUES (?, ?, ?, datetime('now'))",
        params![key, data, snapshot.produced_at.to_rfc3339()],
      )
      .map_err(|e| eyre!("Failed to store snapshot: {}", e))?;

    Ok(())
  }
}
