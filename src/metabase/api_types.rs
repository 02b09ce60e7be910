//! Serde-deserializable types matching Metabase responses.
//!
//! These types are separate from [`Dataset`] so that both transports (REST and
//! the command-line bridge) can deserialize their own wire shape and convert
//! into the same domain type.

use serde::Deserialize;
use serde_json::{Map, Value};

use super::types::Dataset;

// ============================================================================
// REST: /api/card/{id}/query and /api/public/card/{id}/query
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiColumn {
  #[serde(default)]
  pub name: String,
  #[serde(default)]
  pub display_name: Option<String>,
}

impl ApiColumn {
  /// The label shown in Metabase, falling back to the field name
  pub fn label(&self) -> &str {
    match self.display_name.as_deref() {
      Some(display) if !display.is_empty() => display,
      _ => &self.name,
    }
  }
}

#[derive(Debug, Default, Deserialize)]
pub struct ApiDatasetData {
  #[serde(default)]
  pub cols: Vec<ApiColumn>,
  #[serde(default)]
  pub rows: Vec<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
pub struct ApiDatasetResponse {
  #[serde(default)]
  pub data: Option<ApiDatasetData>,
  /// "completed" or "failed"; queries that fail upstream still answer 2xx
  #[serde(default)]
  pub status: Option<String>,
  #[serde(default)]
  pub error: Option<Value>,
}

impl ApiDatasetResponse {
  /// Upstream error message when the query itself failed
  pub fn failure(&self) -> Option<String> {
    if self.status.as_deref() == Some("failed") || self.error.is_some() {
      let message = match &self.error {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => "query failed".to_string(),
      };
      return Some(message);
    }
    None
  }

  pub fn into_dataset(self) -> Dataset {
    let data = self.data.unwrap_or_default();
    Dataset {
      columns: data.cols.iter().map(|c| c.label().to_string()).collect(),
      rows: data.rows,
    }
  }
}

// ============================================================================
// Bridge: `tool call execute --server metabase`
// ============================================================================

/// Bridge payload: rows keyed by their index ("0", "1", ...), each row an
/// object of column label -> value
#[derive(Debug, Deserialize)]
pub struct BridgeResult {
  #[serde(default)]
  pub success: bool,
  #[serde(default)]
  pub data: Map<String, Value>,
  #[serde(default)]
  pub error: Option<Value>,
}

impl BridgeResult {
  pub fn into_dataset(self) -> Dataset {
    let mut keyed: Vec<(String, Map<String, Value>)> = self
      .data
      .into_iter()
      .filter_map(|(key, row)| match row {
        Value::Object(obj) => Some((key, obj)),
        _ => None,
      })
      .collect();

    // Numeric order; non-numeric keys sort after, lexically
    keyed.sort_by(|(a, _), (b, _)| {
      match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Ok(_), Err(_)) => std::cmp::Ordering::Less,
        (Err(_), Ok(_)) => std::cmp::Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
      }
    });

    let columns: Vec<String> = keyed
      .first()
      .map(|(_, row)| row.keys().cloned().collect())
      .unwrap_or_default();

    let rows = keyed
      .into_iter()
      .map(|(_, mut row)| {
        columns
          .iter()
          .map(|col| row.remove(col).unwrap_or(Value::Null))
          .collect()
      })
      .collect();

    Dataset { columns, rows }
  }
}
