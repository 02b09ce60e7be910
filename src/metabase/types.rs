use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Identifier of a saved Metabase question ("card")
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CardRef(pub u64);

impl fmt::Display for CardRef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// Tabular result of one card query, independent of the transport that
/// produced it
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
  pub columns: Vec<String>,
  pub rows: Vec<Vec<Value>>,
}

impl Dataset {
  pub fn is_empty(&self) -> bool {
    self.rows.is_empty()
  }

  /// First cell of the first row
  pub fn first_cell(&self) -> Option<&Value> {
    self.rows.first().and_then(|row| row.first())
  }

  /// Index of the first column whose name contains any of `needles`
  /// (case-insensitive). Needles are tried in order, so earlier ones win.
  pub fn column_index(&self, needles: &[&str]) -> Option<usize> {
    let names: Vec<String> = self.columns.iter().map(|c| c.to_lowercase()).collect();
    needles.iter().find_map(|needle| {
      let needle = needle.to_lowercase();
      names.iter().position(|name| name.contains(&needle))
    })
  }

  /// Keep at most `limit` rows
  pub fn truncate(&mut self, limit: Option<u32>) {
    if let Some(limit) = limit {
      self.rows.truncate(limit as usize);
    }
  }
}

/// HTTP metadata for one card endpoint, without the data payload
#[derive(Debug, Clone, Serialize)]
pub struct ProbeReport {
  pub card: CardRef,
  pub url: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub status_code: Option<u16>,
  pub ok: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub content_type: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn dataset() -> Dataset {
    Dataset {
      columns: vec![
        "Strain".to_string(),
        "Orders".to_string(),
        "Quantity (g)".to_string(),
      ],
      rows: vec![
        vec![json!("A"), json!(3), json!(12.5)],
        vec![json!("B"), json!(1), json!(4)],
      ],
    }
  }

  #[test]
  fn test_first_cell() {
    assert_eq!(dataset().first_cell(), Some(&json!("A")));
    assert_eq!(Dataset::default().first_cell(), None);
  }

  #[test]
  fn test_column_index_is_case_insensitive() {
    let ds = dataset();
    assert_eq!(ds.column_index(&["orders"]), Some(1));
    assert_eq!(ds.column_index(&["QUANTITY"]), Some(2));
    assert_eq!(ds.column_index(&["sales"]), None);
  }

  #[test]
  fn test_column_index_prefers_earlier_needles() {
    let ds = dataset();
    assert_eq!(ds.column_index(&["qty", "quantity", "strain"]), Some(2));
  }

  #[test]
  fn test_truncate() {
    let mut ds = dataset();
    ds.truncate(None);
    assert_eq!(ds.rows.len(), 2);
    ds.truncate(Some(1));
    assert_eq!(ds.rows.len(), 1);
  }

  #[test]
  fn test_card_ref_display() {
    assert_eq!(CardRef(859).to_string(), "859");
  }
}
