//! Card queries through the MCP command-line bridge.

use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use super::api_types::BridgeResult;
use super::types::{CardRef, Dataset};
use super::CardFetcher;
use crate::config::MetabaseConfig;
use crate::error::FetchError;

/// Line the bridge prints right before the JSON payload
const RESULT_MARKER: &str = "Tool execution result:";

/// Row limit sent when the caller does not ask for one
const DEFAULT_ROW_LIMIT: u32 = 2000;

/// Runs `<command> tool call execute --server <server> --input <json>` once
/// per card and parses the payload it prints.
#[derive(Debug, Clone)]
pub struct BridgeFetcher {
  command: String,
  server: String,
  timeout: Duration,
}

impl BridgeFetcher {
  pub fn new(config: &MetabaseConfig) -> Self {
    Self {
      command: config.bridge_command.clone(),
      server: config.bridge_server.clone(),
      timeout: config.timeout(),
    }
  }
}

#[async_trait]
impl CardFetcher for BridgeFetcher {
  async fn fetch_card(&self, card: CardRef, row_limit: Option<u32>) -> Result<Dataset, FetchError> {
    let input = json!({
      "card_id": card.0,
      "row_limit": row_limit.unwrap_or(DEFAULT_ROW_LIMIT),
    })
    .to_string();

    debug!(%card, command = %self.command, "querying card through bridge");

    let run = Command::new(&self.command)
      .args(["tool", "call", "execute", "--server", &self.server, "--input", &input])
      .kill_on_drop(true)
      .output();

    let output = tokio::time::timeout(self.timeout, run)
      .await
      .map_err(|_| FetchError::Bridge {
        card,
        reason: format!("timed out after {}s", self.timeout.as_secs()),
      })?
      .map_err(|e| FetchError::Bridge {
        card,
        reason: format!("failed to run {}: {}", self.command, e),
      })?;

    if !output.status.success() {
      let stderr = String::from_utf8_lossy(&output.stderr);
      return Err(FetchError::Bridge {
        card,
        reason: format!("{}: {}", output.status, stderr.trim()),
      });
    }

    let mut dataset = parse_output(card, &String::from_utf8_lossy(&output.stdout))?;
    dataset.truncate(row_limit);
    Ok(dataset)
  }
}

/// Extract the dataset from bridge stdout. The JSON follows the marker line;
/// without a marker the whole output is tried as JSON.
fn parse_output(card: CardRef, stdout: &str) -> Result<Dataset, FetchError> {
  let payload = match stdout.find(RESULT_MARKER) {
    Some(pos) => {
      let after_marker = &stdout[pos + RESULT_MARKER.len()..];
      // The payload starts on the line after the marker
      after_marker
        .split_once('\n')
        .map(|(_, rest)| rest)
        .unwrap_or("")
    }
    None => stdout,
  };

  let result: BridgeResult =
    serde_json::from_str(payload.trim()).map_err(|e| FetchError::Malformed {
      card,
      reason: e.to_string(),
    })?;

  if !result.success {
    let message = match &result.error {
      Some(serde_json::Value::String(s)) => s.clone(),
      Some(other) => other.to_string(),
      None => "bridge reported failure".to_string(),
    };
    return Err(FetchError::Query { card, message });
  }

  let dataset = result.into_dataset();
  if dataset.is_empty() {
    return Err(FetchError::Empty { card });
  }
  Ok(dataset)
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  const OUTPUT: &str = r#"Connecting to server metabase...
Calling tool execute
Tool execution result:
{
  "success": true,
  "data": {
    "0": { "Number of orders": 146, "Total sales": 1968.0 },
    "1": { "Number of orders": 120, "Total sales": 1500.5 }
  }
}
"#;

  #[test]
  fn test_parse_output_after_marker() {
    let ds = parse_output(CardRef(146), OUTPUT).unwrap();
    assert_eq!(ds.columns, vec!["Number of orders", "Total sales"]);
    assert_eq!(ds.rows.len(), 2);
    assert_eq!(ds.first_cell(), Some(&json!(146)));
  }

  #[test]
  fn test_parse_output_without_marker() {
    let ds = parse_output(
      CardRef(1),
      r#"{"success": true, "data": {"0": {"Orders": 3}}}"#,
    )
    .unwrap();
    assert_eq!(ds.first_cell(), Some(&json!(3)));
  }

  #[test]
  fn test_parse_output_failure_flag() {
    let err = parse_output(
      CardRef(1),
      r#"{"success": false, "error": "card not found"}"#,
    )
    .unwrap_err();
    assert!(matches!(err, FetchError::Query { ref message, .. } if message == "card not found"));
  }

  #[test]
  fn test_parse_output_empty_data() {
    let err = parse_output(CardRef(7), r#"{"success": true, "data": {}}"#).unwrap_err();
    assert!(matches!(err, FetchError::Empty { card: CardRef(7) }));
  }

  #[test]
  fn test_parse_output_garbage() {
    let err = parse_output(CardRef(1), "Tool execution result:\nnope").unwrap_err();
    assert!(matches!(err, FetchError::Malformed { .. }));
  }

  fn fetcher(command: &str) -> BridgeFetcher {
    BridgeFetcher::new(&MetabaseConfig {
      bridge_command: command.to_string(),
      ..MetabaseConfig::default()
    })
  }

  #[tokio::test]
  async fn test_missing_command_is_bridge_error() {
    let err = fetcher("definitely-not-a-real-bridge-binary")
      .fetch_card(CardRef(1), None)
      .await
      .unwrap_err();
    assert!(matches!(err, FetchError::Bridge { .. }));
  }

  #[cfg(unix)]
  #[tokio::test]
  async fn test_non_json_output_is_malformed() {
    // `echo` prints its arguments back, which is not a bridge payload
    let err = fetcher("echo")
      .fetch_card(CardRef(1), Some(5))
      .await
      .unwrap_err();
    assert!(matches!(err, FetchError::Malformed { .. }));
  }

  #[cfg(unix)]
  #[tokio::test]
  async fn test_failing_command_is_bridge_error() {
    let err = fetcher("false").fetch_card(CardRef(1), None).await.unwrap_err();
    assert!(matches!(err, FetchError::Bridge { .. }));
  }

  #[cfg(unix)]
  #[tokio::test]
  async fn test_slow_command_times_out() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("slow-bridge");
    std::fs::write(&script, "#!/bin/sh\nexec sleep 10\n").unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

    let fetcher = BridgeFetcher::new(&MetabaseConfig {
      bridge_command: script.display().to_string(),
      timeout_secs: 1,
      ..MetabaseConfig::default()
    });
    let err = fetcher.fetch_card(CardRef(1), None).await.unwrap_err();
    assert!(
      matches!(err, FetchError::Bridge { ref reason, .. } if reason.contains("timed out")),
      "unexpected error: {err}"
    );
  }
}
