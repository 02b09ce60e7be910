use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::metabase::CardRef;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
  pub metabase: MetabaseConfig,
  pub cards: CardsConfig,
  pub server: ServerConfig,
  pub webhook: WebhookConfig,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
  /// Query the Metabase REST API directly
  #[default]
  Rest,
  /// Shell out to the MCP command-line bridge
  Bridge,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetabaseConfig {
  pub url: String,
  pub transport: Transport,
  /// Executable used when `transport: bridge`
  pub bridge_command: String,
  /// Server name passed to the bridge (`--server <name>`)
  pub bridge_server: String,
  pub timeout_secs: u64,
}

impl Default for MetabaseConfig {
  fn default() -> Self {
    Self {
      url: "http://localhost:3000".to_string(),
      transport: Transport::Rest,
      bridge_command: "manus-mcp-cli".to_string(),
      bridge_server: "metabase".to_string(),
      timeout_secs: 30,
    }
  }
}

impl MetabaseConfig {
  pub fn timeout(&self) -> Duration {
    Duration::from_secs(self.timeout_secs)
  }
}

/// Cards for one reporting period. The change is only computed when a
/// `previous` card is configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodCards {
  pub current: CardRef,
  #[serde(default)]
  pub previous: Option<CardRef>,
}

impl PeriodCards {
  const fn current(id: u64) -> Self {
    Self {
      current: CardRef(id),
      previous: None,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CardsConfig {
  /// Single-row summary of today's KPIs
  pub summary: Option<CardRef>,
  /// Per-product breakdown of today's orders, summed when the summary fails
  pub fallback: Option<CardRef>,
  pub day: PeriodCards,
  pub week: PeriodCards,
  pub month: PeriodCards,
  pub quarter: PeriodCards,
}

impl Default for CardsConfig {
  fn default() -> Self {
    Self {
      summary: Some(CardRef(938)),
      fallback: Some(CardRef(1275)),
      day: PeriodCards::current(859),
      week: PeriodCards::current(860),
      month: PeriodCards::current(861),
      quarter: PeriodCards::current(862),
    }
  }
}

impl CardsConfig {
  /// Stable hash of the card bindings, so a persisted snapshot produced
  /// under a different configuration is never served.
  pub fn fingerprint(&self) -> String {
    let input = serde_json::to_string(self).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
  }

  /// Every card the configuration refers to, in a stable order.
  pub fn all(&self) -> Vec<(&'static str, CardRef)> {
    let mut cards = Vec::new();
    if let Some(card) = self.summary {
      cards.push(("summary", card));
    }
    if let Some(card) = self.fallback {
      cards.push(("fallback", card));
    }
    for (name, period) in [
      ("day", &self.day),
      ("week", &self.week),
      ("month", &self.month),
      ("quarter", &self.quarter),
    ] {
      cards.push((name, period.current));
      if let Some(previous) = period.previous {
        cards.push((name, previous));
      }
    }
    cards
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
  pub port: u16,
  /// Seconds a fetched metric set is served without revalidation
  pub freshness_secs: u64,
  /// Keep the last good metric set on disk across restarts
  pub persist_snapshot: bool,
  /// Snapshot database location (default: $XDG_DATA_HOME/trmnl-orders/snapshot.db)
  pub cache_path: Option<PathBuf>,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      port: 5000,
      freshness_secs: 900,
      persist_snapshot: true,
      cache_path: None,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
  pub url: Option<String>,
  pub timeout_secs: u64,
}

impl Default for WebhookConfig {
  fn default() -> Self {
    Self {
      url: None,
      timeout_secs: 15,
    }
  }
}

impl Config {
  /// Load configuration from file, then apply environment overrides.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./trmnl-orders.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/trmnl-orders/config.yaml
  ///
  /// Unlike the explicit path, a missing file in the search locations is
  /// not an error: every setting has a default.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    let mut config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Self::default(),
    };
    config.apply_overrides(|key| std::env::var(key).ok())?;

    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("trmnl-orders.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("trmnl-orders").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn from_yaml(contents: &str) -> Result<Self, serde_yaml::Error> {
    // An empty file deserializes to `null`
    if contents.trim().is_empty() {
      return Ok(Self::default());
    }
    serde_yaml::from_str(contents)
  }

  /// Apply `METABASE_URL`, `TRMNL_WEBHOOK_URL`, `PORT` and
  /// `TRMNL_ORDERS_CACHE_PATH` on top of the file settings.
  fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
    let var = |key: &str| {
      lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
    };

    if let Some(url) = var("METABASE_URL") {
      self.metabase.url = url;
    }
    if let Some(url) = var("TRMNL_WEBHOOK_URL") {
      self.webhook.url = Some(url);
    }
    if let Some(port) = var("PORT") {
      self.server.port = port
        .parse()
        .map_err(|e| eyre!("Invalid PORT value {:?}: {}", port, e))?;
    }
    if let Some(path) = var("TRMNL_ORDERS_CACHE_PATH") {
      self.server.cache_path = Some(PathBuf::from(path));
    }

    Ok(())
  }

  /// Get the Metabase API key from the environment.
  ///
  /// Returns None when `METABASE_API_KEY` is unset or blank, in which case
  /// the public card endpoints are used.
  pub fn api_key() -> Option<String> {
    std::env::var("METABASE_API_KEY")
      .ok()
      .map(|key| key.trim().to_string())
      .filter(|key| !key.is_empty())
  }

  pub fn freshness(&self) -> chrono::Duration {
    let secs = i64::try_from(self.server.freshness_secs).unwrap_or(i64::MAX);
    chrono::Duration::seconds(secs.min(i64::MAX / 1000))
  }
}
