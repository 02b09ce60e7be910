//! Metabase query transports.
//!
//! Every transport implements [`CardFetcher`]: one query per card, a single
//! attempt, no retries. Callers above decide what a failure means.

mod api_types;
mod bridge;
mod client;
mod types;

use async_trait::async_trait;
use color_eyre::Result;
use std::sync::Arc;

pub use bridge::BridgeFetcher;
pub use client::MetabaseClient;
pub use types::{CardRef, Dataset};

use crate::config::{Config, Transport};
use crate::error::FetchError;

#[async_trait]
pub trait CardFetcher: Send + Sync {
  /// Run the saved query `card`, keeping at most `row_limit` rows.
  async fn fetch_card(&self, card: CardRef, row_limit: Option<u32>) -> Result<Dataset, FetchError>;
}

/// Build the fetcher selected by `metabase.transport`.
pub fn fetcher_from_config(config: &Config) -> Result<Arc<dyn CardFetcher>> {
  let fetcher: Arc<dyn CardFetcher> = match config.metabase.transport {
    Transport::Rest => Arc::new(MetabaseClient::new(&config.metabase, Config::api_key())?),
    Transport::Bridge => Arc::new(BridgeFetcher::new(&config.metabase)),
  };
  Ok(fetcher)
}
