//! Shared test fixtures and helpers.
//!
//! A scripted [`CardFetcher`] standing in for Metabase, dataset builders, and
//! a throwaway HTTP server for tests that need a real socket.

use async_trait::async_trait;
use axum::Router;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::error::FetchError;
use crate::metabase::{CardFetcher, CardRef, Dataset};
use crate::stats::MetricSet;

/// `Dataset` from column names and rows.
pub(crate) fn dataset(columns: &[&str], rows: Vec<Vec<Value>>) -> Dataset {
  Dataset {
    columns: columns.iter().map(|c| c.to_string()).collect(),
    rows,
  }
}

/// Single-cell `Dataset`, the shape of the period cards.
pub(crate) fn scalar_dataset(value: f64) -> Dataset {
  dataset(&["Number of orders"], vec![vec![json!(value)]])
}

/// In-memory fetcher. Unknown cards answer `FetchError::Empty`; while
/// `failing` is set every card answers `FetchError::Status { 503 }`.
pub(crate) struct FakeFetcher {
  cards: HashMap<CardRef, Dataset>,
  failing: AtomicBool,
  calls: AtomicUsize,
}

impl FakeFetcher {
  pub(crate) fn new() -> Self {
    Self {
      cards: HashMap::new(),
      failing: AtomicBool::new(false),
      calls: AtomicUsize::new(0),
    }
  }

  /// Every card of the default `CardsConfig`, with realistic figures.
  pub(crate) fn dashboard() -> Self {
    Self::new()
      .with_card(
        CardRef(938),
        dataset(
          &["Users", "Orders", "Quantity", "Sales", "Products"],
          vec![vec![json!(77), json!(78), json!(1800), json!(1968.0), json!(133)]],
        ),
      )
      .with_card(
        CardRef(1275),
        dataset(
          &["Strain", "Orders", "Quantity", "Sales", "Prod"],
          vec![
            vec![json!("A"), json!(6), json!(1000), json!(600.0), json!(3)],
            vec![json!("B"), json!(4), json!(500), json!(400.0), json!(2)],
          ],
        ),
      )
      .with_card(CardRef(859), scalar_dataset(363.0))
      .with_card(CardRef(860), scalar_dataset(2086.0))
      .with_card(CardRef(861), scalar_dataset(6075.0))
      .with_card(CardRef(862), scalar_dataset(7572.0))
  }

  pub(crate) fn with_card(mut self, card: CardRef, dataset: Dataset) -> Self {
    self.cards.insert(card, dataset);
    self
  }

  pub(crate) fn without_card(mut self, card: CardRef) -> Self {
    self.cards.remove(&card);
    self
  }

  pub(crate) fn set_failing(&self, failing: bool) {
    self.failing.store(failing, Ordering::SeqCst);
  }

  /// Number of `fetch_card` calls so far
  pub(crate) fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }
}

#[async_trait]
impl CardFetcher for FakeFetcher {
  async fn fetch_card(&self, card: CardRef, row_limit: Option<u32>) -> Result<Dataset, FetchError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    if self.failing.load(Ordering::SeqCst) {
      return Err(FetchError::Status { card, status: 503 });
    }
    let mut dataset = self
      .cards
      .get(&card)
      .cloned()
      .ok_or(FetchError::Empty { card })?;
    dataset.truncate(row_limit);
    Ok(dataset)
  }
}

/// A fully populated `MetricSet` with fixed values.
pub(crate) fn sample_metric_set() -> MetricSet {
  MetricSet {
    as_of: "2026-10-18T09:30:00Z".to_string(),
    source: "card:938".to_string(),
    total_users: "77".to_string(),
    total_orders: "78".to_string(),
    total_quantity: "1,8kg".to_string(),
    total_sales: "€1.968".to_string(),
    total_products: "133".to_string(),
    past_day_orders: "363".to_string(),
    past_day_change: "↑ 8.7% vs. previous day".to_string(),
    past_week_orders: "2.086".to_string(),
    past_week_change: "↓ 14.3% vs. previous week".to_string(),
    past_month_orders: "6.075".to_string(),
    past_month_change: "".to_string(),
    past_quarter_orders: "7.572".to_string(),
    past_quarter_change: "n/a".to_string(),
  }
}

/// Serve `app` on an ephemeral loopback port; returns `http://127.0.0.1:<port>`.
pub(crate) async fn spawn_http(app: Router) -> String {
  let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
  let addr = listener.local_addr().unwrap();
  tokio::spawn(async move {
    axum::serve(listener, app).await.unwrap();
  });
  format!("http://{addr}")
}
