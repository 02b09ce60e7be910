//! Order metrics: collection from Metabase and display formatting.

mod collect;
pub mod format;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub use collect::StatsCollector;

/// One complete, formatted snapshot of the dashboard figures.
///
/// Every value is already a display string. A refresh produces a whole new
/// set; fields are never updated individually.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricSet {
  /// RFC 3339 instant the set was produced
  pub as_of: String,
  /// Which card produced today's figures
  pub source: String,

  pub total_users: String,
  pub total_orders: String,
  pub total_quantity: String,
  pub total_sales: String,
  pub total_products: String,

  pub past_day_orders: String,
  pub past_day_change: String,
  pub past_week_orders: String,
  pub past_week_change: String,
  pub past_month_orders: String,
  pub past_month_change: String,
  pub past_quarter_orders: String,
  pub past_quarter_change: String,
}

impl MetricSet {
  /// All metrics as (name, value) pairs, in display order
  pub fn entries(&self) -> [(&'static str, &str); 15] {
    [
      ("as_of", self.as_of.as_str()),
      ("source", self.source.as_str()),
      ("total_users", self.total_users.as_str()),
      ("total_orders", self.total_orders.as_str()),
      ("total_quantity", self.total_quantity.as_str()),
      ("total_sales", self.total_sales.as_str()),
      ("total_products", self.total_products.as_str()),
      ("past_day_orders", self.past_day_orders.as_str()),
      ("past_day_change", self.past_day_change.as_str()),
      ("past_week_orders", self.past_week_orders.as_str()),
      ("past_week_change", self.past_week_change.as_str()),
      ("past_month_orders", self.past_month_orders.as_str()),
      ("past_month_change", self.past_month_change.as_str()),
      ("past_quarter_orders", self.past_quarter_orders.as_str()),
      ("past_quarter_change", self.past_quarter_change.as_str()),
    ]
  }

  pub fn get(&self, name: &str) -> Option<&str> {
    self
      .entries()
      .into_iter()
      .find(|(key, _)| *key == name)
      .map(|(_, value)| value)
  }

  /// Flat name -> value mapping, as pushed to the display webhook
  pub fn variables(&self) -> BTreeMap<String, String> {
    self
      .entries()
      .into_iter()
      .map(|(key, value)| (key.to_string(), value.to_string()))
      .collect()
  }
}
