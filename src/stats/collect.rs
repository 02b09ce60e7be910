//! Turns card datasets into a [`MetricSet`].

use chrono::{SecondsFormat, Utc};
use futures::future::try_join_all;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use super::format::{format_change, format_count, format_currency, format_weight_kg};
use super::MetricSet;
use crate::config::{CardsConfig, PeriodCards};
use crate::error::{NormalizationError, RefreshError};
use crate::metabase::{CardFetcher, CardRef, Dataset};

/// Rows requested from the per-product breakdown card
const BREAKDOWN_ROW_LIMIT: u32 = 2000;

/// Share of orders assumed to come from distinct users when only the
/// breakdown card is available
const USERS_PER_ORDER_ESTIMATE: f64 = 0.6;

const USERS: &[&str] = &["users", "user"];
const ORDERS: &[&str] = &["orders", "order"];
const QUANTITY: &[&str] = &["quantity", "qty", "gram"];
const SALES: &[&str] = &["sales", "revenue", "umsatz", "value"];
const PRODUCTS: &[&str] = &["products", "prod", "items"];

/// Read a cell as a number. Null means "no value"; numeric strings are
/// accepted since some cards return formatted text.
fn number(metric: &'static str, value: &Value) -> Result<Option<f64>, NormalizationError> {
  match value {
    Value::Null => Ok(None),
    Value::Number(n) => Ok(n.as_f64()),
    Value::String(s) => s
      .trim()
      .parse::<f64>()
      .map(Some)
      .map_err(|_| NormalizationError::NotNumeric {
        metric,
        value: value.to_string(),
      }),
    other => Err(NormalizationError::NotNumeric {
      metric,
      value: other.to_string(),
    }),
  }
}

/// First cell of a single-value card
pub fn scalar(metric: &'static str, dataset: &Dataset) -> Result<f64, NormalizationError> {
  let cell = dataset
    .first_cell()
    .ok_or(NormalizationError::NoRows { metric })?;
  Ok(number(metric, cell)?.unwrap_or(0.0))
}

/// One of today's KPIs: a number still to be formatted, or text the card
/// already formatted (e.g. "€9.916"), which is shown as it is.
#[derive(Debug, Clone, PartialEq)]
pub enum Figure {
  Number(f64),
  Text(String),
}

impl Default for Figure {
  fn default() -> Self {
    Figure::Number(0.0)
  }
}

impl Figure {
  /// Read a summary cell. Strings that do not parse as a number are kept as
  /// display text; blank strings and nulls read as zero.
  fn from_cell(metric: &'static str, value: &Value) -> Result<Self, NormalizationError> {
    match value {
      Value::String(s) => {
        let text = s.trim();
        if text.is_empty() {
          return Ok(Figure::default());
        }
        Ok(match text.parse::<f64>() {
          Ok(n) => Figure::Number(n),
          Err(_) => Figure::Text(text.to_string()),
        })
      }
      other => Ok(Figure::Number(number(metric, other)?.unwrap_or(0.0))),
    }
  }

  fn display(&self, format: fn(f64) -> String) -> String {
    match self {
      Figure::Number(n) => format(*n),
      Figure::Text(text) => text.clone(),
    }
  }
}

/// Today's KPIs before formatting.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TodayFigures {
  pub users: Figure,
  pub orders: Figure,
  pub quantity_grams: Figure,
  pub sales: Figure,
  pub products: Figure,
}

impl TodayFigures {
  /// Read the first row of a summary card, matching columns by name. Only
  /// the orders column is required; other missing columns read as zero.
  pub fn from_summary(dataset: &Dataset) -> Result<Self, NormalizationError> {
    const METRIC: &str = "today summary";

    let row = dataset
      .rows
      .first()
      .ok_or(NormalizationError::NoRows { metric: METRIC })?;
    let orders_idx = dataset
      .column_index(ORDERS)
      .ok_or(NormalizationError::MissingColumn {
        metric: METRIC,
        wanted: "orders",
      })?;

    let cell = |idx: Option<usize>| -> Result<Figure, NormalizationError> {
      match idx.and_then(|i| row.get(i)) {
        Some(value) => Figure::from_cell(METRIC, value),
        None => Ok(Figure::default()),
      }
    };

    Ok(Self {
      users: cell(dataset.column_index(USERS))?,
      orders: cell(Some(orders_idx))?,
      quantity_grams: cell(dataset.column_index(QUANTITY))?,
      sales: cell(dataset.column_index(SALES))?,
      products: cell(dataset.column_index(PRODUCTS))?,
    })
  }

  /// Sum a per-product breakdown over all rows. Users are not in the
  /// breakdown and are estimated from the order count.
  pub fn from_breakdown(dataset: &Dataset) -> Result<Self, NormalizationError> {
    const METRIC: &str = "today breakdown";

    if dataset.is_empty() {
      return Err(NormalizationError::NoRows { metric: METRIC });
    }
    let orders_idx = dataset
      .column_index(ORDERS)
      .ok_or(NormalizationError::MissingColumn {
        metric: METRIC,
        wanted: "orders",
      })?;

    let sum = |idx: Option<usize>| -> Result<f64, NormalizationError> {
      let Some(idx) = idx else {
        return Ok(0.0);
      };
      let mut total = 0.0;
      for row in &dataset.rows {
        if let Some(value) = row.get(idx) {
          total += number(METRIC, value)?.unwrap_or(0.0);
        }
      }
      Ok(total)
    };

    let orders = sum(Some(orders_idx))?;
    Ok(Self {
      users: Figure::Number((orders * USERS_PER_ORDER_ESTIMATE).floor()),
      orders: Figure::Number(orders),
      quantity_grams: Figure::Number(sum(dataset.column_index(QUANTITY))?),
      sales: Figure::Number(sum(dataset.column_index(SALES))?),
      products: Figure::Number(sum(dataset.column_index(PRODUCTS))?),
    })
  }
}

/// Formatted figures for one reporting period
#[derive(Debug, Clone, PartialEq)]
struct PeriodFigures {
  orders: String,
  change: String,
}

/// Fetches every configured card and assembles a [`MetricSet`].
///
/// A refresh is all-or-nothing: if any required card fails, the whole
/// collection fails and no partial set is produced.
#[derive(Clone)]
pub struct StatsCollector {
  fetcher: Arc<dyn CardFetcher>,
  cards: CardsConfig,
}

impl StatsCollector {
  pub fn new(fetcher: Arc<dyn CardFetcher>, cards: CardsConfig) -> Self {
    Self { fetcher, cards }
  }

  pub fn cards(&self) -> &CardsConfig {
    &self.cards
  }

  pub async fn collect(&self) -> Result<MetricSet, RefreshError> {
    let periods = [
      ("day", self.cards.day),
      ("week", self.cards.week),
      ("month", self.cards.month),
      ("quarter", self.cards.quarter),
    ];

    let (today, periods) = futures::try_join!(
      self.today(),
      try_join_all(
        periods
          .into_iter()
          .map(|(name, cards)| self.period(name, cards))
      ),
    )?;
    let (figures, source) = today;
    let [day, week, month, quarter]: [PeriodFigures; 4] = periods
      .try_into()
      .map_err(|_| NormalizationError::NoRows { metric: "periods" })?;

    Ok(MetricSet {
      as_of: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
      source,
      total_users: figures.users.display(format_count),
      total_orders: figures.orders.display(format_count),
      total_quantity: figures.quantity_grams.display(format_weight_kg),
      total_sales: figures.sales.display(format_currency),
      total_products: figures.products.display(format_count),
      past_day_orders: day.orders,
      past_day_change: day.change,
      past_week_orders: week.orders,
      past_week_change: week.change,
      past_month_orders: month.orders,
      past_month_change: month.change,
      past_quarter_orders: quarter.orders,
      past_quarter_change: quarter.change,
    })
  }

  /// Today's figures, from the summary card if it works, else from the
  /// breakdown card.
  async fn today(&self) -> Result<(TodayFigures, String), RefreshError> {
    let mut last_error = None;

    if let Some(card) = self.cards.summary {
      match self.summary(card).await {
        Ok(figures) => return Ok((figures, format!("card:{card}"))),
        Err(e) => {
          warn!(%card, error = %e, "summary card unusable, trying breakdown");
          last_error = Some(e);
        }
      }
    }

    if let Some(card) = self.cards.fallback {
      match self.breakdown(card).await {
        Ok(figures) => return Ok((figures, format!("public_card:{card}"))),
        Err(e) => last_error = Some(e),
      }
    }

    match last_error {
      Some(e) => Err(e),
      // Neither card configured: today's block stays at zero
      None => Ok((TodayFigures::default(), "unknown".to_string())),
    }
  }

  async fn summary(&self, card: CardRef) -> Result<TodayFigures, RefreshError> {
    let dataset = self.fetcher.fetch_card(card, Some(1)).await?;
    Ok(TodayFigures::from_summary(&dataset)?)
  }

  async fn breakdown(&self, card: CardRef) -> Result<TodayFigures, RefreshError> {
    let dataset = self
      .fetcher
      .fetch_card(card, Some(BREAKDOWN_ROW_LIMIT))
      .await?;
    Ok(TodayFigures::from_breakdown(&dataset)?)
  }

  async fn period(&self, name: &'static str, cards: PeriodCards) -> Result<PeriodFigures, RefreshError> {
    let current = scalar(name, &self.fetcher.fetch_card(cards.current, Some(1)).await?)?;
    debug!(period = name, current, "period orders");

    let change = match cards.previous {
      Some(card) => {
        let previous = scalar(name, &self.fetcher.fetch_card(card, Some(1)).await?)?;
        format_change(current, previous, name)
      }
      None => String::new(),
    };

    Ok(PeriodFigures {
      orders: format_count(current),
      change,
    })
  }
}
