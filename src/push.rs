//! One-shot webhook push: collect once, post the merge variables, exit.
//!
//! Shares nothing with the server and never touches the cache.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{error, info};

use crate::config::WebhookConfig;
use crate::error::PushError;
use crate::stats::{MetricSet, StatsCollector};

/// How a push run ended; maps onto the process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
  Sent,
  Failed,
  /// No webhook URL configured
  NotConfigured,
}

impl PushOutcome {
  pub fn exit_code(self) -> u8 {
    match self {
      PushOutcome::Sent => 0,
      PushOutcome::Failed => 1,
      PushOutcome::NotConfigured => 2,
    }
  }
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
  merge_variables: &'a BTreeMap<String, String>,
}

/// Every metric plus a human-readable `date`, e.g. "Oct 18, 2026".
pub fn merge_variables(metrics: &MetricSet, now: DateTime<Utc>) -> BTreeMap<String, String> {
  let mut variables = metrics.variables();
  variables.insert("date".to_string(), now.format("%b %d, %Y").to_string());
  variables
}

pub struct WebhookClient {
  client: reqwest::Client,
  url: String,
}

impl WebhookClient {
  pub fn new(url: &str, timeout: Duration) -> Result<Self> {
    url::Url::parse(url).map_err(|e| eyre!("Invalid webhook URL {:?}: {}", url, e))?;

    let client = reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| eyre!("Failed to build HTTP client: {}", e))?;

    Ok(Self {
      client,
      url: url.to_string(),
    })
  }

  /// POST `{"merge_variables": ...}`. Any non-2xx answer is an error.
  pub async fn send(&self, variables: &BTreeMap<String, String>) -> Result<(), PushError> {
    let response = self
      .client
      .post(&self.url)
      .json(&WebhookPayload {
        merge_variables: variables,
      })
      .send()
      .await?;

    let status = response.status();
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      return Err(PushError::Status {
        status: status.as_u16(),
        body,
      });
    }

    Ok(())
  }
}

async fn push(collector: &StatsCollector, client: &WebhookClient) -> Result<usize, PushError> {
  let metrics = collector.collect().await?;
  let variables = merge_variables(&metrics, Utc::now());
  client.send(&variables).await?;
  Ok(variables.len())
}

/// Run the push job once. No retries: the scheduler runs it again.
pub async fn run(webhook: &WebhookConfig, collector: &StatsCollector) -> PushOutcome {
  let Some(url) = webhook.url.as_deref() else {
    error!("no webhook URL configured (set TRMNL_WEBHOOK_URL or webhook.url)");
    return PushOutcome::NotConfigured;
  };

  let client = match WebhookClient::new(url, Duration::from_secs(webhook.timeout_secs)) {
    Ok(client) => client,
    Err(e) => {
      error!(error = %e, "webhook client setup failed");
      return PushOutcome::NotConfigured;
    }
  };

  match push(collector, &client).await {
    Ok(count) => {
      info!(variables = count, "pushed metrics to webhook");
      PushOutcome::Sent
    }
    Err(e) => {
      error!(error = %e, "push failed");
      PushOutcome::Failed
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::CardsConfig;
  use crate::testutil::{sample_metric_set, spawn_http, FakeFetcher};
  use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
  use chrono::TimeZone;
  use serde_json::Value;
  use std::sync::{Arc, Mutex};

  type Received = Arc<Mutex<Vec<Value>>>;

  async fn receiver(status: StatusCode) -> (String, Received) {
    let received: Received = Arc::default();
    let app = Router::new()
      .route(
        "/hook",
        post(
          move |State(received): State<Received>, Json(body): Json<Value>| async move {
            received.lock().unwrap().push(body);
            (status, "done")
          },
        ),
      )
      .with_state(received.clone());
    let base = spawn_http(app).await;
    (format!("{base}/hook"), received)
  }

  fn collector(fetcher: FakeFetcher) -> StatsCollector {
    StatsCollector::new(Arc::new(fetcher), CardsConfig::default())
  }

  fn webhook(url: Option<String>) -> WebhookConfig {
    WebhookConfig {
      url,
      timeout_secs: 5,
    }
  }

  #[test]
  fn test_merge_variables_adds_date() {
    let now = Utc.with_ymd_and_hms(2026, 10, 8, 7, 0, 0).unwrap();
    let variables = merge_variables(&sample_metric_set(), now);

    assert_eq!(variables["date"], "Oct 08, 2026");
    assert_eq!(variables["total_sales"], "€1.968");
    assert_eq!(variables.len(), 16);
  }

  #[test]
  fn test_outcome_exit_codes() {
    assert_eq!(PushOutcome::Sent.exit_code(), 0);
    assert_eq!(PushOutcome::Failed.exit_code(), 1);
    assert_eq!(PushOutcome::NotConfigured.exit_code(), 2);
  }

  #[tokio::test]
  async fn test_run_posts_merge_variables() {
    let (url, received) = receiver(StatusCode::OK).await;

    let outcome = run(&webhook(Some(url)), &collector(FakeFetcher::dashboard())).await;

    assert_eq!(outcome, PushOutcome::Sent);
    let bodies = received.lock().unwrap();
    assert_eq!(bodies.len(), 1);
    let variables = &bodies[0]["merge_variables"];
    assert_eq!(variables["total_orders"], "78");
    assert_eq!(variables["past_week_orders"], "2.086");
    assert!(variables["date"].is_string());
  }

  #[tokio::test]
  async fn test_run_without_url() {
    let fetcher = FakeFetcher::dashboard();
    let collector = collector(fetcher);

    assert_eq!(run(&webhook(None), &collector).await, PushOutcome::NotConfigured);
  }

  #[tokio::test]
  async fn test_run_fetch_failure_sends_nothing() {
    let (url, received) = receiver(StatusCode::OK).await;
    let fetcher = FakeFetcher::dashboard();
    fetcher.set_failing(true);

    let outcome = run(&webhook(Some(url)), &collector(fetcher)).await;

    assert_eq!(outcome, PushOutcome::Failed);
    assert!(received.lock().unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_send_rejected_status() {
    let (url, _received) = receiver(StatusCode::TOO_MANY_REQUESTS).await;
    let client = WebhookClient::new(&url, Duration::from_secs(5)).unwrap();

    let err = client
      .send(&merge_variables(&sample_metric_set(), Utc::now()))
      .await
      .unwrap_err();
    assert!(matches!(err, PushError::Status { status: 429, ref body } if body == "done"));
  }

  #[test]
  fn test_invalid_webhook_url() {
    assert!(WebhookClient::new("not a url", Duration::from_secs(1)).is_err());
  }
}
