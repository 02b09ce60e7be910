use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use reqwest::{header::CONTENT_TYPE, StatusCode};
use serde_json::json;
use tracing::debug;
use url::Url;

use super::api_types::ApiDatasetResponse;
use super::types::{CardRef, Dataset, ProbeReport};
use super::CardFetcher;
use crate::config::MetabaseConfig;
use crate::error::FetchError;

/// Metabase REST client.
///
/// With an API key, cards are queried through the authenticated
/// `/api/card/{id}/query` endpoint; without one, through the public
/// `/api/public/card/{id}/query` endpoint.
#[derive(Clone)]
pub struct MetabaseClient {
  client: reqwest::Client,
  base: String,
  api_key: Option<String>,
}

impl MetabaseClient {
  pub fn new(config: &MetabaseConfig, api_key: Option<String>) -> Result<Self> {
    let base = Url::parse(&config.url)
      .map_err(|e| eyre!("Invalid Metabase URL {:?}: {}", config.url, e))?;
    if !matches!(base.scheme(), "http" | "https") {
      return Err(eyre!("Metabase URL must be http(s): {}", config.url));
    }

    let client = reqwest::Client::builder()
      .timeout(config.timeout())
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      client,
      base: base.as_str().trim_end_matches('/').to_string(),
      api_key,
    })
  }

  fn card_url(&self, card: CardRef) -> String {
    if self.api_key.is_some() {
      format!("{}/api/card/{}/query", self.base, card)
    } else {
      format!("{}/api/public/card/{}/query", self.base, card)
    }
  }

  /// The authenticated endpoint takes the row limit as a query constraint;
  /// the public one has no body, so rows are cut after the response.
  fn request(&self, card: CardRef, row_limit: Option<u32>) -> reqwest::RequestBuilder {
    let url = self.card_url(card);
    match &self.api_key {
      Some(key) => {
        let body = match row_limit {
          Some(limit) => json!({ "constraints": { "max-results": limit } }),
          None => json!({}),
        };
        self
          .client
          .post(url)
          .header("X-API-KEY", key)
          .json(&body)
      }
      None => self.client.get(url),
    }
  }

  /// Issue the card query and report only HTTP metadata. Safe to print:
  /// no data payload and no credentials.
  pub async fn probe(&self, card: CardRef) -> ProbeReport {
    let url = self.card_url(card);
    match self.request(card, Some(1)).send().await {
      Ok(response) => ProbeReport {
        card,
        url,
        status_code: Some(response.status().as_u16()),
        ok: response.status().is_success(),
        content_type: response
          .headers()
          .get(CONTENT_TYPE)
          .and_then(|v| v.to_str().ok())
          .map(String::from),
        error: None,
      },
      Err(e) => ProbeReport {
        card,
        url,
        status_code: None,
        ok: false,
        content_type: None,
        error: Some(e.to_string()),
      },
    }
  }
}

#[async_trait]
impl CardFetcher for MetabaseClient {
  async fn fetch_card(&self, card: CardRef, row_limit: Option<u32>) -> Result<Dataset, FetchError> {
    debug!(%card, url = %self.card_url(card), "querying card");

    let response = self
      .request(card, row_limit)
      .send()
      .await
      .map_err(|source| FetchError::Transport { card, source })?;

    let status = response.status();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
      return Err(FetchError::Unauthorized {
        card,
        status: status.as_u16(),
      });
    }
    if !status.is_success() {
      return Err(FetchError::Status {
        card,
        status: status.as_u16(),
      });
    }

    let body = response
      .bytes()
      .await
      .map_err(|source| FetchError::Transport { card, source })?;
    let parsed: ApiDatasetResponse =
      serde_json::from_slice(&body).map_err(|e| FetchError::Malformed {
        card,
        reason: e.to_string(),
      })?;

    if let Some(message) = parsed.failure() {
      return Err(FetchError::Query { card, message });
    }

    let mut dataset = parsed.into_dataset();
    dataset.truncate(row_limit);
    if dataset.is_empty() {
      return Err(FetchError::Empty { card });
    }

    Ok(dataset)
  }
}
