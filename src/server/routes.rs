use axum::{
  body::Bytes,
  extract::{RawQuery, State},
  http::{Method, StatusCode},
  response::{IntoResponse, Response},
  Json,
};
use chrono::{SecondsFormat, Utc};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use super::state::AppState;
use crate::error::NoData;
use crate::markup::{self, Markup};

const NO_DATA_MESSAGE: &str = "Metrics are unavailable right now";

impl IntoResponse for NoData {
  fn into_response(self) -> Response {
    let body = Json(json!({ "error": self.to_string() }));
    (StatusCode::SERVICE_UNAVAILABLE, body).into_response()
  }
}

/// `user_uuid` from a form-encoded POST body, or from the query string.
fn user_uuid(method: &Method, query: Option<&str>, body: &[u8]) -> Option<String> {
  let source = if method == Method::POST && !body.is_empty() {
    body
  } else {
    query.unwrap_or_default().as_bytes()
  };

  url::form_urlencoded::parse(source)
    .find(|(key, _)| key == "user_uuid")
    .map(|(_, value)| value.into_owned())
}

/// Markup for all four layouts. Always 200: the display has no way to show
/// an HTTP error, so failures are rendered as a "no data" screen.
pub async fn markup_handler(
  State(state): State<Arc<AppState>>,
  method: Method,
  RawQuery(query): RawQuery,
  body: Bytes,
) -> Json<Markup> {
  let user = user_uuid(&method, query.as_deref(), &body);
  info!(user_uuid = user.as_deref().unwrap_or("unknown"), "markup requested");

  let markup = match state.metrics().await {
    Ok(result) => markup::render(&result.data).unwrap_or_else(|e| {
      warn!(error = %e, "could not render markup");
      Markup::no_data(NO_DATA_MESSAGE)
    }),
    Err(e) => {
      warn!(error = %e, "no metrics to render");
      Markup::no_data(NO_DATA_MESSAGE)
    }
  };

  Json(markup)
}

pub async fn health_handler() -> impl IntoResponse {
  Json(json!({
    "status": "ok",
    "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
  }))
}

pub async fn metrics_json_handler(State(state): State<Arc<AppState>>) -> Response {
  match state.metrics().await {
    Ok(result) => Json(result.data.as_ref().clone()).into_response(),
    Err(e) => e.into_response(),
  }
}
