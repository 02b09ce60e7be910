//! HTTP surface for the TRMNL plugin.
//!
//! - `GET|POST /plugin/markup`: rendered layouts, always 200
//! - `GET /health`: liveness, never touches the cache
//! - `GET /metrics/json`: the raw metric set, 503 when there is none

mod routes;
mod state;

use axum::{
  routing::{get, post},
  Router,
};
use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use routes::{health_handler, markup_handler, metrics_json_handler};
pub use state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
  Router::new()
    .route("/plugin/markup", post(markup_handler).get(markup_handler))
    .route("/health", get(health_handler))
    .route("/metrics/json", get(metrics_json_handler))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}

/// Serve until Ctrl+C or SIGTERM.
pub async fn serve(port: u16, state: Arc<AppState>) -> Result<()> {
  let address = format!("0.0.0.0:{port}");
  let listener = TcpListener::bind(&address)
    .await
    .map_err(|e| eyre!("Failed to bind {}: {}", address, e))?;
  info!("Server running on {address}");

  axum::serve(listener, router(state))
    .with_graceful_shutdown(shutdown_signal())
    .await
    .map_err(|e| eyre!("Server error: {}", e))?;

  info!("Server shut down");
  Ok(())
}

async fn shutdown_signal() {
  let ctrl_c = async {
    match tokio::signal::ctrl_c().await {
      Ok(()) => info!("Received Ctrl+C, shutting down"),
      Err(e) => {
        warn!(error = %e, "could not install Ctrl+C handler");
        std::future::pending::<()>().await;
      }
    }
  };

  #[cfg(unix)]
  let terminate = async {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
      Ok(mut stream) => {
        stream.recv().await;
        info!("Received terminate signal, shutting down");
      }
      Err(e) => {
        warn!(error = %e, "could not install SIGTERM handler");
        std::future::pending::<()>().await;
      }
    }
  };

  #[cfg(not(unix))]
  let terminate = std::future::pending::<()>();

  tokio::select! {
    _ = ctrl_c => {},
    _ = terminate => {},
  }
}
