mod cache;
mod config;
mod error;
mod markup;
mod metabase;
mod push;
mod server;
mod stats;
#[cfg(test)]
mod testutil;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use cache::{MetricsCache, NoopStorage, SnapshotStorage, SqliteStorage};
use config::Config;
use metabase::MetabaseClient;
use server::AppState;
use stats::StatsCollector;

#[derive(Parser, Debug)]
#[command(name = "trmnl-orders")]
#[command(about = "Order metrics from Metabase for a TRMNL e-ink display")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/trmnl-orders/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Listen port, overrides PORT and server.port
  #[arg(short, long, global = true)]
  port: Option<u16>,

  #[command(subcommand)]
  command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Command {
  /// Serve the plugin endpoints (default)
  Serve,
  /// Collect once and post the metrics to the webhook
  Push,
  /// Query every configured card and report what Metabase answers
  Probe,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
  color_eyre::install()?;

  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  let args = Args::parse();

  let mut config = Config::load(args.config.as_deref())?;
  if let Some(port) = args.port {
    config.server.port = port;
  }

  match args.command.unwrap_or(Command::Serve) {
    Command::Serve => serve(config).await?,
    Command::Push => {
      let collector = StatsCollector::new(metabase::fetcher_from_config(&config)?, config.cards.clone());
      let outcome = push::run(&config.webhook, &collector).await;
      return Ok(ExitCode::from(outcome.exit_code()));
    }
    Command::Probe => probe(&config).await?,
  }

  Ok(ExitCode::SUCCESS)
}

async fn serve(config: Config) -> Result<()> {
  let fetcher = metabase::fetcher_from_config(&config)?;
  let collector = StatsCollector::new(fetcher, config.cards.clone());

  let storage: Arc<dyn SnapshotStorage> = if config.server.persist_snapshot {
    match SqliteStorage::open(config.server.cache_path.as_deref()) {
      Ok(storage) => Arc::new(storage),
      Err(e) => {
        warn!(error = %e, "snapshot persistence unavailable, keeping metrics in memory only");
        Arc::new(NoopStorage)
      }
    }
  } else {
    Arc::new(NoopStorage)
  };

  let cache = MetricsCache::new(storage, collector.cards().fingerprint()).with_freshness(config.freshness());

  info!(
    metabase = %config.metabase.url,
    transport = ?config.metabase.transport,
    freshness_secs = config.server.freshness_secs,
    "starting server"
  );
  server::serve(config.server.port, Arc::new(AppState::new(cache, collector))).await
}

async fn probe(config: &Config) -> Result<()> {
  let client = MetabaseClient::new(&config.metabase, Config::api_key())?;

  let mut failed = 0;
  for (name, card) in config.cards.all() {
    let report = client.probe(card).await;
    if !report.ok {
      failed += 1;
    }
    let line = serde_json::to_string(&report).map_err(|e| eyre!("Failed to encode probe report: {}", e))?;
    println!("{name}\t{line}");
  }

  if failed > 0 {
    return Err(eyre!("{} card(s) did not answer successfully", failed));
  }
  Ok(())
}
