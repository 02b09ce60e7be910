//! Error types for the fetch -> normalize -> render pipeline.
//!
//! Application plumbing (config, start-up) reports through `color_eyre`; the
//! types here are the ones the cache and the endpoints need to match on.

use thiserror::Error;

use crate::metabase::CardRef;

/// A single card query against the BI API failed.
#[derive(Error, Debug)]
pub enum FetchError {
  #[error("request for card {card} failed: {source}")]
  Transport {
    card: CardRef,
    #[source]
    source: reqwest::Error,
  },

  #[error("card {card} rejected credentials (HTTP {status})")]
  Unauthorized { card: CardRef, status: u16 },

  #[error("card {card} returned HTTP {status}")]
  Status { card: CardRef, status: u16 },

  #[error("card {card} query failed upstream: {message}")]
  Query { card: CardRef, message: String },

  #[error("card {card} returned no rows")]
  Empty { card: CardRef },

  #[error("card {card} returned a malformed body: {reason}")]
  Malformed { card: CardRef, reason: String },

  #[error("bridge command for card {card} failed: {reason}")]
  Bridge { card: CardRef, reason: String },
}

/// A dataset did not have the shape a metric needs.
#[derive(Error, Debug, PartialEq)]
pub enum NormalizationError {
  #[error("{metric}: dataset has no rows")]
  NoRows { metric: &'static str },

  #[error("{metric}: no column matching {wanted}")]
  MissingColumn {
    metric: &'static str,
    wanted: &'static str,
  },

  #[error("{metric}: expected a number, got {value}")]
  NotNumeric { metric: &'static str, value: String },
}

/// Template substitution failed.
#[derive(Error, Debug, PartialEq)]
pub enum RenderError {
  #[error("template {template} references unknown value {key:?}")]
  UnknownKey { template: &'static str, key: String },

  #[error("template {template} has an unterminated placeholder")]
  Unterminated { template: &'static str },
}

/// Everything a single refresh attempt can fail with.
#[derive(Error, Debug)]
pub enum RefreshError {
  #[error(transparent)]
  Fetch(#[from] FetchError),

  #[error(transparent)]
  Normalize(#[from] NormalizationError),
}

/// The cache has nothing to serve: no entry yet and the refresh failed.
#[derive(Error, Debug)]
#[error("no metrics available: {0}")]
pub struct NoData(#[source] pub RefreshError);

/// The webhook push job failed.
#[derive(Error, Debug)]
pub enum PushError {
  #[error(transparent)]
  Refresh(#[from] RefreshError),

  #[error("webhook request failed: {0}")]
  Transport(#[from] reqwest::Error),

  #[error("webhook returned HTTP {status}: {body}")]
  Status { status: u16, body: String },
}
