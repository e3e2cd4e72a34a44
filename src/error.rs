//! Error types surfaced to callers.
//!
//! Only remote failures escape this crate. Storage problems are logged and
//! swallowed at the key-value boundary, and the pure role/menu functions are
//! total.

use std::fmt;

use crate::api::types::EntityId;

/// A failed call to the backend.
///
/// Messages are captured as strings so the error can be cloned onto a stale
/// cache result.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
  #[error("network error: {0}")]
  Network(String),
  #[error("unexpected status {status}: {body}")]
  Status { status: u16, body: String },
  #[error("invalid response: {0}")]
  Decode(String),
}

impl From<reqwest::Error> for BackendError {
  fn from(err: reqwest::Error) -> Self {
    if err.is_decode() {
      Self::Decode(err.to_string())
    } else if let Some(status) = err.status() {
      Self::Status {
        status: status.as_u16(),
        body: err.to_string(),
      }
    } else {
      Self::Network(err.to_string())
    }
  }
}

impl From<serde_json::Error> for BackendError {
  fn from(err: serde_json::Error) -> Self {
    Self::Decode(err.to_string())
  }
}

/// The logical backend operation that was attempted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
  Collection { collection: String },
  Detail { collection: String, id: EntityId },
  Lookup { collection: String, id: EntityId },
  GeoScope { user_id: EntityId },
}

impl fmt::Display for Operation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Collection { collection } => write!(f, "list {}", collection),
      Self::Detail { collection, id } => write!(f, "get {} {}", collection, id),
      Self::Lookup { collection, id } => write!(f, "lookup {} {}", collection, id),
      Self::GeoScope { user_id } => write!(f, "geoscope for user {}", user_id),
    }
  }
}

/// A remote failure tagged with what was being fetched, so the UI can show a
/// scoped error instead of a blank page.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{operation}: {source}")]
pub struct RemoteFetchError {
  pub operation: Operation,
  /// Cache key the result would have been written under, if any.
  pub cache_key: Option<String>,
  #[source]
  pub source: BackendError,
}

impl RemoteFetchError {
  pub fn new(operation: Operation, source: BackendError) -> Self {
    Self {
      operation,
      cache_key: None,
      source,
    }
  }

  pub fn with_cache_key(mut self, key: impl Into<String>) -> Self {
    self.cache_key = Some(key.into());
    self
  }
}
