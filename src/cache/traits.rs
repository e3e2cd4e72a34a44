//! Result types for cache operations.

use chrono::{DateTime, Utc};

use crate::error::RemoteFetchError;

/// Result from a cache operation, including data and metadata about the source.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
  /// When the data was written to the cache (`None` for fresh network data)
  pub cached_at: Option<DateTime<Utc>>,
  /// Set when a refresh was attempted and failed, leaving stale data in place
  pub refresh_error: Option<RemoteFetchError>,
}

impl<T> CacheResult<T> {
  /// Create a new cache result from fresh network data.
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Network,
      cached_at: None,
      refresh_error: None,
    }
  }

  /// Create a new cache result from cached data.
  pub fn from_cache(data: T, cached_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::Cache,
      cached_at: Some(cached_at),
      refresh_error: None,
    }
  }

  /// Cached data served because a refresh failed.
  pub fn stale(data: T, cached_at: DateTime<Utc>, error: RemoteFetchError) -> Self {
    Self {
      data,
      source: CacheSource::Stale,
      cached_at: Some(cached_at),
      refresh_error: Some(error),
    }
  }

  pub fn map<U>(self, f: impl FnOnce(T) -> U) -> CacheResult<U> {
    CacheResult {
      data: f(self.data),
      source: self.source,
      cached_at: self.cached_at,
      refresh_error: self.refresh_error,
    }
  }
}

/// Indicates where cached data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fresh data from network
  Network,
  /// Served from the cache without a network call
  Cache,
  /// Refresh failed, serving the previously cached data
  Stale,
}
