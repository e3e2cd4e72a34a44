//! Cache layer that orchestrates caching logic with network fetching.

use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use tracing::{debug, warn};

use super::entry::{CacheEntry, CacheMeta};
use super::key::CacheKey;
use super::traits::CacheResult;
use crate::error::{BackendError, Operation, RemoteFetchError};
use crate::store::KeyValueStore;

/// Options for a read-through fetch.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
  /// Skip the cache and always call the fetcher
  pub force: bool,
  /// Tags stored with the entry on a successful fetch
  pub meta: CacheMeta,
}

impl FetchOptions {
  pub fn forced() -> Self {
    Self {
      force: true,
      meta: CacheMeta::new(),
    }
  }

  pub fn force(mut self, force: bool) -> Self {
    self.force = force;
    self
  }

  pub fn meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.meta.insert(key.into(), value.into());
    self
  }
}

/// Read-through cache of list and detail responses.
///
/// Entries never expire on their own. Callers decide when to bypass the
/// cache (`force`) or drop an entry (`invalidate`).
#[derive(Clone)]
pub struct EntityCache {
  store: KeyValueStore,
}

impl EntityCache {
  pub fn new(store: KeyValueStore) -> Self {
    Self { store }
  }

  /// Cached entry for `key`, if present and decodable.
  pub fn read<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<CacheEntry<T>> {
    self.store.get(&key.render())
  }

  /// Replace the entry for `key`.
  pub fn write<T: Serialize>(&self, key: &CacheKey, payload: T, meta: CacheMeta) {
    self.store.set(&key.render(), &CacheEntry::new(payload, meta));
  }

  pub fn invalidate(&self, key: &CacheKey) {
    self.store.remove(&key.render());
  }

  /// Drop every cached page and scope of `collection`.
  pub fn invalidate_collection(&self, collection: &str) -> usize {
    self
      .store
      .clear_prefix(&CacheKey::collection_prefix(collection))
  }

  /// Fetch with cache-first strategy.
  ///
  /// 1. Unless forced, return the cached payload without calling `fetcher`
  /// 2. Otherwise fetch from network
  /// 3. On success, overwrite the entry and return the fresh data
  /// 4. On failure, leave any existing entry untouched and return the error
  pub async fn load_or_fetch<T, F, Fut>(
    &self,
    key: &CacheKey,
    operation: Operation,
    options: FetchOptions,
    fetcher: F,
  ) -> Result<CacheResult<T>, RemoteFetchError>
  where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, BackendError>>,
  {
    if !options.force {
      if let Some(entry) = self.read::<T>(key) {
        debug!(key = %key, "cache hit");
        return Ok(CacheResult::from_cache(entry.payload, entry.written_at));
      }
      debug!(key = %key, "cache miss");
    }

    match fetcher().await {
      Ok(data) => {
        self.write(key, &data, options.meta);
        Ok(CacheResult::from_network(data))
      }
      Err(source) => {
        warn!(key = %key, %operation, error = %source, "fetch failed");
        Err(RemoteFetchError::new(operation, source).with_cache_key(key.render()))
      }
    }
  }

  /// Like `load_or_fetch`, but a failed fetch falls back to the existing
  /// entry (marked stale, with the error attached) instead of failing.
  pub async fn load_or_stale<T, F, Fut>(
    &self,
    key: &CacheKey,
    operation: Operation,
    options: FetchOptions,
    fetcher: F,
  ) -> Result<CacheResult<T>, RemoteFetchError>
  where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, BackendError>>,
  {
    match self.load_or_fetch(key, operation, options, fetcher).await {
      Ok(result) => Ok(result),
      Err(error) => match self.read::<T>(key) {
        Some(entry) => Ok(CacheResult::stale(entry.payload, entry.written_at, error)),
        None => Err(error),
      },
    }
  }

  /// The "Refresh" action: drop the entry, then fetch it again.
  pub async fn refresh<T, F, Fut>(
    &self,
    key: &CacheKey,
    operation: Operation,
    meta: CacheMeta,
    fetcher: F,
  ) -> Result<CacheResult<T>, RemoteFetchError>
  where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, BackendError>>,
  {
    self.invalidate(key);
    let options = FetchOptions { force: true, meta };
    self.load_or_fetch(key, operation, options, fetcher).await
  }
}
