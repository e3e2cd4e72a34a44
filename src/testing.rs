//! Test doubles shared across module tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::api::{Backend, EntityId, ListParams, Page, Record};
use crate::error::BackendError;
use crate::geoscope::GeoScope;

type LookupResult = Result<Option<Record>, BackendError>;

/// In-memory `Backend` that counts every call.
#[derive(Default)]
pub struct StubBackend {
  pages: HashMap<String, Page>,
  details: HashMap<(String, EntityId), Record>,
  lookups: HashMap<(String, EntityId), LookupResult>,
  geoscope: Option<Result<GeoScope, BackendError>>,
  lookup_delay: Option<Duration>,

  collection_calls: AtomicUsize,
  detail_calls: AtomicUsize,
  geoscope_calls: AtomicUsize,
  lookup_log: Mutex<Vec<(String, EntityId)>>,
  lookups_in_flight: AtomicUsize,
  max_lookups_in_flight: AtomicUsize,
  last_params: Mutex<Option<ListParams>>,
}

impl StubBackend {
  pub fn with_page(mut self, collection: &str, page: Page) -> Self {
    self.pages.insert(collection.to_string(), page);
    self
  }

  pub fn with_detail(mut self, collection: &str, id: i64, record: Record) -> Self {
    self
      .details
      .insert((collection.to_string(), EntityId::from(id)), record);
    self
  }

  pub fn with_lookup(mut self, collection: &str, id: i64, record: Record) -> Self {
    self
      .lookups
      .insert((collection.to_string(), EntityId::from(id)), Ok(Some(record)));
    self
  }

  pub fn failing_lookup(mut self, collection: &str, id: i64, error: BackendError) -> Self {
    self
      .lookups
      .insert((collection.to_string(), EntityId::from(id)), Err(error));
    self
  }

  pub fn with_geoscope(mut self, scope: GeoScope) -> Self {
    self.geoscope = Some(Ok(scope));
    self
  }

  pub fn failing_geoscope(mut self, error: BackendError) -> Self {
    self.geoscope = Some(Err(error));
    self
  }

  pub fn with_lookup_delay(mut self, delay: Duration) -> Self {
    self.lookup_delay = Some(delay);
    self
  }

  pub fn collection_calls(&self) -> usize {
    self.collection_calls.load(Ordering::SeqCst)
  }

  pub fn detail_calls(&self) -> usize {
    self.detail_calls.load(Ordering::SeqCst)
  }

  pub fn geoscope_calls(&self) -> usize {
    self.geoscope_calls.load(Ordering::SeqCst)
  }

  pub fn lookup_calls(&self) -> Vec<(String, EntityId)> {
    self.lookup_log.lock().unwrap().clone()
  }

  pub fn max_lookups_in_flight(&self) -> usize {
    self.max_lookups_in_flight.load(Ordering::SeqCst)
  }

  pub fn last_params(&self) -> Option<ListParams> {
    self.last_params.lock().unwrap().clone()
  }
}

#[async_trait]
impl Backend for StubBackend {
  async fn fetch_collection(
    &self,
    collection: &str,
    params: &ListParams,
  ) -> Result<Page, BackendError> {
    self.collection_calls.fetch_add(1, Ordering::SeqCst);
    *self.last_params.lock().unwrap() = Some(params.clone());
    self
      .pages
      .get(collection)
      .cloned()
      .ok_or_else(|| BackendError::Network(format!("no stub for {}", collection)))
  }

  async fn fetch_detail(&self, collection: &str, id: &EntityId) -> Result<Record, BackendError> {
    self.detail_calls.fetch_add(1, Ordering::SeqCst);
    self
      .details
      .get(&(collection.to_string(), id.clone()))
      .cloned()
      .ok_or_else(|| BackendError::Status {
        status: 404,
        body: String::new(),
      })
  }

  async fn fetch_by_id(
    &self,
    collection: &str,
    id: &EntityId,
    _fields: &[&str],
  ) -> Result<Option<Record>, BackendError> {
    self
      .lookup_log
      .lock()
      .unwrap()
      .push((collection.to_string(), id.clone()));

    let in_flight = self.lookups_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
    self
      .max_lookups_in_flight
      .fetch_max(in_flight, Ordering::SeqCst);
    if let Some(delay) = self.lookup_delay {
      tokio::time::sleep(delay).await;
    }
    self.lookups_in_flight.fetch_sub(1, Ordering::SeqCst);

    self
      .lookups
      .get(&(collection.to_string(), id.clone()))
      .cloned()
      .unwrap_or(Ok(None))
  }

  async fn fetch_geoscope(&self, _user_id: &EntityId) -> Result<GeoScope, BackendError> {
    self.geoscope_calls.fetch_add(1, Ordering::SeqCst);
    self.geoscope.clone().unwrap_or(Err(BackendError::Status {
      status: 404,
      body: String::new(),
    }))
  }
}

/// Shorthand for building a record from a `json!` object.
pub fn record(value: serde_json::Value) -> Record {
  value.as_object().cloned().unwrap_or_default()
}
