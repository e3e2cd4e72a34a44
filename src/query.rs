//! Async query with stale-response protection.
//!
//! A `Query<T>` owns a fetcher closure and the state of its latest request.
//! Every start of a fetch bumps a generation counter and the spawned task
//! sends its result back tagged with the generation it was started under.
//! `poll()` drops any result whose tag is no longer current, so a slow
//! response for a superseded selection can never overwrite a newer one.
//!
//! # Example
//!
//! ```ignore
//! // `Workspace::detail_query` builds this around `load_detail`
//! let mut query = workspace.detail_query(Collection::Batches, id);
//! query.fetch();
//!
//! // selection changed: the pending answer for the old record is dropped
//! query = workspace.detail_query(Collection::Batches, next_id);
//! query.fetch();
//!
//! // In event loop tick
//! if query.poll() {
//!     // State changed, trigger re-render
//! }
//! ```

use std::future::Future;
use std::pin::Pin;
use tokio::sync::mpsc;
use tracing::debug;

/// The state of a query
#[derive(Debug, Clone)]
pub enum QueryState<T, E> {
  /// Query has not been started, or was cancelled
  Idle,
  /// Query is currently fetching data
  Loading,
  /// Query completed successfully
  Success(T),
  /// Query failed with an error
  Error(E),
}

impl<T, E> QueryState<T, E> {
  pub fn is_loading(&self) -> bool {
    matches!(self, QueryState::Loading)
  }

  pub fn data(&self) -> Option<&T> {
    match self {
      QueryState::Success(data) => Some(data),
      _ => None,
    }
  }

  pub fn error(&self) -> Option<&E> {
    match self {
      QueryState::Error(e) => Some(e),
      _ => None,
    }
  }
}

type BoxFuture<T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send>>;

type FetcherFn<T, E> = Box<dyn Fn() -> BoxFuture<T, E> + Send + Sync>;

/// Result of a spawned fetch, tagged with the generation that started it.
type Tagged<T, E> = (u64, Result<T, E>);

pub struct Query<T, E> {
  state: QueryState<T, E>,
  fetcher: FetcherFn<T, E>,
  generation: u64,
  tx: mpsc::UnboundedSender<Tagged<T, E>>,
  rx: mpsc::UnboundedReceiver<Tagged<T, E>>,
}

impl<T: Send + 'static, E: Send + 'static> Query<T, E> {
  /// Create a new query with the given fetcher function.
  ///
  /// The fetcher is called each time a fetch starts.
  pub fn new<F, Fut>(fetcher: F) -> Self
  where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
  {
    let (tx, rx) = mpsc::unbounded_channel();
    Self {
      state: QueryState::Idle,
      fetcher: Box::new(move || Box::pin(fetcher())),
      generation: 0,
      tx,
      rx,
    }
  }

  pub fn state(&self) -> &QueryState<T, E> {
    &self.state
  }

  pub fn data(&self) -> Option<&T> {
    self.state.data()
  }

  pub fn error(&self) -> Option<&E> {
    self.state.error()
  }

  pub fn is_loading(&self) -> bool {
    self.state.is_loading()
  }

  /// Generation of the most recently started fetch.
  pub fn generation(&self) -> u64 {
    self.generation
  }

  /// Start fetching data if not already loading.
  pub fn fetch(&mut self) {
    if self.state.is_loading() {
      return;
    }
    self.start_fetch();
  }

  /// Start a new fetch that supersedes any in flight.
  pub fn refetch(&mut self) {
    self.start_fetch();
  }

  /// Stop caring about the in-flight fetch, if any. Its result will be
  /// discarded on arrival. Already loaded data is kept.
  pub fn cancel(&mut self) {
    self.generation += 1;
    if self.state.is_loading() {
      self.state = QueryState::Idle;
    }
  }

  /// Poll for results from a pending fetch.
  ///
  /// Returns `true` if the state changed. Results from superseded
  /// generations are dropped without touching the state.
  pub fn poll(&mut self) -> bool {
    let mut changed = false;
    while let Ok((generation, result)) = self.rx.try_recv() {
      if generation != self.generation {
        debug!(generation, current = self.generation, "dropping stale query result");
        continue;
      }
      self.state = match result {
        Ok(data) => QueryState::Success(data),
        Err(e) => QueryState::Error(e),
      };
      changed = true;
    }
    changed
  }

  fn start_fetch(&mut self) {
    self.generation += 1;
    self.state = QueryState::Loading;

    let generation = self.generation;
    let tx = self.tx.clone();
    let future = (self.fetcher)();
    tokio::spawn(async move {
      let result = future.await;
      // Ignore send errors - the query may have been dropped
      let _ = tx.send((generation, result));
    });
  }
}

impl<T: std::fmt::Debug, E: std::fmt::Debug> std::fmt::Debug for Query<T, E> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Query")
      .field("state", &self.state)
      .field("generation", &self.generation)
      .finish_non_exhaustive()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicU32, Ordering};
  use std::sync::Arc;
  use std::time::Duration;

  #[tokio::test]
  async fn test_result_lands_on_poll() {
    let mut query = Query::new(|| async { Ok::<_, String>(vec!["batches", "centres"]) });
    assert!(matches!(query.state(), QueryState::Idle));
    assert_eq!(query.generation(), 0);

    query.fetch();
    assert!(query.is_loading());
    assert_eq!(query.generation(), 1);

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(query.poll());
    assert_eq!(query.data(), Some(&vec!["batches", "centres"]));
    assert!(!query.poll());
  }

  #[tokio::test]
  async fn test_error_lands_on_poll() {
    let mut query: Query<u64, String> =
      Query::new(|| async { Err("list batches: network error".to_string()) });

    query.fetch();
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(query.poll());
    assert!(query.data().is_none());
    assert_eq!(query.error().map(String::as_str), Some("list batches: network error"));
  }

  #[tokio::test]
  async fn test_fetch_while_loading_is_noop() {
    let mut query = Query::new(|| async {
      tokio::time::sleep(Duration::from_millis(100)).await;
      Ok::<_, String>(42)
    });

    query.fetch();
    let generation = query.generation();
    query.fetch();
    assert!(query.is_loading());
    assert_eq!(query.generation(), generation);
  }

  #[tokio::test]
  async fn test_superseded_result_is_dropped() {
    let counter = Arc::new(AtomicU32::new(0));
    let counter_clone = counter.clone();

    // first call is slow, second is fast: the slow one arrives last
    let mut query = Query::new(move || {
      let n = counter_clone.fetch_add(1, Ordering::SeqCst);
      async move {
        let delay = if n == 0 { 60 } else { 5 };
        tokio::time::sleep(Duration::from_millis(delay)).await;
        Ok::<_, String>(n)
      }
    });

    query.fetch();
    query.refetch();
    tokio::time::sleep(Duration::from_millis(120)).await;

    query.poll();
    assert_eq!(query.data(), Some(&1));
    assert_eq!(counter.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn test_cancel_discards_in_flight_result() {
    let mut query = Query::new(|| async {
      tokio::time::sleep(Duration::from_millis(10)).await;
      Ok::<_, String>(7)
    });

    query.fetch();
    query.cancel();
    assert!(matches!(query.state(), QueryState::Idle));

    tokio::time::sleep(Duration::from_millis(40)).await;
    assert!(!query.poll());
    assert!(query.data().is_none());
  }
}
