//! Dashboard control flow: resolve who the user is, then load hydrated lists.
//!
//! A `Workspace` is built once per process and owns the shared collaborators.
//! `open` turns the signed-in user into a `Session` (scope, canonical role and
//! menu projection). Every list load goes through the read-through cache,
//! then through the hydrator, and hands back annotated copies of the rows.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info};

use crate::api::{Backend, EntityId, ListParams, Page, Record};
use crate::cache::{CacheKey, CacheMeta, CacheResult, CacheSource, EntityCache, FetchOptions};
use crate::collections::Collection;
use crate::error::{Operation, RemoteFetchError};
use crate::geoscope::{CurrentUser, GeoscopeResolver, ResolvedScope};
use crate::hydrate::{annotate, EntityKind, LookupHydrator};
use crate::navigation::{project_ui, LeftNavMode, RoleBucket, UiProjection};
use crate::query::Query;
use crate::role::CanonicalRole;
use crate::store::KeyValueStore;

/// Query parameter that restricts a list to one block.
const BLOCK_FILTER: &str = "block";

/// The signed-in user's resolved view of the dashboard.
#[derive(Debug, Clone)]
pub struct Session {
  pub user: CurrentUser,
  pub scope: ResolvedScope,
  pub role: CanonicalRole,
  pub ui: UiProjection,
}

impl Session {
  fn new(user: CurrentUser, scope: ResolvedScope) -> Self {
    let role = scope.role;
    Self {
      user,
      scope,
      role,
      ui: project_ui(role),
    }
  }

  /// Block that region dashboards filter their lists by.
  pub fn block_scope(&self) -> Option<&EntityId> {
    match self.ui.bucket {
      RoleBucket::Region => self.scope.scope.primary_block(),
      _ => None,
    }
  }
}

/// One page of a collection, ready to render.
#[derive(Debug, Clone)]
pub struct ListView {
  pub collection: Collection,
  /// Rows with a `{field}_label` entry for every hydrated id field
  pub rows: Vec<Record>,
  /// Total number of records across all pages
  pub count: u64,
  pub source: CacheSource,
  pub cached_at: Option<DateTime<Utc>>,
  /// Set when fresh data was requested but cached rows are shown instead
  pub refresh_error: Option<RemoteFetchError>,
  /// Ids that still have no label
  pub unresolved: Vec<(EntityKind, EntityId)>,
}

impl ListView {
  pub fn is_stale(&self) -> bool {
    self.source == CacheSource::Stale
  }
}

/// Process-wide collaborators shared by every dashboard.
#[derive(Clone)]
pub struct Workspace {
  backend: Arc<dyn Backend>,
  store: KeyValueStore,
  cache: EntityCache,
  hydrator: Arc<LookupHydrator>,
  resolver: GeoscopeResolver,
}

/// Cache key and request parameters of one list page.
struct ListRequest {
  key: CacheKey,
  params: ListParams,
  meta: CacheMeta,
}

impl Workspace {
  pub fn new(backend: Arc<dyn Backend>, store: KeyValueStore, concurrency: usize) -> Self {
    let hydrator =
      LookupHydrator::new(backend.clone(), store.clone()).with_concurrency(concurrency);
    Self {
      cache: EntityCache::new(store.clone()),
      resolver: GeoscopeResolver::new(store.clone(), backend.clone()),
      hydrator: Arc::new(hydrator),
      backend,
      store,
    }
  }

  pub fn store(&self) -> &KeyValueStore {
    &self.store
  }

  pub fn cache(&self) -> &EntityCache {
    &self.cache
  }

  /// Resolve the user's scope and role, and project the menu for it.
  pub async fn open(&self, user: &CurrentUser) -> Session {
    let scope = self.resolver.resolve(user).await;
    let session = Session::new(user.clone(), scope);
    info!(
      user = %session.user.id,
      role = %session.role,
      tier = ?session.scope.tier,
      dashboard = ?session.ui.dashboard,
      "session opened"
    );
    session
  }

  /// Like `open`, but ignores the persisted scope.
  pub async fn reopen(&self, user: &CurrentUser) -> Session {
    let scope = self.resolver.refresh(user).await;
    Session::new(user.clone(), scope)
  }

  /// Forget everything tied to the signed-in user.
  pub fn logout(&self) {
    self.resolver.forget();
  }

  /// Load one page of `collection`, served from the cache unless `force`.
  ///
  /// When a fetch fails and a cached page exists the cached rows are
  /// returned with `refresh_error` set.
  pub async fn load_list(
    &self,
    session: &Session,
    collection: Collection,
    page: u32,
    force: bool,
  ) -> Result<ListView, RemoteFetchError> {
    let request = self.list_request(session, collection, page);
    let options = FetchOptions {
      force,
      meta: request.meta,
    };
    let backend = self.backend.clone();
    let params = request.params;
    let result = self
      .cache
      .load_or_stale(&request.key, list_operation(collection), options, move || async move {
        backend.fetch_collection(collection.name(), &params).await
      })
      .await?;

    Ok(self.hydrate_page(collection, result).await)
  }

  /// Drop the cached page and fetch it again. Unlike `load_list(force)`,
  /// a failure leaves nothing cached to fall back on.
  pub async fn refresh_list(
    &self,
    session: &Session,
    collection: Collection,
    page: u32,
  ) -> Result<ListView, RemoteFetchError> {
    let request = self.list_request(session, collection, page);
    let backend = self.backend.clone();
    let params = request.params;
    let result = self
      .cache
      .refresh(&request.key, list_operation(collection), request.meta, move || async move {
        backend.fetch_collection(collection.name(), &params).await
      })
      .await?;

    Ok(self.hydrate_page(collection, result).await)
  }

  /// Load one record, labeled the same way list rows are.
  pub async fn load_detail(
    &self,
    collection: Collection,
    id: &EntityId,
    force: bool,
  ) -> Result<CacheResult<Record>, RemoteFetchError> {
    let key = CacheKey::new(collection.name()).scope(format!("id{}", id));
    let operation = Operation::Detail {
      collection: collection.name().to_string(),
      id: id.clone(),
    };
    let backend = self.backend.clone();
    let target = id.clone();
    let result = self
      .cache
      .load_or_stale(&key, operation, FetchOptions::default().force(force), move || async move {
        backend.fetch_detail(collection.name(), &target).await
      })
      .await?;

    let specs = collection.hydrate_fields();
    let records = std::slice::from_ref(&result.data);
    let outcome = self.hydrator.hydrate(records, specs).await;
    Ok(result.map(|record| {
      annotate(std::slice::from_ref(&record), specs, &outcome.labels)
        .pop()
        .unwrap_or(record)
    }))
  }

  /// Detail load wrapped in a `Query` for a UI selection.
  ///
  /// Keep one query per selected record: on a new selection, replace the
  /// query (or `refetch`) and a late answer for the old one is dropped on
  /// `poll` instead of overwriting the newer record.
  pub fn detail_query(
    &self,
    collection: Collection,
    id: EntityId,
  ) -> Query<CacheResult<Record>, RemoteFetchError> {
    let workspace = self.clone();
    Query::new(move || {
      let workspace = workspace.clone();
      let id = id.clone();
      async move { workspace.load_detail(collection, &id, false).await }
    })
  }

  /// Drop every cached page, scope and detail of `collection`.
  pub fn invalidate(&self, collection: Collection) -> usize {
    let removed = self.cache.invalidate_collection(collection.name());
    info!(%collection, removed, "collection invalidated");
    removed
  }

  pub fn nav_mode(&self) -> LeftNavMode {
    LeftNavMode::load(&self.store)
  }

  pub fn set_nav_mode(&self, mode: LeftNavMode) {
    mode.save(&self.store);
  }

  fn list_request(&self, session: &Session, collection: Collection, page: u32) -> ListRequest {
    let mut params = ListParams::page(page);
    let mut scope = None;
    if collection.block_scoped() {
      if let Some(block) = session.block_scope() {
        params = params.filter(BLOCK_FILTER, block.as_str());
        scope = Some(block.to_string());
      }
    }

    let mut meta = CacheMeta::new();
    meta.insert("user".to_string(), session.user.id.to_string());
    meta.insert("role".to_string(), session.role.to_string());

    let key = CacheKey::for_list(collection.name(), scope.as_deref(), &params);
    debug!(key = %key, "list request");
    ListRequest { key, params, meta }
  }

  async fn hydrate_page(&self, collection: Collection, result: CacheResult<Page>) -> ListView {
    let specs = collection.hydrate_fields();
    let outcome = self.hydrator.hydrate(&result.data.results, specs).await;
    ListView {
      collection,
      rows: annotate(&result.data.results, specs, &outcome.labels),
      count: result.data.count,
      source: result.source,
      cached_at: result.cached_at,
      refresh_error: result.refresh_error,
      unresolved: outcome.unresolved,
    }
  }
}

fn list_operation(collection: Collection) -> Operation {
  Operation::Collection {
    collection: collection.name().to_string(),
  }
}
