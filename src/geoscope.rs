//! Resolution of the signed-in user's geographic scope and role.
//!
//! Three attempts, first success wins:
//! 1. the persisted scope, if it belongs to the current user
//! 2. the backend's scope for the user, persisted wholesale on success
//! 3. a minimal scope carrying only the role from the user's profile
//!
//! Resolution never fails. When no attempt yields a role the canonical role
//! is `Unknown` and the UI shows its no-access state.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::api::{Backend, EntityId, Record};
use crate::error::{Operation, RemoteFetchError};
use crate::role::{normalize_role, CanonicalRole, RawRole};
use crate::store::KeyValueStore;

/// Store key of the persisted scope.
pub const GEOSCOPE_KEY: &str = "ps_user_geoscope";

/// The authenticated user's profile, as already held in memory after login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
  pub id: EntityId,
  pub role: RawRole,
}

impl CurrentUser {
  pub fn new(id: impl Into<EntityId>, role: RawRole) -> Self {
    Self {
      id: id.into(),
      role,
    }
  }

  /// Build from a profile record; `None` if it has no usable `id`.
  pub fn from_record(record: &Record) -> Option<Self> {
    let id = record.get("id").and_then(EntityId::from_value)?;
    Some(Self {
      id,
      role: RawRole::from_record(record),
    })
  }
}

/// Role and assigned districts/blocks of one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoScope {
  pub user_id: EntityId,
  #[serde(default)]
  pub role: RawRole,
  #[serde(default)]
  pub districts: Vec<EntityId>,
  #[serde(default)]
  pub blocks: Vec<EntityId>,
}

impl GeoScope {
  /// Decode a backend scope record for `user_id`.
  ///
  /// District and block lists may hold bare ids or expanded objects.
  pub fn from_record(user_id: &EntityId, record: &Record) -> Self {
    Self {
      user_id: user_id.clone(),
      role: RawRole::from_record(record),
      districts: id_list(record, &["districts", "district_ids"]),
      blocks: id_list(record, &["blocks", "block_ids"]),
    }
  }

  /// Scope with nothing but the profile's role.
  pub fn minimal(user: &CurrentUser) -> Self {
    Self {
      user_id: user.id.clone(),
      role: user.role.clone(),
      districts: Vec::new(),
      blocks: Vec::new(),
    }
  }

  pub fn primary_block(&self) -> Option<&EntityId> {
    self.blocks.first()
  }

  pub fn primary_district(&self) -> Option<&EntityId> {
    self.districts.first()
  }
}

fn id_list(record: &Record, fields: &[&str]) -> Vec<EntityId> {
  fields
    .iter()
    .find_map(|field| record.get(*field).and_then(Value::as_array))
    .map(|items| items.iter().filter_map(EntityId::from_value).collect())
    .unwrap_or_default()
}

/// Which attempt produced the scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeTier {
  Cache,
  Remote,
  Profile,
}

/// Outcome of a resolution.
#[derive(Debug, Clone)]
pub struct ResolvedScope {
  pub scope: GeoScope,
  pub tier: ScopeTier,
  pub role: CanonicalRole,
  /// The remote failure that forced the profile fallback, if any
  pub fetch_error: Option<RemoteFetchError>,
}

impl ResolvedScope {
  /// No attempt produced a role the dashboard knows.
  pub fn is_unavailable(&self) -> bool {
    !self.role.is_known()
  }
}

/// Scope role first, profile role when the scope carries none.
fn canonical_role(scope: &GeoScope, user: &CurrentUser) -> CanonicalRole {
  match normalize_role(&scope.role) {
    CanonicalRole::Unknown => normalize_role(&user.role),
    role => role,
  }
}

#[derive(Clone)]
pub struct GeoscopeResolver {
  store: KeyValueStore,
  backend: Arc<dyn Backend>,
}

impl GeoscopeResolver {
  pub fn new(store: KeyValueStore, backend: Arc<dyn Backend>) -> Self {
    Self { store, backend }
  }

  /// The persisted scope, only if it belongs to `user`.
  pub fn cached(&self, user: &CurrentUser) -> Option<GeoScope> {
    let scope: GeoScope = self.store.get(GEOSCOPE_KEY)?;
    if scope.user_id == user.id {
      Some(scope)
    } else {
      debug!(cached = %scope.user_id, current = %user.id, "ignoring geoscope of another user");
      None
    }
  }

  pub async fn resolve(&self, user: &CurrentUser) -> ResolvedScope {
    if let Some(scope) = self.cached(user) {
      let role = canonical_role(&scope, user);
      debug!(user = %user.id, %role, "geoscope from cache");
      return ResolvedScope {
        scope,
        tier: ScopeTier::Cache,
        role,
        fetch_error: None,
      };
    }
    self.fetch(user).await
  }

  /// Skip the persisted scope and ask the backend again.
  pub async fn refresh(&self, user: &CurrentUser) -> ResolvedScope {
    self.fetch(user).await
  }

  /// Remove the persisted scope.
  pub fn forget(&self) {
    self.store.remove(GEOSCOPE_KEY);
  }

  async fn fetch(&self, user: &CurrentUser) -> ResolvedScope {
    match self.backend.fetch_geoscope(&user.id).await {
      Ok(mut scope) => {
        scope.user_id = user.id.clone();
        self.store.set(GEOSCOPE_KEY, &scope);
        let role = canonical_role(&scope, user);
        info!(user = %user.id, %role, blocks = scope.blocks.len(), "geoscope fetched");
        ResolvedScope {
          scope,
          tier: ScopeTier::Remote,
          role,
          fetch_error: None,
        }
      }
      Err(source) => {
        let error = RemoteFetchError::new(
          Operation::GeoScope {
            user_id: user.id.clone(),
          },
          source,
        );
        warn!(user = %user.id, %error, "geoscope unavailable, using profile role");
        let scope = GeoScope::minimal(user);
        let role = normalize_role(&user.role);
        ResolvedScope {
          scope,
          tier: ScopeTier::Profile,
          role,
          fetch_error: Some(error),
        }
      }
    }
  }
}
