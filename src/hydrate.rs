//! Resolution of foreign-key ids in list rows to display labels.
//!
//! One `IdLabelMap` per entity kind is kept in memory and persisted under
//! `{kind}_map_v1`. Maps only grow: an id with a label is never looked up
//! again and its label is never replaced. Ids whose lookup failed stay
//! unlabeled and are retried on the next pass.

use futures::stream::{self, StreamExt};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::api::{Backend, EntityId, Record};
use crate::error::{Operation, RemoteFetchError};
use crate::store::KeyValueStore;

/// Kinds of entity referenced by id from list rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
  User,
  Partner,
  Plan,
  Centre,
  Block,
  District,
}

impl EntityKind {
  pub const ALL: [EntityKind; 6] = [
    Self::User,
    Self::Partner,
    Self::Plan,
    Self::Centre,
    Self::Block,
    Self::District,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::User => "user",
      Self::Partner => "partner",
      Self::Plan => "plan",
      Self::Centre => "centre",
      Self::Block => "block",
      Self::District => "district",
    }
  }

  /// Store key of this kind's label map.
  pub fn map_key(&self) -> String {
    format!("{}_map_v1", self.as_str())
  }

  /// Backend collection used to look up a single id.
  pub fn collection(&self) -> &'static str {
    match self {
      Self::User => "users",
      Self::Partner => "training-partners",
      Self::Plan => "training-plans",
      Self::Centre => "training-centres",
      Self::Block => "blocks",
      Self::District => "districts",
    }
  }

  /// Fields requested from the backend, in label preference order.
  pub fn label_fields(&self) -> &'static [&'static str] {
    match self {
      Self::User => &["first_name", "last_name", "username", "email"],
      Self::Partner => &["name", "partner_name"],
      Self::Plan => &["title", "name", "plan_name"],
      Self::Centre => &["centre_name", "name"],
      Self::Block => &["block_name", "name"],
      Self::District => &["district_name", "name"],
    }
  }

  /// Display label of a looked-up record.
  pub fn label_of(&self, record: &Record) -> Option<String> {
    let text = |field: &str| {
      record
        .get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
    };

    if *self == Self::User {
      let full: Vec<&str> = ["first_name", "last_name"]
        .iter()
        .copied()
        .filter_map(text)
        .collect();
      if !full.is_empty() {
        return Some(full.join(" "));
      }
    }

    self
      .label_fields()
      .iter()
      .copied()
      .find_map(text)
      .map(String::from)
  }
}

impl fmt::Display for EntityKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Which record field holds an id of which kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
  pub source_field: &'static str,
  pub kind: EntityKind,
}

impl FieldSpec {
  pub const fn new(source_field: &'static str, kind: EntityKind) -> Self {
    Self { source_field, kind }
  }

  /// Field added by `annotate` to carry the label.
  pub fn label_field(&self) -> String {
    format!("{}_label", self.source_field)
  }
}

/// Append-only id to label map for one entity kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdLabelMap {
  labels: BTreeMap<EntityId, String>,
}

impl IdLabelMap {
  pub fn get(&self, id: &EntityId) -> Option<&str> {
    self.labels.get(id).map(String::as_str)
  }

  pub fn is_resolved(&self, id: &EntityId) -> bool {
    self.labels.contains_key(id)
  }

  /// Record a label unless the id already has one. Empty labels are ignored.
  /// Returns whether the map changed.
  pub fn insert_new(&mut self, id: EntityId, label: String) -> bool {
    if label.trim().is_empty() || self.labels.contains_key(&id) {
      return false;
    }
    self.labels.insert(id, label);
    true
  }

  pub fn len(&self) -> usize {
    self.labels.len()
  }

  pub fn is_empty(&self) -> bool {
    self.labels.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = (&EntityId, &str)> {
    self.labels.iter().map(|(id, label)| (id, label.as_str()))
  }

  fn load(store: &KeyValueStore, kind: EntityKind) -> Self {
    let raw: BTreeMap<String, String> = store.get(&kind.map_key()).unwrap_or_default();
    let mut map = Self::default();
    for (id, label) in raw {
      map.insert_new(EntityId::new(id), label);
    }
    map
  }

  fn persist(&self, store: &KeyValueStore, kind: EntityKind) {
    let raw: BTreeMap<&str, &str> = self
      .labels
      .iter()
      .map(|(id, label)| (id.as_str(), label.as_str()))
      .collect();
    store.set(&kind.map_key(), &raw);
  }
}

/// Result of one hydration pass.
#[derive(Debug, Clone, Default)]
pub struct HydrationOutcome {
  /// Snapshot of the merged map for every kind named in the pass
  pub labels: HashMap<EntityKind, IdLabelMap>,
  /// Ids newly resolved by this pass
  pub resolved: usize,
  /// Ids that are still unlabeled after this pass
  pub unresolved: Vec<(EntityKind, EntityId)>,
}

impl HydrationOutcome {
  pub fn label(&self, kind: EntityKind, id: &EntityId) -> Option<&str> {
    self.labels.get(&kind).and_then(|map| map.get(id))
  }
}

type WantedIds = BTreeMap<EntityKind, BTreeSet<EntityId>>;

/// Collect distinct ids per kind from `records`.
fn wanted_ids(records: &[Record], specs: &[FieldSpec]) -> WantedIds {
  let mut wanted = WantedIds::new();
  for spec in specs {
    let ids = wanted.entry(spec.kind).or_default();
    ids.extend(
      records
        .iter()
        .filter_map(|r| r.get(spec.source_field))
        .filter_map(EntityId::from_value),
    );
  }
  wanted
}

pub struct LookupHydrator {
  backend: Arc<dyn Backend>,
  store: KeyValueStore,
  concurrency: usize,
  maps: Mutex<HashMap<EntityKind, IdLabelMap>>,
}

impl LookupHydrator {
  pub const DEFAULT_CONCURRENCY: usize = 6;

  pub fn new(backend: Arc<dyn Backend>, store: KeyValueStore) -> Self {
    Self {
      backend,
      store,
      concurrency: Self::DEFAULT_CONCURRENCY,
      maps: Mutex::new(HashMap::new()),
    }
  }

  /// Maximum number of lookups in flight during a pass (at least 1).
  pub fn with_concurrency(mut self, concurrency: usize) -> Self {
    self.concurrency = concurrency.max(1);
    self
  }

  /// Current map for `kind`, loading it from the store on first use.
  pub fn labels(&self, kind: EntityKind) -> IdLabelMap {
    let mut maps = self.lock_maps();
    self.loaded(&mut maps, kind).clone()
  }

  /// Resolve every unlabeled id referenced by `records`.
  ///
  /// Lookups run with bounded concurrency and complete in any order. The
  /// results are merged into the maps in one step after all of them have
  /// finished, then each changed map is persisted. Failed lookups are
  /// reported in `unresolved` and never abort the pass.
  pub async fn hydrate(&self, records: &[Record], specs: &[FieldSpec]) -> HydrationOutcome {
    let wanted = wanted_ids(records, specs);

    let pending: Vec<(EntityKind, EntityId)> = {
      let mut maps = self.lock_maps();
      let mut pending = Vec::new();
      for (kind, ids) in &wanted {
        let map = self.loaded(&mut maps, *kind);
        pending.extend(
          ids
            .iter()
            .filter(|id| !map.is_resolved(id))
            .map(|id| (*kind, id.clone())),
        );
      }
      pending
    };

    if !pending.is_empty() {
      debug!(lookups = pending.len(), concurrency = self.concurrency, "hydrating ids");
    }

    let backend = &self.backend;
    let results: Vec<(EntityKind, EntityId, Option<String>)> = stream::iter(pending)
      .map(|(kind, id)| async move {
        let label = match backend
          .fetch_by_id(kind.collection(), &id, kind.label_fields())
          .await
        {
          Ok(Some(record)) => kind.label_of(&record),
          Ok(None) => {
            debug!(%kind, %id, "lookup found nothing");
            None
          }
          Err(source) => {
            let operation = Operation::Lookup {
              collection: kind.collection().to_string(),
              id: id.clone(),
            };
            warn!(error = %RemoteFetchError::new(operation, source), "label lookup failed");
            None
          }
        };
        (kind, id, label)
      })
      .buffer_unordered(self.concurrency)
      .collect()
      .await;

    let mut outcome = HydrationOutcome::default();
    let mut maps = self.lock_maps();
    let mut changed: BTreeSet<EntityKind> = BTreeSet::new();

    for (kind, id, label) in results {
      let map = self.loaded(&mut maps, kind);
      match label {
        Some(label) => {
          if map.insert_new(id, label) {
            outcome.resolved += 1;
            changed.insert(kind);
          }
        }
        None => {
          if !map.is_resolved(&id) {
            outcome.unresolved.push((kind, id));
          }
        }
      }
    }

    for kind in &changed {
      if let Some(map) = maps.get(kind) {
        map.persist(&self.store, *kind);
      }
    }

    for kind in wanted.keys() {
      let snapshot = self.loaded(&mut maps, *kind).clone();
      outcome.labels.insert(*kind, snapshot);
    }
    outcome.unresolved.sort();
    outcome
  }

  fn lock_maps(&self) -> MutexGuard<'_, HashMap<EntityKind, IdLabelMap>> {
    self.maps.lock().unwrap_or_else(|e| e.into_inner())
  }

  fn loaded<'a>(
    &self,
    maps: &'a mut HashMap<EntityKind, IdLabelMap>,
    kind: EntityKind,
  ) -> &'a mut IdLabelMap {
    maps
      .entry(kind)
      .or_insert_with(|| IdLabelMap::load(&self.store, kind))
  }
}

/// Copies of `records` with a `{field}_label` entry for every spec.
///
/// Unresolved ids are labeled with the raw id. Records without a value in
/// a spec's field are left without the label field.
pub fn annotate(
  records: &[Record],
  specs: &[FieldSpec],
  labels: &HashMap<EntityKind, IdLabelMap>,
) -> Vec<Record> {
  records
    .iter()
    .map(|record| {
      let mut annotated = record.clone();
      for spec in specs {
        let Some(id) = record.get(spec.source_field).and_then(EntityId::from_value) else {
          continue;
        };
        let label = labels
          .get(&spec.kind)
          .and_then(|map| map.get(&id))
          .map(String::from)
          .unwrap_or_else(|| id.to_string());
        annotated.insert(spec.label_field(), Value::String(label));
      }
      annotated
    })
    .collect()
}
