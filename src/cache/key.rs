//! Deterministic cache keys.
//!
//! A key is `{collection}_cache_v1`, optionally followed by `_{scope}`,
//! `_p{page}` and `_q{digest}` where the digest covers every filter/sort
//! parameter. Scope values are escaped so they cannot contain `_`, which
//! keeps the suffixes unambiguous.

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

use crate::api::types::ListParams;

const KEY_VERSION: &str = "v1";

/// Builder for a cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
  collection: String,
  scope: Option<String>,
  page: Option<u32>,
  params: BTreeMap<String, String>,
}

impl CacheKey {
  pub fn new(collection: impl Into<String>) -> Self {
    Self {
      collection: collection.into(),
      scope: None,
      page: None,
      params: BTreeMap::new(),
    }
  }

  /// Key for a collection listing: page and filters from `params`.
  pub fn for_list(collection: &str, scope: Option<&str>, params: &ListParams) -> Self {
    let mut key = Self::new(collection);
    if let Some(scope) = scope {
      key = key.scope(scope);
    }
    if let Some(page) = params.page {
      key = key.page(page);
    }
    for (k, v) in &params.filters {
      key = key.param(k, v);
    }
    key
  }

  /// Scope the key to an entity (request id, block id, ...).
  pub fn scope(mut self, scope: impl fmt::Display) -> Self {
    self.scope = Some(scope.to_string());
    self
  }

  pub fn page(mut self, page: u32) -> Self {
    self.page = Some(page);
    self
  }

  pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.params.insert(key.into(), value.into());
    self
  }

  pub fn collection(&self) -> &str {
    &self.collection
  }

  /// Prefix shared by every key of `collection`.
  pub fn collection_prefix(collection: &str) -> String {
    format!("{}_cache_{}", collection, KEY_VERSION)
  }

  /// Rendered storage key.
  pub fn render(&self) -> String {
    let mut key = Self::collection_prefix(&self.collection);
    if let Some(scope) = &self.scope {
      key.push('_');
      key.push_str(&escape_scope(scope));
    }
    if let Some(page) = self.page {
      key.push_str(&format!("_p{}", page));
    }
    if !self.params.is_empty() {
      key.push_str("_q");
      key.push_str(&params_digest(&self.params));
    }
    key
  }
}

impl fmt::Display for CacheKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.render())
  }
}

fn escape_scope(scope: &str) -> String {
  scope.replace('%', "%25").replace('_', "%5F")
}

/// First 16 hex chars of SHA-256 over `k=v` pairs joined with `&`.
fn params_digest(params: &BTreeMap<String, String>) -> String {
  let mut hasher = Sha256::new();
  for (i, (k, v)) in params.iter().enumerate() {
    if i > 0 {
      hasher.update(b"&");
    }
    hasher.update(k.len().to_string().as_bytes());
    hasher.update(b":");
    hasher.update(k.as_bytes());
    hasher.update(b"=");
    hasher.update(v.len().to_string().as_bytes());
    hasher.update(b":");
    hasher.update(v.as_bytes());
  }
  let digest = hex::encode(hasher.finalize());
  digest[..16].to_string()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_plain_and_scoped_keys() {
    assert_eq!(CacheKey::new("batches").render(), "batches_cache_v1");
    assert_eq!(
      CacheKey::new("training_requests").scope(42).render(),
      "training_requests_cache_v1_42"
    );
  }

  #[test]
  fn test_key_is_deterministic() {
    let build = || {
      CacheKey::new("batches")
        .scope(7)
        .page(3)
        .param("status", "open")
        .param("ordering", "-created")
    };
    assert_eq!(build().render(), build().render());
  }

  #[test]
  fn test_param_order_does_not_matter() {
    let a = CacheKey::new("batches").param("a", "1").param("b", "2");
    let b = CacheKey::new("batches").param("b", "2").param("a", "1");
    assert_eq!(a.render(), b.render());
  }

  #[test]
  fn test_keys_differing_only_in_page() {
    let p1 = CacheKey::new("batches").scope(42).page(1).render();
    let p2 = CacheKey::new("batches").scope(42).page(2).render();
    assert_ne!(p1, p2);
  }

  #[test]
  fn test_keys_differing_only_in_filter() {
    let keys = [
      CacheKey::new("batches").render(),
      CacheKey::new("batches").param("status", "open").render(),
      CacheKey::new("batches").param("status", "closed").render(),
      CacheKey::new("batches").param("status", "").render(),
      CacheKey::new("batches").param("state", "open").render(),
      CacheKey::new("batches").param("a", "b=c").render(),
      CacheKey::new("batches").param("a=b", "c").render(),
    ];
    for (i, a) in keys.iter().enumerate() {
      for b in keys.iter().skip(i + 1) {
        assert_ne!(a, b);
      }
    }
  }

  #[test]
  fn test_scope_cannot_imitate_page_suffix() {
    let paged = CacheKey::new("batches").scope(1).page(2).render();
    let tricky = CacheKey::new("batches").scope("1_p2").render();
    assert_ne!(paged, tricky);
    assert_eq!(tricky, "batches_cache_v1_1%5Fp2");
  }

  #[test]
  fn test_for_list_matches_builder() {
    let params = ListParams::page(2).filter("block", "42");
    assert_eq!(
      CacheKey::for_list("batches", Some("42"), &params).render(),
      CacheKey::new("batches")
        .scope(42)
        .page(2)
        .param("block", "42")
        .render()
    );
  }

  #[test]
  fn test_every_key_shares_collection_prefix() {
    let key = CacheKey::new("centres").scope(9).page(4).render();
    assert!(key.starts_with(&CacheKey::collection_prefix("centres")));
  }
}
