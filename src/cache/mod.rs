//! Read-through caching of backend responses.
//!
//! This module provides:
//! - Deterministic keys built from collection, scope, page and filters
//! - A timestamped envelope stored per key in the shared key-value store
//! - Cache-first fetching with an explicit force flag, and no expiry
//! - Stale fallback when a refresh fails and an older entry exists

mod entry;
mod key;
mod layer;
mod traits;

pub use entry::{CacheEntry, CacheMeta};
pub use key::CacheKey;
pub use layer::{EntityCache, FetchOptions};
pub use traits::{CacheResult, CacheSource};
