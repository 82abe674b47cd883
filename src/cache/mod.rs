//! In-process caches shared by concurrent queries.
//!
//! - [`IdCache`]: entity fingerprint -> (id, sort key), plus id -> entity
//! - [`EntityIdLookup`]: cache-through id resolution against a [`Store`]
//! - [`HierarchyCache`]: bounded subclass / subproperty closures
//!
//! All maps are `DashMap`s. Writes are idempotent upserts of derived facts,
//! so concurrent writers need no coordination beyond last-writer-wins.
//! Entries go stale only through explicit invalidation.
//!
//! [`Store`]: crate::store::Store

mod hash;
mod hierarchy;
mod id_cache;
mod lookup;

pub use hash::{compute_hash, Fingerprint, FINGERPRINT_VERSION};
pub use hierarchy::{Closure, HierarchyCache, Relation};
pub use id_cache::IdCache;
pub use lookup::EntityIdLookup;

use crate::store::StoreError;

/// Errors that can occur during cache operations.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Titles reaching the cache must already be normalized.
    #[error("Title is not normalized (contains a space): {0:?}")]
    UnnormalizedTitle(String),

    /// Cached state disagrees with itself. Logged, never returned to callers
    /// of the query pipeline.
    #[error("Cache inconsistency: {0}")]
    Inconsistency(String),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

pub type CacheResult<T> = Result<T, CacheError>;
