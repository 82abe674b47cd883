//! Entity identifier cache.

use dashmap::DashMap;
use tracing::{trace, warn};

use super::{CacheError, CacheResult, Fingerprint};
use crate::model::{EntityId, EntityPage};

#[derive(Debug, Clone, PartialEq, Eq)]
struct CachedId {
    id: EntityId,
    sort_key: String,
}

/// Maps entity fingerprints to store ids and sort keys, and ids back to
/// the full entity.
///
/// A redirect source is cached under its own fingerprint and, in addition,
/// as id 0 under the fingerprint of the same page without the redirect
/// marker. Resolving that plain fingerprint to 0 answers "this title is a
/// redirect" without another round trip.
#[derive(Debug, Default)]
pub struct IdCache {
    ids: DashMap<Fingerprint, CachedId>,
    entities: DashMap<EntityId, EntityPage>,
}

impl IdCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, fingerprint: &Fingerprint) -> Option<(EntityId, String)> {
        self.ids
            .get(fingerprint)
            .map(|entry| (entry.id, entry.sort_key.clone()))
    }

    /// Cache an entity under its fingerprint.
    pub fn store(&self, page: &EntityPage, id: EntityId, sort_key: &str) -> CacheResult<()> {
        if page.title.contains(' ') {
            return Err(CacheError::UnnormalizedTitle(page.title.clone()));
        }

        let key = page.key();
        self.ids.insert(
            key.fingerprint(),
            CachedId {
                id,
                sort_key: sort_key.to_string(),
            },
        );
        if id != 0 {
            self.entities
                .insert(id, key.clone().with_id(id).with_sort_key(sort_key));
        }
        trace!(entity = %key, id, "cached entity id");

        if page.is_redirect() {
            let companion = key.with_interwiki("");
            self.ids.insert(
                companion.fingerprint(),
                CachedId {
                    id: 0,
                    sort_key: String::new(),
                },
            );
        }
        Ok(())
    }

    /// Reverse lookup of a cached entity.
    pub fn entity(&self, id: EntityId) -> Option<EntityPage> {
        self.entities.get(&id).map(|e| e.value().clone())
    }

    /// Drop the entry of an entity.
    pub fn invalidate(&self, page: &EntityPage) {
        if let Some((_, cached)) = self.ids.remove(&page.fingerprint()) {
            self.entities
                .remove_if(&cached.id, |_, e| e.fingerprint() == page.fingerprint());
        }
    }

    /// Drop the entry of an entity known only by id.
    ///
    /// The fingerprint is recovered from the cached entity. When no entity is
    /// cached for the id the call is a miss.
    pub fn invalidate_by_id(&self, id: EntityId) {
        match self.entities.remove(&id) {
            Some((_, entity)) => {
                self.ids.remove(&entity.fingerprint());
            }
            None => {
                let err = CacheError::Inconsistency(format!("no cached entity for id {}", id));
                warn!(id, error = %err, "treating invalidation as a cache miss");
            }
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn clear(&self) {
        self.ids.clear();
        self.entities.clear();
    }
}
