//! Segment compiler - turns a description into SQL.
//!
//! Two-phase architecture:
//! 1. Build: Description → SegmentGraph (one segment per joinable fragment)
//! 2. Resolve: SegmentGraph → ResolvedQuery (joins, filters, temporary
//!    tables for wide disjunctions, final projection per mode)
//!
//! Named concepts are compiled by the [`concept::ConceptResolver`] and
//! spliced into the outer graph during the build phase.

pub mod builder;
pub mod concept;
pub mod resolver;
pub mod segment;
pub mod temp_table;

pub use builder::SegmentGraphBuilder;
pub use concept::{ConceptCache, ConceptRefresh, ConceptResolver, ResolvedConcept};
pub use resolver::{Fragment, Pagination, ResolvedQuery, SegmentResolver};
pub use segment::{Component, QuerySegment, SegmentGraph, SegmentId, SegmentKind};
pub use temp_table::{Materialization, TemporaryTableScope};

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::cache::{EntityIdLookup, HierarchyCache, IdCache};
use crate::config::Settings;
use crate::model::normalize_title;
use crate::store::{Store, TableNames};

/// Shared collaborators of one compilation.
///
/// Cheap to clone; every field is reference counted.
#[derive(Clone)]
pub struct Services {
    pub store: Arc<dyn Store>,
    pub ids: Arc<EntityIdLookup>,
    pub hierarchy: Arc<HierarchyCache>,
    pub settings: Arc<Settings>,
}

impl Services {
    pub fn new(
        store: Arc<dyn Store>,
        id_cache: Arc<IdCache>,
        hierarchy: Arc<HierarchyCache>,
        settings: Arc<Settings>,
    ) -> Self {
        let ids = Arc::new(EntityIdLookup::new(store.clone(), id_cache));
        Self {
            store,
            ids,
            hierarchy,
            settings,
        }
    }

    pub fn tables(&self) -> &TableNames {
        self.store.tables()
    }

    pub(crate) fn resolver(&self) -> SegmentResolver<'_> {
        SegmentResolver::new(self.tables(), self.settings.query.max_disjunction_arity)
    }
}

#[cfg(test)]
pub(crate) fn test_services(store: Arc<crate::store::SqliteStore>, settings: Settings) -> Services {
    Services::new(
        store,
        Arc::new(IdCache::new()),
        Arc::new(HierarchyCache::new()),
        Arc::new(settings),
    )
}

/// What a query produces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryMode {
    /// Number of matching entities.
    Count,
    /// A page of matching entities.
    #[default]
    Instances,
    /// The statements that would run, without running them.
    Debug,
}

/// Requested ordering.
///
/// An empty property orders by the entity's own sort key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    pub property: String,
    pub ascending: bool,
}

impl SortKey {
    pub fn asc(property: &str) -> Self {
        Self {
            property: normalize_title(property),
            ascending: true,
        }
    }

    pub fn desc(property: &str) -> Self {
        Self {
            property: normalize_title(property),
            ascending: false,
        }
    }

    /// Order by the entity sort key.
    pub fn entity(ascending: bool) -> Self {
        Self {
            property: String::new(),
            ascending,
        }
    }

    pub fn is_entity(&self) -> bool {
        self.property.is_empty()
    }
}

/// Options of one query execution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryOptions {
    pub mode: QueryMode,
    /// Falls back to `query.default_limit`; always capped at `query.max_limit`.
    pub limit: Option<u64>,
    pub offset: u64,
    pub sort: Vec<SortKey>,
}

impl QueryOptions {
    pub fn instances() -> Self {
        Self::default()
    }

    pub fn count() -> Self {
        Self {
            mode: QueryMode::Count,
            ..Self::default()
        }
    }

    pub fn debug() -> Self {
        Self {
            mode: QueryMode::Debug,
            ..Self::default()
        }
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    pub fn sort(mut self, key: SortKey) -> Self {
        self.sort.push(key);
        self
    }
}
