//! Query orchestration.
//!
//! A query moves through `Parsed → Compiled → Resolved → Executed`; any
//! error moves it to `Failed`. Nothing is retried.
//!
//! ```ignore
//! use semql::config::Settings;
//! use semql::engine::QueryEngine;
//! use semql::model::{Comparator, DataValue, Description};
//! use semql::planner::QueryOptions;
//!
//! let engine = QueryEngine::from_settings(Settings::load()?)?;
//! let adults = Description::and([
//!     Description::class("Person"),
//!     Description::value("Age", Comparator::GreaterEq, DataValue::Number(18.0)),
//! ]);
//! let result = engine.execute(&adults, QueryOptions::instances().limit(10))?;
//! ```

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::cache::{HierarchyCache, IdCache};
use crate::config::Settings;
use crate::error::{QueryError, QueryIssue};
use crate::model::{Description, EntityPage};
use crate::planner::{
    ConceptCache, ConceptRefresh, ConceptResolver, Pagination, QueryMode, QueryOptions,
    ResolvedConcept, SegmentGraphBuilder, Services, TemporaryTableScope,
};
use crate::store::{Row, SqliteStore, Store, StoreError};

/// Lifecycle state of one query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryState {
    Parsed,
    Compiled,
    Resolved,
    Executed,
    Failed,
}

struct Lifecycle {
    query: String,
    state: QueryState,
}

impl Lifecycle {
    fn start(description: &Description) -> Self {
        let query = description.to_string();
        debug!(%query, "query parsed");
        Self {
            query,
            state: QueryState::Parsed,
        }
    }

    fn advance(&mut self, next: QueryState) {
        debug!(query = %self.query, from = ?self.state, to = ?next, "query state");
        self.state = next;
    }

    fn fail(&mut self, error: &QueryError) {
        warn!(query = %self.query, from = ?self.state, %error, "query failed");
        self.state = QueryState::Failed;
    }
}

/// Answer to a query.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryResult {
    /// Matching entities, at most `limit` of them.
    pub rows: Vec<EntityPage>,
    /// More entities match beyond this page.
    pub has_more: bool,
    /// Set in count mode only.
    pub count: Option<u64>,
    /// Non-fatal compilation issues.
    pub errors: Vec<QueryIssue>,
    /// Set in debug mode only.
    pub debug: Option<String>,
}

/// Compiles and runs descriptions against a store.
#[derive(Clone)]
pub struct QueryEngine {
    services: Services,
}

impl QueryEngine {
    pub fn new(store: Arc<dyn Store>, settings: Settings) -> Self {
        Self::with_caches(
            store,
            Arc::new(IdCache::new()),
            Arc::new(HierarchyCache::new()),
            settings,
        )
    }

    /// Engine sharing caches with other engines.
    pub fn with_caches(
        store: Arc<dyn Store>,
        id_cache: Arc<IdCache>,
        hierarchy: Arc<HierarchyCache>,
        settings: Settings,
    ) -> Self {
        Self {
            services: Services::new(store, id_cache, hierarchy, Arc::new(settings)),
        }
    }

    /// Engine over the SQLite database named in the storage settings.
    pub fn from_settings(settings: Settings) -> Result<Self, QueryError> {
        let store = SqliteStore::from_settings(&settings.storage)?;
        Ok(Self::new(Arc::new(store), settings))
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.services.store
    }

    pub fn id_cache(&self) -> &Arc<IdCache> {
        self.services.ids.cache()
    }

    pub fn hierarchy_cache(&self) -> &Arc<HierarchyCache> {
        &self.services.hierarchy
    }

    pub fn settings(&self) -> &Settings {
        &self.services.settings
    }

    /// Run a query.
    ///
    /// Fatal compilation issues fail the query before storage is touched.
    pub fn execute(
        &self,
        description: &Description,
        options: QueryOptions,
    ) -> Result<QueryResult, QueryError> {
        let mut lifecycle = Lifecycle::start(description);
        let result = self.run(description, &options, &mut lifecycle);
        if let Err(e) = &result {
            lifecycle.fail(e);
        }
        result
    }

    fn run(
        &self,
        description: &Description,
        options: &QueryOptions,
        lifecycle: &mut Lifecycle,
    ) -> Result<QueryResult, QueryError> {
        let settings = &self.services.settings.query;
        let limit = options
            .limit
            .unwrap_or(settings.default_limit)
            .min(settings.max_limit);

        let graph = SegmentGraphBuilder::new(&self.services)
            .with_sort(&options.sort)
            .build(description)?;
        if graph.has_fatal() {
            return Err(QueryError::Compilation(graph.errors));
        }
        lifecycle.advance(QueryState::Compiled);

        let pagination = Pagination {
            limit,
            offset: options.offset,
            sort: options.sort.clone(),
            singleton: description.is_singleton(),
        };
        let resolved = self
            .services
            .resolver()
            .resolve(&graph, options.mode, &pagination)?;
        lifecycle.advance(QueryState::Resolved);

        let store = self.services.store.as_ref();
        let dialect = store.dialect();
        let mut result = QueryResult {
            errors: graph.errors,
            ..QueryResult::default()
        };

        if options.mode == QueryMode::Debug {
            result.debug = Some(resolved.debug_text(dialect));
            lifecycle.advance(QueryState::Executed);
            return Ok(result);
        }

        let Some(statement) = &resolved.statement else {
            if options.mode == QueryMode::Count {
                result.count = Some(0);
            }
            lifecycle.advance(QueryState::Executed);
            return Ok(result);
        };

        let rows = {
            let mut scope = TemporaryTableScope::new(store);
            for materialization in &resolved.materializations {
                scope.materialize(materialization)?;
            }
            store.query(&statement.to_sql(dialect))?
        };

        match options.mode {
            QueryMode::Count => {
                let count = rows.first().map(|row| row.get_i64(0)).transpose()?;
                result.count = Some(count.and_then(|n| u64::try_from(n).ok()).unwrap_or(0));
            }
            QueryMode::Instances | QueryMode::Debug => {
                let mut pages = rows
                    .iter()
                    .map(|row| self.entity_from_row(row))
                    .collect::<Result<Vec<_>, _>>()?;
                result.has_more = pages.len() as u64 > limit;
                pages.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
                result.rows = pages;
            }
        }
        lifecycle.advance(QueryState::Executed);
        debug!(
            rows = result.rows.len(),
            has_more = result.has_more,
            count = ?result.count,
            "query executed"
        );
        Ok(result)
    }

    /// Turn a projected row into an entity and remember its id.
    fn entity_from_row(&self, row: &Row) -> Result<EntityPage, QueryError> {
        let id = row.get_i64(0)?;
        let namespace = i32::try_from(row.get_i64(2)?).map_err(|_| {
            StoreError::InvalidRow(format!("namespace of entity {} out of range", id))
        })?;
        let page = EntityPage::from_parts(
            row.get_string(1)?,
            namespace,
            row.get_string(3)?,
            row.get_string(4)?,
        );
        let sort_key = row
            .get_opt_string(5)?
            .unwrap_or_else(|| page.default_sort_key());
        if let Err(e) = self.services.ids.cache().store(&page, id, &sort_key) {
            warn!(entity = %page, error = %e, "could not cache entity id");
        }
        Ok(page.with_id(id).with_sort_key(sort_key))
    }

    // ===== Concepts =====

    /// Compile a stored concept on its own.
    pub fn resolve_concept(&self, name: &str) -> Result<Option<ResolvedConcept>, QueryError> {
        ConceptResolver::new(&self.services).resolve_concept(name)
    }

    /// Recompute the cached members of a concept.
    pub fn refresh_concept(&self, name: &str) -> Result<Option<ConceptRefresh>, QueryError> {
        ConceptCache::new(&self.services).refresh(name)
    }

    pub fn delete_concept_cache(&self, name: &str) -> Result<bool, QueryError> {
        ConceptCache::new(&self.services).delete(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IssueKind;
    use crate::model::{Comparator, DataValue, NS_MAIN};

    fn engine() -> (Arc<SqliteStore>, QueryEngine) {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let engine = QueryEngine::new(store.clone(), Settings::default());
        (store, engine)
    }

    #[test]
    fn test_engine_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<QueryEngine>();
    }

    #[test]
    fn test_instances_are_cached() {
        let (store, engine) = engine();
        let alice = EntityPage::new("Alice", NS_MAIN);
        store.add_instance(&alice, &EntityPage::category("Person")).unwrap();

        let result = engine
            .execute(&Description::class("Person"), QueryOptions::instances())
            .unwrap();
        assert_eq!(result.rows.len(), 1);
        let row = &result.rows[0];
        assert_eq!(row.title, "Alice");
        assert_eq!(row.sort_key.as_deref(), Some("Alice"));
        let id = row.id.unwrap();
        assert_eq!(engine.id_cache().entity(id).map(|e| e.title), Some("Alice".into()));
    }

    #[test]
    fn test_limit_is_clamped() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let mut settings = Settings::default();
        settings.query.max_limit = 2;
        let engine = QueryEngine::new(store.clone(), settings);
        for name in ["A", "B", "C"] {
            store.create_entity(&EntityPage::new(name, NS_MAIN)).unwrap();
        }
        let result = engine
            .execute(&Description::namespace(NS_MAIN), QueryOptions::instances().limit(100))
            .unwrap();
        assert_eq!(result.rows.len(), 2);
        assert!(result.has_more);
    }

    #[test]
    fn test_debug_mode_does_not_execute() {
        let (store, engine) = engine();
        store.create_entity(&EntityPage::category("Person")).unwrap();
        let result = engine
            .execute(&Description::class("Person"), QueryOptions::debug())
            .unwrap();
        let debug = result.debug.unwrap();
        assert!(debug.starts_with("SELECT DISTINCT"), "{}", debug);
        assert!(result.rows.is_empty());
        assert!(result.count.is_none());
    }

    #[test]
    fn test_debug_mode_ends_executed() {
        let (store, engine) = engine();
        store.create_entity(&EntityPage::category("Person")).unwrap();
        let description = Description::class("Person");
        let mut lifecycle = Lifecycle::start(&description);
        engine
            .run(&description, &QueryOptions::debug(), &mut lifecycle)
            .unwrap();
        assert_eq!(lifecycle.state, QueryState::Executed);
    }

    #[test]
    fn test_single_page_fetches_one_row() {
        let (store, engine) = engine();
        let alice = EntityPage::new("Alice", NS_MAIN);
        store.add_instance(&alice, &EntityPage::category("Person")).unwrap();
        let description = Description::and([
            Description::class("Person"),
            Description::page(alice),
        ]);

        let debug = engine
            .execute(&description, QueryOptions::debug())
            .unwrap()
            .debug
            .unwrap();
        assert!(debug.ends_with("LIMIT 1 OFFSET 0"), "{}", debug);
        let result = engine
            .execute(&description, QueryOptions::instances().limit(10))
            .unwrap();
        assert_eq!(result.rows.len(), 1);
        assert!(!result.has_more);
    }

    #[test]
    fn test_empty_match_count_is_zero() {
        let (_store, engine) = engine();
        let result = engine
            .execute(&Description::class("Nobody"), QueryOptions::count())
            .unwrap();
        assert_eq!(result.count, Some(0));
        assert!(!result.has_more);
    }

    #[test]
    fn test_fatal_issue_fails_query() {
        let (_store, engine) = engine();
        let err = engine
            .execute(
                &Description::value("Age", Comparator::Greater, DataValue::Number(1.0)),
                QueryOptions::instances(),
            )
            .unwrap_err();
        match err {
            QueryError::Compilation(issues) => {
                assert_eq!(issues[0].kind, IssueKind::UnknownProperty)
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_lifecycle_transitions() {
        let mut lifecycle = Lifecycle::start(&Description::Thing);
        assert_eq!(lifecycle.state, QueryState::Parsed);
        lifecycle.advance(QueryState::Compiled);
        lifecycle.fail(&QueryError::InvalidGraph("x".into()));
        assert_eq!(lifecycle.state, QueryState::Failed);
    }
}
