//! Named concepts: stored descriptions that other queries refer to.
//!
//! A concept reference is expanded in place while the outer query is being
//! built. When the concept's members were materialized recently enough the
//! expansion reads the concept cache table instead.

use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, trace, warn};

use super::builder::{Built, CompileContext, SegmentGraphBuilder};
use super::resolver::Fragment;
use super::segment::QuerySegment;
use super::temp_table::{Materialization, TemporaryTableScope};
use super::Services;
use crate::error::{IssueKind, QueryError, QueryIssue};
use crate::model::{Description, EntityId, EntityPage};
use crate::sql::{col, lit_int, lit_null, table_col, Delete, ExprExt, Insert, OrderByExpr, Query, TableRef, Update};
use crate::store::StoreError;

/// Seconds since the epoch.
pub(crate) fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Row of the concept table.
#[derive(Debug, Clone, PartialEq)]
struct StoredConcept {
    text: String,
    cache_date: Option<i64>,
    size: usize,
    depth: usize,
}

impl StoredConcept {
    /// Why the stored description exceeds the query limits, if it does.
    fn exceeds(&self, max_depth: usize, max_size: usize) -> Option<String> {
        (self.depth > max_depth || self.size > max_size).then(|| {
            format!(
                "depth {} and size {} exceed the limits (depth {}, size {})",
                self.depth, self.size, max_depth, max_size
            )
        })
    }

    fn is_fresh(&self, now: i64, lifetime: u64) -> bool {
        match self.cache_date {
            Some(date) => now.saturating_sub(date) < i64::try_from(lifetime).unwrap_or(i64::MAX),
            None => false,
        }
    }
}

/// A concept compiled on its own.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConcept {
    pub concept_id: EntityId,
    /// Root fragment; its join field yields the member ids.
    pub fragment: Fragment,
    pub materializations: Vec<Materialization>,
    /// Non-fatal issues of the compilation.
    pub issues: Vec<QueryIssue>,
}

/// Expands and compiles stored concepts.
pub struct ConceptResolver<'a> {
    services: &'a Services,
}

impl<'a> ConceptResolver<'a> {
    pub fn new(services: &'a Services) -> Self {
        Self { services }
    }

    /// Expand a concept reference into `ctx`.
    pub(crate) fn splice(
        &self,
        builder: &SegmentGraphBuilder<'_>,
        concept: &EntityPage,
        ctx: &mut CompileContext,
    ) -> Result<Built, QueryError> {
        let Some(id) = self.services.ids.id_of(concept)? else {
            trace!(%concept, "unknown concept");
            return Ok(Built::Empty);
        };
        if ctx.is_expanding(id) {
            ctx.warn(
                IssueKind::RecursionDetected,
                format!("Concept \"{}\" refers to itself", concept),
            );
            return Ok(Built::Empty);
        }
        let Some(stored) = self.load(id)? else {
            ctx.warn(
                IssueKind::Structural,
                format!("\"{}\" has no concept description", concept),
            );
            return Ok(Built::Empty);
        };

        if stored.is_fresh(unix_now(), self.services.settings.concept.cache_lifetime_seconds) {
            let tables = self.services.tables();
            let mut segment = QuerySegment::table(ctx.allocate(), &tables.concept_cache, "s_id");
            segment.filter(segment.column("o_id").eq(lit_int(id)));
            debug!(%concept, "reading cached concept members");
            return Ok(Built::Segment(ctx.insert(segment)));
        }

        let limits = &self.services.settings.query;
        if let Some(reason) = stored.exceeds(limits.max_depth, limits.max_size) {
            ctx.warn(
                IssueKind::QueryTooComplex,
                format!("Concept \"{}\" is too complex: {}", concept, reason),
            );
            return Ok(Built::Empty);
        }
        let description = match parse(&stored.text) {
            Ok(description) => description,
            Err(e) => {
                ctx.warn(
                    IssueKind::Structural,
                    format!("Description of concept \"{}\" is unreadable: {}", concept, e),
                );
                return Ok(Built::Empty);
            }
        };
        let mut nested = ctx.nested(id);
        let built = builder.compile(&description, &mut nested, false)?;
        debug!(%concept, issues = nested.issues().len(), "spliced concept");
        ctx.merge(nested);
        Ok(built)
    }

    /// Compile a concept on its own, ignoring its cached members.
    ///
    /// `None` when the concept is unknown or matches nothing.
    pub fn resolve_concept(&self, name: &str) -> Result<Option<ResolvedConcept>, QueryError> {
        let concept = EntityPage::concept(name);
        let Some(id) = self.services.ids.id_of(&concept)? else {
            return Ok(None);
        };
        let Some(stored) = self.load(id)? else {
            return Ok(None);
        };
        let limits = &self.services.settings.query;
        if let Some(reason) = stored.exceeds(limits.max_depth, limits.max_size) {
            return Err(QueryError::Compilation(vec![QueryIssue::fatal(
                IssueKind::QueryTooComplex,
                format!("Concept \"{}\" is too complex: {}", concept, reason),
            )]));
        }
        let description = parse(&stored.text).map_err(|e| {
            QueryError::Compilation(vec![QueryIssue::fatal(
                IssueKind::Structural,
                format!("Description of concept \"{}\" is unreadable: {}", concept, e),
            )])
        })?;

        let builder = SegmentGraphBuilder::new(self.services);
        let mut ctx = CompileContext::new().nested(id);
        let built = builder.compile(&description, &mut ctx, false)?;
        let graph = ctx.finish(built, self.services.tables());
        if graph.has_fatal() {
            return Err(QueryError::Compilation(graph.errors));
        }

        let Some((fragment, materializations)) = self.services.resolver().resolve_root(&graph)?
        else {
            return Ok(None);
        };
        Ok(Some(ResolvedConcept {
            concept_id: id,
            fragment,
            materializations,
            issues: graph.errors,
        }))
    }

    fn load(&self, id: EntityId) -> Result<Option<StoredConcept>, QueryError> {
        let store = self.services.store.as_ref();
        let sql = Query::new()
            .select(vec![
                col("concept_txt"),
                col("cache_date"),
                col("concept_size"),
                col("concept_depth"),
            ])
            .from(TableRef::new(&store.tables().concepts))
            .filter(col("s_id").eq(lit_int(id)))
            .to_sql(store.dialect());
        let rows = store.query(&sql)?;
        let Some(row) = rows.first() else {
            return Ok(None);
        };
        let count = |idx: usize| -> Result<usize, QueryError> {
            let n = row.get_i64(idx)?;
            usize::try_from(n).map_err(|_| {
                StoreError::InvalidRow(format!("negative size {} in concept {}", n, id)).into()
            })
        };
        Ok(Some(StoredConcept {
            text: row.get_string(0)?,
            cache_date: row.get_opt_i64(1)?,
            size: count(2)?,
            depth: count(3)?,
        }))
    }
}

fn parse(text: &str) -> Result<Description, serde_json::Error> {
    serde_json::from_str(text)
}

// =============================================================================
// Concept cache
// =============================================================================

/// Outcome of a concept cache refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct ConceptRefresh {
    pub concept_id: EntityId,
    /// Members written to the cache.
    pub count: u64,
    pub issues: Vec<QueryIssue>,
}

/// Materializes concept members into the concept cache table.
pub struct ConceptCache<'a> {
    services: &'a Services,
}

impl<'a> ConceptCache<'a> {
    pub fn new(services: &'a Services) -> Self {
        Self { services }
    }

    pub fn refresh(&self, name: &str) -> Result<Option<ConceptRefresh>, QueryError> {
        self.refresh_at(name, unix_now())
    }

    /// Recompute the cached members of a concept, stamping the cache with
    /// `now`. `None` when there is no such concept.
    ///
    /// The old members stay in place until the concept has compiled and its
    /// temporary tables are filled. A failure after that point leaves the
    /// cache empty and unstamped.
    pub fn refresh_at(&self, name: &str, now: i64) -> Result<Option<ConceptRefresh>, QueryError> {
        let resolver = ConceptResolver::new(self.services);
        let Some(id) = self.services.ids.id_of(&EntityPage::concept(name))? else {
            return Ok(None);
        };
        if resolver.load(id)?.is_none() {
            return Ok(None);
        }

        let store = self.services.store.as_ref();
        let tables = self.services.tables();
        let resolved = resolver.resolve_concept(name)?;

        let mut scope = TemporaryTableScope::new(store);
        let (insert, issues) = match resolved {
            None => (None, Vec::new()),
            Some(resolved) => {
                for materialization in &resolved.materializations {
                    scope.materialize(materialization)?;
                }
                let (members, ids) = self.services.resolver().members(resolved.fragment);
                let select = members
                    .select(vec![table_col(&ids, "smw_id"), lit_int(id)])
                    .distinct()
                    .order_by(vec![OrderByExpr::asc(table_col(&ids, "smw_id"))])
                    .limit(self.services.settings.concept.cache_max_size);
                let insert = Insert::into(tables.concept_cache.as_str())
                    .columns(["s_id", "o_id"])
                    .from_select(select)
                    .ignore_duplicates();
                (Some(insert), resolved.issues)
            }
        };

        let count = match self.replace_members(id, insert.as_ref(), now) {
            Ok(count) => count,
            Err(e) => {
                if let Err(reset) = self.reset(id) {
                    warn!(concept = name, error = %reset, "could not reset concept cache");
                }
                return Err(e);
            }
        };
        drop(scope);
        debug!(concept = name, count, "refreshed concept cache");
        Ok(Some(ConceptRefresh {
            concept_id: id,
            count,
            issues,
        }))
    }

    fn replace_members(
        &self,
        id: EntityId,
        insert: Option<&Insert>,
        now: i64,
    ) -> Result<u64, QueryError> {
        let store = self.services.store.as_ref();
        let dialect = store.dialect();
        self.clear_members(id)?;
        let count = match insert {
            Some(insert) => store.execute(&insert.to_sql(dialect))? as u64,
            None => 0,
        };
        let update = Update::table(store.tables().concepts.as_str())
            .set("cache_date", lit_int(now))
            .set("cache_count", lit_int(i64::try_from(count).unwrap_or(i64::MAX)))
            .filter(col("s_id").eq(lit_int(id)));
        store.execute(&update.to_sql(dialect))?;
        Ok(count)
    }

    /// Drop the cached members of a concept. Returns false when there is
    /// no such concept.
    pub fn delete(&self, name: &str) -> Result<bool, QueryError> {
        let Some(id) = self.services.ids.id_of(&EntityPage::concept(name))? else {
            return Ok(false);
        };
        Ok(self.reset(id)? > 0)
    }

    /// Clear the members and the cache stamp of a concept.
    fn reset(&self, id: EntityId) -> Result<usize, QueryError> {
        let store = self.services.store.as_ref();
        let update = Update::table(store.tables().concepts.as_str())
            .set("cache_date", lit_null())
            .set("cache_count", lit_null())
            .filter(col("s_id").eq(lit_int(id)));
        let updated = store.execute(&update.to_sql(store.dialect()))?;
        self.clear_members(id)?;
        Ok(updated)
    }

    fn clear_members(&self, id: EntityId) -> Result<usize, QueryError> {
        let store = self.services.store.as_ref();
        let delete = Delete::from(store.tables().concept_cache.as_str())
            .filter(col("o_id").eq(lit_int(id)));
        Ok(store.execute(&delete.to_sql(store.dialect()))?)
    }
}
