//! Cache-through entity id resolution.

use std::sync::Arc;

use tracing::trace;

use super::{CacheError, CacheResult, IdCache};
use crate::model::{EntityId, EntityPage};
use crate::sql::{and_all, col, lit_str, or_any, ExprExt, Expr, Query, TableRef};
use crate::store::{Row, Store};

/// Resolves entities to store ids, consulting the [`IdCache`] first.
pub struct EntityIdLookup {
    store: Arc<dyn Store>,
    cache: Arc<IdCache>,
}

impl EntityIdLookup {
    pub fn new(store: Arc<dyn Store>, cache: Arc<IdCache>) -> Self {
        Self { store, cache }
    }

    pub fn cache(&self) -> &Arc<IdCache> {
        &self.cache
    }

    /// Id of an entity, or `None` when the store does not know it.
    ///
    /// A cached id of 0 marks a redirect source and also yields `None`.
    pub fn id_of(&self, page: &EntityPage) -> CacheResult<Option<EntityId>> {
        Ok(self.resolve(page)?.map(|(id, _)| id))
    }

    /// Id and sort key of an entity.
    pub fn resolve(&self, page: &EntityPage) -> CacheResult<Option<(EntityId, String)>> {
        if page.title.contains(' ') {
            return Err(CacheError::UnnormalizedTitle(page.title.clone()));
        }
        if let Some((id, sort_key)) = self.cache.lookup(&page.fingerprint()) {
            trace!(entity = %page, id, "id cache hit");
            return Ok((id != 0).then_some((id, sort_key)));
        }

        let sql = self.select_ids(std::slice::from_ref(page));
        let rows = self.store.query(&sql)?;
        match rows.first() {
            Some(row) => {
                let (entity, id, sort_key) = self.entity_from_row(row)?;
                self.cache.store(&entity, id, &sort_key)?;
                Ok(Some((id, sort_key)))
            }
            None => Ok(None),
        }
    }

    /// Resolve a batch of entities with one query and cache the results.
    ///
    /// Returns how many of them the store knows.
    pub fn prefetch(&self, pages: &[EntityPage]) -> CacheResult<usize> {
        if let Some(bad) = pages.iter().find(|p| p.title.contains(' ')) {
            return Err(CacheError::UnnormalizedTitle(bad.title.clone()));
        }
        let missing: Vec<EntityPage> = pages
            .iter()
            .filter(|p| self.cache.lookup(&p.fingerprint()).is_none())
            .cloned()
            .collect();
        let cached = pages.len() - missing.len();
        if missing.is_empty() {
            return Ok(cached);
        }

        let rows = self.store.query(&self.select_ids(&missing))?;
        for row in &rows {
            let (entity, id, sort_key) = self.entity_from_row(row)?;
            self.cache.store(&entity, id, &sort_key)?;
        }
        trace!(requested = pages.len(), fetched = rows.len(), "prefetched entity ids");
        Ok(cached + rows.len())
    }

    fn select_ids(&self, pages: &[EntityPage]) -> String {
        let identity = |p: &EntityPage| -> Expr {
            let parts = [
                col("smw_title").eq(lit_str(&p.title)),
                col("smw_namespace").eq(i64::from(p.namespace)),
                col("smw_iw").eq(lit_str(&p.interwiki)),
                col("smw_subobject").eq(lit_str(&p.subobject)),
            ];
            // Non-empty array, so and_all always yields an expression
            and_all(parts).unwrap_or_else(crate::sql::never)
        };
        let mut query = Query::new()
            .select(vec![
                col("smw_id"),
                col("smw_title"),
                col("smw_namespace"),
                col("smw_iw"),
                col("smw_subobject"),
                col("smw_sortkey"),
            ])
            .from(TableRef::new(&self.store.tables().ids));
        if let Some(filter) = or_any(pages.iter().map(identity)) {
            query = query.filter(filter);
        }
        query.to_sql(self.store.dialect())
    }

    fn entity_from_row(&self, row: &Row) -> CacheResult<(EntityPage, EntityId, String)> {
        let id = row.get_i64(0)?;
        let namespace = i32::try_from(row.get_i64(2)?).map_err(|_| {
            CacheError::Inconsistency(format!("namespace of entity {} out of range", id))
        })?;
        let entity = EntityPage::from_parts(
            row.get_string(1)?,
            namespace,
            row.get_string(3)?,
            row.get_string(4)?,
        );
        let sort_key = row
            .get_opt_string(5)?
            .unwrap_or_else(|| entity.default_sort_key());
        Ok((entity, id, sort_key))
    }
}
