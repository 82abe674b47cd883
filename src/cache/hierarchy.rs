//! Bounded transitive closure of the subclass and subproperty relations.

use std::collections::HashSet;

use dashmap::DashMap;
use tracing::{debug, warn};

use crate::model::EntityId;
use crate::sql::{col, ExprExt, OrderByExpr, Query, TableRef};
use crate::store::{Store, StoreResult, TableNames};

/// Hierarchy relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Relation {
    SubclassOf,
    SubpropertyOf,
}

impl Relation {
    fn table(self, tables: &TableNames) -> &str {
        match self {
            Relation::SubclassOf => &tables.subclasses,
            Relation::SubpropertyOf => &tables.subproperties,
        }
    }
}

/// Ids reachable from a root, one level per step below it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Closure {
    /// `levels[0]` is the root alone.
    pub levels: Vec<Vec<EntityId>>,
    /// More descendants exist below the deepest expanded level.
    pub truncated: bool,
}

impl Closure {
    pub fn ids(&self) -> Vec<EntityId> {
        self.levels.iter().flatten().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.levels.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Closure cache keyed by (relation, root id, depth bound).
#[derive(Debug, Default)]
pub struct HierarchyCache {
    closures: DashMap<(Relation, EntityId, usize), Closure>,
}

impl HierarchyCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Descendants of `root` at most `max_depth` levels down.
    ///
    /// Cycles are cut at the first repeated id.
    pub fn closure(
        &self,
        store: &dyn Store,
        relation: Relation,
        root: EntityId,
        max_depth: usize,
    ) -> StoreResult<Closure> {
        let key = (relation, root, max_depth);
        if let Some(hit) = self.closures.get(&key) {
            return Ok(hit.value().clone());
        }

        let closure = Self::expand(store, relation, root, max_depth)?;
        if closure.truncated {
            warn!(?relation, root, max_depth, "hierarchy closure truncated");
        }
        debug!(?relation, root, size = closure.len(), "computed hierarchy closure");
        self.closures.insert(key, closure.clone());
        Ok(closure)
    }

    fn expand(
        store: &dyn Store,
        relation: Relation,
        root: EntityId,
        max_depth: usize,
    ) -> StoreResult<Closure> {
        let mut seen: HashSet<EntityId> = HashSet::from([root]);
        let mut levels = vec![vec![root]];
        let mut truncated = false;

        loop {
            let frontier = match levels.last() {
                Some(level) if !level.is_empty() => level.clone(),
                _ => break,
            };
            let children: Vec<EntityId> = Self::children(store, relation, &frontier)?
                .into_iter()
                .filter(|id| !seen.contains(id))
                .collect();
            if children.is_empty() {
                break;
            }
            if levels.len() > max_depth {
                truncated = true;
                break;
            }
            seen.extend(children.iter().copied());
            levels.push(children);
        }

        Ok(Closure { levels, truncated })
    }

    fn children(
        store: &dyn Store,
        relation: Relation,
        parents: &[EntityId],
    ) -> StoreResult<Vec<EntityId>> {
        let query = Query::new()
            .select(vec![col("s_id")])
            .distinct()
            .from(TableRef::new(relation.table(store.tables())))
            .filter(col("o_id").in_list(parents.iter().map(|&id| id.into()).collect()))
            .order_by(vec![OrderByExpr::asc(col("s_id"))]);
        let sql = query.to_sql(store.dialect());
        let mut ids = Vec::new();
        for row in store.query(&sql)? {
            ids.push(row.get_i64(0)?);
        }
        Ok(ids)
    }

    /// Forget every closure of one relation.
    pub fn invalidate(&self, relation: Relation) {
        self.closures.retain(|(r, _, _), _| *r != relation);
    }

    pub fn clear(&self) {
        self.closures.clear();
    }
}
