//! SegmentGraph → SQL.
//!
//! Segments are resolved bottom-up into [`Fragment`]s: a FROM table plus
//! joins and a where clause, exposing one join field. Parents join their
//! children's fragments; the root fragment is finally projected per
//! [`QueryMode`].

use std::collections::{BTreeMap, HashMap};

use petgraph::algo::is_cyclic_directed;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::DfsPostOrder;
use tracing::debug;

use super::segment::{QuerySegment, SegmentGraph, SegmentId, SegmentKind};
use super::temp_table::Materialization;
use super::{QueryMode, SortKey};
use crate::error::QueryError;
use crate::model::{DELETED_MARKER, INTERNAL_MARKER, REDIRECT_MARKER};
use crate::sql::{
    count_distinct, lit_str, never, or_any, table_col, Dialect, Expr, ExprExt, Insert, Join,
    OrderByExpr, Query, SelectExpr, TableRef,
};
use crate::store::TableNames;

/// Alias of the id table joined for the final projection.
const IDS_ALIAS: &str = "ids";

/// Columns of the entity projection, in row order.
pub const ENTITY_COLUMNS: [&str; 6] = [
    "smw_id",
    "smw_title",
    "smw_namespace",
    "smw_iw",
    "smw_subobject",
    "smw_sortkey",
];

// =============================================================================
// Fragment
// =============================================================================

/// A resolved segment: a joinable table expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    pub from: TableRef,
    pub joins: Vec<Join>,
    pub where_clause: Option<Expr>,
    pub join_field: Expr,
    pub sort_fields: BTreeMap<String, Expr>,
}

impl Fragment {
    fn new(from: TableRef, join_field: Expr) -> Self {
        Self {
            from,
            joins: Vec::new(),
            where_clause: None,
            join_field,
            sort_fields: BTreeMap::new(),
        }
    }

    /// The id table under `alias`, joined on `smw_id`.
    fn ids(tables: &TableNames, alias: &str) -> Self {
        Self::new(
            TableRef::new(&tables.ids).with_alias(alias),
            table_col(alias, "smw_id"),
        )
    }

    fn filter(&mut self, condition: Expr) {
        self.where_clause = Some(match self.where_clause.take() {
            Some(existing) => existing.and(condition),
            None => condition,
        });
    }

    /// Inner-join this fragment into `target`, requiring `on` to equal
    /// this fragment's join field.
    pub fn join_into(self, target: &mut Fragment, on: Expr) {
        target
            .joins
            .push(Join::inner(self.from, on.eq(self.join_field)));
        target.joins.extend(self.joins);
        if let Some(condition) = self.where_clause {
            target.filter(condition);
        }
        for (key, field) in self.sort_fields {
            target.sort_fields.entry(key).or_insert(field);
        }
    }

    /// Join this fragment into `target`, or filter `target` by its
    /// members when the fragment is shared with another parent.
    fn attach(self, target: &mut Fragment, on: Expr, shared: bool) {
        if shared {
            target.filter(on.in_subquery(self.subquery()));
        } else {
            self.join_into(target, on);
        }
    }

    /// `SELECT DISTINCT join_field ...` over this fragment.
    pub fn subquery(&self) -> Query {
        self.clone()
            .into_query()
            .select(vec![self.join_field.clone()])
            .distinct()
    }

    fn into_query(self) -> Query {
        let query = Query::new().from(self.from).joins(self.joins);
        match self.where_clause {
            Some(condition) => query.filter(condition),
            None => query,
        }
    }
}

/// A resolved component waiting to be combined into its parent.
struct Child {
    fragment: Fragment,
    on: Option<Expr>,
    shared: bool,
}

// =============================================================================
// Resolved query
// =============================================================================

/// Pagination and ordering of an instance query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pagination {
    /// Rows wanted; one more is fetched to detect further results.
    pub limit: u64,
    pub offset: u64,
    pub sort: Vec<SortKey>,
    /// At most one entity can match, so no extra row is fetched.
    pub singleton: bool,
}

impl Pagination {
    /// Rows the statement asks for.
    pub fn fetch_limit(&self) -> u64 {
        if self.singleton {
            self.limit.min(1)
        } else {
            self.limit.saturating_add(1)
        }
    }
}

/// Output of resolution: the final statement and the temporary tables it
/// depends on.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedQuery {
    pub mode: QueryMode,
    /// `None` when the query provably matches nothing.
    pub statement: Option<Query>,
    /// Tables to materialize, in dependency order, before the statement runs.
    pub materializations: Vec<Materialization>,
}

impl ResolvedQuery {
    fn empty(mode: QueryMode) -> Self {
        Self {
            mode,
            statement: None,
            materializations: Vec::new(),
        }
    }

    pub fn to_sql(&self, dialect: Dialect) -> Option<String> {
        self.statement.as_ref().map(|q| q.to_sql(dialect))
    }

    /// Every statement that would run, separated by `;`.
    pub fn debug_text(&self, dialect: Dialect) -> String {
        self.materializations
            .iter()
            .flat_map(|m| m.to_sql(dialect))
            .chain(self.to_sql(dialect))
            .collect::<Vec<_>>()
            .join(";\n")
    }
}

// =============================================================================
// Resolver
// =============================================================================

/// Resolves segment graphs. Holds no state between calls.
pub struct SegmentResolver<'a> {
    tables: &'a TableNames,
    max_disjunction_arity: usize,
}

impl<'a> SegmentResolver<'a> {
    pub fn new(tables: &'a TableNames, max_disjunction_arity: usize) -> Self {
        Self {
            tables,
            max_disjunction_arity,
        }
    }

    /// Resolve a graph into the statement for `mode`.
    pub fn resolve(
        &self,
        graph: &SegmentGraph,
        mode: QueryMode,
        pagination: &Pagination,
    ) -> Result<ResolvedQuery, QueryError> {
        let Some((root, materializations)) = self.resolve_root(graph)? else {
            return Ok(ResolvedQuery::empty(mode));
        };

        let statement = match mode {
            QueryMode::Count => {
                let (query, ids) = self.members(root);
                query.select(vec![count_distinct(table_col(&ids, "smw_id")).alias("count")])
            }
            QueryMode::Instances | QueryMode::Debug => self.instances(root, pagination),
        };
        debug!(?mode, temporary_tables = materializations.len(), "resolved segment graph");
        Ok(ResolvedQuery {
            mode,
            statement: Some(statement),
            materializations,
        })
    }

    /// Resolve the root segment into a fragment. `None` for an empty match.
    pub fn resolve_root(
        &self,
        graph: &SegmentGraph,
    ) -> Result<Option<(Fragment, Vec<Materialization>)>, QueryError> {
        let Some(root) = graph.root else {
            return Ok(None);
        };

        let mut dag: DiGraph<SegmentId, ()> = DiGraph::new();
        let nodes: HashMap<SegmentId, NodeIndex> = graph
            .segments
            .keys()
            .map(|&id| (id, dag.add_node(id)))
            .collect();
        for segment in graph.segments.values() {
            for child in segment.component_ids() {
                let target = nodes.get(&child).ok_or_else(|| {
                    QueryError::InvalidGraph(format!(
                        "segment {} references missing segment {}",
                        segment.id, child
                    ))
                })?;
                dag.add_edge(nodes[&segment.id], *target, ());
            }
        }
        let start = *nodes.get(&root).ok_or_else(|| {
            QueryError::InvalidGraph(format!("root segment {} does not exist", root))
        })?;
        if is_cyclic_directed(&dag) {
            return Err(QueryError::InvalidGraph("segment graph contains a cycle".into()));
        }

        let mut parents: HashMap<SegmentId, usize> = HashMap::new();
        for segment in graph.segments.values() {
            for child in segment.component_ids() {
                *parents.entry(child).or_default() += 1;
            }
        }

        let mut resolved: HashMap<SegmentId, Fragment> = HashMap::new();
        let mut materializations = Vec::new();
        let mut dfs = DfsPostOrder::new(&dag, start);
        while let Some(node) = dfs.next(&dag) {
            let segment = &graph.segments[&dag[node]];
            let fragment =
                self.resolve_segment(segment, &parents, &mut resolved, &mut materializations)?;
            resolved.insert(segment.id, fragment);
        }

        let fragment = resolved.remove(&root).ok_or_else(|| {
            QueryError::InvalidGraph(format!("root segment {} was not resolved", root))
        })?;
        Ok(Some((fragment, materializations)))
    }

    /// A child with more than one parent stays in `resolved` and is
    /// referenced through `IN (subquery)`, so its aliases never appear
    /// twice in one FROM clause.
    fn resolve_segment(
        &self,
        segment: &QuerySegment,
        parents: &HashMap<SegmentId, usize>,
        resolved: &mut HashMap<SegmentId, Fragment>,
        materializations: &mut Vec<Materialization>,
    ) -> Result<Fragment, QueryError> {
        let mut children = Vec::with_capacity(segment.components.len());
        for component in &segment.components {
            let shared = parents.get(&component.segment).copied().unwrap_or(0) > 1;
            let child = if shared {
                resolved.get(&component.segment).cloned()
            } else {
                resolved.remove(&component.segment)
            };
            let child = child.ok_or_else(|| {
                QueryError::InvalidGraph(format!(
                    "segment {} was not resolved before segment {}",
                    component.segment, segment.id
                ))
            })?;
            children.push(Child {
                fragment: child,
                on: component.on.clone(),
                shared,
            });
        }

        let fragment = match segment.kind {
            SegmentKind::Table => {
                let (Some(table), Some(join_field)) = (&segment.join_table, &segment.join_field)
                else {
                    return Err(QueryError::InvalidGraph(format!(
                        "table segment {} has no table",
                        segment.id
                    )));
                };
                let mut fragment = Fragment::new(
                    TableRef::new(table).with_alias(&segment.alias),
                    join_field.clone(),
                );
                fragment.joins = segment.joins.clone();
                fragment.where_clause = segment.where_clause.clone();
                fragment.sort_fields = segment.sort_fields.clone();
                for child in children {
                    let on = child.on.unwrap_or_else(|| fragment.join_field.clone());
                    child.fragment.attach(&mut fragment, on, child.shared);
                }
                fragment
            }
            SegmentKind::Conjunction => {
                let base = children.iter().position(|child| !child.shared);
                let mut fragment = match base {
                    Some(index) => children.remove(index).fragment,
                    None => Fragment::ids(self.tables, &segment.alias),
                };
                for child in children {
                    let on = fragment.join_field.clone();
                    child.fragment.attach(&mut fragment, on, child.shared);
                }
                fragment
            }
            SegmentKind::Disjunction => {
                let branches: Vec<Fragment> =
                    children.into_iter().map(|child| child.fragment).collect();
                if branches.len() > self.max_disjunction_arity {
                    self.materialize(segment, &branches, materializations)
                } else {
                    let mut fragment = Fragment::ids(self.tables, &segment.alias);
                    let id = fragment.join_field.clone();
                    let condition = or_any(
                        branches
                            .iter()
                            .map(|branch| id.clone().in_subquery(branch.subquery())),
                    )
                    .unwrap_or_else(never);
                    fragment.filter(condition);
                    fragment
                }
            }
            SegmentKind::Noop => {
                let mut fragment = Fragment::ids(self.tables, &segment.alias);
                fragment.filter(never());
                fragment
            }
        };
        Ok(fragment)
    }

    /// Copy the members of every branch into a temporary id table and
    /// reference that table instead.
    fn materialize(
        &self,
        segment: &QuerySegment,
        branches: &[Fragment],
        materializations: &mut Vec<Materialization>,
    ) -> Fragment {
        let mut materialization = Materialization::new(Materialization::new_table_name());
        materialization.populate = branches
            .iter()
            .map(|branch| {
                Insert::into(materialization.table.as_str())
                    .columns(["id"])
                    .from_select(branch.subquery())
                    .ignore_duplicates()
            })
            .collect();
        debug!(
            segment = segment.id,
            table = %materialization.table,
            branches = branches.len(),
            "materializing disjunction"
        );
        let fragment = Fragment::new(
            TableRef::new(&materialization.table).with_alias(&segment.alias),
            table_col(&segment.alias, "id"),
        );
        materializations.push(materialization);
        fragment
    }

    /// Query over the entities of `root`, without a select list.
    ///
    /// Redirects, internal and deleted objects never qualify. Returns the
    /// query and the alias of the id table in it.
    pub(crate) fn members(&self, root: Fragment) -> (Query, String) {
        let alias = match &root.from.alias {
            Some(alias)
                if root.from.table == self.tables.ids
                    && root.join_field == table_col(alias, "smw_id") =>
            {
                alias.clone()
            }
            _ => IDS_ALIAS.to_string(),
        };
        let join_field = root.join_field.clone();
        let mut query = root.into_query();
        if alias == IDS_ALIAS {
            query = query.inner_join(
                TableRef::new(&self.tables.ids).with_alias(IDS_ALIAS),
                table_col(IDS_ALIAS, "smw_id").eq(join_field),
            );
        }
        let excluded = [REDIRECT_MARKER, INTERNAL_MARKER, DELETED_MARKER]
            .into_iter()
            .map(lit_str)
            .collect();
        let query = query.filter(table_col(&alias, "smw_iw").not_in_list(excluded));
        (query, alias)
    }

    fn instances(&self, root: Fragment, pagination: &Pagination) -> Query {
        let sort_fields = root.sort_fields.clone();
        let (query, ids) = self.members(root);

        let mut select: Vec<SelectExpr> = ENTITY_COLUMNS
            .iter()
            .map(|column| table_col(&ids, column).into())
            .collect();
        let mut order_by = Vec::new();
        for key in &pagination.sort {
            let field = if key.is_entity() {
                table_col(&ids, "smw_sortkey")
            } else {
                match sort_fields.get(&key.property) {
                    Some(field) => {
                        select.push(field.clone().alias(&format!("sort_{}", order_by.len())));
                        field.clone()
                    }
                    None => continue,
                }
            };
            order_by.push(if key.ascending {
                OrderByExpr::asc(field)
            } else {
                OrderByExpr::desc(field)
            });
        }
        if order_by.is_empty() {
            order_by.push(OrderByExpr::asc(table_col(&ids, "smw_sortkey")));
        }
        order_by.push(OrderByExpr::asc(table_col(&ids, "smw_id")));

        query
            .select(select)
            .distinct()
            .order_by(order_by)
            .limit(pagination.fetch_limit())
            .offset(pagination.offset)
    }
}
