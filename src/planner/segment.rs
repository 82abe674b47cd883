//! Query segments: the nodes of a compiled query graph.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::QueryIssue;
use crate::sql::{table_col, Expr, ExprExt, Join};

/// Segment id, sequential within one compilation.
pub type SegmentId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SegmentKind {
    /// A table restricted by a where clause, with optional joined children.
    Table,
    /// All components must match the same entity.
    Conjunction,
    /// Any component may match.
    Disjunction,
    /// Matches nothing.
    Noop,
}

/// A child reference of a segment.
#[derive(Debug, Clone, PartialEq)]
pub struct Component {
    pub segment: SegmentId,
    /// Parent column the child's join field must equal. `None` means the
    /// parent's own join field.
    pub on: Option<Expr>,
}

/// A node of the segment graph.
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySegment {
    pub id: SegmentId,
    pub kind: SegmentKind,
    /// Table alias, `t{id}`.
    pub alias: String,
    pub join_table: Option<String>,
    /// Column other segments join against.
    pub join_field: Option<Expr>,
    pub joins: Vec<Join>,
    pub where_clause: Option<Expr>,
    pub components: Vec<Component>,
    /// Sort expressions keyed by property key.
    pub sort_fields: BTreeMap<String, Expr>,
}

impl QuerySegment {
    pub fn alias_for(id: SegmentId) -> String {
        format!("t{}", id)
    }

    fn empty(id: SegmentId, kind: SegmentKind) -> Self {
        Self {
            id,
            kind,
            alias: Self::alias_for(id),
            join_table: None,
            join_field: None,
            joins: Vec::new(),
            where_clause: None,
            components: Vec::new(),
            sort_fields: BTreeMap::new(),
        }
    }

    /// A `Table` segment over `table`, joined on `join_column`.
    pub fn table(id: SegmentId, table: &str, join_column: &str) -> Self {
        let mut segment = Self::empty(id, SegmentKind::Table);
        segment.join_field = Some(table_col(&segment.alias, join_column));
        segment.join_table = Some(table.to_string());
        segment
    }

    /// A `Conjunction` or `Disjunction` over existing segments.
    pub fn combinator(id: SegmentId, kind: SegmentKind, components: Vec<SegmentId>) -> Self {
        let mut segment = Self::empty(id, kind);
        segment.components = components
            .into_iter()
            .map(|segment| Component { segment, on: None })
            .collect();
        segment
    }

    pub fn noop(id: SegmentId) -> Self {
        Self::empty(id, SegmentKind::Noop)
    }

    /// Column of this segment's table.
    pub fn column(&self, name: &str) -> Expr {
        table_col(&self.alias, name)
    }

    /// AND a condition into the where clause.
    pub fn filter(&mut self, condition: Expr) {
        self.where_clause = Some(match self.where_clause.take() {
            Some(existing) => existing.and(condition),
            None => condition,
        });
    }

    pub fn component_ids(&self) -> impl Iterator<Item = SegmentId> + '_ {
        self.components.iter().map(|c| c.segment)
    }
}

/// Output of one compilation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SegmentGraph {
    /// `None` when the description provably matches nothing.
    pub root: Option<SegmentId>,
    pub segments: BTreeMap<SegmentId, QuerySegment>,
    pub errors: Vec<QueryIssue>,
}

impl SegmentGraph {
    pub fn is_empty_match(&self) -> bool {
        self.root.is_none()
    }

    pub fn get(&self, id: SegmentId) -> Option<&QuerySegment> {
        self.segments.get(&id)
    }

    pub fn has_fatal(&self) -> bool {
        self.errors.iter().any(QueryIssue::is_fatal)
    }

    /// Drop segments the root cannot reach.
    pub fn prune(&mut self) {
        let mut reachable = BTreeSet::new();
        let mut stack: Vec<SegmentId> = self.root.into_iter().collect();
        while let Some(id) = stack.pop() {
            if !reachable.insert(id) {
                continue;
            }
            if let Some(segment) = self.segments.get(&id) {
                stack.extend(segment.component_ids());
            }
        }
        self.segments.retain(|id, _| reachable.contains(id));
    }
}
