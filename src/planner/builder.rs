//! Description → SegmentGraph.
//!
//! Every description node compiles to one of three outcomes: no match at
//! all, no restriction at all, or a segment. The first two never reach the
//! graph; combinators absorb them the way set algebra says they should.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, trace};

use super::concept::ConceptResolver;
use super::segment::{Component, QuerySegment, SegmentGraph, SegmentId, SegmentKind};
use super::{Services, SortKey};
use crate::cache::Relation;
use crate::error::{IssueKind, QueryError, QueryIssue};
use crate::model::{
    ClassDescription, Comparator, DataValue, Description, EntityId, EntityPage, Property,
    SomePropertyDescription, ValueDescription,
};
use crate::sql::{
    col, lit_float, lit_int, lit_str, never, or_any, table_col, Expr, ExprExt, Join, Query,
    TableRef,
};
use crate::store::TableNames;

// =============================================================================
// Compile context
// =============================================================================

/// Mutable state of one compilation, threaded through every recursive call.
#[derive(Debug, Default)]
pub(crate) struct CompileContext {
    next_id: SegmentId,
    segments: BTreeMap<SegmentId, QuerySegment>,
    issues: Vec<QueryIssue>,
    /// Concepts currently being expanded, outermost first.
    concepts: Vec<EntityId>,
    /// Requested sort properties not yet attached to a segment.
    pending_sorts: BTreeSet<String>,
}

impl CompileContext {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Context for expanding `concept` inside this one.
    ///
    /// The counter continues from the outer one, so the ids of the
    /// sub-graph never collide with segments already emitted.
    pub(crate) fn nested(&self, concept: EntityId) -> Self {
        let mut concepts = self.concepts.clone();
        concepts.push(concept);
        Self {
            next_id: self.next_id,
            concepts,
            ..Self::default()
        }
    }

    /// Take over the segments and issues of a nested context.
    pub(crate) fn merge(&mut self, nested: CompileContext) {
        self.next_id = self.next_id.max(nested.next_id);
        self.segments.extend(nested.segments);
        self.issues.extend(nested.issues);
    }

    pub(crate) fn is_expanding(&self, concept: EntityId) -> bool {
        self.concepts.contains(&concept)
    }

    pub(crate) fn allocate(&mut self) -> SegmentId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub(crate) fn insert(&mut self, segment: QuerySegment) -> SegmentId {
        let id = segment.id;
        debug!(
            segment = id,
            kind = ?segment.kind,
            table = segment.join_table.as_deref().unwrap_or("-"),
            "emitted segment"
        );
        self.segments.insert(id, segment);
        id
    }

    pub(crate) fn warn(&mut self, kind: IssueKind, message: impl Into<String>) {
        self.issues.push(QueryIssue::warning(kind, message));
    }

    pub(crate) fn fail(&mut self, kind: IssueKind, message: impl Into<String>) {
        self.issues.push(QueryIssue::fatal(kind, message));
    }

    pub(crate) fn issues(&self) -> &[QueryIssue] {
        &self.issues
    }

    /// Seal the context into a graph rooted at `built`.
    pub(crate) fn finish(mut self, built: Built, tables: &TableNames) -> SegmentGraph {
        let root = match built {
            Built::Empty => None,
            Built::Segment(id) => Some(id),
            Built::Trivial => {
                let segment = QuerySegment::table(self.allocate(), &tables.ids, "smw_id");
                Some(self.insert(segment))
            }
        };
        for key in std::mem::take(&mut self.pending_sorts) {
            self.warn(
                IssueKind::UnresolvableSort,
                format!("Sort key \"{}\" is not part of the query", key),
            );
        }
        let mut graph = SegmentGraph {
            root,
            segments: self.segments,
            errors: self.issues,
        };
        graph.prune();
        graph
    }
}

/// Outcome of compiling one description node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Built {
    /// Matches nothing.
    Empty,
    /// Matches everything.
    Trivial,
    Segment(SegmentId),
}

/// How a property value is matched inside its value table.
#[derive(Debug, Clone, PartialEq)]
enum ValueMatch {
    /// Presence of the property is enough.
    Any,
    Impossible,
    /// Compare a column of the value table.
    Column {
        column: &'static str,
        comparator: Comparator,
        operand: Expr,
    },
    /// Compare the sort key of the object page.
    ObjectSortKey { comparator: Comparator, operand: Expr },
}

/// Where the sort value of a property segment lives.
#[derive(Debug, Clone, Copy)]
enum SortField {
    Column(&'static str),
    ObjectSortKey,
}

impl SortField {
    fn of(value: &DataValue) -> Self {
        match value {
            DataValue::Number(_) => SortField::Column("o_sortkey"),
            DataValue::Text(_) => SortField::Column("o_blob"),
            DataValue::Page(_) => SortField::ObjectSortKey,
        }
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Compiles descriptions into segment graphs.
pub struct SegmentGraphBuilder<'a> {
    services: &'a Services,
    sort: Vec<SortKey>,
}

impl<'a> SegmentGraphBuilder<'a> {
    pub fn new(services: &'a Services) -> Self {
        Self {
            services,
            sort: Vec::new(),
        }
    }

    /// Sort keys to attach to property segments.
    pub fn with_sort(mut self, sort: &[SortKey]) -> Self {
        self.sort = sort.to_vec();
        self
    }

    fn tables(&self) -> &'a TableNames {
        self.services.tables()
    }

    /// Compile a description.
    ///
    /// Compilation problems are reported in [`SegmentGraph::errors`]; only
    /// storage failures end up in the `Err` arm.
    pub fn build(&self, description: &Description) -> Result<SegmentGraph, QueryError> {
        let mut ctx = CompileContext::new();
        let limits = &self.services.settings.query;
        let (depth, size) = (description.depth(), description.size());
        if depth > limits.max_depth || size > limits.max_size {
            ctx.fail(
                IssueKind::QueryTooComplex,
                format!(
                    "Query of depth {} and size {} exceeds the limits (depth {}, size {})",
                    depth, size, limits.max_depth, limits.max_size
                ),
            );
            return Ok(ctx.finish(Built::Empty, self.tables()));
        }

        ctx.pending_sorts = self
            .sort
            .iter()
            .filter(|key| !key.is_entity())
            .map(|key| key.property.clone())
            .collect();

        let built = self.compile(description, &mut ctx, true)?;
        let graph = ctx.finish(built, self.tables());
        debug!(
            query = %description,
            root = ?graph.root,
            segments = graph.segments.len(),
            issues = graph.errors.len(),
            "built segment graph"
        );
        Ok(graph)
    }

    /// Compile one node. `sortable` is true while the node is reached
    /// through conjunctions only.
    pub(crate) fn compile(
        &self,
        description: &Description,
        ctx: &mut CompileContext,
        sortable: bool,
    ) -> Result<Built, QueryError> {
        match description {
            Description::Thing => Ok(Built::Trivial),
            Description::Class(class) => self.compile_class(class, ctx),
            Description::Namespace(ns) => {
                let mut segment = QuerySegment::table(ctx.allocate(), &self.tables().ids, "smw_id");
                segment.filter(segment.column("smw_namespace").eq(lit_int(i64::from(ns.namespace))));
                Ok(Built::Segment(ctx.insert(segment)))
            }
            Description::Value(value) => match &value.property {
                Some(property) => self.compile_property_value(property, value, ctx, sortable),
                None => self.compile_page(value, ctx),
            },
            Description::SomeProperty(some) => self.compile_some_property(some, ctx, sortable),
            Description::Conjunction(children) => self.compile_conjunction(children, ctx, sortable),
            Description::Disjunction(children) => self.compile_disjunction(children, ctx),
            Description::Concept(concept) => {
                ConceptResolver::new(self.services).splice(self, &concept.concept, ctx)
            }
        }
    }

    fn compile_class(
        &self,
        class: &ClassDescription,
        ctx: &mut CompileContext,
    ) -> Result<Built, QueryError> {
        let settings = &self.services.settings;
        let mut ids: Vec<EntityId> = Vec::new();
        for page in &class.classes {
            let Some(id) = self.services.ids.id_of(page)? else {
                trace!(class = %page, "dropping unknown class");
                continue;
            };
            if settings.query.subcategory_hierarchy {
                let depth = class.hierarchy_depth.unwrap_or(settings.hierarchy.max_depth);
                let closure = self.services.hierarchy.closure(
                    self.services.store.as_ref(),
                    Relation::SubclassOf,
                    id,
                    depth,
                )?;
                if closure.truncated {
                    ctx.warn(
                        IssueKind::RecursionLimitExceeded,
                        format!("Subcategories of \"{}\" truncated at depth {}", page, depth),
                    );
                }
                ids.extend(closure.ids());
            } else {
                ids.push(id);
            }
        }
        dedup_in_order(&mut ids);
        if ids.is_empty() {
            return Ok(Built::Empty);
        }

        let mut segment = QuerySegment::table(ctx.allocate(), &self.tables().instances, "s_id");
        segment.filter(id_filter(segment.column("o_id"), &ids));
        Ok(Built::Segment(ctx.insert(segment)))
    }

    /// A single page, optionally compared by sort key.
    fn compile_page(
        &self,
        value: &ValueDescription,
        ctx: &mut CompileContext,
    ) -> Result<Built, QueryError> {
        let DataValue::Page(page) = &value.value else {
            ctx.warn(
                IssueKind::Structural,
                format!("\"{}\" is not a page and cannot be queried on its own", value.value),
            );
            return Ok(Built::Empty);
        };

        let mut segment = QuerySegment::table(ctx.allocate(), &self.tables().ids, "smw_id");
        match value.comparator {
            Comparator::Equal | Comparator::NotEqual => {
                let equal = value.comparator == Comparator::Equal;
                match self.services.ids.id_of(page)? {
                    Some(id) if equal => segment.filter(segment.column("smw_id").eq(lit_int(id))),
                    Some(id) => segment.filter(segment.column("smw_id").ne(lit_int(id))),
                    None if equal => return Ok(Built::Empty),
                    None => return Ok(Built::Trivial),
                }
            }
            comparator => {
                let operand = self.page_operand(page, comparator)?;
                segment.filter(compare(segment.column("smw_sortkey"), comparator, operand));
            }
        }
        Ok(Built::Segment(ctx.insert(segment)))
    }

    fn compile_property_value(
        &self,
        property: &Property,
        value: &ValueDescription,
        ctx: &mut CompileContext,
        sortable: bool,
    ) -> Result<Built, QueryError> {
        let Some(pids) = self.property_ids(property, ctx)? else {
            return Ok(Built::Empty);
        };
        let matcher = self.value_match(value, ctx)?;
        if matcher == ValueMatch::Impossible {
            return Ok(Built::Empty);
        }

        let table = self.tables().value_table(&value.value);
        let mut branches = Vec::with_capacity(pids.len());
        for &pid in &pids {
            let mut segment = QuerySegment::table(ctx.allocate(), table, "s_id");
            segment.filter(segment.column("p_id").eq(lit_int(pid)));
            self.apply_match(&mut segment, &matcher);
            if sortable && pids.len() == 1 {
                self.attach_sort(&mut segment, property, SortField::of(&value.value), ctx);
            }
            branches.push(ctx.insert(segment));
        }

        if let [single] = branches[..] {
            return Ok(Built::Segment(single));
        }
        let segment = QuerySegment::combinator(ctx.allocate(), SegmentKind::Disjunction, branches);
        Ok(Built::Segment(ctx.insert(segment)))
    }

    fn compile_some_property(
        &self,
        some: &SomePropertyDescription,
        ctx: &mut CompileContext,
        sortable: bool,
    ) -> Result<Built, QueryError> {
        let Some(pids) = self.property_ids(&some.property, ctx)? else {
            return Ok(Built::Empty);
        };

        match self.compile(&some.description, ctx, false)? {
            Built::Empty => Ok(Built::Empty),
            Built::Trivial => {
                // Any value at all: the value type is unknown, so every value
                // table is a candidate.
                let mut segment = QuerySegment::table(ctx.allocate(), &self.tables().ids, "smw_id");
                let holders = self.tables().value_tables().map(|table| {
                    segment.column("smw_id").in_subquery(
                        Query::new()
                            .select(vec![col("s_id")])
                            .from(TableRef::new(table))
                            .filter(id_filter(col("p_id"), &pids)),
                    )
                });
                if let Some(condition) = or_any(holders) {
                    segment.filter(condition);
                }
                Ok(Built::Segment(ctx.insert(segment)))
            }
            Built::Segment(child) => {
                let mut segment =
                    QuerySegment::table(ctx.allocate(), &self.tables().page_values, "s_id");
                segment.filter(id_filter(segment.column("p_id"), &pids));
                segment.components.push(Component {
                    segment: child,
                    on: Some(segment.column("o_id")),
                });
                if sortable {
                    self.attach_sort(&mut segment, &some.property, SortField::ObjectSortKey, ctx);
                }
                Ok(Built::Segment(ctx.insert(segment)))
            }
        }
    }

    fn compile_conjunction(
        &self,
        children: &[Description],
        ctx: &mut CompileContext,
        sortable: bool,
    ) -> Result<Built, QueryError> {
        let mut parts = Vec::new();
        let mut empty = false;
        for child in children {
            match self.compile(child, ctx, sortable)? {
                Built::Empty => empty = true,
                Built::Trivial => {}
                Built::Segment(id) => parts.push(id),
            }
        }
        if empty {
            return Ok(Built::Empty);
        }
        match parts[..] {
            [] => Ok(Built::Trivial),
            [single] => Ok(Built::Segment(single)),
            _ => {
                let segment =
                    QuerySegment::combinator(ctx.allocate(), SegmentKind::Conjunction, parts);
                Ok(Built::Segment(ctx.insert(segment)))
            }
        }
    }

    fn compile_disjunction(
        &self,
        children: &[Description],
        ctx: &mut CompileContext,
    ) -> Result<Built, QueryError> {
        let mut parts = Vec::new();
        let mut trivial = false;
        for child in children {
            match self.compile(child, ctx, false)? {
                Built::Empty => {}
                Built::Trivial => trivial = true,
                Built::Segment(id) => parts.push(id),
            }
        }
        if trivial {
            return Ok(Built::Trivial);
        }
        match parts[..] {
            [] => Ok(Built::Empty),
            [single] => Ok(Built::Segment(single)),
            _ => {
                let segment =
                    QuerySegment::combinator(ctx.allocate(), SegmentKind::Disjunction, parts);
                Ok(Built::Segment(ctx.insert(segment)))
            }
        }
    }

    // ===== Helpers =====

    /// Property id plus its subproperties. `None` (with a fatal issue) when
    /// the property is unknown.
    fn property_ids(
        &self,
        property: &Property,
        ctx: &mut CompileContext,
    ) -> Result<Option<Vec<EntityId>>, QueryError> {
        let Some(pid) = self.services.ids.id_of(&property.entity())? else {
            ctx.fail(
                IssueKind::UnknownProperty,
                format!("Unknown property \"{}\"", property),
            );
            return Ok(None);
        };
        let settings = &self.services.settings;
        if !settings.query.subproperty_hierarchy {
            return Ok(Some(vec![pid]));
        }
        let depth = settings.hierarchy.max_depth;
        let closure = self.services.hierarchy.closure(
            self.services.store.as_ref(),
            Relation::SubpropertyOf,
            pid,
            depth,
        )?;
        if closure.truncated {
            ctx.warn(
                IssueKind::RecursionLimitExceeded,
                format!("Subproperties of \"{}\" truncated at depth {}", property, depth),
            );
        }
        Ok(Some(closure.ids()))
    }

    fn value_match(
        &self,
        value: &ValueDescription,
        ctx: &mut CompileContext,
    ) -> Result<ValueMatch, QueryError> {
        let comparator = value.comparator;
        let matcher = match &value.value {
            DataValue::Number(n) => {
                if comparator.is_pattern() {
                    ctx.warn(
                        IssueKind::Structural,
                        format!("Pattern comparison is not defined for the number {}", n),
                    );
                    ValueMatch::Impossible
                } else if !n.is_finite() {
                    ctx.warn(IssueKind::Structural, format!("{} is not a comparable number", n));
                    ValueMatch::Impossible
                } else {
                    ValueMatch::Column {
                        column: "o_sortkey",
                        comparator,
                        operand: lit_float(*n),
                    }
                }
            }
            DataValue::Text(text) => ValueMatch::Column {
                column: "o_blob",
                comparator,
                operand: if comparator.is_pattern() {
                    lit_str(&like_pattern(text))
                } else {
                    lit_str(text)
                },
            },
            DataValue::Page(page) => match comparator {
                Comparator::Equal | Comparator::NotEqual => {
                    match (self.services.ids.id_of(page)?, comparator) {
                        (Some(id), _) => ValueMatch::Column {
                            column: "o_id",
                            comparator,
                            operand: lit_int(id),
                        },
                        (None, Comparator::Equal) => ValueMatch::Impossible,
                        (None, _) => ValueMatch::Any,
                    }
                }
                _ => ValueMatch::ObjectSortKey {
                    comparator,
                    operand: self.page_operand(page, comparator)?,
                },
            },
        };
        Ok(matcher)
    }

    /// Operand for a range or pattern comparison against a page sort key.
    fn page_operand(&self, page: &EntityPage, comparator: Comparator) -> Result<Expr, QueryError> {
        if comparator.is_pattern() {
            return Ok(lit_str(&like_pattern(&page.default_sort_key())));
        }
        let sort_key = match &page.sort_key {
            Some(key) => key.clone(),
            None => match self.services.ids.resolve(page)? {
                Some((_, key)) => key,
                None => page.default_sort_key(),
            },
        };
        Ok(lit_str(&sort_key))
    }

    fn apply_match(&self, segment: &mut QuerySegment, matcher: &ValueMatch) {
        match matcher {
            ValueMatch::Any => {}
            ValueMatch::Impossible => segment.filter(never()),
            ValueMatch::Column {
                column,
                comparator,
                operand,
            } => {
                let condition = compare(segment.column(column), *comparator, operand.clone());
                segment.filter(condition);
            }
            ValueMatch::ObjectSortKey {
                comparator,
                operand,
            } => {
                let sort_key = self.join_object(segment);
                segment.filter(compare(sort_key, *comparator, operand.clone()));
            }
        }
    }

    /// Join the object page of a page-valued segment; returns its sort key
    /// column.
    fn join_object(&self, segment: &mut QuerySegment) -> Expr {
        let alias = format!("{}o", segment.alias);
        let joined = segment
            .joins
            .iter()
            .any(|join| join.table.alias.as_deref() == Some(alias.as_str()));
        if !joined {
            let on = table_col(&alias, "smw_id").eq(segment.column("o_id"));
            segment
                .joins
                .push(Join::inner(TableRef::new(&self.tables().ids).with_alias(&alias), on));
        }
        table_col(&alias, "smw_sortkey")
    }

    fn attach_sort(
        &self,
        segment: &mut QuerySegment,
        property: &Property,
        field: SortField,
        ctx: &mut CompileContext,
    ) {
        if !ctx.pending_sorts.remove(&property.key) {
            return;
        }
        let field = match field {
            SortField::Column(column) => segment.column(column),
            SortField::ObjectSortKey => self.join_object(segment),
        };
        trace!(property = %property, segment = segment.id, "attached sort field");
        segment.sort_fields.insert(property.key.clone(), field);
    }
}

/// `column = id` for one id, `column IN (...)` for several.
fn id_filter(column: Expr, ids: &[EntityId]) -> Expr {
    match ids {
        [single] => column.eq(lit_int(*single)),
        _ => column.in_list(ids.iter().map(|&id| lit_int(id)).collect()),
    }
}

fn dedup_in_order(ids: &mut Vec<EntityId>) {
    let mut seen = BTreeSet::new();
    ids.retain(|id| seen.insert(*id));
}

fn compare(left: Expr, comparator: Comparator, operand: Expr) -> Expr {
    match comparator {
        Comparator::Equal => left.eq(operand),
        Comparator::NotEqual => left.ne(operand),
        Comparator::Less => left.lt(operand),
        Comparator::Greater => left.gt(operand),
        Comparator::LessEq => left.lte(operand),
        Comparator::GreaterEq => left.gte(operand),
        Comparator::Like => left.like_escape(operand, '\\'),
        Comparator::NotLike => left.not_like_escape(operand, '\\'),
    }
}

/// Wiki wildcards to a SQL LIKE pattern escaped with `\`.
///
/// `*` matches any run of characters and `?` a single one; literal `%`, `_`
/// and `\` are escaped first.
pub(crate) fn like_pattern(text: &str) -> String {
    let mut pattern = String::with_capacity(text.len() + 2);
    for c in text.chars() {
        match c {
            '\\' | '%' | '_' => {
                pattern.push('\\');
                pattern.push(c);
            }
            '*' => pattern.push('%'),
            '?' => pattern.push('_'),
            c => pattern.push(c),
        }
    }
    pattern
}
