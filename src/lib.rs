//! # semql
//!
//! Compiles semantic wiki queries into multi-dialect SQL and runs them.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                 Description (query tree)                 │
//! │  (classes, property values, pages, concepts, and / or)   │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [builder + id / hierarchy caches]
//! ┌─────────────────────────────────────────────────────────┐
//! │                     SegmentGraph                         │
//! │       (one segment per joinable fragment + issues)       │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [resolver]
//! ┌─────────────────────────────────────────────────────────┐
//! │        ResolvedQuery (statement + temporary tables)      │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [engine + store]
//! ┌─────────────────────────────────────────────────────────┐
//! │                      QueryResult                         │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod planner;
pub mod sql;
pub mod store;

/// Re-exports for convenient usage.
pub mod prelude {
    pub use crate::cache::{EntityIdLookup, HierarchyCache, IdCache};
    pub use crate::config::Settings;
    pub use crate::engine::{QueryEngine, QueryResult};
    pub use crate::error::{IssueKind, QueryError, QueryIssue, Severity};
    pub use crate::model::{
        Comparator, DataValue, Description, EntityId, EntityPage, Property, NS_CATEGORY,
        NS_CONCEPT, NS_MAIN, NS_PROPERTY,
    };
    pub use crate::planner::{QueryMode, QueryOptions, SortKey};
    pub use crate::sql::{Dialect, SqlDialect};
    pub use crate::store::{SqliteStore, Store};
}

pub use engine::{QueryEngine, QueryResult};
pub use error::QueryError;
pub use model::{Description, EntityPage};
pub use planner::{QueryMode, QueryOptions};
