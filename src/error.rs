//! Query diagnostics and the top-level error type.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::cache::CacheError;
use crate::store::StoreError;

/// What went wrong while compiling a description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// Malformed or unsupported description shape.
    Structural,
    /// A concept refers back to itself.
    RecursionDetected,
    /// A hierarchy closure hit its depth bound.
    RecursionLimitExceeded,
    /// A sort key names a property the query never touches.
    UnresolvableSort,
    UnknownProperty,
    QueryTooComplex,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// The affected branch degrades; the query still runs.
    Warning,
    /// The query fails before touching storage.
    Fatal,
}

/// A compilation diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryIssue {
    pub kind: IssueKind,
    pub severity: Severity,
    pub message: String,
}

impl QueryIssue {
    pub fn warning(kind: IssueKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: Severity::Warning,
            message: message.into(),
        }
    }

    pub fn fatal(kind: IssueKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: Severity::Fatal,
            message: message.into(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.severity == Severity::Fatal
    }
}

impl fmt::Display for QueryIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

fn join_issues(issues: &[QueryIssue]) -> String {
    issues
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors that abort a query.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("Query compilation failed: {}", join_issues(.0))]
    Compilation(Vec<QueryIssue>),

    #[error("Storage error: {0}")]
    Resource(#[from] StoreError),

    #[error("Invalid segment graph: {0}")]
    InvalidGraph(String),

    #[error("Identifier cache error: {0}")]
    Cache(CacheError),
}

impl From<CacheError> for QueryError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::Store(e) => QueryError::Resource(e),
            other => QueryError::Cache(other),
        }
    }
}
