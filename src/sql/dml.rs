//! DML (Data Manipulation Language) support.
//!
//! This module provides types and builders for generating DML statements
//! (INSERT ... SELECT, UPDATE, DELETE) across different SQL dialects.
//!
//! # Examples
//!
//! ```ignore
//! use semql::sql::dml::{Insert, Update, Delete};
//! use semql::sql::expr::{col, lit_int};
//!
//! // INSERT ... SELECT, skipping ids already present
//! let insert = Insert::into("smw_tmp_1")
//!     .columns(["id"])
//!     .from_select(query)
//!     .ignore_duplicates();
//!
//! // UPDATE
//! let update = Update::table("smw_fpt_conc")
//!     .set("cache_count", lit_int(3))
//!     .filter(col("s_id").eq(lit_int(1)));
//!
//! // DELETE
//! let delete = Delete::from("smw_concept_cache")
//!     .filter(col("o_id").eq(lit_int(1)));
//! ```

use super::dialect::{ConflictStyle, Dialect, SqlDialect};
use super::expr::{Expr, ExprExt};
use super::query::Query;
use super::token::{Token, TokenStream};

// ============================================================================
// INSERT
// ============================================================================

/// INSERT ... SELECT statement.
#[derive(Debug, Clone, PartialEq)]
#[must_use = "DML statements have no effect until converted to SQL with to_sql()"]
pub struct Insert {
    pub table: String,
    pub columns: Vec<String>,
    pub from_query: Option<Box<Query>>,
    pub on_conflict: Option<OnConflict>,
}

impl Insert {
    /// Create a new INSERT statement.
    pub fn into(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: Vec::new(),
            from_query: None,
            on_conflict: None,
        }
    }

    /// Set target columns.
    pub fn columns(mut self, cols: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.columns = cols.into_iter().map(|c| c.into()).collect();
        self
    }

    /// Insert the rows produced by a SELECT.
    pub fn from_select(mut self, query: Query) -> Self {
        self.from_query = Some(Box::new(query));
        self
    }

    /// Add ON CONFLICT clause.
    pub fn on_conflict(mut self, conflict: OnConflict) -> Self {
        self.on_conflict = Some(conflict);
        self
    }

    /// Skip rows whose key already exists.
    pub fn ignore_duplicates(self) -> Self {
        self.on_conflict(OnConflict::DoNothing)
    }

    /// Convert to SQL for the given dialect.
    pub fn to_sql(&self, dialect: Dialect) -> String {
        self.to_tokens(dialect).serialize(dialect)
    }

    /// Convert to token stream.
    pub fn to_tokens(&self, dialect: Dialect) -> TokenStream {
        let mut ts = TokenStream::new();
        let style = self.on_conflict.map(|_| dialect.conflict_style());

        // INSERT [OR IGNORE | IGNORE] INTO
        ts.push(Token::Insert).space();
        match style {
            Some(ConflictStyle::OrIgnore) => {
                ts.push(Token::Or).space().push(Token::Ignore).space();
            }
            Some(ConflictStyle::Ignore) => {
                ts.push(Token::Ignore).space();
            }
            Some(ConflictStyle::OnConflictDoNothing) | None => {}
        }
        ts.push(Token::Into).space();
        ts.push(Token::Ident(self.table.clone()));

        // Columns
        if !self.columns.is_empty() {
            ts.space().lparen();
            for (i, col) in self.columns.iter().enumerate() {
                if i > 0 {
                    ts.comma().space();
                }
                ts.push(Token::Ident(col.clone()));
            }
            ts.rparen();
        }

        if let Some(ref query) = self.from_query {
            ts.space().append(&query.to_tokens_for_dialect(dialect));
        }

        // ON CONFLICT (PostgreSQL)
        if let (Some(conflict), Some(ConflictStyle::OnConflictDoNothing)) =
            (self.on_conflict, style)
        {
            ts.space().append(&conflict.to_tokens(dialect));
        }

        ts
    }
}

/// Conflict handling for INSERT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnConflict {
    /// Drop conflicting rows silently.
    DoNothing,
}

impl OnConflict {
    /// Convert to token stream.
    pub fn to_tokens(&self, _dialect: Dialect) -> TokenStream {
        let mut ts = TokenStream::new();
        match self {
            OnConflict::DoNothing => {
                ts.push(Token::On)
                    .space()
                    .push(Token::Conflict)
                    .space()
                    .push(Token::Do)
                    .space()
                    .push(Token::Nothing);
            }
        }
        ts
    }
}

// ============================================================================
// UPDATE
// ============================================================================

/// UPDATE statement.
#[derive(Debug, Clone)]
#[must_use = "DML statements have no effect until converted to SQL with to_sql()"]
pub struct Update {
    pub table: String,
    pub set: Vec<(String, Expr)>,
    pub filter: Option<Expr>,
}

impl Update {
    /// Create a new UPDATE statement.
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            set: Vec::new(),
            filter: None,
        }
    }

    /// Add a SET column = value.
    pub fn set(mut self, column: impl Into<String>, value: impl Into<Expr>) -> Self {
        self.set.push((column.into(), value.into()));
        self
    }

    /// Add WHERE clause (ANDed with existing conditions).
    pub fn filter(mut self, expr: Expr) -> Self {
        self.filter = Some(match self.filter {
            Some(existing) => existing.and(expr),
            None => expr,
        });
        self
    }

    /// Convert to SQL for the given dialect.
    pub fn to_sql(&self, dialect: Dialect) -> String {
        self.to_tokens(dialect).serialize(dialect)
    }

    /// Convert to token stream.
    pub fn to_tokens(&self, dialect: Dialect) -> TokenStream {
        let mut ts = TokenStream::new();

        ts.push(Token::Update)
            .space()
            .push(Token::Ident(self.table.clone()));

        ts.space().push(Token::Set).space();
        for (i, (col, expr)) in self.set.iter().enumerate() {
            if i > 0 {
                ts.comma().space();
            }
            ts.push(Token::Ident(col.clone()))
                .space()
                .push(Token::Eq)
                .space()
                .append(&expr.to_tokens_for_dialect(dialect));
        }

        if let Some(ref filter) = self.filter {
            ts.space()
                .push(Token::Where)
                .space()
                .append(&filter.to_tokens_for_dialect(dialect));
        }

        ts
    }
}

// ============================================================================
// DELETE
// ============================================================================

/// DELETE statement.
#[derive(Debug, Clone)]
#[must_use = "DML statements have no effect until converted to SQL with to_sql()"]
pub struct Delete {
    pub table: String,
    pub filter: Option<Expr>,
}

impl Delete {
    /// Create a new DELETE statement.
    pub fn from(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            filter: None,
        }
    }

    /// Add WHERE clause (ANDed with existing conditions).
    pub fn filter(mut self, expr: Expr) -> Self {
        self.filter = Some(match self.filter {
            Some(existing) => existing.and(expr),
            None => expr,
        });
        self
    }

    /// Convert to SQL for the given dialect.
    pub fn to_sql(&self, dialect: Dialect) -> String {
        self.to_tokens(dialect).serialize(dialect)
    }

    /// Convert to token stream.
    pub fn to_tokens(&self, dialect: Dialect) -> TokenStream {
        let mut ts = TokenStream::new();

        ts.push(Token::Delete)
            .space()
            .push(Token::From)
            .space()
            .push(Token::Ident(self.table.clone()));

        if let Some(ref filter) = self.filter {
            ts.space()
                .push(Token::Where)
                .space()
                .append(&filter.to_tokens_for_dialect(dialect));
        }

        ts
    }
}
