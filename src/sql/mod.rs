//! SQL generation module.
//!
//! This module provides a type-safe SQL builder that generates multi-dialect SQL.
//! It includes:
//!
//! - [`query`] - SELECT query builder
//! - [`expr`] - Expression AST and builder DSL
//! - [`ddl`] - Data Definition Language (CREATE TABLE, CREATE INDEX, DROP TABLE)
//! - [`dml`] - Data Manipulation Language (INSERT ... SELECT, UPDATE, DELETE)
//! - [`token`] - Token types for SQL generation
//! - [`dialect`] - SQL dialect implementations

pub mod ddl;
pub mod dialect;
pub mod dml;
pub mod expr;
pub mod query;
pub mod token;
pub mod types;

#[cfg(test)]
pub mod test_utils;

// Re-export commonly used types at the sql module level
pub use dialect::{ConflictStyle, Dialect, SqlDialect};
pub use expr::{
    and_all, col, count_distinct, lit_bool, lit_float, lit_int, lit_null, lit_str, never, or_any,
    table_col, BinaryOperator, Expr, ExprExt, Literal, UnaryOperator,
};
pub use query::{Join, JoinType, LimitOffset, OrderByExpr, Query, SelectExpr, SortDir, TableRef};
pub use token::{Token, TokenStream};

// Re-export DDL types
pub use ddl::{ColumnConstraint, ColumnDef, CreateIndex, CreateTable, DataType, DdlStatement, DropTable};

// Re-export DML types
pub use dml::{Delete, Insert, OnConflict, Update};
