//! SQLite SQL dialect.
//!
//! SQLite differences from ANSI:
//! - Type affinities instead of strict types
//! - Booleans are integers (1/0)
//! - `INSERT OR IGNORE` for duplicate suppression
//! - NULLS FIRST/LAST since 3.30

use super::helpers;
use super::{ConflictStyle, SqlDialect};
use crate::sql::types::DataType;

/// SQLite SQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct Sqlite;

impl SqlDialect for Sqlite {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_double(ident)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_numeric(b)
    }

    fn emit_data_type(&self, dt: &DataType) -> String {
        helpers::emit_data_type_sqlite(dt)
    }

    fn conflict_style(&self) -> ConflictStyle {
        ConflictStyle::OrIgnore
    }
}
