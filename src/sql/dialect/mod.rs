//! SQL Dialect definitions and formatting rules.
//!
//! This module provides a trait-based abstraction for SQL dialect differences.
//! Each dialect implements `SqlDialect` to handle its specific syntax:
//!
//! - Identifier quoting: `"` (SQLite/PG), `` ` `` (MySQL)
//! - Boolean literals: true/false vs 1/0
//! - Temporary id tables: plain `TEMPORARY` vs `ENGINE=MEMORY`
//! - Duplicate suppression on `INSERT ... SELECT`: `OR IGNORE`, `IGNORE`,
//!   `ON CONFLICT DO NOTHING`
//!
//! # Usage
//!
//! ```ignore
//! use semql::sql::dialect::{Dialect, SqlDialect};
//!
//! let dialect = Dialect::Postgres;
//! let quoted = dialect.quote_identifier("smw_id");  // "smw_id"
//! ```

pub mod helpers;
mod mysql;
mod postgres;
mod sqlite;

pub use mysql::MySql;
pub use postgres::Postgres;
pub use sqlite::Sqlite;

use serde::{Deserialize, Serialize};

use super::token::TokenStream;
use super::types::DataType;

/// How a dialect spells "insert, but skip rows that violate a key".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictStyle {
    /// `INSERT OR IGNORE INTO ...` (SQLite)
    OrIgnore,
    /// `INSERT IGNORE INTO ...` (MySQL)
    Ignore,
    /// `INSERT INTO ... ON CONFLICT DO NOTHING` (PostgreSQL)
    OnConflictDoNothing,
}

/// SQL dialect trait - defines how SQL constructs are rendered.
///
/// Implementations handle dialect-specific syntax differences.
/// The default implementations follow ANSI SQL where possible.
pub trait SqlDialect: std::fmt::Debug {
    /// Dialect name for display/logging.
    fn name(&self) -> &'static str;

    // =========================================================================
    // Identifier and Literal Quoting
    // =========================================================================

    /// Quote an identifier (table, column, alias).
    fn quote_identifier(&self, ident: &str) -> String;

    /// Quote a string literal.
    ///
    /// All supported dialects use single quotes with `''` for escaping.
    fn quote_string(&self, s: &str) -> String {
        helpers::quote_string_single(s)
    }

    /// Format a boolean literal.
    fn format_bool(&self, b: bool) -> &'static str;

    // =========================================================================
    // Pagination
    // =========================================================================

    /// Emit LIMIT/OFFSET pagination clause.
    fn emit_limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> TokenStream {
        helpers::emit_limit_offset_standard(limit, offset)
    }

    /// Whether this dialect supports NULLS FIRST/LAST in ORDER BY.
    fn supports_nulls_ordering(&self) -> bool {
        true
    }

    // =========================================================================
    // DDL Support
    // =========================================================================

    /// Emit a column type for this dialect.
    fn emit_data_type(&self, dt: &DataType) -> String {
        helpers::emit_data_type_standard(dt)
    }

    /// Whether this dialect supports IF NOT EXISTS for CREATE statements.
    fn supports_if_not_exists(&self) -> bool {
        true
    }

    /// Whether this dialect supports IF EXISTS for DROP statements.
    fn supports_if_exists(&self) -> bool {
        true
    }

    /// Table options appended after the column list of a temporary table.
    ///
    /// MySQL keeps temporary id tables in the MEMORY engine.
    fn temporary_table_options(&self) -> Option<&'static str> {
        None
    }

    // =========================================================================
    // DML Support
    // =========================================================================

    /// Duplicate suppression used by materialization inserts.
    fn conflict_style(&self) -> ConflictStyle {
        ConflictStyle::OnConflictDoNothing
    }
}

/// Supported SQL dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    Sqlite,
    Postgres,
    #[serde(rename = "mysql")]
    MySql,
}

impl Dialect {
    /// Get the dialect implementation.
    pub fn dialect(&self) -> &'static dyn SqlDialect {
        match self {
            Dialect::Sqlite => &Sqlite,
            Dialect::Postgres => &Postgres,
            Dialect::MySql => &MySql,
        }
    }
}

// Implement SqlDialect for Dialect enum by delegating to concrete types
impl SqlDialect for Dialect {
    fn name(&self) -> &'static str {
        self.dialect().name()
    }

    fn quote_identifier(&self, ident: &str) -> String {
        self.dialect().quote_identifier(ident)
    }

    fn quote_string(&self, s: &str) -> String {
        self.dialect().quote_string(s)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        self.dialect().format_bool(b)
    }

    fn emit_limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> TokenStream {
        self.dialect().emit_limit_offset(limit, offset)
    }

    fn supports_nulls_ordering(&self) -> bool {
        self.dialect().supports_nulls_ordering()
    }

    fn emit_data_type(&self, dt: &DataType) -> String {
        self.dialect().emit_data_type(dt)
    }

    fn supports_if_not_exists(&self) -> bool {
        self.dialect().supports_if_not_exists()
    }

    fn supports_if_exists(&self) -> bool {
        self.dialect().supports_if_exists()
    }

    fn temporary_table_options(&self) -> Option<&'static str> {
        self.dialect().temporary_table_options()
    }

    fn conflict_style(&self) -> ConflictStyle {
        self.dialect().conflict_style()
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.dialect().name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dialect_display() {
        assert_eq!(Dialect::Sqlite.to_string(), "sqlite");
        assert_eq!(Dialect::Postgres.to_string(), "postgres");
        assert_eq!(Dialect::MySql.to_string(), "mysql");
    }

    #[test]
    fn test_quote_identifier() {
        assert_eq!(Dialect::Sqlite.quote_identifier("smw_id"), "\"smw_id\"");
        assert_eq!(Dialect::Postgres.quote_identifier("smw_id"), "\"smw_id\"");
        assert_eq!(Dialect::MySql.quote_identifier("smw_id"), "`smw_id`");
    }

    #[test]
    fn test_quote_identifier_escaping() {
        assert_eq!(
            Dialect::Sqlite.quote_identifier("weird\"name"),
            "\"weird\"\"name\""
        );
        assert_eq!(
            Dialect::MySql.quote_identifier("weird`name"),
            "`weird``name`"
        );
    }

    #[test]
    fn test_format_bool() {
        assert_eq!(Dialect::Sqlite.format_bool(true), "1");
        assert_eq!(Dialect::Postgres.format_bool(false), "false");
        assert_eq!(Dialect::MySql.format_bool(false), "0");
    }

    #[test]
    fn test_conflict_style() {
        assert_eq!(Dialect::Sqlite.conflict_style(), ConflictStyle::OrIgnore);
        assert_eq!(Dialect::MySql.conflict_style(), ConflictStyle::Ignore);
        assert_eq!(
            Dialect::Postgres.conflict_style(),
            ConflictStyle::OnConflictDoNothing
        );
    }

    #[test]
    fn test_temporary_table_options() {
        assert_eq!(Dialect::MySql.temporary_table_options(), Some("ENGINE=MEMORY"));
        assert_eq!(Dialect::Sqlite.temporary_table_options(), None);
        assert_eq!(Dialect::Postgres.temporary_table_options(), None);
    }

    #[test]
    fn test_dialect_deserialize() {
        #[derive(Deserialize)]
        struct Wrapper {
            dialect: Dialect,
        }
        let w: Wrapper = toml::from_str("dialect = \"mysql\"").unwrap();
        assert_eq!(w.dialect, Dialect::MySql);
        let w: Wrapper = toml::from_str("dialect = \"postgres\"").unwrap();
        assert_eq!(w.dialect, Dialect::Postgres);
    }
}
