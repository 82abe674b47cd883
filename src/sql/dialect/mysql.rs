//! MySQL SQL dialect.
//!
//! MySQL differences from ANSI:
//! - Backtick identifier quoting (`` `name` ``)
//! - Boolean is TINYINT(1), returns 1/0
//! - Backslash escapes inside string literals
//! - No NULLS FIRST/LAST
//! - `INSERT IGNORE` for duplicate suppression
//! - Temporary id tables live in the MEMORY engine

use super::helpers;
use super::{ConflictStyle, SqlDialect};
use crate::sql::types::DataType;

/// MySQL SQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct MySql;

impl SqlDialect for MySql {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_backtick(ident)
    }

    fn quote_string(&self, s: &str) -> String {
        helpers::quote_string_mysql(s)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_numeric(b)
    }

    fn supports_nulls_ordering(&self) -> bool {
        false
    }

    fn emit_data_type(&self, dt: &DataType) -> String {
        helpers::emit_data_type_mysql(dt)
    }

    fn temporary_table_options(&self) -> Option<&'static str> {
        Some("ENGINE=MEMORY")
    }

    fn conflict_style(&self) -> ConflictStyle {
        ConflictStyle::Ignore
    }
}
