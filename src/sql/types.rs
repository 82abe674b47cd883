//! SQL-level column types for DDL generation.
//!
//! Only the types the storage schema and temporary id tables need.

use std::fmt;

/// SQL-level data type for DDL generation.
///
/// Rendered per dialect through `SqlDialect::emit_data_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    /// 32-bit signed integer (INT/INTEGER).
    Int32,

    /// 64-bit signed integer (BIGINT). Entity ids use this.
    Int64,

    /// 64-bit floating point. Numeric property values use this.
    Float64,

    /// Unbounded text.
    Text,

    /// Variable-length character string with maximum length.
    Varchar(u16),
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Int32 => write!(f, "int32"),
            DataType::Int64 => write!(f, "int64"),
            DataType::Float64 => write!(f, "float64"),
            DataType::Text => write!(f, "text"),
            DataType::Varchar(n) => write!(f, "varchar({})", n),
        }
    }
}
