//! Storage collaborator.
//!
//! The query pipeline never talks to a database directly. It renders SQL for
//! the dialect a [`Store`] reports, hands statements to [`Store::execute`] /
//! [`Store::query`], and allocates scratch tables through the
//! [`TemporaryTableAllocator`] half of the trait.
//!
//! [`SqliteStore`] is the bundled rusqlite implementation.

pub mod schema;
mod sqlite;

pub use schema::TableNames;
pub use sqlite::SqliteStore;

use crate::sql::Dialect;

/// Errors raised by a storage backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Temporary table {table}: {message}")]
    TemporaryTable { table: String, message: String },

    #[error("Unexpected row shape: {0}")]
    InvalidRow(String),

    #[error("Unsupported storage configuration: {0}")]
    Unsupported(String),

    #[error("Settings error: {0}")]
    Settings(#[from] crate::config::SettingsError),

    #[error("Connection lock poisoned")]
    Poisoned,
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A single cell of a result row.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

/// A result row, addressed by column position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    values: Vec<SqlValue>,
}

impl Row {
    pub fn new(values: Vec<SqlValue>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn cell(&self, idx: usize) -> StoreResult<&SqlValue> {
        self.values
            .get(idx)
            .ok_or_else(|| StoreError::InvalidRow(format!("missing column {}", idx)))
    }

    pub fn get_i64(&self, idx: usize) -> StoreResult<i64> {
        self.get_opt_i64(idx)?
            .ok_or_else(|| StoreError::InvalidRow(format!("column {} is NULL", idx)))
    }

    pub fn get_opt_i64(&self, idx: usize) -> StoreResult<Option<i64>> {
        match self.cell(idx)? {
            SqlValue::Null => Ok(None),
            SqlValue::Integer(n) => Ok(Some(*n)),
            SqlValue::Real(f) if f.fract() == 0.0 => Ok(Some(*f as i64)),
            SqlValue::Text(s) => s
                .parse()
                .map(Some)
                .map_err(|_| StoreError::InvalidRow(format!("column {} is not an integer", idx))),
            other => Err(StoreError::InvalidRow(format!(
                "column {} is not an integer: {:?}",
                idx, other
            ))),
        }
    }

    pub fn get_string(&self, idx: usize) -> StoreResult<String> {
        Ok(self.get_opt_string(idx)?.unwrap_or_default())
    }

    pub fn get_opt_string(&self, idx: usize) -> StoreResult<Option<String>> {
        match self.cell(idx)? {
            SqlValue::Null => Ok(None),
            SqlValue::Text(s) => Ok(Some(s.clone())),
            SqlValue::Integer(n) => Ok(Some(n.to_string())),
            SqlValue::Real(f) => Ok(Some(f.to_string())),
        }
    }
}

/// Creates and drops the scratch id tables used to materialize wide
/// disjunctions.
///
/// Names are chosen by the caller and are unique per materialization.
pub trait TemporaryTableAllocator {
    fn create_temporary_table(&self, name: &str) -> StoreResult<()>;

    fn drop_temporary_table(&self, name: &str) -> StoreResult<()>;
}

/// Relational backend the compiled queries run against.
pub trait Store: TemporaryTableAllocator + Send + Sync {
    /// SQL dialect statements must be rendered in.
    fn dialect(&self) -> Dialect;

    /// Names of the entity and property tables.
    fn tables(&self) -> &TableNames;

    /// Run a statement that returns no rows. Returns the affected row count.
    fn execute(&self, sql: &str) -> StoreResult<usize>;

    /// Run a query and collect every row.
    fn query(&self, sql: &str) -> StoreResult<Vec<Row>>;
}
