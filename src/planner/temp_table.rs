//! Scratch id tables for wide disjunctions.
//!
//! The resolver only describes a [`Materialization`]; creating and filling
//! the table is the job of whoever executes the query, inside a
//! [`TemporaryTableScope`] that drops every table it created when it goes
//! out of scope, on success and on error alike.

use tracing::{debug, warn};
use uuid::Uuid;

use crate::sql::{CreateTable, Dialect, Insert};
use crate::store::{Store, StoreResult};

/// A temporary id table and the statements that fill it.
#[derive(Debug, Clone, PartialEq)]
pub struct Materialization {
    pub table: String,
    pub populate: Vec<Insert>,
}

impl Materialization {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            populate: Vec::new(),
        }
    }

    /// A fresh, collision-free table name.
    pub fn new_table_name() -> String {
        format!("smw_tmp_{}", Uuid::new_v4().simple())
    }

    /// CREATE followed by the INSERTs, for debug output.
    pub fn to_sql(&self, dialect: Dialect) -> Vec<String> {
        std::iter::once(CreateTable::temporary_id_table(&self.table).to_sql(dialect))
            .chain(self.populate.iter().map(|insert| insert.to_sql(dialect)))
            .collect()
    }
}

/// Owns the temporary tables of one query execution.
pub struct TemporaryTableScope<'a> {
    store: &'a dyn Store,
    created: Vec<String>,
}

impl<'a> TemporaryTableScope<'a> {
    pub fn new(store: &'a dyn Store) -> Self {
        Self {
            store,
            created: Vec::new(),
        }
    }

    /// Create an empty id table owned by this scope.
    pub fn create(&mut self, table: &str) -> StoreResult<()> {
        self.store.create_temporary_table(table)?;
        self.created.push(table.to_string());
        Ok(())
    }

    /// Create and fill a table. Returns the number of inserted rows.
    pub fn materialize(&mut self, materialization: &Materialization) -> StoreResult<usize> {
        self.create(&materialization.table)?;
        let dialect = self.store.dialect();
        let mut inserted = 0;
        for insert in &materialization.populate {
            inserted += self.store.execute(&insert.to_sql(dialect))?;
        }
        debug!(table = %materialization.table, rows = inserted, "materialized temporary table");
        Ok(inserted)
    }

    pub fn tables(&self) -> &[String] {
        &self.created
    }
}

impl Drop for TemporaryTableScope<'_> {
    fn drop(&mut self) {
        while let Some(table) = self.created.pop() {
            if let Err(e) = self.store.drop_temporary_table(&table) {
                warn!(%table, error = %e, "failed to drop temporary table");
            }
        }
    }
}
