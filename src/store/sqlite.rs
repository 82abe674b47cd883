//! rusqlite-backed [`Store`].

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::types::ValueRef;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, trace};

use super::schema::{install_statements, TableNames};
use super::{Row, SqlValue, Store, StoreError, StoreResult, TemporaryTableAllocator};
use crate::cache::compute_hash;
use crate::config::StorageSettings;
use crate::model::{DataValue, Description, EntityId, EntityPage, Property, REDIRECT_MARKER};
use crate::sql::{CreateTable, Dialect, DropTable};

/// SQLite store with the full schema installed.
///
/// The connection sits behind a mutex so the store can be shared between
/// threads; every call holds the lock for one statement.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    tables: TableNames,
}

impl SqliteStore {
    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    /// Open or create a database file.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        Self::with_connection(Connection::open(path)?)
    }

    /// Open the database described by the storage settings.
    pub fn from_settings(settings: &StorageSettings) -> StoreResult<Self> {
        if settings.dialect != Dialect::Sqlite {
            return Err(StoreError::Unsupported(format!(
                "SqliteStore cannot serve the {} dialect",
                settings.dialect
            )));
        }
        match settings.resolved_path()? {
            Some(path) => Self::open(path),
            None => Self::open_in_memory(),
        }
    }

    fn with_connection(conn: Connection) -> StoreResult<Self> {
        let store = Self {
            conn: Mutex::new(conn),
            tables: TableNames::default(),
        };
        store.init()?;
        Ok(store)
    }

    /// Install the schema if it is missing.
    fn init(&self) -> StoreResult<()> {
        let ddl = install_statements(&self.tables)
            .iter()
            .map(|stmt| stmt.to_sql(Dialect::Sqlite))
            .collect::<Vec<_>>()
            .join(";\n");
        self.conn()?.execute_batch(&ddl)?;
        debug!(tables = ?self.tables, "installed sqlite schema");
        Ok(())
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    // ===== Fixture writers =====

    /// Insert an entity, or return the id it already has.
    pub fn create_entity(&self, page: &EntityPage) -> StoreResult<EntityId> {
        let conn = self.conn()?;
        let t = &self.tables;
        let existing: Option<EntityId> = conn
            .query_row(
                &format!(
                    "SELECT smw_id FROM {} WHERE smw_title = ? AND smw_namespace = ? AND smw_iw = ? AND smw_subobject = ?",
                    t.ids
                ),
                params![page.title, page.namespace, page.interwiki, page.subobject],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(id) = existing {
            return Ok(id);
        }

        let sort_key = page
            .sort_key
            .clone()
            .unwrap_or_else(|| page.default_sort_key());
        conn.execute(
            &format!(
                "INSERT INTO {} (smw_namespace, smw_title, smw_iw, smw_subobject, smw_sortkey) VALUES (?, ?, ?, ?, ?)",
                t.ids
            ),
            params![page.namespace, page.title, page.interwiki, page.subobject, sort_key],
        )?;
        let id = conn.last_insert_rowid();
        trace!(%page, id, "created entity");
        Ok(id)
    }

    /// Put a page into a category.
    pub fn add_instance(&self, page: &EntityPage, category: &EntityPage) -> StoreResult<()> {
        let s_id = self.create_entity(page)?;
        let o_id = self.create_entity(category)?;
        self.insert_pair(&self.tables.instances, s_id, o_id)
    }

    /// Declare `child` a subcategory of `parent`.
    pub fn add_subclass(&self, child: &EntityPage, parent: &EntityPage) -> StoreResult<()> {
        let s_id = self.create_entity(child)?;
        let o_id = self.create_entity(parent)?;
        self.insert_pair(&self.tables.subclasses, s_id, o_id)
    }

    /// Declare `child` a subproperty of `parent`.
    pub fn add_subproperty(&self, child: &Property, parent: &Property) -> StoreResult<()> {
        let s_id = self.create_entity(&child.entity())?;
        let o_id = self.create_entity(&parent.entity())?;
        self.insert_pair(&self.tables.subproperties, s_id, o_id)
    }

    fn insert_pair(&self, table: &str, s_id: EntityId, o_id: EntityId) -> StoreResult<()> {
        self.conn()?.execute(
            &format!("INSERT OR IGNORE INTO {} (s_id, o_id) VALUES (?, ?)", table),
            params![s_id, o_id],
        )?;
        Ok(())
    }

    /// Record a property value of a page.
    pub fn add_property_value(
        &self,
        page: &EntityPage,
        property: &Property,
        value: &DataValue,
    ) -> StoreResult<()> {
        let s_id = self.create_entity(page)?;
        let p_id = self.create_entity(&property.entity())?;
        let t = &self.tables;
        match value {
            DataValue::Page(object) => {
                let o_id = self.create_entity(object)?;
                self.conn()?.execute(
                    &format!("INSERT INTO {} (s_id, p_id, o_id) VALUES (?, ?, ?)", t.page_values),
                    params![s_id, p_id, o_id],
                )?;
            }
            DataValue::Number(n) => {
                self.conn()?.execute(
                    &format!(
                        "INSERT INTO {} (s_id, p_id, o_serialized, o_sortkey) VALUES (?, ?, ?, ?)",
                        t.number_values
                    ),
                    params![s_id, p_id, n.to_string(), n],
                )?;
            }
            DataValue::Text(s) => {
                let hash = compute_hash(&serde_json::Value::String(s.clone()));
                self.conn()?.execute(
                    &format!(
                        "INSERT INTO {} (s_id, p_id, o_blob, o_hash) VALUES (?, ?, ?, ?)",
                        t.text_values
                    ),
                    params![s_id, p_id, s, hash],
                )?;
            }
        }
        Ok(())
    }

    /// Store (or replace) the description of a concept.
    ///
    /// Replacing a description clears any materialized members.
    pub fn store_concept(
        &self,
        concept: &EntityPage,
        description: &Description,
    ) -> StoreResult<EntityId> {
        let id = self.create_entity(concept)?;
        let text = serde_json::to_string(description)?;
        let t = &self.tables;
        let conn = self.conn()?;
        conn.execute(
            &format!(
                "INSERT OR REPLACE INTO {} (s_id, concept_txt, concept_docu, concept_features, concept_size, concept_depth, cache_date, cache_count) VALUES (?, ?, NULL, ?, ?, ?, NULL, NULL)",
                t.concepts
            ),
            params![
                id,
                text,
                description.query_features().bits(),
                description.size() as i64,
                description.depth() as i64
            ],
        )?;
        conn.execute(
            &format!("DELETE FROM {} WHERE o_id = ?", t.concept_cache),
            params![id],
        )?;
        Ok(id)
    }

    /// Turn `source` into a redirect to `target`.
    ///
    /// The source entity is stored with the redirect interwiki marker.
    pub fn create_redirect(
        &self,
        source: &EntityPage,
        target: &EntityPage,
    ) -> StoreResult<EntityId> {
        let target_id = self.create_entity(target)?;
        let source_id =
            self.create_entity(&source.key().with_interwiki(REDIRECT_MARKER))?;
        self.conn()?.execute(
            &format!(
                "INSERT OR REPLACE INTO {} (s_title, s_namespace, o_id) VALUES (?, ?, ?)",
                self.tables.redirects
            ),
            params![source.title, source.namespace, target_id],
        )?;
        Ok(source_id)
    }
}

impl TemporaryTableAllocator for SqliteStore {
    fn create_temporary_table(&self, name: &str) -> StoreResult<()> {
        let sql = CreateTable::temporary_id_table(name).to_sql(Dialect::Sqlite);
        self.conn()?
            .execute_batch(&sql)
            .map_err(|e| StoreError::TemporaryTable {
                table: name.into(),
                message: e.to_string(),
            })
    }

    fn drop_temporary_table(&self, name: &str) -> StoreResult<()> {
        let sql = DropTable::new(name).if_exists().to_sql(Dialect::Sqlite);
        self.conn()?
            .execute_batch(&sql)
            .map_err(|e| StoreError::TemporaryTable {
                table: name.into(),
                message: e.to_string(),
            })
    }
}

impl Store for SqliteStore {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn tables(&self) -> &TableNames {
        &self.tables
    }

    fn execute(&self, sql: &str) -> StoreResult<usize> {
        trace!(sql, "execute");
        Ok(self.conn()?.execute(sql, [])?)
    }

    fn query(&self, sql: &str) -> StoreResult<Vec<Row>> {
        trace!(sql, "query");
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql)?;
        let width = stmt.column_count();
        let rows = stmt
            .query_map([], |row| {
                (0..width)
                    .map(|i| {
                        row.get_ref(i).map(|v| match v {
                            ValueRef::Null => SqlValue::Null,
                            ValueRef::Integer(n) => SqlValue::Integer(n),
                            ValueRef::Real(f) => SqlValue::Real(f),
                            ValueRef::Text(t) | ValueRef::Blob(t) => {
                                SqlValue::Text(String::from_utf8_lossy(t).into_owned())
                            }
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()
                    .map(Row::new)
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
