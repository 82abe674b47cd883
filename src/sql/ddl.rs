//! DDL (Data Definition Language) support.
//!
//! This module provides types and builders for generating DDL statements
//! (CREATE TABLE, CREATE INDEX, DROP TABLE) across different SQL dialects.
//! The storage schema installer and the temporary id tables of the
//! segment resolver are both expressed through it.
//!
//! # Examples
//!
//! ```ignore
//! use semql::sql::ddl::{CreateTable, ColumnDef, DataType};
//! use semql::sql::Dialect;
//!
//! let table = CreateTable::new("smw_fpt_inst")
//!     .column(ColumnDef::new("s_id", DataType::Int64).not_null())
//!     .column(ColumnDef::new("o_id", DataType::Int64).not_null());
//!
//! println!("{}", table.to_sql(Dialect::Sqlite));
//! ```

use super::dialect::{Dialect, SqlDialect};
use super::token::{Token, TokenStream};

// Re-export DataType from sql::types for DDL generation
pub use super::types::DataType;

/// DDL statement types.
#[derive(Debug, Clone)]
pub enum DdlStatement {
    CreateTable(CreateTable),
    CreateIndex(CreateIndex),
    DropTable(DropTable),
}

impl DdlStatement {
    /// Convert to SQL for the given dialect.
    pub fn to_sql(&self, dialect: Dialect) -> String {
        self.to_tokens(dialect).serialize(dialect)
    }

    /// Convert to token stream.
    pub fn to_tokens(&self, dialect: Dialect) -> TokenStream {
        match self {
            DdlStatement::CreateTable(ct) => ct.to_tokens(dialect),
            DdlStatement::CreateIndex(ci) => ci.to_tokens(dialect),
            DdlStatement::DropTable(dt) => dt.to_tokens(dialect),
        }
    }
}

impl From<CreateTable> for DdlStatement {
    fn from(ct: CreateTable) -> Self {
        DdlStatement::CreateTable(ct)
    }
}

impl From<CreateIndex> for DdlStatement {
    fn from(ci: CreateIndex) -> Self {
        DdlStatement::CreateIndex(ci)
    }
}

impl From<DropTable> for DdlStatement {
    fn from(dt: DropTable) -> Self {
        DdlStatement::DropTable(dt)
    }
}

// ============================================================================
// CREATE TABLE
// ============================================================================

/// CREATE TABLE statement.
#[derive(Debug, Clone)]
#[must_use = "DDL statements have no effect until converted to SQL with to_sql()"]
pub struct CreateTable {
    pub temporary: bool,
    pub if_not_exists: bool,
    pub name: String,
    pub columns: Vec<ColumnDef>,
    pub primary_key: Vec<String>,
}

impl CreateTable {
    /// Create a new CREATE TABLE statement.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            temporary: false,
            if_not_exists: false,
            name: name.into(),
            columns: Vec::new(),
            primary_key: Vec::new(),
        }
    }

    /// The single-column id table used to materialize a disjunction.
    pub fn temporary_id_table(name: impl Into<String>) -> Self {
        Self::new(name)
            .temporary()
            .column(ColumnDef::new("id", DataType::Int64).primary_key())
    }

    /// Make this a session-scoped temporary table.
    pub fn temporary(mut self) -> Self {
        self.temporary = true;
        self
    }

    /// Add IF NOT EXISTS clause.
    pub fn if_not_exists(mut self) -> Self {
        self.if_not_exists = true;
        self
    }

    /// Add a column definition.
    pub fn column(mut self, col: ColumnDef) -> Self {
        self.columns.push(col);
        self
    }

    /// Add multiple column definitions.
    pub fn columns(mut self, cols: impl IntoIterator<Item = ColumnDef>) -> Self {
        self.columns.extend(cols);
        self
    }

    /// Set a composite primary key.
    pub fn primary_key(mut self, columns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.primary_key = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Convert to SQL for the given dialect.
    pub fn to_sql(&self, dialect: Dialect) -> String {
        self.to_tokens(dialect).serialize(dialect)
    }

    /// Convert to token stream.
    pub fn to_tokens(&self, dialect: Dialect) -> TokenStream {
        let mut ts = TokenStream::new();

        ts.push(Token::Create).space();
        if self.temporary {
            ts.push(Token::Temporary).space();
        }
        ts.push(Token::Table);

        // IF NOT EXISTS (dialect-specific)
        if self.if_not_exists && dialect.supports_if_not_exists() {
            ts.space()
                .push(Token::If)
                .space()
                .push(Token::Not)
                .space()
                .push(Token::Exists);
        }

        ts.space().push(Token::Ident(self.name.clone()));

        ts.space().lparen();
        for (i, col) in self.columns.iter().enumerate() {
            if i > 0 {
                ts.comma().space();
            }
            ts.append(&col.to_tokens(dialect));
        }

        if !self.primary_key.is_empty() {
            if !self.columns.is_empty() {
                ts.comma().space();
            }
            ts.push(Token::Primary).space().push(Token::Key).space().lparen();
            for (i, c) in self.primary_key.iter().enumerate() {
                if i > 0 {
                    ts.comma().space();
                }
                ts.push(Token::Ident(c.clone()));
            }
            ts.rparen();
        }
        ts.rparen();

        if self.temporary {
            if let Some(options) = dialect.temporary_table_options() {
                ts.space().push(Token::Raw(options.into()));
            }
        }

        ts
    }
}

// ============================================================================
// Column Definition
// ============================================================================

/// Column definition for CREATE TABLE.
#[derive(Debug, Clone)]
pub struct ColumnDef {
    pub name: String,
    pub data_type: DataType,
    pub nullable: Option<bool>,
    pub constraints: Vec<ColumnConstraint>,
}

impl ColumnDef {
    /// Create a new column definition.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: None,
            constraints: Vec::new(),
        }
    }

    /// Mark column as NOT NULL.
    pub fn not_null(mut self) -> Self {
        self.nullable = Some(false);
        self
    }

    /// Add PRIMARY KEY constraint.
    pub fn primary_key(mut self) -> Self {
        self.constraints.push(ColumnConstraint::PrimaryKey);
        self
    }

    /// Add UNIQUE constraint.
    pub fn unique(mut self) -> Self {
        self.constraints.push(ColumnConstraint::Unique);
        self
    }

    /// Convert to token stream.
    pub fn to_tokens(&self, dialect: Dialect) -> TokenStream {
        let mut ts = TokenStream::new();

        ts.push(Token::Ident(self.name.clone()));

        ts.space()
            .push(Token::Raw(dialect.emit_data_type(&self.data_type)));

        if let Some(nullable) = self.nullable {
            if nullable {
                ts.space().push(Token::Null);
            } else {
                ts.space().push(Token::Not).space().push(Token::Null);
            }
        }

        for constraint in &self.constraints {
            match constraint {
                ColumnConstraint::PrimaryKey => {
                    ts.space().push(Token::Primary).space().push(Token::Key);
                }
                ColumnConstraint::Unique => {
                    ts.space().push(Token::Unique);
                }
            }
        }

        ts
    }
}

/// Column-level constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnConstraint {
    PrimaryKey,
    Unique,
}

// ============================================================================
// CREATE INDEX
// ============================================================================

/// CREATE INDEX statement.
#[derive(Debug, Clone)]
#[must_use = "DDL statements have no effect until converted to SQL with to_sql()"]
pub struct CreateIndex {
    pub name: String,
    pub table: String,
    pub columns: Vec<String>,
    pub unique: bool,
    pub if_not_exists: bool,
}

impl CreateIndex {
    /// Create a new CREATE INDEX statement.
    pub fn new(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            columns: Vec::new(),
            unique: false,
            if_not_exists: false,
        }
    }

    /// Make it a UNIQUE index.
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Add IF NOT EXISTS clause.
    pub fn if_not_exists(mut self) -> Self {
        self.if_not_exists = true;
        self
    }

    /// Add indexed columns.
    pub fn columns(mut self, cols: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.columns.extend(cols.into_iter().map(Into::into));
        self
    }

    /// Convert to SQL for the given dialect.
    pub fn to_sql(&self, dialect: Dialect) -> String {
        self.to_tokens(dialect).serialize(dialect)
    }

    /// Convert to token stream.
    pub fn to_tokens(&self, dialect: Dialect) -> TokenStream {
        let mut ts = TokenStream::new();

        ts.push(Token::Create).space();
        if self.unique {
            ts.push(Token::Unique).space();
        }
        ts.push(Token::Index);

        // MySQL has no IF NOT EXISTS for indexes
        if self.if_not_exists && dialect != Dialect::MySql {
            ts.space()
                .push(Token::If)
                .space()
                .push(Token::Not)
                .space()
                .push(Token::Exists);
        }

        ts.space()
            .push(Token::Ident(self.name.clone()))
            .space()
            .push(Token::On)
            .space()
            .push(Token::Ident(self.table.clone()))
            .space()
            .lparen();
        for (i, c) in self.columns.iter().enumerate() {
            if i > 0 {
                ts.comma().space();
            }
            ts.push(Token::Ident(c.clone()));
        }
        ts.rparen();

        ts
    }
}

// ============================================================================
// DROP TABLE
// ============================================================================

/// DROP TABLE statement.
#[derive(Debug, Clone)]
#[must_use = "DDL statements have no effect until converted to SQL with to_sql()"]
pub struct DropTable {
    pub if_exists: bool,
    pub name: String,
}

impl DropTable {
    /// Create a new DROP TABLE statement.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            if_exists: false,
            name: name.into(),
        }
    }

    /// Add IF EXISTS clause.
    pub fn if_exists(mut self) -> Self {
        self.if_exists = true;
        self
    }

    /// Convert to SQL for the given dialect.
    pub fn to_sql(&self, dialect: Dialect) -> String {
        self.to_tokens(dialect).serialize(dialect)
    }

    /// Convert to token stream.
    pub fn to_tokens(&self, dialect: Dialect) -> TokenStream {
        let mut ts = TokenStream::new();

        ts.push(Token::Drop).space().push(Token::Table);

        if self.if_exists && dialect.supports_if_exists() {
            ts.space().push(Token::If).space().push(Token::Exists);
        }

        ts.space().push(Token::Ident(self.name.clone()));

        ts
    }
}
