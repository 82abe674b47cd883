//! Storage schema: table names and the DDL that installs them.
//!
//! Entities live in one id table. Every fact is a row keyed by subject id
//! (`s_id`) in a table chosen by the kind of its object:
//!
//! ```text
//! smw_object_ids     smw_id, smw_namespace, smw_title, smw_iw, smw_subobject, smw_sortkey
//! smw_fpt_inst       s_id, o_id                 (page is in category)
//! smw_fpt_subc       s_id, o_id                 (category is subcategory of)
//! smw_fpt_subp       s_id, o_id                 (property is subproperty of)
//! smw_fpt_redi       s_title, s_namespace, o_id (redirect source -> target)
//! smw_fpt_conc       s_id, concept_txt, ...     (stored concept descriptions)
//! smw_concept_cache  s_id, o_id                 (materialized concept members)
//! smw_di_wikipage    s_id, p_id, o_id
//! smw_di_number      s_id, p_id, o_serialized, o_sortkey
//! smw_di_blob        s_id, p_id, o_blob, o_hash
//! ```

use serde::{Deserialize, Serialize};

use crate::model::DataValue;
use crate::sql::{ColumnDef, CreateIndex, CreateTable, DataType, DdlStatement};

/// Physical table names used by the compiler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableNames {
    pub ids: String,
    pub instances: String,
    pub subclasses: String,
    pub subproperties: String,
    pub redirects: String,
    pub concepts: String,
    pub concept_cache: String,
    pub page_values: String,
    pub number_values: String,
    pub text_values: String,
}

impl Default for TableNames {
    fn default() -> Self {
        Self {
            ids: "smw_object_ids".into(),
            instances: "smw_fpt_inst".into(),
            subclasses: "smw_fpt_subc".into(),
            subproperties: "smw_fpt_subp".into(),
            redirects: "smw_fpt_redi".into(),
            concepts: "smw_fpt_conc".into(),
            concept_cache: "smw_concept_cache".into(),
            page_values: "smw_di_wikipage".into(),
            number_values: "smw_di_number".into(),
            text_values: "smw_di_blob".into(),
        }
    }
}

impl TableNames {
    /// Property table holding values of the given kind.
    pub fn value_table(&self, value: &DataValue) -> &str {
        match value {
            DataValue::Page(_) => &self.page_values,
            DataValue::Number(_) => &self.number_values,
            DataValue::Text(_) => &self.text_values,
        }
    }

    /// All property value tables.
    pub fn value_tables(&self) -> [&str; 3] {
        [&self.page_values, &self.number_values, &self.text_values]
    }
}

fn id_column(name: &str) -> ColumnDef {
    ColumnDef::new(name, DataType::Int64).not_null()
}

fn pair_table(name: &str) -> CreateTable {
    CreateTable::new(name)
        .if_not_exists()
        .column(id_column("s_id"))
        .column(id_column("o_id"))
}

fn index(table: &str, suffix: &str, columns: &[&str]) -> CreateIndex {
    CreateIndex::new(format!("{}_{}", table, suffix), table)
        .if_not_exists()
        .columns(columns.iter().copied())
}

/// DDL that installs the full schema. Safe to run repeatedly.
pub fn install_statements(tables: &TableNames) -> Vec<DdlStatement> {
    let mut statements: Vec<DdlStatement> = Vec::new();

    statements.push(
        CreateTable::new(&tables.ids)
            .if_not_exists()
            .column(ColumnDef::new("smw_id", DataType::Int64).primary_key())
            .column(ColumnDef::new("smw_namespace", DataType::Int32).not_null())
            .column(ColumnDef::new("smw_title", DataType::Varchar(255)).not_null())
            .column(ColumnDef::new("smw_iw", DataType::Varchar(32)).not_null())
            .column(ColumnDef::new("smw_subobject", DataType::Varchar(255)).not_null())
            .column(ColumnDef::new("smw_sortkey", DataType::Varchar(255)))
            .into(),
    );
    statements.push(
        index(
            &tables.ids,
            "identity",
            &["smw_title", "smw_namespace", "smw_iw", "smw_subobject"],
        )
        .unique()
        .into(),
    );

    for table in [&tables.instances, &tables.subclasses, &tables.subproperties, &tables.concept_cache] {
        statements.push(pair_table(table).primary_key(["s_id", "o_id"]).into());
        statements.push(index(table, "o", &["o_id"]).into());
    }

    statements.push(
        CreateTable::new(&tables.redirects)
            .if_not_exists()
            .column(ColumnDef::new("s_title", DataType::Varchar(255)).not_null())
            .column(ColumnDef::new("s_namespace", DataType::Int32).not_null())
            .column(id_column("o_id"))
            .primary_key(["s_title", "s_namespace"])
            .into(),
    );

    statements.push(
        CreateTable::new(&tables.concepts)
            .if_not_exists()
            .column(ColumnDef::new("s_id", DataType::Int64).primary_key())
            .column(ColumnDef::new("concept_txt", DataType::Text).not_null())
            .column(ColumnDef::new("concept_docu", DataType::Text))
            .column(ColumnDef::new("concept_features", DataType::Int32).not_null())
            .column(ColumnDef::new("concept_size", DataType::Int32).not_null())
            .column(ColumnDef::new("concept_depth", DataType::Int32).not_null())
            .column(ColumnDef::new("cache_date", DataType::Int64))
            .column(ColumnDef::new("cache_count", DataType::Int64))
            .into(),
    );

    statements.push(
        CreateTable::new(&tables.page_values)
            .if_not_exists()
            .column(id_column("s_id"))
            .column(id_column("p_id"))
            .column(id_column("o_id"))
            .into(),
    );
    statements.push(
        CreateTable::new(&tables.number_values)
            .if_not_exists()
            .column(id_column("s_id"))
            .column(id_column("p_id"))
            .column(ColumnDef::new("o_serialized", DataType::Varchar(255)).not_null())
            .column(ColumnDef::new("o_sortkey", DataType::Float64).not_null())
            .into(),
    );
    statements.push(
        CreateTable::new(&tables.text_values)
            .if_not_exists()
            .column(id_column("s_id"))
            .column(id_column("p_id"))
            .column(ColumnDef::new("o_blob", DataType::Text).not_null())
            .column(ColumnDef::new("o_hash", DataType::Varchar(64)).not_null())
            .into(),
    );
    for table in tables.value_tables() {
        statements.push(index(table, "sp", &["s_id", "p_id"]).into());
        statements.push(index(table, "p", &["p_id"]).into());
    }

    statements
}
