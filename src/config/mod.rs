//! Configuration module for semql.
//!
//! Handles query limits, hierarchy and concept cache tuning, and storage
//! settings loaded from TOML.

mod settings;

pub use settings::{
    expand_env_vars, ConceptSettings, HierarchySettings, QuerySettings, Settings, SettingsError,
    StorageSettings,
};
