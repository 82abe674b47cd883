//! TOML-based configuration for semql.
//!
//! Supports a config file (semql.toml) with environment variable expansion.
//!
//! Example configuration:
//! ```toml
//! [query]
//! max_limit = 500
//! default_limit = 50
//! max_depth = 4
//! max_size = 64
//! max_disjunction_arity = 20
//! subcategory_hierarchy = true
//! subproperty_hierarchy = true
//!
//! [hierarchy]
//! max_depth = 10
//!
//! [concept]
//! cache_max_size = 10000
//! cache_lifetime_seconds = 86400
//!
//! [storage]
//! dialect = "sqlite"
//! path = "${SEMQL_DB}"
//! ```

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::sql::Dialect;

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Query compilation limits.
    pub query: QuerySettings,

    /// Subclass / subproperty closure.
    pub hierarchy: HierarchySettings,

    /// Concept cache.
    pub concept: ConceptSettings,

    /// Storage backend.
    pub storage: StorageSettings,
}

/// Query compilation and pagination limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct QuerySettings {
    /// Upper bound applied to every requested limit.
    pub max_limit: u64,

    /// Limit used when a query does not ask for one.
    pub default_limit: u64,

    /// Maximum nesting depth of a description.
    pub max_depth: usize,

    /// Maximum number of description nodes.
    pub max_size: usize,

    /// Disjunctions with more branches than this are materialized into a
    /// temporary table instead of being inlined.
    pub max_disjunction_arity: usize,

    /// Expand class restrictions with their subclasses.
    pub subcategory_hierarchy: bool,

    /// Expand property restrictions with their subproperties.
    pub subproperty_hierarchy: bool,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            max_limit: 500,
            default_limit: 50,
            max_depth: 4,
            max_size: 64,
            max_disjunction_arity: 20,
            subcategory_hierarchy: true,
            subproperty_hierarchy: true,
        }
    }
}

/// Hierarchy closure settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HierarchySettings {
    /// Levels below the root expanded when a description sets no depth.
    pub max_depth: usize,
}

impl Default for HierarchySettings {
    fn default() -> Self {
        Self { max_depth: 10 }
    }
}

/// Concept cache settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConceptSettings {
    /// Maximum number of members materialized per concept.
    pub cache_max_size: u64,

    /// Seconds a materialized concept stays usable.
    pub cache_lifetime_seconds: u64,
}

impl Default for ConceptSettings {
    fn default() -> Self {
        Self {
            cache_max_size: 10_000,
            cache_lifetime_seconds: 86_400,
        }
    }
}

/// Storage backend settings.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageSettings {
    /// SQL dialect of the backend.
    pub dialect: Dialect,

    /// Database file (supports ${ENV_VAR} expansion). In-memory when unset.
    pub path: Option<String>,
}

impl StorageSettings {
    /// Get the database path with environment variables expanded.
    pub fn resolved_path(&self) -> Result<Option<PathBuf>, SettingsError> {
        self.path
            .as_deref()
            .map(|p| expand_env_vars(p).map(PathBuf::from))
            .transpose()
    }
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate settings from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, SettingsError> {
        let settings: Settings = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from the default config file locations.
    ///
    /// Searches in order:
    /// 1. Environment variable `SEMQL_CONFIG`
    /// 2. `./semql.toml`
    pub fn load() -> Result<Self, SettingsError> {
        if let Ok(path) = env::var("SEMQL_CONFIG") {
            return Self::from_file(&path);
        }

        let local_config = PathBuf::from("semql.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        // Return defaults if no config file found
        Ok(Settings::default())
    }

    /// Reject combinations the compiler cannot honor.
    pub fn validate(&self) -> Result<(), SettingsError> {
        let q = &self.query;
        if q.max_limit == 0 {
            return Err(SettingsError::InvalidConfig(
                "query.max_limit must be positive".into(),
            ));
        }
        if q.default_limit > q.max_limit {
            return Err(SettingsError::InvalidConfig(format!(
                "query.default_limit ({}) exceeds query.max_limit ({})",
                q.default_limit, q.max_limit
            )));
        }
        if q.max_depth == 0 || q.max_size == 0 {
            return Err(SettingsError::InvalidConfig(
                "query.max_depth and query.max_size must be positive".into(),
            ));
        }
        if q.max_disjunction_arity == 0 {
            return Err(SettingsError::InvalidConfig(
                "query.max_disjunction_arity must be at least 1".into(),
            ));
        }
        if self.concept.cache_max_size == 0 {
            return Err(SettingsError::InvalidConfig(
                "concept.cache_max_size must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Expand environment variables in a string.
///
/// Supports `${VAR}` and `$VAR` syntax.
pub fn expand_env_vars(s: &str) -> Result<String, SettingsError> {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            result.push(c);
            continue;
        }

        let mut var_name = String::new();
        if chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            for ch in chars.by_ref() {
                if ch == '}' {
                    break;
                }
                var_name.push(ch);
            }
        } else {
            // $VAR (ends at non-alphanumeric/underscore)
            while let Some(&ch) = chars.peek() {
                if ch.is_alphanumeric() || ch == '_' {
                    var_name.push(ch);
                    chars.next();
                } else {
                    break;
                }
            }
            if var_name.is_empty() {
                // Just a lone $, keep it
                result.push('$');
                continue;
            }
        }

        let value =
            env::var(&var_name).map_err(|_| SettingsError::MissingEnvVar(var_name.clone()))?;
        result.push_str(&value);
    }

    Ok(result)
}
