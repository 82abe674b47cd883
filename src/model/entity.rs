//! Wiki entities: pages, subobjects and properties.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::cache::Fingerprint;

/// Store-assigned numeric id of an entity.
pub type EntityId = i64;

pub const NS_MAIN: i32 = 0;
pub const NS_CATEGORY: i32 = 14;
pub const NS_PROPERTY: i32 = 102;
pub const NS_CONCEPT: i32 = 108;

/// Interwiki marker of a redirect source.
pub const REDIRECT_MARKER: &str = ":smw-redi";
/// Interwiki marker of internal objects (never returned as results).
pub const INTERNAL_MARKER: &str = ":smw";
/// Interwiki marker of entities scheduled for deletion.
pub const DELETED_MARKER: &str = ":smw-delete";

/// Normalize a title to its database key form.
///
/// Surrounding whitespace is dropped, inner runs of whitespace become a
/// single underscore and the first letter is upper-cased.
pub fn normalize_title(title: &str) -> String {
    let joined = title.split_whitespace().collect::<Vec<_>>().join("_");
    let mut chars = joined.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// A page, or a subobject of a page, in some namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityPage {
    pub title: String,
    pub namespace: i32,
    #[serde(default)]
    pub interwiki: String,
    #[serde(default)]
    pub subobject: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<EntityId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_key: Option<String>,
}

impl EntityPage {
    /// A local page; the title is normalized.
    pub fn new(title: &str, namespace: i32) -> Self {
        Self::from_parts(normalize_title(title), namespace, "", "")
    }

    /// Build from already stored parts, without normalization.
    pub fn from_parts(
        title: impl Into<String>,
        namespace: i32,
        interwiki: impl Into<String>,
        subobject: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            namespace,
            interwiki: interwiki.into(),
            subobject: subobject.into(),
            id: None,
            sort_key: None,
        }
    }

    pub fn category(name: &str) -> Self {
        Self::new(name, NS_CATEGORY)
    }

    pub fn concept(name: &str) -> Self {
        Self::new(name, NS_CONCEPT)
    }

    pub fn with_interwiki(mut self, interwiki: &str) -> Self {
        self.interwiki = interwiki.into();
        self
    }

    pub fn with_subobject(mut self, subobject: &str) -> Self {
        self.subobject = subobject.into();
        self
    }

    pub fn with_id(mut self, id: EntityId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_sort_key(mut self, sort_key: impl Into<String>) -> Self {
        self.sort_key = Some(sort_key.into());
        self
    }

    /// Identity key over `(title, namespace, interwiki, subobject)`.
    ///
    /// Id and sort key do not take part.
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of(self.identity())
    }

    /// Ordered identity tuple, as JSON.
    pub(crate) fn identity(&self) -> serde_json::Value {
        json!([self.title, self.namespace, self.interwiki, self.subobject])
    }

    /// The same entity with neither id nor sort key.
    pub fn key(&self) -> EntityPage {
        Self::from_parts(
            self.title.clone(),
            self.namespace,
            self.interwiki.clone(),
            self.subobject.clone(),
        )
    }

    pub fn is_redirect(&self) -> bool {
        self.interwiki == REDIRECT_MARKER
    }

    /// Sort key used when none is stored: the title as display text.
    pub fn default_sort_key(&self) -> String {
        self.title.replace('_', " ")
    }
}

impl fmt::Display for EntityPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match namespace_text(self.namespace) {
            Some("") => write!(f, "{}", self.title)?,
            Some(ns) => write!(f, "{}:{}", ns, self.title)?,
            None => write!(f, "{{ns {}}}:{}", self.namespace, self.title)?,
        }
        if !self.subobject.is_empty() {
            write!(f, "#{}", self.subobject)?;
        }
        Ok(())
    }
}

/// Canonical name of a known namespace. `Some("")` for the main namespace.
pub fn namespace_text(namespace: i32) -> Option<&'static str> {
    match namespace {
        NS_MAIN => Some(""),
        NS_CATEGORY => Some("Category"),
        NS_PROPERTY => Some("Property"),
        NS_CONCEPT => Some("Concept"),
        _ => None,
    }
}

/// A property, identified by its normalized label.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Property {
    pub key: String,
}

impl Property {
    pub fn new(label: &str) -> Self {
        Self {
            key: normalize_title(label),
        }
    }

    /// The page that describes this property.
    pub fn entity(&self) -> EntityPage {
        EntityPage::from_parts(self.key.clone(), NS_PROPERTY, "", "")
    }
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key.replace('_', " "))
    }
}
