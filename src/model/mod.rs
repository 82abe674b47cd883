//! Query model: wiki entities and the description trees queries are built from.

pub mod description;
pub mod entity;

pub use description::{
    ClassDescription, Comparator, ConceptDescription, DataValue, Description,
    NamespaceDescription, QueryFeatures, SomePropertyDescription, ValueDescription,
};
pub use entity::{
    namespace_text, normalize_title, EntityId, EntityPage, Property, DELETED_MARKER,
    INTERNAL_MARKER, NS_CATEGORY, NS_CONCEPT, NS_MAIN, NS_PROPERTY, REDIRECT_MARKER,
};
