//! Query descriptions: the parsed restriction tree a query is compiled from.
//!
//! A [`Description`] is immutable once built. Stored concepts keep their
//! description as JSON, so every type here round-trips through serde.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::entity::{namespace_text, EntityPage, Property, NS_CATEGORY, NS_CONCEPT};
use crate::cache::Fingerprint;

/// Query capabilities a description needs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct QueryFeatures(u8);

impl QueryFeatures {
    pub const NONE: QueryFeatures = QueryFeatures(0);
    pub const CATEGORY: QueryFeatures = QueryFeatures(1);
    pub const NAMESPACE: QueryFeatures = QueryFeatures(1 << 1);
    pub const PROPERTY: QueryFeatures = QueryFeatures(1 << 2);
    pub const CONCEPT: QueryFeatures = QueryFeatures(1 << 3);
    pub const CONJUNCTION: QueryFeatures = QueryFeatures(1 << 4);
    pub const DISJUNCTION: QueryFeatures = QueryFeatures(1 << 5);

    pub fn contains(self, other: QueryFeatures) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn bits(self) -> u8 {
        self.0
    }
}

impl BitOr for QueryFeatures {
    type Output = QueryFeatures;

    fn bitor(self, rhs: QueryFeatures) -> QueryFeatures {
        QueryFeatures(self.0 | rhs.0)
    }
}

impl BitOrAssign for QueryFeatures {
    fn bitor_assign(&mut self, rhs: QueryFeatures) {
        self.0 |= rhs.0;
    }
}

/// Comparison applied between a property value and a constant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparator {
    #[default]
    Equal,
    NotEqual,
    Less,
    Greater,
    LessEq,
    GreaterEq,
    Like,
    NotLike,
}

impl Comparator {
    /// Query-string prefix of the comparator.
    pub fn prefix(self) -> &'static str {
        match self {
            Comparator::Equal => "",
            Comparator::NotEqual => "!",
            Comparator::Less => "<<",
            Comparator::Greater => ">>",
            Comparator::LessEq => "<",
            Comparator::GreaterEq => ">",
            Comparator::Like => "~",
            Comparator::NotLike => "!~",
        }
    }

    /// Whether the comparator orders values rather than matching them.
    pub fn is_range(self) -> bool {
        matches!(
            self,
            Comparator::Less | Comparator::Greater | Comparator::LessEq | Comparator::GreaterEq
        )
    }

    pub fn is_pattern(self) -> bool {
        matches!(self, Comparator::Like | Comparator::NotLike)
    }
}

/// A typed constant; the variant picks the property value table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataValue {
    Page(EntityPage),
    Number(f64),
    Text(String),
}

impl DataValue {
    fn encode(&self) -> Value {
        match self {
            DataValue::Page(page) => json!(["page", page.identity()]),
            DataValue::Number(n) => json!(["number", n]),
            DataValue::Text(s) => json!(["text", s]),
        }
    }
}

impl fmt::Display for DataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataValue::Page(page) => write!(f, "{}", page),
            DataValue::Number(n) => write!(f, "{}", n),
            DataValue::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassDescription {
    pub classes: Vec<EntityPage>,
    /// Subclass levels to expand. Falls back to the configured depth.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hierarchy_depth: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceDescription {
    pub namespace: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueDescription {
    /// `None` when the value restricts the result entity itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property: Option<Property>,
    #[serde(default)]
    pub comparator: Comparator,
    pub value: DataValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SomePropertyDescription {
    pub property: Property,
    pub description: Box<Description>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptDescription {
    pub concept: EntityPage,
}

/// A query restriction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Description {
    /// Matches every entity.
    Thing,
    Class(ClassDescription),
    Namespace(NamespaceDescription),
    Value(ValueDescription),
    SomeProperty(SomePropertyDescription),
    Conjunction(Vec<Description>),
    /// An empty disjunction matches nothing.
    Disjunction(Vec<Description>),
    Concept(ConceptDescription),
}

impl Description {
    /// The canonical description that matches nothing.
    pub fn nothing() -> Self {
        Description::Disjunction(Vec::new())
    }

    pub fn class(name: &str) -> Self {
        Description::Class(ClassDescription {
            classes: vec![EntityPage::category(name)],
            hierarchy_depth: None,
        })
    }

    pub fn classes<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        Description::Class(ClassDescription {
            classes: names.into_iter().map(EntityPage::category).collect(),
            hierarchy_depth: None,
        })
    }

    pub fn namespace(namespace: i32) -> Self {
        Description::Namespace(NamespaceDescription { namespace })
    }

    /// `[[property::<comparator>value]]`.
    pub fn value(property: &str, comparator: Comparator, value: DataValue) -> Self {
        Description::Value(ValueDescription {
            property: Some(Property::new(property)),
            comparator,
            value,
        })
    }

    /// A single page, matched by identity.
    pub fn page(page: EntityPage) -> Self {
        Description::Value(ValueDescription {
            property: None,
            comparator: Comparator::Equal,
            value: DataValue::Page(page),
        })
    }

    pub fn some_property(property: &str, description: Description) -> Self {
        Description::SomeProperty(SomePropertyDescription {
            property: Property::new(property),
            description: Box::new(description),
        })
    }

    pub fn concept(name: &str) -> Self {
        Description::Concept(ConceptDescription {
            concept: EntityPage::concept(name),
        })
    }

    pub fn and(children: impl IntoIterator<Item = Description>) -> Self {
        Description::Conjunction(children.into_iter().collect())
    }

    pub fn or(children: impl IntoIterator<Item = Description>) -> Self {
        Description::Disjunction(children.into_iter().collect())
    }

    pub fn is_thing(&self) -> bool {
        matches!(self, Description::Thing)
    }

    /// Structural key of the description.
    ///
    /// Conjunctions and disjunctions hash their children in fingerprint
    /// order, so reordered operands give the same key.
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of(self.encode())
    }

    fn encode(&self) -> Value {
        match self {
            Description::Thing => json!(["thing"]),
            Description::Class(c) => {
                let classes: Vec<Value> = c.classes.iter().map(|p| p.identity()).collect();
                json!(["class", classes, c.hierarchy_depth])
            }
            Description::Namespace(n) => json!(["namespace", n.namespace]),
            Description::Value(v) => json!([
                "value",
                v.property.as_ref().map(|p| p.key.as_str()),
                v.comparator,
                v.value.encode()
            ]),
            Description::SomeProperty(s) => {
                json!(["some_property", s.property.key, s.description.encode()])
            }
            Description::Conjunction(children) => {
                json!(["conjunction", Self::sorted_fingerprints(children)])
            }
            Description::Disjunction(children) => {
                json!(["disjunction", Self::sorted_fingerprints(children)])
            }
            Description::Concept(c) => json!(["concept", c.concept.identity()]),
        }
    }

    fn sorted_fingerprints(children: &[Description]) -> Vec<String> {
        let mut keys: Vec<String> = children
            .iter()
            .map(|c| c.fingerprint().as_str().to_string())
            .collect();
        keys.sort();
        keys
    }

    pub fn query_features(&self) -> QueryFeatures {
        match self {
            Description::Thing => QueryFeatures::NONE,
            Description::Class(_) => QueryFeatures::CATEGORY,
            Description::Namespace(_) => QueryFeatures::NAMESPACE,
            Description::Value(v) if v.property.is_some() => QueryFeatures::PROPERTY,
            Description::Value(_) => QueryFeatures::NONE,
            Description::SomeProperty(s) => {
                QueryFeatures::PROPERTY | s.description.query_features()
            }
            Description::Conjunction(children) => children
                .iter()
                .fold(QueryFeatures::CONJUNCTION, |acc, c| acc | c.query_features()),
            Description::Disjunction(children) => children
                .iter()
                .fold(QueryFeatures::DISJUNCTION, |acc, c| acc | c.query_features()),
            Description::Concept(_) => QueryFeatures::CONCEPT,
        }
    }

    /// Whether at most one entity can ever match.
    pub fn is_singleton(&self) -> bool {
        match self {
            Description::Value(v) => {
                v.property.is_none()
                    && v.comparator == Comparator::Equal
                    && matches!(v.value, DataValue::Page(_))
            }
            Description::Conjunction(children) => children.iter().any(|c| c.is_singleton()),
            _ => false,
        }
    }

    /// Property nesting depth.
    pub fn depth(&self) -> usize {
        match self {
            Description::SomeProperty(s) => 1 + s.description.depth(),
            Description::Conjunction(children) | Description::Disjunction(children) => {
                children.iter().map(|c| c.depth()).max().unwrap_or(0)
            }
            _ => 0,
        }
    }

    /// Number of restricting nodes; `Thing` and combinators count zero.
    pub fn size(&self) -> usize {
        match self {
            Description::Thing => 0,
            Description::SomeProperty(s) => 1 + s.description.size(),
            Description::Conjunction(children) | Description::Disjunction(children) => {
                children.iter().map(|c| c.size()).sum()
            }
            _ => 1,
        }
    }
}

/// Renders the description in wiki query syntax.
impl fmt::Display for Description {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Description::Thing => f.write_str("+"),
            Description::Class(c) => {
                let names: Vec<String> = c.classes.iter().map(|p| p.title.replace('_', " ")).collect();
                write!(f, "[[Category:{}]]", names.join("||"))
            }
            Description::Namespace(n) => {
                let prefix = if n.namespace == NS_CATEGORY { ":" } else { "" };
                match namespace_text(n.namespace) {
                    Some(text) => write!(f, "[[{}{}:+]]", prefix, text),
                    None => write!(f, "[[{{ns {}}}:+]]", n.namespace),
                }
            }
            Description::Value(v) => match &v.property {
                Some(p) => write!(f, "[[{}::{}{}]]", p, v.comparator.prefix(), v.value),
                None => write!(f, "[[{}{}]]", v.comparator.prefix(), v.value),
            },
            Description::SomeProperty(s) => match s.description.as_ref() {
                Description::Thing => write!(f, "[[{}::+]]", s.property),
                inner => write!(f, "[[{}::<q>{}</q>]]", s.property, inner),
            },
            Description::Conjunction(children) => {
                for child in children {
                    write!(f, "{}", child)?;
                }
                Ok(())
            }
            Description::Disjunction(children) => {
                let parts: Vec<String> = children.iter().map(|c| format!("<q>{}</q>", c)).collect();
                f.write_str(&parts.join(" OR "))
            }
            Description::Concept(c) if c.concept.namespace == NS_CONCEPT => {
                write!(f, "[[Concept:{}]]", c.concept.title.replace('_', " "))
            }
            Description::Concept(c) => write!(f, "[[{}]]", c.concept),
        }
    }
}
