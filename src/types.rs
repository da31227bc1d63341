//! Core types shared by the enumeration and notification layers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Commit number of a live collection. Strictly increasing per collection.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Version(pub u64);

impl fmt::Debug for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "V({})", self.0)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Version {
    pub fn next(self) -> Self {
        Version(self.0 + 1)
    }
}

/// Stable identity of an object across versions.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectKey(pub u64);

impl fmt::Debug for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectKey({})", self.0)
    }
}

/// Identifier of a live collection within an engine session.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CollectionId(pub u64);

impl fmt::Debug for CollectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CollectionId({})", self.0)
    }
}

/// Identifier of an engine session.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RealmId(pub u64);

impl fmt::Debug for RealmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RealmId({})", self.0)
    }
}

/// Storage type of a property.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyKind {
    Bool,
    Int,
    Float,
    String,
    Date,
    Data,
    Object,
    List,
}

impl PropertyKind {
    /// Whether values of this kind have a total order usable for sorting.
    pub fn is_sortable(self) -> bool {
        !matches!(self, PropertyKind::Data | PropertyKind::List)
    }

    /// Whether `@sum`/`@avg` are defined for this kind.
    pub fn is_numeric(self) -> bool {
        matches!(self, PropertyKind::Int | PropertyKind::Float)
    }
}

/// A single property of a class.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub name: String,
    pub kind: PropertyKind,
}

/// Element-type metadata for a collection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassInfo {
    /// Class name (e.g., "Person").
    pub name: String,

    /// Properties in declaration order.
    pub properties: Vec<Property>,
}

impl ClassInfo {
    /// Create class metadata with no properties.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: Vec::new(),
        }
    }

    /// Add a property.
    pub fn with_property(mut self, name: impl Into<String>, kind: PropertyKind) -> Self {
        self.properties.push(Property {
            name: name.into(),
            kind,
        });
        self
    }

    /// Look up a property by name.
    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }
}

/// An element stored in a live collection.
///
/// Elements are addressed by a stable key so that derived views can be
/// diffed across versions, and expose their properties as JSON values for
/// sorting and key-value lookup.
pub trait Object: Clone + Send + Sync + 'static {
    /// Stable identity of this object.
    fn object_key(&self) -> ObjectKey;

    /// Value of the named property, or `None` if the object has no such
    /// property.
    fn value_for_key(&self, key: &str) -> Option<serde_json::Value>;
}

/// A schemaless object backed by a JSON map.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DynamicObject {
    pub key: ObjectKey,
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl DynamicObject {
    pub fn new(key: u64) -> Self {
        Self {
            key: ObjectKey(key),
            fields: serde_json::Map::new(),
        }
    }

    /// Set a field.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Build from a JSON object. Non-object values yield an empty field map.
    pub fn from_json(key: u64, value: serde_json::Value) -> Self {
        let fields = match value {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        Self {
            key: ObjectKey(key),
            fields,
        }
    }
}

impl Object for DynamicObject {
    fn object_key(&self) -> ObjectKey {
        self.key
    }

    fn value_for_key(&self, key: &str) -> Option<serde_json::Value> {
        self.fields.get(key).cloned()
    }
}
