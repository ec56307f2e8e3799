// src/types.rs

//! Database-level value types shared by the driver traits, the schema
//! synchronizer and the record gateway.

use std::collections::BTreeMap;
use std::fmt;

/// Name of the base vertex class every collection class extends.
pub const BASE_VERTEX_CLASS: &str = "V";

/// Name of the base edge class.
pub const BASE_EDGE_CLASS: &str = "E";

/// Handle to a class defined in the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassHandle {
    pub name: String,
    pub superclass: Option<String>,
    pub cluster_id: i32,
}

impl ClassHandle {
    pub fn new(name: impl Into<String>, superclass: Option<&str>, cluster_id: i32) -> Self {
        Self {
            name: name.into(),
            superclass: superclass.map(str::to_string),
            cluster_id,
        }
    }
}

impl fmt::Display for ClassHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.superclass {
            Some(parent) => write!(f, "{} extends {} (cluster {})", self.name, parent, self.cluster_id),
            None => write!(f, "{} (cluster {})", self.name, self.cluster_id),
        }
    }
}

/// Declared type of a class property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PropertyType {
    #[default]
    String,
    Integer,
    Long,
    Double,
    Boolean,
    Date,
    Link,
    Embedded,
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PropertyType::String => "String",
            PropertyType::Integer => "Integer",
            PropertyType::Long => "Long",
            PropertyType::Double => "Double",
            PropertyType::Boolean => "Boolean",
            PropertyType::Date => "Date",
            PropertyType::Link => "Link",
            PropertyType::Embedded => "Embedded",
        };
        f.write_str(s)
    }
}

/// A property declared on a class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    pub name: String,
    pub kind: PropertyType,
}

impl Property {
    pub fn new(name: impl Into<String>, kind: PropertyType) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    Unique,
    NotUnique,
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexKind::Unique => f.write_str("UNIQUE"),
            IndexKind::NotUnique => f.write_str("NOTUNIQUE"),
        }
    }
}

/// Description of an index to create.
///
/// Index names follow the `<Class>.<property>` convention, so the identifier
/// index on the base vertex class for `id` is `V.id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    pub name: String,
    pub class: String,
    pub property: String,
    pub kind: IndexKind,
}

impl IndexSpec {
    /// Unique index over `id_property` on the base vertex class.
    pub fn unique_id(id_property: &str) -> Self {
        Self {
            name: format!("{BASE_VERTEX_CLASS}.{id_property}"),
            class: BASE_VERTEX_CLASS.to_string(),
            property: id_property.to_string(),
            kind: IndexKind::Unique,
        }
    }
}

/// An index as reported by the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Index {
    pub name: String,
    pub class: String,
    pub property: String,
    pub kind: IndexKind,
}

impl From<&IndexSpec> for Index {
    fn from(spec: &IndexSpec) -> Self {
        Self {
            name: spec.name.clone(),
            class: spec.class.clone(),
            property: spec.property.clone(),
            kind: spec.kind,
        }
    }
}

/// Physical address of a record: cluster plus position inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId {
    pub cluster: i32,
    pub position: i64,
}

impl RecordId {
    pub fn new(cluster: i32, position: i64) -> Self {
        Self { cluster, position }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}:{}", self.cluster, self.position)
    }
}

/// A value as stored and returned by the database driver.
#[derive(Debug, Clone, PartialEq)]
pub enum DbValue {
    /// Plain JSON scalar (or any JSON value the driver passes through).
    Scalar(serde_json::Value),
    /// Link to another record.
    Link(RecordId),
    List(Vec<DbValue>),
    Embedded(DbRecord),
}

impl DbValue {
    /// Recognizable shape of this value, if it has one that transformers can
    /// hook into.
    pub fn shape(&self) -> Option<ValueShape> {
        match self {
            DbValue::Link(_) => Some(ValueShape::RecordId),
            _ => None,
        }
    }
}

impl From<serde_json::Value> for DbValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Array(items) => {
                DbValue::List(items.into_iter().map(DbValue::from).collect())
            }
            serde_json::Value::Object(map) => DbValue::Embedded(
                map.into_iter().map(|(k, v)| (k, DbValue::from(v))).collect(),
            ),
            other => DbValue::Scalar(other),
        }
    }
}

/// Shapes of driver values that post-query transformers can be keyed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueShape {
    RecordId,
}

/// A record as stored and returned by the database driver.
pub type DbRecord = BTreeMap<String, DbValue>;

/// A record as returned to callers, after value transformation.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Equality criteria on top-level fields.
pub type Criteria = serde_json::Map<String, serde_json::Value>;

/// Convert caller-supplied JSON fields into a driver record.
pub fn record_from_json(fields: Record) -> DbRecord {
    fields
        .into_iter()
        .map(|(k, v)| (k, DbValue::from(v)))
        .collect()
}
