//! Documents moved by the migration engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::SchemaVersion;

/// A reference from one document to another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub id: String,
}

/// A versioned, typed record stored in a migratable index.
///
/// The engine treats `attributes` as opaque; only the transforms registered
/// for `type_name` look inside it. `id` is unique within an index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigratableDocument {
    pub id: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub namespaces: Vec<String>,
    #[serde(default)]
    pub migration_version: SchemaVersion,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub core_migration_version: Option<SchemaVersion>,
    #[serde(default = "empty_attributes")]
    pub attributes: Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

fn empty_attributes() -> Value {
    Value::Object(Map::new())
}

impl MigratableDocument {
    /// Creates a document with no namespaces or references.
    pub fn new(
        id: impl Into<String>,
        type_name: impl Into<String>,
        migration_version: SchemaVersion,
        attributes: Value,
    ) -> Self {
        Self {
            id: id.into(),
            type_name: type_name.into(),
            namespaces: Vec::new(),
            migration_version,
            core_migration_version: None,
            attributes,
            references: Vec::new(),
            updated_at: None,
        }
    }

    pub fn with_reference(mut self, reference: Reference) -> Self {
        self.references.push(reference);
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespaces.push(namespace.into());
        self
    }

    /// Returns a top-level attribute, if the attributes payload is an object.
    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.as_object().and_then(|obj| obj.get(key))
    }

    /// Returns the attributes payload as a mutable object, converting a
    /// non-object payload into an empty object first.
    pub fn attributes_mut(&mut self) -> &mut Map<String, Value> {
        // At most two iterations.
        loop {
            match self.attributes {
                Value::Object(ref mut map) => return map,
                _ => self.attributes = empty_attributes(),
            }
        }
    }
}
