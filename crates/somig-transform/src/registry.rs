//! Registry of saved-object types and their migrations.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use somig_types::{MigratableDocument, SchemaVersion};

use crate::AttributeSchema;

/// Upgrades one document to a single schema version.
///
/// A transform receives the document at the previous version and returns it
/// at the transform's version, or a message describing why it could not.
pub type Transform =
    Arc<dyn Fn(MigratableDocument) -> Result<MigratableDocument, String> + Send + Sync>;

/// Errors raised while building a registry.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TransformError {
    #[error("type {0} is already registered")]
    DuplicateType(String),

    #[error("type name must not be empty")]
    EmptyTypeName,
}

/// One saved-object type: its ordered migrations and latest-version shape.
#[derive(Clone)]
pub struct TypeDefinition {
    name: String,
    migrations: BTreeMap<SchemaVersion, Transform>,
    schema: Option<AttributeSchema>,
}

impl TypeDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            migrations: BTreeMap::new(),
            schema: None,
        }
    }

    /// Adds the transform that upgrades documents to `version`.
    ///
    /// Registering a second transform for the same version replaces the first.
    pub fn migration<F>(mut self, version: SchemaVersion, transform: F) -> Self
    where
        F: Fn(MigratableDocument) -> Result<MigratableDocument, String> + Send + Sync + 'static,
    {
        self.migrations.insert(version, Arc::new(transform));
        self
    }

    pub fn schema(mut self, schema: AttributeSchema) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Version of the newest registered transform, or zero without any.
    pub fn latest_version(&self) -> SchemaVersion {
        self.migrations
            .keys()
            .next_back()
            .copied()
            .unwrap_or(SchemaVersion::ZERO)
    }

    pub fn attribute_schema(&self) -> Option<&AttributeSchema> {
        self.schema.as_ref()
    }

    /// Transforms strictly newer than `version`, oldest first.
    pub fn migrations_after(
        &self,
        version: SchemaVersion,
    ) -> impl Iterator<Item = (SchemaVersion, &Transform)> {
        use std::ops::Bound::{Excluded, Unbounded};
        self.migrations
            .range((Excluded(version), Unbounded))
            .map(|(v, t)| (*v, t))
    }
}

impl fmt::Debug for TypeDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDefinition")
            .field("name", &self.name)
            .field("versions", &self.migrations.keys().collect::<Vec<_>>())
            .field("schema", &self.schema)
            .finish()
    }
}

/// All known saved-object types.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    types: BTreeMap<String, TypeDefinition>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, definition: TypeDefinition) -> crate::Result<()> {
        if definition.name.is_empty() {
            return Err(TransformError::EmptyTypeName);
        }
        if self.types.contains_key(&definition.name) {
            return Err(TransformError::DuplicateType(definition.name));
        }
        self.types.insert(definition.name.clone(), definition);
        Ok(())
    }

    pub fn get(&self, type_name: &str) -> Option<&TypeDefinition> {
        self.types.get(type_name)
    }

    /// Latest version per registered type.
    pub fn latest_versions(&self) -> BTreeMap<String, SchemaVersion> {
        self.types
            .iter()
            .map(|(name, def)| (name.clone(), def.latest_version()))
            .collect()
    }

    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}
