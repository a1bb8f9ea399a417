//! Attribute shape checks.

use std::collections::BTreeMap;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use somig_types::MigratableDocument;

/// JSON kind expected for a declared attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    String,
    Number,
    Boolean,
    Object,
    Array,
    /// Any non-null value.
    Any,
}

impl FieldKind {
    pub fn matches(self, value: &Value) -> bool {
        match self {
            FieldKind::String => value.is_string(),
            FieldKind::Number => value.is_number(),
            FieldKind::Boolean => value.is_boolean(),
            FieldKind::Object => value.is_object(),
            FieldKind::Array => value.is_array(),
            FieldKind::Any => !value.is_null(),
        }
    }
}

impl Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FieldKind::String => "string",
            FieldKind::Number => "number",
            FieldKind::Boolean => "boolean",
            FieldKind::Object => "object",
            FieldKind::Array => "array",
            FieldKind::Any => "any",
        };
        f.write_str(s)
    }
}

/// Declared top-level attributes of a type at its latest version.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AttributeSchema {
    pub fields: BTreeMap<String, FieldKind>,
}

impl AttributeSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.insert(name.into(), kind);
        self
    }

    /// Checks that every declared field is present with the declared kind.
    pub fn validate(&self, doc: &MigratableDocument) -> Result<(), String> {
        let Some(attributes) = doc.attributes.as_object() else {
            return Err("attributes must be an object".to_string());
        };
        for (name, kind) in &self.fields {
            match attributes.get(name) {
                None => return Err(format!("missing attribute `{name}`")),
                Some(value) if !kind.matches(value) => {
                    return Err(format!("attribute `{name}` must be {kind}"));
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    /// Drops attributes the schema does not declare.
    pub fn project(&self, mut doc: MigratableDocument) -> MigratableDocument {
        doc.attributes_mut()
            .retain(|name, _| self.fields.contains_key(name));
        doc
    }
}
