//! Index layout: names, descriptors, aliases and store handles.

use std::collections::BTreeSet;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::SchemaVersion;

// ============================================================================
// Index Names
// ============================================================================

/// Name of a physical index (or alias) in the document store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IndexName(String);

impl IndexName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The versioned index documents end up in: `{prefix}_{version}_001`.
    pub fn target(prefix: &str, version: SchemaVersion) -> Self {
        Self(format!("{prefix}_{version}_001"))
    }

    /// The scratch index documents are transformed into before the clone.
    pub fn temp(prefix: &str, version: SchemaVersion) -> Self {
        Self(format!("{prefix}_{version}_reindex_temp"))
    }

    /// Alias that pins a specific stack version: `{prefix}_{version}`.
    pub fn version_alias(prefix: &str, version: SchemaVersion) -> Self {
        Self(format!("{prefix}_{version}"))
    }

    /// Index a legacy (pre-alias) index is reindexed into before migrating.
    pub fn pre_migration(prefix: &str, version: SchemaVersion) -> Self {
        Self(format!("{prefix}_pre{version}_001"))
    }
}

impl Display for IndexName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for IndexName {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for IndexName {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for IndexName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// Store Handles
// ============================================================================

/// Opaque point-in-time handle returned by the store.
///
/// A PIT holds store-side resources until it is closed or its keep-alive
/// lease expires.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PitId(String);

impl PitId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for PitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Handle to an asynchronous store-side task (reindex).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Tiebreaker sort value of the last hit of a page, used as `search_after`.
///
/// Stable across pages of the same PIT.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct SortKey(u64);

impl SortKey {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Index Metadata
// ============================================================================

/// Health an index must reach before it is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexStatus {
    Red,
    Yellow,
    Green,
}

impl Display for IndexStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IndexStatus::Red => "red",
            IndexStatus::Yellow => "yellow",
            IndexStatus::Green => "green",
        };
        f.write_str(s)
    }
}

/// Index mappings, kept as the raw JSON body the store understands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Mappings(Value);

impl Mappings {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Returns the declared top-level property names.
    pub fn property_names(&self) -> BTreeSet<String> {
        self.0
            .get("properties")
            .and_then(Value::as_object)
            .map(|props| props.keys().cloned().collect())
            .unwrap_or_default()
    }
}

impl Default for Mappings {
    fn default() -> Self {
        Self(json!({ "dynamic": false, "properties": {} }))
    }
}

/// An index as reported by the store during initialisation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDescriptor {
    pub name: IndexName,
    #[serde(default)]
    pub aliases: BTreeSet<String>,
    #[serde(default)]
    pub write_block: bool,
    #[serde(default)]
    pub mappings: Mappings,
    #[serde(default)]
    pub doc_count: u64,
}

impl IndexDescriptor {
    pub fn has_alias(&self, alias: &str) -> bool {
        self.aliases.contains(alias)
    }
}

/// One operation of an atomic alias update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AliasAction {
    /// Point `alias` at `index`.
    Add {
        index: IndexName,
        alias: String,
        must_exist: bool,
    },
    /// Remove `alias` from `index`.
    Remove {
        index: IndexName,
        alias: String,
        must_exist: bool,
    },
    /// Delete `index` as part of the same atomic update.
    RemoveIndex { index: IndexName },
}
