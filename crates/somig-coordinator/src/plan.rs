use serde::{Deserialize, Serialize};
use somig_types::{Mappings, SchemaVersion};

/// One index prefix to bring to `target_version`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexPlan {
    pub prefix: String,
    pub target_version: SchemaVersion,
    pub mappings: Mappings,
}

impl IndexPlan {
    pub fn new(prefix: impl Into<String>, target_version: SchemaVersion, mappings: Mappings) -> Self {
        Self {
            prefix: prefix.into(),
            target_version,
            mappings,
        }
    }
}
