//! # somig-transform: Document transform pipeline
//!
//! Upgrades saved-object documents from the schema version they were stored
//! with to the latest version registered for their type. The pipeline is
//! pure: no IO, and a failing document never aborts the rest of its batch.
//!
//! ## Architecture
//!
//! - [`registry`]: [`TypeRegistry`] and [`TypeDefinition`] (ordered per-type transforms)
//! - [`schema`]: [`AttributeSchema`] shape checks and the forward-compatible projection
//! - [`pipeline`]: [`TransformPipeline`], which applies a registry to batches
//!
//! ## Example
//!
//! ```ignore
//! let mut registry = TypeRegistry::new();
//! registry.register(
//!     TypeDefinition::new("dashboard")
//!         .migration(SchemaVersion::new(2, 0, 0), |mut doc| {
//!             doc.attributes_mut().insert("layout".into(), json!("grid"));
//!             Ok(doc)
//!         }),
//! )?;
//!
//! let pipeline = TransformPipeline::new(registry);
//! let batch = pipeline.transform_batch(documents);
//! ```

pub mod pipeline;
pub mod registry;
pub mod schema;


pub use pipeline::TransformPipeline;
pub use registry::{Transform, TransformError, TypeDefinition, TypeRegistry};
pub use schema::{AttributeSchema, FieldKind};

/// Result type for registry construction.
pub type Result<T> = std::result::Result<T, TransformError>;
