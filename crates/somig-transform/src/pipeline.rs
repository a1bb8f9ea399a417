//! Applies a [`TypeRegistry`] to batches of documents.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use somig_types::{DocumentTransformError, MigratableDocument, TransformErrorKind, TransformedBatch};
use tracing::{debug, warn};

use crate::TypeRegistry;

/// Upgrades documents to the latest registered version of their type.
///
/// Cheap to clone; the registry is shared.
#[derive(Debug, Clone)]
pub struct TransformPipeline {
    registry: Arc<TypeRegistry>,
}

impl TransformPipeline {
    pub fn new(registry: TypeRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    pub fn from_shared(registry: Arc<TypeRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// Transforms every document independently.
    ///
    /// Output documents keep their input order; failures are collected
    /// rather than aborting the batch.
    pub fn transform_batch(&self, documents: Vec<MigratableDocument>) -> TransformedBatch {
        let total = documents.len();
        let mut batch = TransformedBatch::default();

        for doc in documents {
            match self.transform_document(doc) {
                Ok(doc) => batch.documents.push(doc),
                Err(err) => batch.errors.push(err),
            }
        }

        debug!(
            total,
            transformed = batch.documents.len(),
            failed = batch.errors.len(),
            "transformed batch"
        );
        batch
    }

    /// Upgrades one document.
    ///
    /// Applies every transform newer than the document's version in
    /// ascending order, then projects and validates the attributes against
    /// the type's schema when one is declared.
    pub fn transform_document(
        &self,
        doc: MigratableDocument,
    ) -> Result<MigratableDocument, DocumentTransformError> {
        let Some(definition) = self.registry.get(&doc.type_name) else {
            return Err(DocumentTransformError::new(&doc, TransformErrorKind::UnknownType));
        };

        let latest = definition.latest_version();
        if doc.migration_version > latest {
            let kind = TransformErrorKind::NewerThanKnown {
                document: doc.migration_version,
                latest,
            };
            return Err(DocumentTransformError::new(&doc, kind));
        }

        let (id, type_name) = (doc.id.clone(), doc.type_name.clone());
        let fail = |kind| DocumentTransformError {
            id: id.clone(),
            type_name: type_name.clone(),
            kind,
        };

        let mut current = doc;
        for (version, transform) in definition.migrations_after(current.migration_version) {
            // A panicking transform fails only this document.
            let mut next = catch_unwind(AssertUnwindSafe(|| transform(current)))
                .unwrap_or_else(|panic_info| {
                    let message = panic_message(panic_info.as_ref());
                    warn!(id = %id, type_name = %type_name, %version, "transform panicked: {message}");
                    Err(format!("transform panicked: {message}"))
                })
                .map_err(|message| fail(TransformErrorKind::TransformFailed { version, message }))?;
            if next.id != id || next.type_name != type_name {
                return Err(fail(TransformErrorKind::TransformFailed {
                    version,
                    message: "transform must not change the document id or type".to_string(),
                }));
            }
            next.migration_version = version;
            current = next;
        }
        current.migration_version = latest;

        if let Some(schema) = definition.attribute_schema() {
            current = schema.project(current);
            schema
                .validate(&current)
                .map_err(|message| fail(TransformErrorKind::SchemaViolation { message }))?;
        }

        Ok(current)
    }
}

fn panic_message(panic_info: &(dyn Any + Send)) -> String {
    if let Some(s) = panic_info.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic_info.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
