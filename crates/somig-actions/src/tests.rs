use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use somig_store::{InMemoryStore, Operation, StoreError};
use somig_transform::{TransformPipeline, TypeDefinition, TypeRegistry};
use somig_types::{
    ActionError, ActionResponse, AliasAction, IndexName, IndexStatus, Mappings, MigratableDocument,
    SchemaVersion,
};

use crate::Actions;

// ============================================================================
// Test Helpers
// ============================================================================

fn doc(id: &str) -> MigratableDocument {
    MigratableDocument::new(id, "dashboard", SchemaVersion::new(1, 0, 0), json!({ "title": id }))
}

fn pipeline() -> TransformPipeline {
    let mut registry = TypeRegistry::new();
    registry
        .register(TypeDefinition::new("dashboard").migration(SchemaVersion::new(2, 0, 0), Ok))
        .unwrap();
    TransformPipeline::new(registry)
}

fn actions(store: InMemoryStore) -> (Arc<InMemoryStore>, Actions<InMemoryStore>) {
    let store = Arc::new(store);
    let actions = Actions::new(Arc::clone(&store), pipeline());
    (store, actions)
}

fn idx(name: &str) -> IndexName {
    IndexName::new(name)
}

// ============================================================================
// Write Blocks
// ============================================================================

#[tokio::test]
async fn write_block_is_idempotent() {
    let store = InMemoryStore::new();
    store.insert_index("source", Mappings::default(), &[]);
    let (_, actions) = actions(store);

    assert_eq!(
        actions.set_write_block(&idx("source")).await,
        Ok(ActionResponse::WriteBlockSet)
    );
    assert_eq!(
        actions.set_write_block(&idx("source")).await,
        Ok(ActionResponse::WriteBlockSet)
    );
}

#[tokio::test]
async fn unacknowledged_write_block_is_retryable() {
    let store = InMemoryStore::new();
    store.insert_index("source", Mappings::default(), &[]);
    store.unacknowledge_next_write_blocks(1);
    let (_, actions) = actions(store);

    let err = actions.set_write_block(&idx("source")).await.unwrap_err();
    assert!(err.is_retryable());
    assert!(err.to_string().contains("set_write_block_failed"));
}

#[tokio::test]
async fn write_block_on_missing_index_is_index_not_found() {
    let (_, actions) = actions(InMemoryStore::new());

    assert_eq!(
        actions.set_write_block(&idx("missing")).await,
        Err(ActionError::IndexNotFound {
            index: idx("missing")
        })
    );
}

// ============================================================================
// Index Creation and Clone
// ============================================================================

#[tokio::test]
async fn create_index_tolerates_existing_index() {
    let (store, actions) = actions(InMemoryStore::new());
    let aliases = vec![".kibana_2.0.0".to_string()];

    for _ in 0..2 {
        assert_eq!(
            actions.create_index(&idx("target"), &Mappings::default(), &aliases).await,
            Ok(ActionResponse::IndexCreated)
        );
    }
    assert!(store.index(&idx("target")).unwrap().has_alias(".kibana_2.0.0"));
}

#[tokio::test]
async fn create_index_maps_mapping_errors_to_conflict() {
    let store = InMemoryStore::new();
    store.inject(
        Operation::CreateIndex,
        StoreError::response(400, "mapper_parsing_exception", "unknown field type"),
    );
    let (_, actions) = actions(store);

    let err = actions
        .create_index(&idx("target"), &Mappings::default(), &[])
        .await
        .unwrap_err();
    assert!(matches!(err, ActionError::MappingConflict { .. }));
}

#[tokio::test]
async fn create_index_waits_for_yellow() {
    let store = InMemoryStore::new();
    store.inject(Operation::WaitForIndexStatus, StoreError::Timeout);
    let (_, actions) = actions(store);

    let err = actions
        .create_index(&idx("target"), &Mappings::default(), &[])
        .await
        .unwrap_err();
    assert!(err.is_retryable());
    assert!(err.to_string().contains("index_not_yellow_timeout"));

    // The replay finds the index already created.
    assert_eq!(
        actions.create_index(&idx("target"), &Mappings::default(), &[]).await,
        Ok(ActionResponse::IndexCreated)
    );
}

#[tokio::test]
async fn clone_index_is_idempotent() {
    let store = InMemoryStore::new();
    store.insert_documents("temp", [doc("a")]);
    store.set_write_block(&idx("temp"), true);
    let (store, actions) = actions(store);

    for _ in 0..2 {
        assert_eq!(
            actions.clone_index(&idx("temp"), &idx("target")).await,
            Ok(ActionResponse::IndexCloned)
        );
    }
    assert_eq!(store.documents(&idx("target")).len(), 1);
}

#[tokio::test]
async fn wait_for_status_on_red_index_is_retryable() {
    let store = InMemoryStore::new();
    store.insert_index("source", Mappings::default(), &[]);
    store.set_index_status(&idx("source"), IndexStatus::Red);
    let (_, actions) = actions(store);

    let err = actions
        .wait_for_index_status(&idx("source"), IndexStatus::Yellow)
        .await
        .unwrap_err();
    assert!(err.is_retryable());
}

// ============================================================================
// Reindex Tasks
// ============================================================================

#[tokio::test]
async fn unfinished_task_is_a_retryable_timeout() {
    let store = InMemoryStore::new().with_task_polls(2);
    store.insert_documents("legacy", [doc("a")]);
    store.insert_index("pre", Mappings::default(), &[]);
    let (_, actions) = actions(store);

    let Ok(ActionResponse::ReindexStarted(task)) = actions.reindex(&idx("legacy"), &idx("pre")).await else {
        panic!("reindex did not start");
    };

    let err = actions.wait_for_task(&task).await.unwrap_err();
    assert!(err.to_string().contains("wait_for_task_completion_timeout"));
    assert_eq!(actions.wait_for_task(&task).await, Ok(ActionResponse::TaskCompleted));
}

// ============================================================================
// Reading and Writing Documents
// ============================================================================

#[tokio::test]
async fn read_batch_reports_last_sort_and_total() {
    let store = InMemoryStore::new();
    store.insert_documents("source", (0..5).map(|i| doc(&format!("d{i}"))));
    let (_, actions) = actions(store);

    let Ok(ActionResponse::PitOpened(pit)) = actions.open_pit(&idx("source")).await else {
        panic!("pit was not opened");
    };
    let Ok(ActionResponse::BatchRead(batch)) = actions.read_batch(&pit, None, 3).await else {
        panic!("batch was not read");
    };

    assert_eq!(batch.documents.len(), 3);
    assert_eq!(batch.total, 5);
    assert_eq!(batch.last_sort.map(|s| s.as_u64()), Some(3));
}

#[tokio::test]
async fn bulk_write_treats_version_conflicts_as_success() {
    let store = InMemoryStore::new();
    store.insert_documents("temp", [doc("a")]);
    let (store, actions) = actions(store);

    let result = actions.bulk_write(&idx("temp"), &[doc("a"), doc("b")]).await;

    assert_eq!(result, Ok(ActionResponse::BatchWritten { count: 2 }));
    assert_eq!(store.documents(&idx("temp")).len(), 2);
}

#[tokio::test]
async fn bulk_write_into_blocked_index_is_reported() {
    let store = InMemoryStore::new();
    store.insert_index("temp", Mappings::default(), &[]);
    store.set_write_block(&idx("temp"), true);
    let (_, actions) = actions(store);

    assert_eq!(
        actions.bulk_write(&idx("temp"), &[doc("a")]).await,
        Err(ActionError::TargetIndexHadWriteBlock { index: idx("temp") })
    );
}

#[tokio::test]
async fn transform_batch_uses_the_pipeline() {
    let (_, actions) = actions(InMemoryStore::new());
    let unknown = MigratableDocument::new("x", "mystery", SchemaVersion::new(1, 0, 0), json!({}));

    let Ok(ActionResponse::BatchTransformed(batch)) = actions.transform_batch(vec![doc("a"), unknown]).await else {
        panic!("transform failed");
    };

    assert_eq!(batch.documents.len(), 1);
    assert_eq!(batch.documents[0].migration_version, SchemaVersion::new(2, 0, 0));
    assert_eq!(batch.errors.len(), 1);
}

#[tokio::test]
async fn closing_a_missing_pit_succeeds() {
    let store = InMemoryStore::new();
    store.inject(
        Operation::ClosePointInTime,
        StoreError::response(404, "search_context_missing_exception", "gone"),
    );
    let (_, actions) = actions(store);

    assert_eq!(
        actions.close_pit(&somig_types::PitId::new("stale")).await,
        Ok(ActionResponse::PitClosed)
    );
}

// ============================================================================
// Aliases, Timeouts
// ============================================================================

#[tokio::test]
async fn missing_required_alias_is_reported_by_name() {
    let store = InMemoryStore::new();
    store.insert_index("old", Mappings::default(), &[]);
    let (_, actions) = actions(store);

    let err = actions
        .update_aliases(&[AliasAction::Remove {
            index: idx("old"),
            alias: ".kibana".into(),
            must_exist: true,
        }])
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ActionError::AliasNotFound {
            alias: ".kibana".into()
        }
    );
}

#[tokio::test(start_paused = true)]
async fn slow_store_calls_time_out_as_retryable() {
    let store = InMemoryStore::new().with_latency(Duration::from_secs(120));
    store.insert_index("source", Mappings::default(), &[]);
    let store = Arc::new(store);
    let actions = Actions::new(store, pipeline()).with_timeout(Duration::from_secs(1));

    let err = actions.refresh(&idx("source")).await.unwrap_err();
    assert!(err.is_retryable());
}
