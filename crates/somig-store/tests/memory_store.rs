//! Behaviour of the in-memory store that the migration engine relies on.

use std::time::Duration;

use serde_json::json;
use somig_store::{DocumentStore, InMemoryStore, Operation, Refresh, StoreError};
use somig_types::{AliasAction, IndexName, IndexStatus, Mappings, MigratableDocument, SchemaVersion, SortKey};

const TIMEOUT: Duration = Duration::from_secs(60);

fn doc(id: &str) -> MigratableDocument {
    MigratableDocument::new(id, "dashboard", SchemaVersion::new(1, 0, 0), json!({ "title": id }))
}

fn seeded(name: &str, count: usize) -> InMemoryStore {
    let store = InMemoryStore::new();
    store.insert_index(name, Mappings::default(), &[".kibana"]);
    store.insert_documents(name, (0..count).map(|i| doc(&format!("doc-{i:03}"))));
    store
}

// ============================================================================
// Write Blocks
// ============================================================================

#[tokio::test]
async fn repeated_write_block_is_acknowledged_without_shards() {
    let store = seeded("source", 1);
    let index = IndexName::new("source");

    let first = store.add_write_block(&index, TIMEOUT).await.unwrap();
    let second = store.add_write_block(&index, TIMEOUT).await.unwrap();

    assert!(first.acknowledged && first.shards_acknowledged);
    assert!(second.acknowledged);
    assert!(!second.shards_acknowledged);
}

#[tokio::test]
async fn write_block_on_missing_index_fails() {
    let store = InMemoryStore::new();
    let err = store
        .add_write_block(&IndexName::new("missing"), TIMEOUT)
        .await
        .unwrap_err();
    assert!(err.is_type("index_not_found_exception"));
}

#[tokio::test]
async fn blocked_index_rejects_bulk_items() {
    let store = seeded("source", 0);
    let index = IndexName::new("source");
    store.set_write_block(&index, true);

    let response = store.bulk_index(&index, &[doc("a")], Refresh::False).await.unwrap();

    assert!(response.has_errors());
    let (id, error) = response.failures().next().unwrap();
    assert_eq!(id, "a");
    assert!(error.is_type("cluster_block_exception"));
}

// ============================================================================
// Bulk Writes
// ============================================================================

#[tokio::test]
async fn bulk_create_reports_version_conflict_for_existing_ids() {
    let store = seeded("target", 0);
    let index = IndexName::new("target");

    store.bulk_index(&index, &[doc("a")], Refresh::False).await.unwrap();
    let replay = store.bulk_index(&index, &[doc("a"), doc("b")], Refresh::False).await.unwrap();

    let failures: Vec<_> = replay.failures().collect();
    assert_eq!(failures.len(), 1);
    assert!(failures[0].1.is_type("version_conflict_engine_exception"));
    assert_eq!(store.documents(&index).len(), 2);
}

// ============================================================================
// Point-in-Time Snapshots
// ============================================================================

#[tokio::test]
async fn pit_pages_are_stable_against_later_writes() {
    let store = seeded("source", 5);
    let index = IndexName::new("source");
    let pit = store.open_point_in_time(&index, "10m").await.unwrap();

    store.insert_documents("source", [doc("late")]);

    let first = store.search_after(&pit, None, 3, "10m").await.unwrap();
    assert_eq!(first.hits.len(), 3);
    assert_eq!(first.total, 5);

    let last = first.hits.last().map(|hit| hit.sort);
    let second = store.search_after(&pit, last, 3, "10m").await.unwrap();
    assert_eq!(second.hits.len(), 2);
    assert!(second.hits.iter().all(|hit| hit.document.id != "late"));

    let exhausted = store
        .search_after(&pit, Some(SortKey::new(5)), 3, "10m")
        .await
        .unwrap();
    assert!(exhausted.hits.is_empty());
}

#[tokio::test]
async fn closing_pits_releases_them_and_unknown_pits_close_cleanly() {
    let store = seeded("source", 1);
    let pit = store
        .open_point_in_time(&IndexName::new("source"), "10m")
        .await
        .unwrap();
    assert_eq!(store.open_pit_count(), 1);

    store.close_point_in_time(&pit).await.unwrap();
    store.close_point_in_time(&pit).await.unwrap();
    assert_eq!(store.open_pit_count(), 0);

    let err = store.search_after(&pit, None, 10, "10m").await.unwrap_err();
    assert!(err.is_type("search_context_missing_exception"));
}

// ============================================================================
// Clone, Reindex and Tasks
// ============================================================================

#[tokio::test]
async fn clone_requires_write_block_and_copies_it() {
    let store = seeded("temp", 3);
    let temp = IndexName::new("temp");
    let target = IndexName::new("target");

    let err = store.clone_index(&temp, &target, TIMEOUT).await.unwrap_err();
    assert!(err.is_type("illegal_state_exception"));

    store.add_write_block(&temp, TIMEOUT).await.unwrap();
    store.clone_index(&temp, &target, TIMEOUT).await.unwrap();

    let cloned = store.index(&target).unwrap();
    assert!(cloned.write_block);
    assert!(cloned.aliases.is_empty());
    assert_eq!(cloned.doc_count, 3);

    let again = store.clone_index(&temp, &target, TIMEOUT).await.unwrap_err();
    assert!(again.is_type("resource_already_exists_exception"));
}

#[tokio::test]
async fn reindex_task_completes_after_configured_polls() {
    let store = seeded("legacy", 4).with_task_polls(2);
    store.insert_index("pre", Mappings::default(), &[]);

    let task = store
        .reindex(&IndexName::new("legacy"), &IndexName::new("pre"))
        .await
        .unwrap();

    assert!(!store.get_task(&task, TIMEOUT).await.unwrap().completed);
    let status = store.get_task(&task, TIMEOUT).await.unwrap();
    assert!(status.completed);
    assert!(status.failures.is_empty());
    assert_eq!(store.documents(&IndexName::new("pre")).len(), 4);
}

// ============================================================================
// Aliases
// ============================================================================

#[tokio::test]
async fn alias_update_is_atomic() {
    let store = seeded("old", 0);
    store.insert_index("new", Mappings::default(), &[]);

    let actions = [
        AliasAction::Add {
            index: IndexName::new("new"),
            alias: ".kibana".into(),
            must_exist: false,
        },
        AliasAction::Remove {
            index: IndexName::new("old"),
            alias: ".kibana_missing".into(),
            must_exist: true,
        },
    ];
    let err = store.update_aliases(&actions).await.unwrap_err();
    assert!(err.is_type("aliases_not_found_exception"));
    assert_eq!(store.alias_targets(".kibana"), vec![IndexName::new("old")]);

    let swap = [
        AliasAction::Remove {
            index: IndexName::new("old"),
            alias: ".kibana".into(),
            must_exist: true,
        },
        AliasAction::Add {
            index: IndexName::new("new"),
            alias: ".kibana".into(),
            must_exist: false,
        },
        AliasAction::RemoveIndex {
            index: IndexName::new("old"),
        },
    ];
    store.update_aliases(&swap).await.unwrap();
    assert_eq!(store.alias_targets(".kibana"), vec![IndexName::new("new")]);
    assert!(store.index(&IndexName::new("old")).is_none());
}

#[tokio::test]
async fn fetch_indices_matches_names_and_aliases() {
    let store = seeded(".kibana_8.0.0_001", 0);
    store.insert_index("unrelated", Mappings::default(), &[]);

    let found = store.fetch_indices(".kibana").await.unwrap();
    assert_eq!(found.len(), 1);
    assert!(found[0].has_alias(".kibana"));
}

// ============================================================================
// Faults and Status
// ============================================================================

#[tokio::test]
async fn injected_faults_precede_real_work() {
    let store = seeded("source", 1);
    store.inject_times(Operation::OpenPointInTime, 2, StoreError::unavailable());
    let index = IndexName::new("source");

    assert!(store.open_point_in_time(&index, "10m").await.is_err());
    assert!(store.open_point_in_time(&index, "10m").await.is_err());
    assert!(store.open_point_in_time(&index, "10m").await.is_ok());

    assert_eq!(store.calls(Operation::OpenPointInTime), 3);
    assert_eq!(store.faults_injected(), 2);
    assert_eq!(store.open_pit_count(), 1);
}

#[tokio::test]
async fn unhealthy_index_times_out_waiting_for_status() {
    let store = seeded("source", 0);
    let index = IndexName::new("source");
    store.set_index_status(&index, IndexStatus::Red);

    let err = store
        .wait_for_index_status(&index, IndexStatus::Yellow, TIMEOUT)
        .await
        .unwrap_err();
    assert_eq!(err, StoreError::Timeout);

    store.set_index_status(&index, IndexStatus::Yellow);
    store
        .wait_for_index_status(&index, IndexStatus::Yellow, TIMEOUT)
        .await
        .unwrap();
}
