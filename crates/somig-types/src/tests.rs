use std::time::Duration;

use serde_json::json;
use test_case::test_case;

use crate::*;

// ============================================================================
// SchemaVersion
// ============================================================================

#[test_case("7.10.0", SchemaVersion::new(7, 10, 0); "two digit minor")]
#[test_case("8.0.0", SchemaVersion::new(8, 0, 0); "major only")]
#[test_case(" 1.2.3 ", SchemaVersion::new(1, 2, 3); "surrounding whitespace")]
fn parses_valid_versions(input: &str, expected: SchemaVersion) {
    assert_eq!(input.parse::<SchemaVersion>().unwrap(), expected);
}

#[test_case(""; "empty")]
#[test_case("8.0"; "missing patch")]
#[test_case("8.0.0.1"; "too many components")]
#[test_case("8.x.0"; "non numeric")]
#[test_case("8..0"; "empty component")]
fn rejects_invalid_versions(input: &str) {
    assert!(input.parse::<SchemaVersion>().is_err());
}

#[test]
fn versions_order_numerically_not_lexically() {
    let a: SchemaVersion = "7.9.3".parse().unwrap();
    let b: SchemaVersion = "7.10.0".parse().unwrap();
    assert!(a < b);
    assert!(SchemaVersion::ZERO < a);
}

#[test]
fn version_serialises_as_string() {
    let v = SchemaVersion::new(8, 8, 0);
    assert_eq!(serde_json::to_value(v).unwrap(), json!("8.8.0"));
    let back: SchemaVersion = serde_json::from_value(json!("8.8.0")).unwrap();
    assert_eq!(back, v);
    assert!(serde_json::from_value::<SchemaVersion>(json!("nope")).is_err());
}

// ============================================================================
// Documents
// ============================================================================

#[test]
fn document_defaults_when_fields_missing() {
    let doc: MigratableDocument = serde_json::from_value(json!({
        "id": "dash-1",
        "type": "dashboard",
    }))
    .unwrap();

    assert_eq!(doc.migration_version, SchemaVersion::ZERO);
    assert!(doc.attributes.is_object());
    assert!(doc.references.is_empty());
    assert!(doc.namespaces.is_empty());
}

#[test]
fn attributes_mut_normalises_non_object_payload() {
    let mut doc = MigratableDocument::new("a", "tag", SchemaVersion::ZERO, json!(null));
    doc.attributes_mut().insert("name".into(), json!("x"));
    assert_eq!(doc.attribute("name"), Some(&json!("x")));
}

#[test]
fn attributes_mut_keeps_existing_object() {
    let mut doc = MigratableDocument::new("a", "tag", SchemaVersion::ZERO, json!({ "kept": 1 }));
    doc.attributes_mut().insert("name".into(), json!("x"));
    assert_eq!(doc.attributes, json!({ "kept": 1, "name": "x" }));
}

// ============================================================================
// Index names
// ============================================================================

#[test]
fn versioned_index_names() {
    let v = SchemaVersion::new(8, 1, 0);
    assert_eq!(IndexName::target(".kibana", v).as_str(), ".kibana_8.1.0_001");
    assert_eq!(IndexName::temp(".kibana", v).as_str(), ".kibana_8.1.0_reindex_temp");
    assert_eq!(IndexName::version_alias(".kibana", v).as_str(), ".kibana_8.1.0");
    assert_eq!(IndexName::pre_migration(".kibana", v).as_str(), ".kibana_pre8.1.0_001");
}

#[test]
fn mappings_property_names() {
    let mappings = Mappings::new(json!({
        "properties": { "type": { "type": "keyword" }, "dashboard": { "type": "object" } }
    }));
    let names: Vec<_> = mappings.property_names().into_iter().collect();
    assert_eq!(names, vec!["dashboard".to_string(), "type".to_string()]);
    assert!(Mappings::default().property_names().is_empty());
}

// ============================================================================
// RetryPolicy
// ============================================================================

#[test]
fn retry_delay_doubles_and_caps() {
    let policy = RetryPolicy::default();
    assert_eq!(policy.delay_for(1), Duration::from_secs(2));
    assert_eq!(policy.delay_for(2), Duration::from_secs(4));
    assert_eq!(policy.delay_for(6), Duration::from_secs(64));
    assert_eq!(policy.delay_for(7), Duration::from_secs(64));
    assert_eq!(policy.delay_for(40), Duration::from_secs(64));
}

#[test]
fn retry_ceiling_is_inclusive() {
    let policy = RetryPolicy::default().with_max_retries(3);
    assert!(policy.allows(3));
    assert!(!policy.allows(4));
}

#[test_case(503, true)]
#[test_case(429, true)]
#[test_case(401, true)]
#[test_case(400, false)]
#[test_case(404, false)]
#[test_case(500, false)]
fn default_retryable_statuses(status: u16, retryable: bool) {
    assert_eq!(RetryPolicy::default().is_retryable_status(status), retryable);
}

// ============================================================================
// ActionError
// ============================================================================

#[test]
fn only_transient_kinds_are_retryable() {
    assert!(ActionError::retryable("reset").is_retryable());
    assert!(
        ActionError::TaskStillRunning {
            task: TaskId::new("node:1")
        }
        .is_retryable()
    );
    assert!(
        !ActionError::IndexNotFound {
            index: IndexName::from("x")
        }
        .is_retryable()
    );
    assert!(!ActionError::unexpected("boom").is_retryable());
}

mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn version_display_parses_back(major in 0u32..1000, minor in 0u32..1000, patch in 0u32..1000) {
            let v = SchemaVersion::new(major, minor, patch);
            prop_assert_eq!(v.to_string().parse::<SchemaVersion>().unwrap(), v);
        }

        #[test]
        fn retry_delay_never_exceeds_cap(retry in 0u32..200) {
            let policy = RetryPolicy::default();
            prop_assert!(policy.delay_for(retry) <= Duration::from_secs(64));
        }
    }
}
