//! Integration tests for the error taxonomy and its JSON-RPC mapping.

mod common;

use common::TestEnv;
use contextframe_mcp::error::ServerError;
use contextframe_mcp::tools::*;
use rmcp::ErrorData;
use serde_json::json;
use uuid::Uuid;

/// Converts a server error the way the protocol layer does and returns
/// (code, message, data).
fn to_wire(err: ServerError) -> (i32, String, serde_json::Value) {
    let data: ErrorData = err.into();
    (
        data.code.0,
        data.message.to_string(),
        data.data.unwrap_or_default(),
    )
}

#[tokio::test]
async fn test_non_string_custom_metadata_maps_to_invalid_params() {
    let env = TestEnv::new();
    let err = execute_add_document(
        &env.dataset,
        None,
        serde_json::from_value(json!({
            "content": "x",
            "metadata": {"custom_metadata": {"priority": 1}},
        }))
        .unwrap(),
    )
    .await
    .unwrap_err();

    let (code, message, data) = to_wire(err);
    assert_eq!(code, -32602);
    assert!(message.contains("custom_metadata.priority"));
    assert_eq!(data["kind"], "validation");
    assert_eq!(data["errors"][0]["field"], "custom_metadata.priority");
    assert!(data["errors"][0]["hint"]
        .as_str()
        .unwrap()
        .to_lowercase()
        .contains("string"));
}

#[tokio::test]
async fn test_multi_field_diagnostics_are_stable_bullets() {
    let env = TestEnv::new();
    let run = || async {
        execute_add_document(
            &env.dataset,
            None,
            serde_json::from_value(json!({
                "content": "x",
                "metadata": {
                    "status": "live",
                    "custom_metadata": {"a": 1, "b": true},
                },
            }))
            .unwrap(),
        )
        .await
        .unwrap_err()
        .to_string()
    };

    let first = run().await;
    let second = run().await;
    // Stable across runs, bullet list in message order: status is
    // checked before custom metadata, custom keys in key order
    assert_eq!(first, second);
    let status = first.find("- status").unwrap();
    let a = first.find("custom_metadata.a").unwrap();
    let b = first.find("custom_metadata.b").unwrap();
    assert!(status < a && a < b);
    assert!(first.contains("  - "));
}

#[tokio::test]
async fn test_unknown_relationship_type_lists_valid_set() {
    let env = TestEnv::new();
    let err = execute_add_document(
        &env.dataset,
        None,
        serde_json::from_value(json!({
            "content": "x",
            "relationships": [{"type": "sibling", "target_uri": "ctx://a"}],
        }))
        .unwrap(),
    )
    .await
    .unwrap_err();

    let message = err.to_string();
    for valid in ["parent", "child", "related", "reference", "contains", "member_of"] {
        assert!(message.contains(valid), "missing {valid} in: {message}");
    }
}

#[tokio::test]
async fn test_malformed_uuid_cites_expected_format() {
    let env = TestEnv::new();
    let err = execute_get_document(
        &env.dataset,
        serde_json::from_value(json!({"document_id": "12345"})).unwrap(),
    )
    .await
    .unwrap_err();

    let (code, _, data) = to_wire(err);
    assert_eq!(code, -32602);
    assert!(data["errors"][0]["hint"]
        .as_str()
        .unwrap()
        .contains("xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx"));
}

#[tokio::test]
async fn test_missing_document_is_invalid_params_with_hint() {
    let env = TestEnv::new();
    let err = execute_get_document(
        &env.dataset,
        serde_json::from_value(json!({"document_id": Uuid::new_v4().to_string()})).unwrap(),
    )
    .await
    .unwrap_err();

    assert!(err.is_client_fixable());
    let (code, _, data) = to_wire(err);
    assert_eq!(code, -32602);
    assert_eq!(data["kind"], "not_found");
    assert!(data["hints"][0].as_str().unwrap().contains("list_documents"));
}

#[tokio::test]
async fn test_duplicate_insert_is_conflict() {
    let env = TestEnv::new();
    let id = env.add_doc("original", "O").await;
    let record = env.dataset.get_by_uuid(id).await.unwrap().unwrap();
    let err = env.dataset.add(record).await.unwrap_err();

    assert_eq!(err.kind(), "conflict");
    let (code, _, data) = to_wire(err);
    assert_eq!(code, -32602);
    assert_eq!(data["kind"], "conflict");
}

#[test]
fn test_timeout_maps_to_server_error_code_with_marker() {
    let (code, message, data) = to_wire(ServerError::Timeout { seconds: 30 });
    assert_eq!(code, -32000);
    assert!(message.contains("30"));
    assert_eq!(data["timeout"], true);
    assert_eq!(data["kind"], "timeout");
}

#[test]
fn test_dataset_fault_is_internal_error() {
    let err = ServerError::Dataset(contextframe_mcp::error::DatasetError::Write(
        "disk full".into(),
    ));
    assert!(!err.is_client_fixable());
    let (code, _, data) = to_wire(err);
    assert_eq!(code, -32603);
    assert_eq!(data["kind"], "io");
}

#[test]
fn test_llm_failure_is_external_internal_error() {
    let err = ServerError::Enhance(contextframe_mcp::error::EnhanceError::Provider(
        "upstream 503".into(),
    ));
    let (code, message, data) = to_wire(err);
    assert_eq!(code, -32603);
    assert!(message.contains("503"));
    assert_eq!(data["kind"], "external");
}

#[tokio::test]
async fn test_unsupported_filter_surfaces_as_io_error() {
    let env = TestEnv::new();
    env.add_doc("row", "R").await;
    let err = env
        .dataset
        .count_rows(Some("content LIKE '%x%'"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "io");
    assert!(err.to_string().contains("unsupported filter"));
}

#[tokio::test]
async fn test_invalid_time_range_is_validation_error() {
    let env = TestEnv::new();
    let err = execute_analyze_usage(
        &env.server.analytics().usage,
        serde_json::from_value(json!({"time_range": "fortnight"})).unwrap(),
    )
    .await
    .unwrap_err();

    let (code, _, data) = to_wire(err);
    assert_eq!(code, -32602);
    assert_eq!(data["errors"][0]["field"], "time_range");
}
