//! Integration tests for document CRUD, search, and extraction tools.

mod common;

use common::{MapEmbedder, TestEnv};
use contextframe_mcp::monitoring::OperationStatus;
use contextframe_mcp::tools::*;
use serde_json::json;

#[tokio::test]
async fn test_add_then_get_preserves_metadata() {
    let env = TestEnv::new();
    let added = execute_add_document(
        &env.dataset,
        None,
        serde_json::from_value(json!({
            "content": "Columnar storage fundamentals.",
            "metadata": {
                "title": "Columnar 101",
                "author": "ada",
                "tags": ["storage", "columnar"],
                "status": "published",
                "collection": "papers",
                "custom_metadata": {"priority": "1", "team": "infra"},
            },
        }))
        .unwrap(),
    )
    .await
    .unwrap();

    let fetched = execute_get_document(
        &env.dataset,
        serde_json::from_value(json!({"document_id": added.document_id.to_string()})).unwrap(),
    )
    .await
    .unwrap();

    let doc = fetched.document;
    assert_eq!(doc.uuid, added.document_id);
    assert_eq!(doc.content, "Columnar storage fundamentals.");
    assert_eq!(doc.metadata.title.as_deref(), Some("Columnar 101"));
    assert_eq!(doc.metadata.author.as_deref(), Some("ada"));
    assert!(doc.metadata.tags_equal(&["columnar".into(), "storage".into()]));
    assert_eq!(
        doc.metadata.status,
        Some(contextframe_mcp::DocumentStatus::Published)
    );
    assert_eq!(doc.metadata.custom_metadata["priority"], "1");
    assert_eq!(doc.metadata.custom_metadata["team"], "infra");
}

#[tokio::test]
async fn test_update_changes_only_touched_paths() {
    let env = TestEnv::new();
    let added = execute_add_document(
        &env.dataset,
        None,
        serde_json::from_value(json!({
            "content": "v1",
            "metadata": {"title": "T1", "author": "ada", "tags": ["keep"]},
        }))
        .unwrap(),
    )
    .await
    .unwrap();

    execute_update_document(
        &env.dataset,
        serde_json::from_value(json!({
            "document_id": added.document_id.to_string(),
            "content": "v2",
            "metadata": {"title": "T2"},
        }))
        .unwrap(),
    )
    .await
    .unwrap();

    let fetched = execute_get_document(
        &env.dataset,
        serde_json::from_value(json!({"document_id": added.document_id.to_string()})).unwrap(),
    )
    .await
    .unwrap();

    assert_eq!(fetched.document.content, "v2");
    assert_eq!(fetched.document.metadata.title.as_deref(), Some("T2"));
    // Untouched paths unchanged
    assert_eq!(fetched.document.metadata.author.as_deref(), Some("ada"));
    assert_eq!(fetched.document.metadata.tags, vec!["keep"]);
    assert!(fetched.document.metadata.updated_at.is_some());
}

#[tokio::test]
async fn test_vector_search_returns_most_similar() {
    // Three documents with distinct vectors; querying with B's vector
    // must return B first.
    let env = TestEnv::new();
    env.add_doc_with_vector("alpha doc", "A", vec![1.0, 0.0, 0.0]).await;
    let b = env
        .add_doc_with_vector("beta doc", "B", vec![0.0, 1.0, 0.0])
        .await;
    env.add_doc_with_vector("gamma doc", "C", vec![0.0, 0.0, 1.0]).await;

    let embedder: std::sync::Arc<dyn contextframe_mcp::embed::EmbeddingProvider> =
        MapEmbedder::new(&[("B", vec![0.0, 1.0, 0.0])]);
    let output = execute_search_documents(
        &env.dataset,
        Some(&embedder),
        &env.server.analytics().queries,
        &env.server.analytics().advisor,
        serde_json::from_value(json!({
            "query": "B",
            "search_type": "vector",
            "limit": 1,
        }))
        .unwrap(),
    )
    .await
    .unwrap();
    assert_eq!(output.documents.len(), 1);
    assert_eq!(output.documents[0].uuid, b);

    // One query execution was recorded for the analyzer
    assert_eq!(env.server.analytics().queries.len(), 1);
}

#[tokio::test]
async fn test_search_records_perf_metric_via_shim() {
    let env = TestEnv::new();
    env.add_doc("searchable text here", "Doc").await;

    // Drive the shim the way call_tool does around a search
    let monitoring = env.server.monitoring();
    monitoring
        .performance
        .start_operation("op-s1", "tools/call", None, None);
    let output = execute_search_documents(
        &env.dataset,
        None,
        &env.server.analytics().queries,
        &env.server.analytics().advisor,
        serde_json::from_value(json!({"query": "searchable", "limit": 5})).unwrap(),
    )
    .await
    .unwrap();
    monitoring
        .performance
        .end_operation("op-s1", OperationStatus::Success, Some(128), None);

    assert_eq!(output.documents.len(), 1);
    let metrics = monitoring.performance.operation_metrics(Some("tools/call"));
    assert_eq!(metrics["tools/call"].count, 1);
    assert_eq!(metrics["tools/call"].error_count, 0);
    // Exactly one perf metric in the buffer
    assert_eq!(monitoring.collector.buffer_sizes().1, 1);
}

#[tokio::test]
async fn test_knn_with_fewer_rows_than_k() {
    let env = TestEnv::new();
    env.add_doc_with_vector("has vector", "V", vec![1.0, 0.0]).await;
    env.add_doc("no vector", "N").await;

    let hits = env.dataset.knn_search(&[1.0, 0.0], 10, None).await.unwrap();
    // Only rows that have vectors come back, in similarity order
    assert_eq!(hits.len(), 1);
    assert!(hits[0].score > 0.99);
}

#[tokio::test]
async fn test_hybrid_search_merges_scores() {
    let env = TestEnv::new();
    let both = env
        .add_doc_with_vector("ranking systems overview", "Both", vec![1.0, 0.0])
        .await;
    env.add_doc_with_vector("unrelated vectors", "VecOnly", vec![0.9, 0.1]).await;

    let embedder: std::sync::Arc<dyn contextframe_mcp::embed::EmbeddingProvider> =
        MapEmbedder::new(&[("ranking", vec![1.0, 0.0])]);
    let output = execute_search_documents(
        &env.dataset,
        Some(&embedder),
        &env.server.analytics().queries,
        &env.server.analytics().advisor,
        serde_json::from_value(json!({
            "query": "ranking",
            "search_type": "hybrid",
            "limit": 2,
        }))
        .unwrap(),
    )
    .await
    .unwrap();

    // The document matching both signals ranks first
    assert_eq!(output.documents[0].uuid, both);
}

#[tokio::test]
async fn test_document_usage_events_from_tool_results() {
    let env = TestEnv::new();
    let id = env.add_doc("tracked content", "Tracked").await;

    // get_document result drives a read event
    let get_output = execute_get_document(
        &env.dataset,
        serde_json::from_value(json!({"document_id": id.to_string()})).unwrap(),
    )
    .await
    .unwrap();
    let call_result = rmcp::model::CallToolResult::success(vec![rmcp::model::Content::text(
        serde_json::to_string(&get_output).unwrap(),
    )]);
    env.server
        .record_document_usage("get_document", None, &call_result, Some("agent-x"));

    let stats = env
        .server
        .monitoring()
        .usage
        .document_usage(&id.to_string())
        .expect("document access recorded");
    assert_eq!(stats.access_count, 1);
    assert_eq!(stats.access_by_operation["read"], 1);

    // search_documents result drives one search_hit per returned doc
    let search_output = execute_search_documents(
        &env.dataset,
        None,
        &env.server.analytics().queries,
        &env.server.analytics().advisor,
        serde_json::from_value(json!({"query": "tracked", "limit": 5})).unwrap(),
    )
    .await
    .unwrap();
    let call_result = rmcp::model::CallToolResult::success(vec![rmcp::model::Content::text(
        serde_json::to_string(&search_output).unwrap(),
    )]);
    env.server
        .record_document_usage("search_documents", None, &call_result, None);

    let stats = env
        .server
        .monitoring()
        .usage
        .document_usage(&id.to_string())
        .unwrap();
    assert_eq!(stats.search_appearances, 1);
    assert_eq!(stats.access_count, 2);
}

#[tokio::test]
async fn test_extract_from_file_into_dataset() {
    let env = TestEnv::new();
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("guide.md");
    std::fs::write(&path, "---\nauthor: grace\n---\n# Field Guide\n\nContents.\n").unwrap();

    let output = execute_extract_from_file(
        &env.dataset,
        None,
        serde_json::from_value(json!({
            "file_path": path.to_string_lossy(),
            "collection": "imported",
            "generate_embedding": false,
        }))
        .unwrap(),
    )
    .await
    .unwrap();

    let id = output.document_id.unwrap();
    let stored = env.dataset.get_by_uuid(id).await.unwrap().unwrap();
    assert_eq!(stored.metadata.title.as_deref(), Some("Field Guide"));
    assert_eq!(stored.metadata.custom_metadata["author"], "grace");
    assert_eq!(stored.metadata.collection.as_deref(), Some("imported"));
}

#[tokio::test]
async fn test_batch_extract_only_matching_patterns() {
    let env = TestEnv::new();
    let dir = tempfile::TempDir::new().unwrap();
    std::fs::write(dir.path().join("one.md"), "# One\n").unwrap();
    std::fs::write(dir.path().join("two.yaml"), "name: two\n").unwrap();
    std::fs::write(dir.path().join("ignore.bin"), "xx").unwrap();

    let output = execute_batch_extract(
        &env.dataset,
        None,
        serde_json::from_value(json!({
            "directory": dir.path().to_string_lossy(),
            "patterns": ["*.md", "*.yaml"],
            "generate_embedding": false,
        }))
        .unwrap(),
    )
    .await
    .unwrap();

    assert_eq!(output.files_processed, 2);
    assert_eq!(output.documents_added, 2);
    assert_eq!(env.dataset.count_rows(None).await.unwrap(), 2);
}

#[tokio::test]
async fn test_batch_enhance_mixed_outcomes() {
    let env = TestEnv::new();
    let a = env.add_doc("first", "A").await;
    let b = env.add_doc("second", "B").await;

    let enhancer = contextframe_mcp::enhance::Enhancer::new(
        contextframe_mcp::enhance::testing::ScriptedClient::new(vec![
            Ok(json!({"title": "First"})),
            Err(contextframe_mcp::error::ServerError::Enhance(
                contextframe_mcp::error::EnhanceError::Provider("overloaded".into()),
            )),
        ]),
    );
    let output = execute_batch_enhance(
        &env.dataset,
        &enhancer,
        serde_json::from_value(json!({
            "document_ids": [a.to_string(), b.to_string()],
            "field": "title",
        }))
        .unwrap(),
    )
    .await
    .unwrap();

    assert_eq!(output.succeeded, 1);
    assert_eq!(output.failed, 1);
    assert!(output.results[1].error.as_ref().unwrap().contains("overloaded"));
    let first = env.dataset.get_by_uuid(a).await.unwrap().unwrap();
    assert_eq!(first.metadata.title.as_deref(), Some("First"));
    // The failed record kept its original title
    let second = env.dataset.get_by_uuid(b).await.unwrap().unwrap();
    assert_eq!(second.metadata.title.as_deref(), Some("B"));
}
