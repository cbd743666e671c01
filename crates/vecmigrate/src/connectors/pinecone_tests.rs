//! Tests for Pinecone connector.

use super::*;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config(server: &MockServer) -> PineconeConfig {
    PineconeConfig {
        api_key: "pc-key".to_string(),
        index: "docs".to_string(),
        namespace: None,
        host: Some(server.uri()),
        controller_url: server.uri(),
        cloud: "aws".to_string(),
        region: "us-east-1".to_string(),
    }
}

fn connector(server: &MockServer) -> PineconeConnector {
    PineconeConnector::new(test_config(server), Duration::from_secs(5))
}

fn index_model(uri: &str, dimension: usize, metric: &str) -> serde_json::Value {
    json!({
        "name": "docs",
        "dimension": dimension,
        "metric": metric,
        "host": uri,
        "spec": {"serverless": {"cloud": "aws", "region": "us-east-1"}},
        "status": {"ready": true, "state": "Ready"}
    })
}

async fn mount_stats(server: &MockServer, stats: serde_json::Value) {
    Mock::given(method("POST"))
        .and(path("/describe_index_stats"))
        .respond_with(ResponseTemplate::new(200).set_body_json(stats))
        .mount(server)
        .await;
}

#[test]
fn test_pinecone_config_defaults() {
    let json = r#"{"api_key":"k","index":"docs"}"#;
    let config: PineconeConfig = serde_json::from_str(json).unwrap();
    assert_eq!(config.controller_url, "https://api.pinecone.io");
    assert!(config.host.is_none());
    assert!(config.namespace.is_none());
}

#[test]
fn test_namespace_count() {
    let stats: IndexStats = serde_json::from_value(json!({
        "namespaces": {"": {"vectorCount": 3}, "prod": {"vectorCount": 7}},
        "dimension": 4,
        "totalVectorCount": 10
    }))
    .unwrap();
    assert_eq!(namespace_count(&stats, None), 10);
    assert_eq!(namespace_count(&stats, Some("prod")), 7);
    assert_eq!(namespace_count(&stats, Some("missing")), 0);
}

#[tokio::test]
async fn test_describe_reads_index_and_stats() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/indexes/docs"))
        .and(header("Api-Key", "pc-key"))
        .and(header("X-Pinecone-API-Version", API_VERSION))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(index_model(&server.uri(), 4, "dotproduct")),
        )
        .mount(&server)
        .await;
    mount_stats(
        &server,
        json!({"namespaces": {"prod": {"vectorCount": 5}}, "dimension": 4, "totalVectorCount": 5}),
    )
    .await;

    let scope = CollectionScope::new("docs").with_namespace(Some("prod".to_string()));
    let description = connector(&server).describe(&scope).await.unwrap();

    assert_eq!(description.dimension, Some(4));
    assert_eq!(description.metric.as_deref(), Some("dotproduct"));
    assert_eq!(description.total_count, Some(5));
}

#[tokio::test]
async fn test_list_ids_passes_pagination_token_and_namespace() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/vectors/list"))
        .and(query_param("paginationToken", "tok-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "vectors": [{"id": "c"}],
            "namespace": "prod"
        })))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/vectors/list"))
        .and(query_param("namespace", "prod"))
        .and(query_param("limit", "100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "vectors": [{"id": "a"}, {"id": "b"}],
            "pagination": {"next": "tok-1"},
            "namespace": "prod"
        })))
        .mount(&server)
        .await;

    let connector = connector(&server);
    let scope = CollectionScope::new("docs").with_namespace(Some("prod".to_string()));

    let first = connector.list_ids(&scope, None).await.unwrap();
    assert_eq!(first.ids, vec!["a", "b"]);
    assert_eq!(first.next_cursor.as_deref(), Some("tok-1"));

    let second = connector.list_ids(&scope, first.next_cursor).await.unwrap();
    assert_eq!(second.ids, vec!["c"]);
    assert!(second.next_cursor.is_none());
}

#[tokio::test]
async fn test_fetch_omits_unknown_ids() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/vectors/fetch"))
        .and(query_param("ids", "a"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "vectors": {
                "a": {"id": "a", "values": [0.5, 0.25], "metadata": {"genre": "drama"}}
            },
            "namespace": ""
        })))
        .mount(&server)
        .await;

    let items = connector(&server)
        .fetch(
            &CollectionScope::new("docs"),
            &["a".to_string(), "ghost".to_string()],
        )
        .await
        .unwrap();

    assert_eq!(items.len(), 1);
    assert_eq!(items["a"].vector, vec![0.5, 0.25]);
    assert_eq!(items["a"].payload["genre"], json!("drama"));
}

#[tokio::test]
async fn test_fetch_missing_metadata_is_empty_payload() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/vectors/fetch"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "vectors": {"a": {"id": "a", "values": [1.0]}}
        })))
        .mount(&server)
        .await;

    let items = connector(&server)
        .fetch(&CollectionScope::new("docs"), &["a".to_string()])
        .await
        .unwrap();
    assert!(items["a"].payload.is_empty());
}

#[tokio::test]
async fn test_host_resolved_from_control_plane() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/indexes/docs"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(index_model(&server.uri(), 4, "cosine")),
        )
        .expect(1)
        .mount(&server)
        .await;
    mount_stats(&server, json!({"namespaces": {}, "totalVectorCount": 42})).await;

    let mut config = test_config(&server);
    config.host = None;
    let connector = PineconeConnector::new(config, Duration::from_secs(5));

    let scope = CollectionScope::new("docs");
    assert_eq!(connector.count(&scope).await.unwrap(), 42);
    // Cached: the control plane is not asked again.
    assert_eq!(connector.count(&scope).await.unwrap(), 42);
}

#[tokio::test]
async fn test_create_collection_serverless_spec() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/indexes"))
        .and(body_json(json!({
            "name": "docs",
            "dimension": 8,
            "metric": "euclidean",
            "spec": {"serverless": {"cloud": "aws", "region": "us-east-1"}}
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "name": "docs", "dimension": 8, "metric": "euclidean",
            "status": {"ready": false, "state": "Initializing"}
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/indexes/docs"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(index_model(&server.uri(), 8, "euclidean")),
        )
        .mount(&server)
        .await;

    let descriptor = connector(&server)
        .create_collection(&CollectionScope::new("docs"), 8, DistanceMetric::Euclidean)
        .await
        .unwrap();

    assert_eq!(descriptor.dimension, 8);
    assert_eq!(descriptor.metric, DistanceMetric::Euclidean);
}

#[tokio::test]
async fn test_get_collection_missing_is_none() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/indexes/docs"))
        .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
        .mount(&server)
        .await;

    let existing = connector(&server)
        .get_collection(&CollectionScope::new("docs"))
        .await
        .unwrap();
    assert!(existing.is_none());
}

#[tokio::test]
async fn test_write_batch_upserts_with_namespace() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/vectors/upsert"))
        .and(body_json(json!({
            "vectors": [
                {"id": "1", "values": [1.0, 2.0], "metadata": {"k": "v"}},
                {"id": "2", "values": [3.0, 4.0]}
            ],
            "namespace": "prod"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"upsertedCount": 2})))
        .expect(1)
        .mount(&server)
        .await;

    let items = vec![
        MigrationItem {
            id: "1".to_string(),
            vector: vec![1.0, 2.0],
            payload: Payload::from([("k".to_string(), json!("v"))]),
        },
        MigrationItem {
            id: "2".to_string(),
            vector: vec![3.0, 4.0],
            payload: Payload::new(),
        },
    ];

    let scope = CollectionScope::new("docs").with_namespace(Some("prod".to_string()));
    let written = connector(&server).write_batch(&scope, &items).await.unwrap();
    assert_eq!(written, 2);
}

#[tokio::test]
async fn test_rate_limit_maps_to_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/vectors/list"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .mount(&server)
        .await;

    let err = connector(&server)
        .list_ids(&CollectionScope::new("docs"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::RateLimit(_)));
}

#[tokio::test]
async fn test_fetch_splits_large_batches() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/vectors/fetch"))
        .and(query_param("ids", "id-0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "vectors": {"id-0": {"id": "id-0", "values": [1.0]}}
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/vectors/fetch"))
        .and(query_param("ids", "id-100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "vectors": {"id-100": {"id": "id-100", "values": [2.0]}}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let ids: Vec<String> = (0..150).map(|i| format!("id-{i}")).collect();
    let items = connector(&server)
        .fetch(&CollectionScope::new("docs"), &ids)
        .await
        .unwrap();

    assert_eq!(items.len(), 2);
    assert_eq!(items["id-100"].vector, vec![2.0]);
}
