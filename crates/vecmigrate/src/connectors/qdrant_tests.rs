//! Tests for Qdrant connector.

use super::*;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config(url: &str) -> QdrantConfig {
    QdrantConfig {
        url: url.to_string(),
        collection: "docs".to_string(),
        api_key: Some("qd-key".to_string()),
        vector_name: None,
    }
}

fn connector(server: &MockServer) -> QdrantConnector {
    QdrantConnector::new(test_config(&server.uri()), Duration::from_secs(5))
}

fn collection_body(size: usize, distance: &str, points: u64) -> Value {
    json!({
        "result": {
            "status": "green",
            "points_count": points,
            "config": {"params": {"vectors": {"size": size, "distance": distance}}}
        },
        "status": "ok",
        "time": 0.001
    })
}

#[test]
fn test_destination_point_id_numeric() {
    assert_eq!(destination_point_id("42"), (json!(42), false));
    // Leading zeros would be lost as an integer.
    let (id, remapped) = destination_point_id("007");
    assert!(id.is_string());
    assert!(remapped);
}

#[test]
fn test_destination_point_id_uuid_kept() {
    let uuid = "5c56c793-69f3-4fbf-87e6-c4bf54c28c26";
    assert_eq!(destination_point_id(uuid), (json!(uuid), false));
}

#[test]
fn test_destination_point_id_string_is_stable() {
    let (first, remapped) = destination_point_id("doc-1");
    let (second, _) = destination_point_id("doc-1");
    assert!(remapped);
    assert_eq!(first, second);
    assert!(Uuid::parse_str(first.as_str().unwrap()).is_ok());
}

#[test]
fn test_id_round_trip_forms() {
    assert_eq!(id_to_string(&json!(7)), "7");
    assert_eq!(id_to_string(&json!("abc")), "abc");
    assert_eq!(id_to_json("7"), json!(7));
    assert_eq!(id_to_json("abc"), json!("abc"));
}

#[test]
fn test_vectors_config_untagged() {
    let single: VectorsConfig =
        serde_json::from_value(json!({"size": 4, "distance": "Cosine", "on_disk": true})).unwrap();
    assert!(matches!(single, VectorsConfig::Single(VectorParams { size: 4, .. })));

    let named: VectorsConfig =
        serde_json::from_value(json!({"text": {"size": 8, "distance": "Dot"}})).unwrap();
    assert!(matches!(named, VectorsConfig::Named(_)));
}

#[tokio::test]
async fn test_describe_reports_dimension_and_metric() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/collections/docs"))
        .and(header("api-key", "qd-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(collection_body(4, "Cosine", 12)))
        .mount(&server)
        .await;

    let description = connector(&server)
        .describe(&CollectionScope::new("docs"))
        .await
        .unwrap();

    assert_eq!(description.dimension, Some(4));
    assert_eq!(description.metric.as_deref(), Some("Cosine"));
    assert_eq!(description.total_count, Some(12));
}

#[tokio::test]
async fn test_list_ids_follows_next_page_offset() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/collections/docs/points/scroll"))
        .and(body_json(json!({"limit": 1000, "with_payload": false, "with_vector": false})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": {"points": [{"id": 1}, {"id": 2}], "next_page_offset": 3}
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/collections/docs/points/scroll"))
        .and(body_json(
            json!({"limit": 1000, "offset": 3, "with_payload": false, "with_vector": false}),
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": {"points": [{"id": 3}], "next_page_offset": null}
        })))
        .mount(&server)
        .await;

    let connector = connector(&server);
    let scope = CollectionScope::new("docs");

    let first = connector.list_ids(&scope, None).await.unwrap();
    assert_eq!(first.ids, vec!["1", "2"]);
    assert_eq!(first.next_cursor.as_deref(), Some("3"));

    let second = connector.list_ids(&scope, first.next_cursor).await.unwrap();
    assert_eq!(second.ids, vec!["3"]);
    assert!(second.next_cursor.is_none());
}

#[tokio::test]
async fn test_fetch_maps_points_and_defaults_payload() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/collections/docs/points"))
        .and(body_json(json!({"ids": [1, "abc"], "with_payload": true, "with_vector": true})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": [
                {"id": 1, "payload": {"title": "one"}, "vector": [0.1, 0.2]},
                {"id": "abc", "payload": null, "vector": [0.3, 0.4]}
            ]
        })))
        .mount(&server)
        .await;

    let items = connector(&server)
        .fetch(
            &CollectionScope::new("docs"),
            &["1".to_string(), "abc".to_string()],
        )
        .await
        .unwrap();

    assert_eq!(items.len(), 2);
    assert_eq!(items["1"].payload["title"], json!("one"));
    assert_eq!(items["abc"].vector, vec![0.3, 0.4]);
    assert!(items["abc"].payload.is_empty());
}

#[tokio::test]
async fn test_fetch_named_vector() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/collections/docs/points"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": [{"id": 5, "vector": {"text": [1.0, 2.0], "image": [3.0]}}]
        })))
        .mount(&server)
        .await;

    let mut config = test_config(&server.uri());
    config.vector_name = Some("text".to_string());
    let connector = QdrantConnector::new(config, Duration::from_secs(5));

    let items = connector
        .fetch(&CollectionScope::new("docs"), &["5".to_string()])
        .await
        .unwrap();
    assert_eq!(items["5"].vector, vec![1.0, 2.0]);
}

#[tokio::test]
async fn test_get_collection_missing_is_none() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/collections/docs"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "status": {"error": "Not found: Collection `docs` doesn't exist!"}
        })))
        .mount(&server)
        .await;

    let existing = connector(&server)
        .get_collection(&CollectionScope::new("docs"))
        .await
        .unwrap();
    assert!(existing.is_none());
}

#[tokio::test]
async fn test_create_collection_sends_vector_params() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/collections/docs"))
        .and(body_json(json!({"vectors": {"size": 4, "distance": "Dot"}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": true})))
        .expect(1)
        .mount(&server)
        .await;

    let descriptor = connector(&server)
        .create_collection(&CollectionScope::new("docs"), 4, DistanceMetric::DotProduct)
        .await
        .unwrap();

    assert_eq!(descriptor.dimension, 4);
    assert_eq!(descriptor.metric, DistanceMetric::DotProduct);
}

#[tokio::test]
async fn test_write_batch_waits_and_remaps_ids() {
    let server = MockServer::start().await;
    let remapped = Uuid::new_v5(&Uuid::NAMESPACE_OID, b"doc-1").to_string();
    Mock::given(method("PUT"))
        .and(path("/collections/docs/points"))
        .and(query_param("wait", "true"))
        .and(body_json(json!({
            "points": [
                {"id": 9, "vector": [1.0, 0.0], "payload": {}},
                {"id": remapped, "vector": [0.0, 1.0], "payload": {"_source_id": "doc-1"}}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": {"operation_id": 1, "status": "completed"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let items = vec![
        MigrationItem {
            id: "9".to_string(),
            vector: vec![1.0, 0.0],
            payload: Payload::new(),
        },
        MigrationItem {
            id: "doc-1".to_string(),
            vector: vec![0.0, 1.0],
            payload: Payload::new(),
        },
    ];

    let written = connector(&server)
        .write_batch(&CollectionScope::new("docs"), &items)
        .await
        .unwrap();
    assert_eq!(written, 2);
}

#[tokio::test]
async fn test_write_batch_failure_is_destination_error() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/collections/docs/points"))
        .respond_with(ResponseTemplate::new(400).set_body_string("wrong vector size"))
        .mount(&server)
        .await;

    let items = vec![MigrationItem {
        id: "1".to_string(),
        vector: vec![1.0],
        payload: Payload::new(),
    }];
    let err = connector(&server)
        .write_batch(&CollectionScope::new("docs"), &items)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::DestinationConnection(_)));
}

#[tokio::test]
async fn test_count_is_exact() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/collections/docs/points/count"))
        .and(body_json(json!({"exact": true})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": {"count": 250}})))
        .mount(&server)
        .await;

    let count = connector(&server)
        .count(&CollectionScope::new("docs"))
        .await
        .unwrap();
    assert_eq!(count, 250);
}

#[tokio::test]
async fn test_unauthorized_is_authentication_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/collections/docs"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
        .mount(&server)
        .await;

    let err = connector(&server)
        .describe(&CollectionScope::new("docs"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Authentication(_)));
}

#[tokio::test]
async fn test_fetch_point_without_vector_keeps_batch() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/collections/docs/points"))
        .and(body_json(json!({"ids": [1, 2], "with_payload": true, "with_vector": ["text"]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": [
                {"id": 1, "vector": {"text": [1.0, 2.0]}},
                {"id": 2, "vector": {}}
            ]
        })))
        .mount(&server)
        .await;

    let mut config = test_config(&server.uri());
    config.vector_name = Some("text".to_string());
    let connector = QdrantConnector::new(config, Duration::from_secs(5));

    let items = connector
        .fetch(
            &CollectionScope::new("docs"),
            &["1".to_string(), "2".to_string()],
        )
        .await
        .unwrap();

    assert_eq!(items.len(), 2);
    assert_eq!(items["1"].vector, vec![1.0, 2.0]);
    assert!(items["2"].vector.is_empty());
}

#[tokio::test]
async fn test_write_uses_detected_single_named_vector() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/collections/docs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": {
                "points_count": 0,
                "config": {"params": {"vectors": {"dense": {"size": 2, "distance": "Cosine"}}}}
            }
        })))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/collections/docs/points"))
        .and(body_json(json!({
            "points": [{"id": 1, "vector": {"dense": [0.5, 0.25]}, "payload": {}}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": {"operation_id": 1, "status": "completed"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let connector = connector(&server);
    let scope = CollectionScope::new("docs");

    let descriptor = connector.get_collection(&scope).await.unwrap().unwrap();
    assert_eq!(descriptor.dimension, 2);

    let items = vec![MigrationItem {
        id: "1".to_string(),
        vector: vec![0.5, 0.25],
        payload: Payload::new(),
    }];
    assert_eq!(connector.write_batch(&scope, &items).await.unwrap(), 1);
}
