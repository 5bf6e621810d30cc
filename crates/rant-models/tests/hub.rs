//! HubClient and full acquisitions against a mock HTTP hub.

mod common;

use common::{descriptor, sha256_hex, REVISION};
use rant_models::{HubClient, HubConfig, ModelError, ModelManager, RemoteRepository, TreeListing};
use tempfile::tempdir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn tree_path(p: &str) -> String {
    format!("/api/models/owner/test-model/tree/{}/{}", REVISION, p)
}

fn resolve_path(p: &str) -> String {
    format!("/owner/test-model/resolve/{}/{}", REVISION, p)
}

fn manager_for(server: &MockServer, root: &std::path::Path) -> ModelManager {
    ModelManager::with_config(root.to_path_buf(), HubConfig::with_base_url(server.uri()))
}

#[tokio::test]
async fn not_found_listing_means_single_file() {
    let server = MockServer::start().await;
    let dir = tempdir().unwrap();

    Mock::given(method("GET"))
        .and(path(tree_path("a.bin")))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(resolve_path("a.bin")))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"hello".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let manager = manager_for(&server, dir.path());
    let mut d = descriptor(&["a.bin"]);
    d.file_hashes.insert("a.bin".to_string(), sha256_hex(b"hello"));

    let first = manager.acquire(&d, |_| {}).await.unwrap();
    assert!(first.join("a.bin").is_file());
    assert!(manager.is_verified(&d).await);

    // Served from cache: the mocks above still see exactly one hit each
    let second = manager.acquire(&d, |_| {}).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn directory_listing_with_lfs_entries() {
    let server = MockServer::start().await;
    let dir = tempdir().unwrap();
    let weights = vec![9u8; 2048];

    let root_listing = serde_json::json!([
        {"type": "file", "oid": "1", "size": 4, "path": "Encoder.mlmodelc/model.mil"},
        {"type": "directory", "oid": "2", "size": 0, "path": "Encoder.mlmodelc/weights"}
    ]);
    let weights_listing = serde_json::json!([
        {
            "type": "file", "oid": "3", "size": 133,
            "lfs": {"oid": sha256_hex(&weights), "size": weights.len(), "pointerSize": 133},
            "path": "Encoder.mlmodelc/weights/weight.bin"
        }
    ]);

    Mock::given(method("GET"))
        .and(path(tree_path("Encoder.mlmodelc")))
        .respond_with(ResponseTemplate::new(200).set_body_json(root_listing))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(tree_path("Encoder.mlmodelc/weights")))
        .respond_with(ResponseTemplate::new(200).set_body_json(weights_listing))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(resolve_path("Encoder.mlmodelc/model.mil")))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"prog".to_vec()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(resolve_path("Encoder.mlmodelc/weights/weight.bin")))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(weights.clone()))
        .mount(&server)
        .await;

    let manager = manager_for(&server, dir.path());
    let d = descriptor(&["Encoder.mlmodelc"]);
    let mut fractions = Vec::new();
    let entry = manager
        .acquire(&d, |p| fractions.push(p.fraction))
        .await
        .unwrap();

    assert_eq!(std::fs::read(entry.join("Encoder.mlmodelc/model.mil")).unwrap(), b"prog");
    assert_eq!(
        std::fs::read(entry.join("Encoder.mlmodelc/weights/weight.bin")).unwrap(),
        weights
    );
    assert_eq!(fractions.last().copied(), Some(1.0));
}

#[tokio::test]
async fn listing_server_error_aborts() {
    let server = MockServer::start().await;
    let dir = tempdir().unwrap();

    Mock::given(method("GET"))
        .and(path(tree_path("a.bin")))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let manager = manager_for(&server, dir.path());
    let err = manager.acquire(&descriptor(&["a.bin"]), |_| {}).await.unwrap_err();
    assert!(matches!(err, ModelError::ListingFailed(_)));
}

#[tokio::test]
async fn malformed_listing_aborts() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(tree_path("Decoder.mlmodelc")))
        .respond_with(ResponseTemplate::new(200).set_body_string("{not json"))
        .mount(&server)
        .await;

    let client = HubClient::connect(&HubConfig::with_base_url(server.uri())).unwrap();
    let err = client
        .list_tree("owner/test-model", REVISION, "Decoder.mlmodelc")
        .await
        .unwrap_err();
    assert!(matches!(err, ModelError::MalformedListing(_)));
}

#[tokio::test]
async fn client_maps_statuses() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(tree_path("vocab.json")))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(resolve_path("vocab.json")))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let client = HubClient::connect(&HubConfig::with_base_url(server.uri())).unwrap();
    let listing = client
        .list_tree("owner/test-model", REVISION, "vocab.json")
        .await
        .unwrap();
    assert_eq!(listing, TreeListing::NotFound);

    let err = client
        .open("owner/test-model", REVISION, "vocab.json")
        .await
        .unwrap_err();
    assert!(matches!(err, ModelError::DownloadFailed(_)));
}

#[tokio::test]
async fn truncated_body_is_rejected() {
    let server = MockServer::start().await;
    let dir = tempdir().unwrap();

    let listing = serde_json::json!([
        {"type": "file", "size": 100, "path": "weights/weight.bin"}
    ]);
    Mock::given(method("GET"))
        .and(path(tree_path("weights")))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(resolve_path("weights/weight.bin")))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 40]))
        .mount(&server)
        .await;

    let manager = manager_for(&server, dir.path());
    let d = descriptor(&["weights"]);
    let err = manager.acquire(&d, |_| {}).await.unwrap_err();

    assert!(matches!(err, ModelError::DownloadFailed(_)));
    let entry = manager.model_path(&d);
    assert!(!entry.join("weights/weight.bin").exists());
    assert!(!entry.join("weights/.weight.bin.part").exists());
}
