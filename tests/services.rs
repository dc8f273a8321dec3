use autoflow::services::{
    ConnectionService, FileService, HttpConnectionService, HttpFileService, HttpStore, SqliteStore, StepFiles,
    StoreService, WorkerApi,
};
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn api(server: &MockServer) -> WorkerApi {
    WorkerApi::new(&format!("{}/api", server.uri()), "engine-token").unwrap()
}

#[tokio::test]
async fn http_store_reads_writes_and_deletes_entries() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/store-entries"))
        .and(query_param("key", "flow_f1/counter"))
        .and(header("authorization", "Bearer engine-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "key": "flow_f1/counter", "value": 3 })))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/store-entries"))
        .and(query_param("key", "missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/store-entries"))
        .and(body_json(json!({ "key": "flow_f1/counter", "value": 4 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "key": "flow_f1/counter", "value": 4 })))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/v1/store-entries"))
        .and(query_param("key", "flow_f1/counter"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let store = HttpStore::new(api(&mock_server));

    assert_eq!(store.get("flow_f1/counter").await.unwrap(), Some(json!(3)));
    assert_eq!(store.get("missing").await.unwrap(), None);
    assert_eq!(store.put("flow_f1/counter", json!(4)).await.unwrap(), json!(4));
    store.delete("flow_f1/counter").await.unwrap();
}

#[tokio::test]
async fn http_store_surfaces_server_errors() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/store-entries"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let store = HttpStore::new(api(&mock_server));

    assert!(store.get("anything").await.is_err());
}

#[tokio::test]
async fn http_connections_unwrap_value_and_swallow_failures() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/worker/app-connections/slack"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "name": "slack", "value": { "token": "xoxb" } })),
        )
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/worker/app-connections/broken"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let connections = HttpConnectionService::new(api(&mock_server));

    assert_eq!(connections.get("slack").await, Some(json!({ "token": "xoxb" })));
    assert_eq!(connections.get("unknown").await, None);
    assert_eq!(connections.get("broken").await, None);
}

#[tokio::test]
async fn http_files_upload_and_return_url() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/step-files"))
        .and(query_param("flowId", "flow-1"))
        .and(query_param("stepName", "export"))
        .and(query_param("fileName", "report.csv"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "url": "https://files.example.com/1" })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let backend: Arc<dyn FileService> = Arc::new(HttpFileService::new(api(&mock_server)));
    let files = StepFiles::new(backend, "flow-1", "export");

    let url = files.write("report.csv", b"a,b\n1,2\n".to_vec()).await.unwrap();

    assert_eq!(url, "https://files.example.com/1");
}

#[tokio::test]
async fn sqlite_store_persists_per_project() {
    let dir = tempfile::tempdir().unwrap();
    let data_dir = dir.path().to_string_lossy().to_string();

    {
        let store = SqliteStore::open(&data_dir, "project-1").await.unwrap();
        store.put("greeting", json!({ "text": "hello" })).await.unwrap();
    }

    let reopened = SqliteStore::open(&data_dir, "project-1").await.unwrap();
    assert_eq!(reopened.get("greeting").await.unwrap(), Some(json!({ "text": "hello" })));

    let other = SqliteStore::open(&data_dir, "project-2").await.unwrap();
    assert_eq!(other.get("greeting").await.unwrap(), None);
    assert!(dir.path().join("project-1").join("store.db").exists());
}
