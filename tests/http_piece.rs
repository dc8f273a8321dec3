mod common;

use common::{flow, TestEngine};
use serde_json::{json, Value};
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn http_step(name: &str, input: Value) -> Value {
    json!({
        "type": "PIECE",
        "name": name,
        "displayName": "Send request",
        "settings": {
            "pieceName": "http",
            "pieceVersion": "0.1.0",
            "actionName": "send_request",
            "input": input,
        }
    })
}

#[tokio::test]
async fn send_request_returns_status_headers_and_body() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/orders"))
        .and(query_param("dryRun", "true"))
        .and(header("x-api-key", "secret-token"))
        .and(body_json(json!({ "sku": "A-1", "quantity": 2 })))
        .respond_with(
            ResponseTemplate::new(201)
                .insert_header("x-request-id", "abc")
                .set_body_json(json!({ "id": 42 })),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let engine = TestEngine::new();
    let flow = flow(http_step(
        "create_order",
        json!({
            "method": "POST",
            "url": format!("{}/api/orders", mock_server.uri()),
            "headers": { "x-api-key": "{{connections.gmail.access_token}}" },
            "queryParams": { "dryRun": true },
            "body": { "sku": "{{trigger.sku}}", "quantity": "{{trigger.quantity}}" },
        }),
    ));

    let output = engine.begin(flow, json!({ "sku": "A-1", "quantity": 2 })).await;

    assert_eq!(output["status"], "SUCCEEDED");
    let step = &output["steps"]["create_order"];
    assert_eq!(step["output"]["status"], 201);
    assert_eq!(step["output"]["body"], json!({ "id": 42 }));
    assert_eq!(step["output"]["headers"]["x-request-id"], "abc");
    assert_eq!(step["input"]["headers"]["x-api-key"], "**REDACTED**");
}

#[tokio::test]
async fn non_success_status_fails_step_with_response() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "error": "not found" })))
        .mount(&mock_server)
        .await;

    let engine = TestEngine::new();
    let flow = flow(http_step("fetch", json!({ "url": format!("{}/missing", mock_server.uri()) })));

    let output = engine.begin(flow, json!({})).await;

    assert_eq!(output["status"], "FAILED");
    assert_eq!(output["steps"]["fetch"]["status"], "FAILED");
    assert_eq!(
        output["error"]["message"],
        json!({ "status": 404, "body": { "error": "not found" } })
    );
}

#[tokio::test]
async fn unreachable_host_fails_step() {
    let engine = TestEngine::new();
    // Port 9 (discard) is not served in the test environment
    let flow = flow(http_step("fetch", json!({ "url": "http://127.0.0.1:9/nothing", "timeout": 2 })));

    let output = engine.begin(flow, json!({})).await;

    assert_eq!(output["status"], "FAILED");
    assert!(output["error"]["message"]
        .as_str()
        .unwrap()
        .starts_with("HTTP request failed"));
}

#[tokio::test]
async fn missing_url_is_a_validation_error() {
    let engine = TestEngine::new();
    let flow = flow(http_step("fetch", json!({ "method": "TRACE" })));

    let output = engine.begin(flow, json!({})).await;

    assert_eq!(output["status"], "FAILED");
    let message = output["error"]["message"].as_object().unwrap();
    assert_eq!(message["url"], "Expected value but got nothing");
    assert!(message.contains_key("method"));
}
