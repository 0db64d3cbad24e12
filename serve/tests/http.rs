//! HTTP-level tests: health, conversation JSON, and SSE framing of the page
//! generation stream.

use std::sync::Arc;

use futures_util::StreamExt;
use lectern::llm::MockLlm;
use lectern::{Service, Settings};
use serde_json::{json, Value};

fn test_service(llm: MockLlm) -> Arc<Service> {
    let settings = Arc::new(Settings::from_env());
    settings.set_use_mock_data(true);
    Arc::new(Service::build(settings, Arc::new(llm)).expect("service builds"))
}

/// Binds the app on an ephemeral port, returns its base URL.
async fn spawn_app(service: Arc<Service>) -> String {
    let app = serve::router(service);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn health_endpoint_reports_healthy() {
    let base = spawn_app(test_service(MockLlm::new("{}"))).await;
    let body: Value = reqwest::get(format!("{base}/api/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn conversation_endpoint_returns_legacy_action() {
    let service = test_service(MockLlm::scripted(
        [
            json!({"intent": "chat_smalltalk", "confidence": 0.97}).to_string(),
            "Hi there!".to_string(),
        ],
        "{}",
    ));
    let base = spawn_app(service).await;

    let body: Value = reqwest::Client::new()
        .post(format!("{base}/api/conversation"))
        .json(&json!({"message": "hello", "teacherId": "t-1"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["action"], "chat");
    assert_eq!(body["legacyAction"], "chat_smalltalk");
    assert_eq!(body["chatResponse"], "Hi there!");
    assert!(body["conversationId"].as_str().unwrap().starts_with("conv-"));
}

#[tokio::test]
async fn page_generate_streams_sse_until_complete() {
    let service = test_service(MockLlm::new("A short generated summary."));
    let base = spawn_app(service).await;

    let blueprint = json!({
        "id": "bp-1",
        "name": "Assignment analysis",
        "sourcePrompt": "analyze",
        "dataContract": {"inputs": [], "bindings": [{
            "id": "submissions", "sourceType": "tool",
            "toolName": "get_assignment_submissions",
            "paramMapping": {"teacherId": "$context.teacherId",
                              "assignmentId": "assign-u5"},
            "required": true, "dependsOn": []
        }]},
        "computeGraph": {"nodes": []},
        "uiComposition": {"layout": "single_page", "tabs": [{
            "id": "t", "label": "Tab", "slots": [{
                "id": "summary", "componentType": "markdown",
                "dataBinding": null, "props": {}, "aiContentSlot": true
            }]
        }]}
    });

    let response = reqwest::Client::new()
        .post(format!("{base}/api/page/generate"))
        .json(&json!({"blueprint": blueprint, "context": {}, "teacherId": "t-1"}))
        .send()
        .await
        .unwrap();

    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "text/event-stream"
    );
    assert_eq!(
        response.headers().get("cache-control").unwrap(),
        "no-cache, no-transform"
    );

    let mut body = String::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        body.push_str(&String::from_utf8_lossy(&chunk.unwrap()));
        if body.contains("\"COMPLETE\"") {
            break;
        }
    }

    // Every line is `data: <json>`; the union tags appear in order.
    let types: Vec<String> = body
        .lines()
        .filter_map(|l| l.strip_prefix("data: "))
        .filter_map(|l| serde_json::from_str::<Value>(l).ok())
        .filter_map(|v| v.get("type").and_then(Value::as_str).map(str::to_string))
        .collect();
    assert_eq!(types.first().map(String::as_str), Some("PHASE"));
    assert!(types.iter().any(|t| t == "BLOCK_START"));
    assert!(types.iter().any(|t| t == "SLOT_DELTA"));
    assert!(types.iter().any(|t| t == "BLOCK_COMPLETE"));
    assert_eq!(types.last().map(String::as_str), Some("COMPLETE"));
    assert_eq!(types.iter().filter(|t| *t == "COMPLETE").count(), 1);
}
