//! Circuit breaker lifecycle against a dead backend, and the tool-level
//! mock fallback that keeps the pipeline indistinguishable from normal
//! operation while the circuit is open.

use std::sync::{Arc, Once};

use lectern::backend::{BackendAdapters, BackendClient, BackendError, CircuitState};
use lectern::llm::MockLlm;
use lectern::{Service, Settings};
use serde_json::json;

static ENV: Once = Once::new();

fn resilience_settings() -> Arc<Settings> {
    ENV.call_once(|| {
        // Port 9 (discard) refuses connections immediately; one attempt per
        // call makes the failure count deterministic.
        std::env::set_var("JAVA_BACKEND_BASE_URL", "http://127.0.0.1:9");
        std::env::set_var("RETRY_MAX_ATTEMPTS", "1");
        std::env::set_var("RETRY_BASE_DELAY_MS", "1");
        std::env::set_var("JAVA_BACKEND_TIMEOUT_SEC", "1");
        std::env::set_var("CIRCUIT_OPEN_THRESHOLD", "5");
        std::env::set_var("TOOL_TIMEOUT_SEC", "2");
    });
    Arc::new(Settings::from_env())
}

#[tokio::test]
async fn circuit_opens_after_threshold_and_fails_fast() {
    let settings = resilience_settings();
    let client = BackendClient::new(&settings).unwrap();

    for i in 0..5 {
        let err = client.get_json("/teacher/t-1/classes/me").await.unwrap_err();
        assert!(
            matches!(err, BackendError::Transport(_)),
            "call {i} should fail in transport, got {err}"
        );
    }
    assert_eq!(client.circuit().state(), CircuitState::Open);

    // The sixth call never reaches the HTTP layer.
    let err = client.get_json("/teacher/t-1/classes/me").await.unwrap_err();
    assert!(matches!(err, BackendError::CircuitOpen));
}

#[tokio::test]
async fn open_circuit_still_serves_mock_data_through_the_tools() {
    let settings = resilience_settings();
    // Live mode: every tool call hits the dead backend first.
    settings.set_use_mock_data(false);

    let service = Service::build(settings, Arc::new(MockLlm::new("{}"))).unwrap();
    // Drive the shared circuit open, then keep calling; the tool output
    // stays the deterministic dataset throughout.
    for _ in 0..7 {
        let out = service
            .registry
            .call("get_teacher_classes", json!({"teacherId": "t-1"}))
            .await
            .unwrap();
        let classes = out.as_array().expect("mock fallback dataset");
        assert_eq!(classes.len(), 3);
    }
}

#[tokio::test]
async fn adapters_surface_not_found_from_the_envelope() {
    // The adapter contract: code != 200 in the envelope fails the request
    // even when transport succeeded. Covered here at the client level by a
    // dead host only; the envelope paths are unit-tested in the crate.
    let settings = resilience_settings();
    let client = Arc::new(BackendClient::new(&settings).unwrap());
    let adapters = BackendAdapters::new(client);
    let err = adapters.teacher_classes("t-1").await.unwrap_err();
    assert!(!matches!(err, BackendError::NotFound { .. }));
}
