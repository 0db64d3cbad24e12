//! Request handlers.

use std::convert::Infallible;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use stream_event::PageEvent;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::error;

use lectern::patch::PatchPlan;
use lectern::{Blueprint, ConversationRequest};

use super::app::AppState;

/// Bounded buffer between the engine task and the SSE writer; when it fills,
/// the engine suspends on its next emit (backpressure via the socket).
const EVENT_QUEUE_CAPACITY: usize = 128;

fn error_body(message: String) -> Json<Value> {
    Json(json!({"success": false, "error": message}))
}

/// `POST /api/conversation`
pub(crate) async fn conversation(
    State(state): State<AppState>,
    Json(request): Json<ConversationRequest>,
) -> impl IntoResponse {
    match state.service.gateway.handle(request).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => {
            error!(error = %e, "conversation turn failed");
            (StatusCode::BAD_GATEWAY, error_body(e.to_string())).into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GenerateRequest {
    blueprint: Blueprint,
    #[serde(default)]
    context: Value,
    #[serde(default)]
    teacher_id: Option<String>,
}

fn sse_response(
    rx: mpsc::Receiver<PageEvent>,
) -> impl IntoResponse {
    let stream = ReceiverStream::new(rx).map(|event| {
        Ok::<Event, Infallible>(
            Event::default()
                .json_data(&event)
                .unwrap_or_else(|_| Event::default().data("{}")),
        )
    });
    (
        [
            (header::CACHE_CONTROL, "no-cache, no-transform"),
            (header::CONNECTION, "keep-alive"),
        ],
        Sse::new(stream).keep_alive(KeepAlive::default()),
    )
}

/// `POST /api/page/generate` (SSE)
pub(crate) async fn page_generate(
    State(state): State<AppState>,
    Json(request): Json<GenerateRequest>,
) -> impl IntoResponse {
    let (tx, rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
    let executor = state.service.executor.clone();
    tokio::spawn(async move {
        let teacher_id = request.teacher_id.unwrap_or_default();
        executor
            .execute(request.blueprint, request.context, &teacher_id, tx)
            .await;
    });
    sse_response(rx)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PatchRequest {
    current_page: Value,
    patch_plan: PatchPlan,
    #[serde(default)]
    data_context: Value,
    #[serde(default)]
    compute_results: Value,
}

/// `POST /api/page/patch` (SSE)
pub(crate) async fn page_patch(
    State(state): State<AppState>,
    Json(request): Json<PatchRequest>,
) -> impl IntoResponse {
    let (tx, rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
    let patcher = state.service.patcher.clone();
    tokio::spawn(async move {
        patcher
            .apply(
                request.current_page,
                request.patch_plan,
                request.data_context,
                request.compute_results,
                tx,
            )
            .await;
    });
    sse_response(rx)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WorkflowRequest {
    #[serde(alias = "prompt")]
    message: String,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    context: Value,
}

/// `POST /api/workflow/generate` — direct planner call.
pub(crate) async fn workflow_generate(
    State(state): State<AppState>,
    Json(request): Json<WorkflowRequest>,
) -> impl IntoResponse {
    let language = request.language.as_deref().unwrap_or("the user's language");
    match state
        .service
        .planner
        .plan(&request.message, language, &request.context)
        .await
    {
        Ok(blueprint) => (
            StatusCode::OK,
            Json(json!({"success": true, "blueprint": blueprint})),
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "direct planner call failed");
            (StatusCode::BAD_GATEWAY, error_body(e.to_string())).into_response()
        }
    }
}

/// `GET /api/health`
pub(crate) async fn health() -> impl IntoResponse {
    Json(json!({"status": "healthy"}))
}
