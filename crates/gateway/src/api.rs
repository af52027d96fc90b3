//! Route handlers.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use codeloop_agent::{ChatReply, ChatRequest, FailureKind};
use codeloop_core::event::{DomainEvent, FileChange};
use codeloop_core::step::StepRecord;
use codeloop_files::{FileRecord, normalize_path};
use codeloop_providers::BackendKind;

use crate::SharedState;

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<StepRecord>,
}

impl ErrorResponse {
    fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            steps: Vec::new(),
        }
    }
}

type ApiError = (StatusCode, Json<ErrorResponse>);

pub async fn chat_handler(
    State(state): State<SharedState>,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<ChatReply>, ApiError> {
    info!(
        conversation_id = ?payload.conversation_id,
        model = ?payload.model,
        "Chat request"
    );

    match state.orchestrator.handle(payload).await {
        Ok(reply) => Ok(Json(reply)),
        Err(failure) => {
            let status = match failure.kind {
                FailureKind::Validation | FailureKind::BackendUnavailable => StatusCode::BAD_REQUEST,
                FailureKind::Backend => {
                    error!(error = %failure.message, "Chat failed");
                    StatusCode::BAD_GATEWAY
                }
            };
            Err((
                status,
                Json(ErrorResponse {
                    error: failure.message,
                    steps: failure.steps,
                }),
            ))
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ModelAvailability {
    pub gpt4: bool,
    pub gemini: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub models: ModelAvailability,
}

pub async fn health_handler(State(state): State<SharedState>) -> Json<HealthResponse> {
    let backends = state.orchestrator.backends();
    Json(HealthResponse {
        status: "running".into(),
        models: ModelAvailability {
            gpt4: backends.is_available(BackendKind::Gpt4),
            gemini: backends.is_available(BackendKind::Gemini),
        },
    })
}

pub async fn list_files_handler(State(state): State<SharedState>) -> Json<Vec<FileRecord>> {
    Json(state.files.list())
}

pub async fn get_file_handler(
    State(state): State<SharedState>,
    Path(path): Path<String>,
) -> Result<Json<FileRecord>, ApiError> {
    state
        .files
        .get(&path)
        .map(Json)
        .ok_or_else(|| (StatusCode::NOT_FOUND, Json(ErrorResponse::new("File not found"))))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub message: String,
}

pub async fn delete_file_handler(
    State(state): State<SharedState>,
    Path(path): Path<String>,
) -> Result<Json<DeleteResponse>, ApiError> {
    if !state.files.delete(&path) {
        return Err((StatusCode::NOT_FOUND, Json(ErrorResponse::new("File not found"))));
    }
    // The store accepted the path, so it normalizes.
    let path = normalize_path(&path).unwrap_or(path);

    state.orchestrator.events().publish(DomainEvent::FileChanged {
        path: path.clone(),
        change: FileChange::Deleted,
        timestamp: Utc::now(),
    });
    info!(path = %path, "File deleted");

    Ok(Json(DeleteResponse {
        message: "File deleted successfully".into(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{GatewayState, build_router};
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use std::sync::Arc;
    use tower::ServiceExt;

    use codeloop_agent::Orchestrator;
    use codeloop_agent::test_helpers::{ScriptedProvider, action, output};
    use codeloop_core::error::ProviderError;
    use codeloop_files::VirtualFileStore;
    use codeloop_providers::{Backend, BackendRouter};

    fn state_with(provider: ScriptedProvider) -> SharedState {
        let files = Arc::new(VirtualFileStore::new());
        let tools = Arc::new(codeloop_tools::default_registry(files.clone()));
        let router = BackendRouter::new().with(
            BackendKind::Gpt4,
            Backend::new(Arc::new(provider), "mock-model"),
        );
        GatewayState::new(Arc::new(Orchestrator::new(router, tools)), files)
    }

    fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn empty_request(method: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn health_reports_backends() {
        let app = build_router(state_with(ScriptedProvider::new([output("x")])));

        let response = app.oneshot(empty_request("GET", "/api/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let health: HealthResponse =
            serde_json::from_value(body_json(response).await).unwrap();
        assert_eq!(health.status, "running");
        assert!(health.models.gpt4);
        assert!(!health.models.gemini);
    }

    #[tokio::test]
    async fn chat_runs_the_loop() {
        let state = state_with(ScriptedProvider::new([
            action("createFile", serde_json::json!({"fileName": "a.txt", "content": "hi"})),
            output("done"),
        ]));
        let app = build_router(state.clone());

        let response = app
            .oneshot(json_request(
                "POST",
                "/api/chat",
                serde_json::json!({"message": "make a file", "conversationId": "c1"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["finalOutput"], "done");
        assert_eq!(json["conversationId"], "c1");
        assert_eq!(json["model"], "gpt4");
        assert_eq!(json["steps"].as_array().unwrap().len(), 3);
        assert_eq!(json["steps"][0]["type"], "action");
        assert!(state.files.contains("a.txt"));
    }

    #[tokio::test]
    async fn chat_without_message_is_bad_request() {
        let app = build_router(state_with(ScriptedProvider::new([output("x")])));

        let response = app
            .oneshot(json_request("POST", "/api/chat", serde_json::json!({"conversationId": "c1"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "Message is required");
    }

    #[tokio::test]
    async fn chat_with_unconfigured_backend_is_bad_request() {
        let app = build_router(state_with(ScriptedProvider::new([output("x")])));

        let response = app
            .oneshot(json_request(
                "POST",
                "/api/chat",
                serde_json::json!({"message": "hi", "model": "gemini"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "Gemini API key is not configured");
    }

    #[tokio::test]
    async fn backend_failure_is_bad_gateway_with_steps() {
        let app = build_router(state_with(ScriptedProvider::failing(
            ProviderError::AuthenticationFailed("bad key".into()),
        )));

        let response = app
            .oneshot(json_request("POST", "/api/chat", serde_json::json!({"message": "hi"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let json = body_json(response).await;
        assert!(json["error"].as_str().unwrap().contains("bad key"));
        assert_eq!(json["steps"][0]["type"], "error");
    }

    #[tokio::test]
    async fn file_routes() {
        let state = state_with(ScriptedProvider::new([output("x")]));
        state.files.put("src/App.jsx", "export default 1;").unwrap();
        state.files.put("README.md", "# hi").unwrap();

        let list = build_router(state.clone())
            .oneshot(empty_request("GET", "/api/files"))
            .await
            .unwrap();
        assert_eq!(list.status(), StatusCode::OK);
        let json = body_json(list).await;
        assert_eq!(json.as_array().unwrap().len(), 2);
        assert_eq!(json[0]["name"], "src/App.jsx");
        assert_eq!(json[0]["size"], 17);
        assert!(json[0]["createdAt"].is_string());

        let one = build_router(state.clone())
            .oneshot(empty_request("GET", "/api/files/src/App.jsx"))
            .await
            .unwrap();
        assert_eq!(one.status(), StatusCode::OK);
        assert_eq!(body_json(one).await["content"], "export default 1;");

        let deleted = build_router(state.clone())
            .oneshot(empty_request("DELETE", "/api/files/src/App.jsx"))
            .await
            .unwrap();
        assert_eq!(deleted.status(), StatusCode::OK);
        assert_eq!(body_json(deleted).await["message"], "File deleted successfully");

        let gone = build_router(state.clone())
            .oneshot(empty_request("GET", "/api/files/src/App.jsx"))
            .await
            .unwrap();
        assert_eq!(gone.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(gone).await["error"], "File not found");

        let again = build_router(state.clone())
            .oneshot(empty_request("DELETE", "/api/files/src/App.jsx"))
            .await
            .unwrap();
        assert_eq!(again.status(), StatusCode::NOT_FOUND);
        assert_eq!(state.files.len(), 1);
    }

    #[tokio::test]
    async fn delete_reports_the_stored_path() {
        let state = state_with(ScriptedProvider::new([output("x")]));
        state.files.put("src/App.jsx", "x").unwrap();
        let mut events = state.orchestrator.events().subscribe();

        let deleted = build_router(state.clone())
            .oneshot(empty_request("DELETE", "/api/files/.%2Fsrc%5CApp.jsx"))
            .await
            .unwrap();
        assert_eq!(deleted.status(), StatusCode::OK);
        assert!(state.files.is_empty());

        let event = events.try_recv().unwrap();
        match event.as_ref() {
            DomainEvent::FileChanged { path, change, .. } => {
                assert_eq!(path, "src/App.jsx");
                assert_eq!(*change, FileChange::Deleted);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
