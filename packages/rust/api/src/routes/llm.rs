//! Direct access to the chat model.

use std::time::Instant;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::info;

use mojarung_llm::ChatRequest;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/llm", post(complete))
}

#[derive(Debug, Deserialize)]
struct CompletionRequest {
    prompt: String,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    max_tokens: Option<u32>,
    #[serde(default)]
    temperature: Option<f32>,
    #[serde(default)]
    role: Option<String>,
}

#[derive(Debug, Serialize)]
struct CompletionResponse {
    response: String,
    /// Seconds spent waiting for the model.
    execution_time: f64,
}

async fn complete(
    State(state): State<AppState>,
    Json(req): Json<CompletionRequest>,
) -> ApiResult<Json<CompletionResponse>> {
    if req.prompt.trim().is_empty() {
        return Err(ApiError::bad_request("Prompt must not be empty"));
    }

    let mut request = ChatRequest::new(req.prompt);
    if let Some(model) = req.model.filter(|m| !m.trim().is_empty()) {
        request = request.model(model);
    }
    if let Some(role) = req.role.filter(|r| !r.trim().is_empty()) {
        request = request.role(role);
    }
    if let Some(max_tokens) = req.max_tokens {
        request = request.max_tokens(max_tokens);
    }
    if let Some(temperature) = req.temperature {
        request = request.temperature(temperature);
    }

    let started = Instant::now();
    let response = state.llm.complete(request).await?;
    let execution_time = started.elapsed().as_secs_f64();
    info!(execution_time, chars = response.len(), "completion served");

    Ok(Json(CompletionResponse {
        response,
        execution_time,
    }))
}

#[cfg(test)]
mod tests {
    use crate::routes::test_support::{StubModel, TestApp};
    use axum::http::StatusCode;
    use mojarung_shared::AppConfig;
    use serde_json::json;

    #[tokio::test]
    async fn forwards_overrides_to_the_model() {
        let app = TestApp::with(AppConfig::default(), StubModel::new(["Привет!"])).await;
        let (status, body) = app
            .post(
                "/api/llm",
                None,
                json!({ "prompt": "Скажи привет", "model": "test-model", "max_tokens": 16, "role": "system" }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["response"], "Привет!");
        assert!(body["execution_time"].as_f64().is_some());

        let request = &app.model.requests()[0];
        assert_eq!(request.model.as_deref(), Some("test-model"));
        assert_eq!(request.role, "system");
        assert_eq!(request.max_tokens, Some(16));
        assert_eq!(request.temperature, None);
    }

    #[tokio::test]
    async fn model_failure_is_bad_gateway() {
        let app = TestApp::new().await;
        let (status, body) = app.post("/api/llm", None, json!({ "prompt": "hi" })).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(
            body["detail"]
                .as_str()
                .expect("detail")
                .starts_with("Language model request failed")
        );

        let (status, _) = app.post("/api/llm", None, json!({ "prompt": "  " })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
