//! In-process app for route tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use mojarung_llm::{ChatModel, ChatRequest};
use mojarung_shared::{AppConfig, MojarungError, Result};
use mojarung_storage::Storage;

use crate::build_router;
use crate::state::AppState;

/// Chat model that replays canned replies.
#[derive(Default)]
pub struct StubModel {
    replies: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl StubModel {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().expect("lock").clone()
    }
}

#[async_trait]
impl ChatModel for StubModel {
    async fn complete(&self, request: ChatRequest) -> Result<String> {
        self.requests.lock().expect("lock").push(request);
        self.replies
            .lock()
            .expect("lock")
            .pop_front()
            .ok_or_else(|| MojarungError::Llm("no scripted reply".into()))
    }
}

pub struct TestApp {
    pub state: AppState,
    pub model: Arc<StubModel>,
    router: Router,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with(AppConfig::default(), StubModel::default()).await
    }

    pub async fn with(config: AppConfig, model: StubModel) -> Self {
        let path = std::env::temp_dir().join(format!("mojarung-api-{}.db", uuid::Uuid::now_v7()));
        let storage = Storage::open(&path).await.expect("open storage");
        let model = Arc::new(model);
        let llm: Arc<dyn ChatModel> = model.clone();
        let state = AppState::new(config, storage, llm, "test-secret").expect("state");
        Self {
            router: build_router(state.clone()),
            state,
            model,
        }
    }

    pub fn storage(&self) -> &Storage {
        &self.state.storage
    }

    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request");
        self.call(request).await
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.send(Method::GET, uri, token, None).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.send(Method::POST, uri, token, Some(body)).await
    }

    pub async fn call(&self, request: Request<Body>) -> (StatusCode, Value) {
        let (status, _, body) = self.call_raw(request).await;
        (status, body)
    }

    pub async fn call_raw(
        &self,
        request: Request<Body>,
    ) -> (StatusCode, axum::http::HeaderMap, Value) {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible");
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body")
            .to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, headers, body)
    }

    /// Register a user and return a bearer token for it.
    pub async fn signup(&self, email: &str, username: &str) -> String {
        let (status, _) = self
            .post(
                "/api/auth/register",
                None,
                serde_json::json!({ "email": email, "username": username, "password": "password123" }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);

        let user = self
            .storage()
            .get_user_by_email(email)
            .await
            .expect("lookup")
            .expect("registered");
        self.state.tokens.issue(user.id).expect("token")
    }
}
