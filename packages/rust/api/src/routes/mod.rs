//! HTTP routes, one module per resource.

use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::state::AppState;

pub mod auth;
pub mod companies;
pub mod invest;
pub mod llm;
pub mod news;
pub mod parsers;
pub mod pulse;
pub mod recommendations;
pub mod users;

#[cfg(test)]
pub(crate) mod test_support;

/// Every route of the service.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/health", get(health))
        .merge(auth::router())
        .merge(users::router())
        .merge(news::router())
        .merge(parsers::router())
        .merge(companies::router())
        .merge(invest::router())
        .merge(pulse::router())
        .merge(llm::router())
        .merge(recommendations::router())
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// `?skip=&limit=` for list endpoints.
#[derive(Debug, Deserialize)]
pub struct Paging {
    #[serde(default)]
    pub skip: usize,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    100
}

/// `{"message": ...}`
pub(crate) fn message(text: impl Into<String>) -> Json<Value> {
    Json(json!({ "message": text.into() }))
}
