//! Read-only proxy to the social feed.

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use mojarung_shared::MojarungError;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/pulse/user/{user}", get(user_info))
        .route("/api/pulse/user/{user}/posts", get(user_posts))
        .route("/api/pulse/ticker/{ticker}/posts", get(ticker_posts))
}

#[derive(Debug, Deserialize)]
struct PostsQuery {
    #[serde(default = "default_limit")]
    limit: usize,
}

fn default_limit() -> usize {
    5
}

/// Feed failures surface as 404 for the requested resource.
fn not_found(what: String) -> impl FnOnce(MojarungError) -> ApiError {
    move |e| {
        warn!(error = %e, "pulse request failed");
        ApiError::not_found(what)
    }
}

async fn user_info(
    State(state): State<AppState>,
    Path(nickname): Path<String>,
) -> ApiResult<Json<Value>> {
    state
        .pulse
        .user_info(&nickname)
        .await
        .map(Json)
        .map_err(not_found(format!("User '{nickname}' not found")))
}

async fn user_posts(
    State(state): State<AppState>,
    Path(profile_id): Path<String>,
) -> ApiResult<Json<Value>> {
    state
        .pulse
        .user_posts(&profile_id)
        .await
        .map(Json)
        .map_err(not_found(format!("Posts for user '{profile_id}' not found")))
}

async fn ticker_posts(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
    Query(query): Query<PostsQuery>,
) -> ApiResult<Json<Value>> {
    let ticker = ticker.trim().to_uppercase();
    state
        .pulse
        .ticker_posts(&ticker, query.limit)
        .await
        .map(Json)
        .map_err(not_found(format!("Posts for ticker '{ticker}' not found")))
}
