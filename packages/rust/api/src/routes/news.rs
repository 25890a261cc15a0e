//! The personalised news feed.

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use tracing::debug;

use mojarung_core::interest_filter;
use mojarung_shared::NewsArticle;

use crate::auth::CurrentUser;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/news", get(latest))
        .route("/api/news/{id}", get(by_id))
}

#[derive(Debug, Deserialize)]
struct FeedQuery {
    #[serde(default = "default_top")]
    top: i64,
    /// Only articles matching the user's interests.
    #[serde(default)]
    filter: bool,
}

fn default_top() -> i64 {
    10
}

async fn latest(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<FeedQuery>,
) -> ApiResult<Json<Vec<NewsArticle>>> {
    let top = usize::try_from(query.top)
        .ok()
        .filter(|&top| top >= 1)
        .ok_or_else(|| ApiError::bad_request("Parameter 'top' must be a positive integer"))?;

    let filter = if query.filter {
        let scores = state.storage.get_tag_scores(user.id).await?;
        Some(interest_filter(&scores, &user.ticker_list()))
    } else {
        None
    };
    debug!(user = %user.id, top, filtered = filter.is_some(), "news feed");

    let articles = state.storage.latest_articles(top, filter.as_ref()).await?;
    Ok(Json(articles))
}

async fn by_id(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Json<NewsArticle>> {
    state
        .storage
        .get_article(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("News article not found"))
}
