//! Trade recommendations and questions about an article.

use axum::extract::{Path, State};
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use mojarung_core::{
    Recommendation, TagBuckets, UserContext, answer_question, recommend, user_operations,
};

use crate::auth::CurrentUser;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/recommendations/news/{id}", post(for_article))
        .route("/api/assistant/ask", post(ask))
}

#[derive(Debug, Deserialize)]
struct AskRequest {
    news_text: String,
    question: String,
}

#[derive(Debug, Serialize)]
struct AskResponse {
    answer: String,
}

async fn for_article(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<Recommendation>> {
    let article = state
        .storage
        .get_article(id)
        .await?
        .ok_or_else(|| ApiError::not_found("News article not found"))?;

    let scores = state.storage.get_tag_scores(user.id).await?;
    let context = UserContext {
        buckets: TagBuckets::from_scores(&scores),
        tickers: user.ticker_list(),
        operations: user_operations(&user, &state.config.invest).await,
    };
    Ok(Json(recommend(state.llm.as_ref(), &article, &context).await?))
}

async fn ask(
    State(state): State<AppState>,
    Json(req): Json<AskRequest>,
) -> ApiResult<Json<AskResponse>> {
    if req.news_text.trim().is_empty() || req.question.trim().is_empty() {
        return Err(ApiError::bad_request("Both news_text and question are required"));
    }
    let answer = answer_question(state.llm.as_ref(), &req.news_text, &req.question).await?;
    Ok(Json(AskResponse { answer }))
}
