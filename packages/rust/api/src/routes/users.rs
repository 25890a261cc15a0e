//! Interest scores, reactions and followed tickers.

use axum::extract::{Path, State};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::Value;

use mojarung_core::{Reaction, apply_reaction};
use mojarung_shared::TagScores;

use crate::auth::CurrentUser;
use crate::error::{ApiError, ApiResult};
use crate::routes::auth::UserOut;
use crate::routes::message;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/users/me/tags", get(tags))
        .route("/api/users/me/like", post(like))
        .route("/api/users/me/dislike", post(dislike))
        .route("/api/users/me/tickers", post(follow_ticker))
        .route("/api/users/me/tickers/{ticker}", delete(unfollow_ticker))
}

#[derive(Debug, Deserialize)]
struct ReactionRequest {
    news_id: i64,
}

#[derive(Debug, Deserialize)]
struct FollowRequest {
    company_id: i64,
}

async fn tags(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<TagScores>> {
    let scores = state.storage.get_tag_scores(user.id).await?;
    Ok(Json(scores))
}

async fn like(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<ReactionRequest>,
) -> ApiResult<Json<Value>> {
    apply_reaction(&state.storage, &user, req.news_id, Reaction::Like).await?;
    Ok(message("Like processed successfully"))
}

async fn dislike(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<ReactionRequest>,
) -> ApiResult<Json<Value>> {
    apply_reaction(&state.storage, &user, req.news_id, Reaction::Dislike).await?;
    Ok(message("Dislike processed successfully"))
}

async fn follow_ticker(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<FollowRequest>,
) -> ApiResult<Json<UserOut>> {
    let company = state
        .storage
        .get_company(req.company_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Company not found"))?;

    let mut tickers = user.ticker_list();
    if tickers.iter().any(|t| t.eq_ignore_ascii_case(&company.ticker)) {
        return Ok(Json(user.into()));
    }
    tickers.push(company.ticker.to_uppercase());
    let updated = state.storage.set_user_tickers(user.id, &tickers).await?;
    Ok(Json(updated.into()))
}

async fn unfollow_ticker(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(ticker): Path<String>,
) -> ApiResult<Json<UserOut>> {
    let tickers = user.ticker_list();
    let remaining: Vec<String> = tickers
        .iter()
        .filter(|t| !t.eq_ignore_ascii_case(ticker.trim()))
        .cloned()
        .collect();
    if remaining.len() == tickers.len() {
        return Err(ApiError::not_found("Ticker not found in user's list"));
    }
    let updated = state.storage.set_user_tickers(user.id, &remaining).await?;
    Ok(Json(updated.into()))
}
