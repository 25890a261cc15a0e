//! News pipeline trigger and stored article listings.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::Value;
use tracing::{error, info};

use mojarung_core::{JobKind, NewsPipeline, SilentProgress, run_news_pipeline};
use mojarung_shared::{NewsArticle, RawNews};

use crate::error::{ApiError, ApiResult};
use crate::routes::{Paging, message};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/parsers/run", post(run))
        .route("/api/parsers/news", get(list_news))
        .route("/api/parsers/news/{id}", get(news_by_id))
        .route("/api/parsers/raw-news", get(list_raw_news))
        .route("/api/parsers/raw-news/{id}", get(raw_news_by_id))
}

/// Start a pipeline run in the background. Only one run at a time.
async fn run(State(state): State<AppState>) -> ApiResult<(StatusCode, Json<Value>)> {
    let guard = state
        .jobs
        .try_start(JobKind::News)
        .ok_or_else(|| ApiError::conflict("News parsing is already running"))?;

    tokio::spawn(async move {
        let _guard = guard;
        let pipeline = NewsPipeline {
            storage: &state.storage,
            llm: state.llm.as_ref(),
            embedder: state.embedder.as_ref(),
            fetcher: &state.fetcher,
            sources: &state.sources,
        };
        match run_news_pipeline(&pipeline, &state.news_pipeline, &SilentProgress).await {
            Ok(report) => info!(
                saved = report.saved,
                rejected = report.rejected,
                "background news run finished"
            ),
            Err(e) => error!(error = %e, "background news run failed"),
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        message("News parsing started in the background"),
    ))
}

async fn list_news(
    State(state): State<AppState>,
    Query(paging): Query<Paging>,
) -> ApiResult<Json<Vec<NewsArticle>>> {
    let articles = state.storage.list_articles(paging.skip, paging.limit).await?;
    Ok(Json(articles))
}

async fn news_by_id(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<NewsArticle>> {
    state
        .storage
        .get_article(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("News article not found"))
}

async fn list_raw_news(
    State(state): State<AppState>,
    Query(paging): Query<Paging>,
) -> ApiResult<Json<Vec<RawNews>>> {
    let raw = state.storage.list_raw_news(paging.skip, paging.limit).await?;
    Ok(Json(raw))
}

async fn raw_news_by_id(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<RawNews>> {
    state
        .storage
        .get_raw_news(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Raw news not found"))
}
