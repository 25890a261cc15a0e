//! Company directory and its enrichment job.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::Value;
use tracing::{error, info};

use mojarung_core::{JobKind, SilentProgress, run_company_pipeline};
use mojarung_shared::Company;

use crate::error::{ApiError, ApiResult};
use crate::routes::{Paging, message};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/tradingview/parse", post(parse))
        .route("/api/tradingview/companies", get(list))
        .route("/api/tradingview/companies/{ticker}", get(by_ticker))
}

async fn parse(State(state): State<AppState>) -> ApiResult<(StatusCode, Json<Value>)> {
    let guard = state
        .jobs
        .try_start(JobKind::Companies)
        .ok_or_else(|| ApiError::conflict("Company parsing is already running"))?;

    tokio::spawn(async move {
        let _guard = guard;
        let result = run_company_pipeline(
            &state.storage,
            state.llm.as_ref(),
            &state.fetcher,
            &state.company_pipeline,
            &SilentProgress,
        )
        .await;
        match result {
            Ok(report) => info!(
                saved = report.saved,
                skipped = report.skipped,
                failed = report.failed,
                "background company run finished"
            ),
            Err(e) => error!(error = %e, "background company run failed"),
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        message("Company parsing started in the background"),
    ))
}

async fn list(
    State(state): State<AppState>,
    Query(paging): Query<Paging>,
) -> ApiResult<Json<Vec<Company>>> {
    let companies = state.storage.list_companies(paging.skip, paging.limit).await?;
    Ok(Json(companies))
}

async fn by_ticker(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
) -> ApiResult<Json<Company>> {
    state
        .storage
        .get_company_by_ticker(&ticker.trim().to_uppercase())
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Company not found"))
}
