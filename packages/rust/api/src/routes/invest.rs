//! Brokerage sandbox on behalf of the current user.

use axum::extract::{Path, Query, State};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};

use mojarung_invest::{
    Account, Balance, OrderRequest, PlacedOrder, TopUp, TradableShare, balance, place_order,
    tradable_shares, top_up,
};

use crate::auth::CurrentUser;
use crate::error::{ApiError, ApiResult};
use crate::routes::message;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/invest/sandbox/topup", post(topup))
        .route("/api/invest/sandbox/balance", get(get_balance))
        .route(
            "/api/invest/sandbox/accounts",
            post(open_account).get(list_accounts),
        )
        .route("/api/invest/sandbox/accounts/{id}", delete(close_account))
        .route("/api/invest/sandbox/orders", post(order))
        .route("/api/invest/sandbox/tradable-shares", get(shares))
}

#[derive(Debug, Deserialize)]
struct AccountQuery {
    #[serde(default)]
    account_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TopUpRequest {
    amount: f64,
}

async fn topup(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<AccountQuery>,
    Json(req): Json<TopUpRequest>,
) -> ApiResult<Json<TopUp>> {
    if req.amount.is_nan() || req.amount <= 0.0 {
        return Err(ApiError::bad_request("Amount must be greater than 0"));
    }
    let client = state.sandbox_for(&user)?;
    Ok(Json(top_up(&client, query.account_id.as_deref(), req.amount).await?))
}

async fn get_balance(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<AccountQuery>,
) -> ApiResult<Json<Balance>> {
    let client = state.sandbox_for(&user)?;
    Ok(Json(balance(&client, query.account_id.as_deref()).await?))
}

async fn open_account(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<Value>> {
    let client = state.sandbox_for(&user)?;
    let account_id = client.open_account().await?;
    Ok(Json(json!({ "account_id": account_id })))
}

async fn list_accounts(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<Vec<Account>>> {
    let client = state.sandbox_for(&user)?;
    Ok(Json(client.accounts().await?))
}

async fn close_account(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(account_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let client = state.sandbox_for(&user)?;
    client.close_account(&account_id).await?;
    Ok(message(format!("Sandbox account {account_id} closed")))
}

async fn order(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<AccountQuery>,
    Json(req): Json<OrderRequest>,
) -> ApiResult<Json<PlacedOrder>> {
    if req.quantity <= 0 {
        return Err(ApiError::bad_request("Quantity must be greater than 0"));
    }
    let client = state.sandbox_for(&user)?;
    Ok(Json(
        place_order(&client, query.account_id.as_deref(), &req).await?,
    ))
}

async fn shares(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<Vec<TradableShare>>> {
    let client = state.sandbox_for(&user)?;
    Ok(Json(tradable_shares(&client).await?))
}
