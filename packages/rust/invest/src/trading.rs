//! Account-level operations built on [`SandboxClient`] calls.

use chrono::{Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use mojarung_shared::{MojarungError, Result};

use crate::money::{f64_to_money, f64_to_quotation, money_to_f64, quotation_to_f64};
use crate::sandbox::{Direction, OrderParams, Operation, SandboxClient};

/// Slack added to the last price when estimating a market buy.
const MARKET_PRICE_MARGIN: f64 = 1.05;

/// Shares returned by [`tradable_shares`] at most.
const MAX_TRADABLE_SHARES: usize = 20;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopUp {
    pub account_id: String,
    pub new_balance: f64,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Balance {
    pub account_id: String,
    pub balance: f64,
    pub currency: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderRequest {
    pub ticker: String,
    /// Lots to trade.
    pub quantity: i64,
    /// Price per share; absent means a market order.
    #[serde(default)]
    pub price: Option<f64>,
    pub direction: Direction,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlacedOrder {
    pub order_id: String,
    pub status: String,
    pub initial_price: f64,
    pub executed_lots: i64,
    pub total_order_amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradableShare {
    pub ticker: String,
    pub figi: String,
    pub name: String,
    pub lot: i32,
}

/// The given account, or the first sandbox account when none is given.
pub async fn resolve_account(client: &SandboxClient, account_id: Option<&str>) -> Result<String> {
    if let Some(id) = account_id.filter(|id| !id.is_empty()) {
        return Ok(id.to_string());
    }
    client
        .accounts()
        .await?
        .into_iter()
        .next()
        .map(|a| a.id)
        .ok_or_else(|| MojarungError::not_found("sandbox account"))
}

#[instrument(skip_all, fields(amount = amount))]
pub async fn top_up(client: &SandboxClient, account_id: Option<&str>, amount: f64) -> Result<TopUp> {
    if amount.is_nan() || amount <= 0.0 {
        return Err(MojarungError::validation("amount must be greater than 0"));
    }
    let account_id = resolve_account(client, account_id).await?;
    let balance = client
        .pay_in(&account_id, &f64_to_money(amount, "rub"))
        .await?;
    info!(%account_id, "sandbox account topped up");

    Ok(TopUp {
        account_id,
        new_balance: money_to_f64(&balance),
        currency: balance.currency,
    })
}

/// Currency holdings of the account's portfolio.
pub async fn balance(client: &SandboxClient, account_id: Option<&str>) -> Result<Balance> {
    let account_id = resolve_account(client, account_id).await?;
    let portfolio = client.portfolio(&account_id).await?;
    let total = portfolio.total_amount_currencies.unwrap_or_default();
    Ok(Balance {
        account_id,
        balance: money_to_f64(&total),
        currency: total.currency,
    })
}

/// Validate and place an order.
///
/// The ticker is looked up and must be tradable. Buys are checked against
/// the rouble balance: limit orders cost `price * quantity * lot`, market
/// orders are estimated from the last price plus a 5% margin.
#[instrument(skip_all, fields(ticker = %order.ticker, quantity = order.quantity))]
pub async fn place_order(
    client: &SandboxClient,
    account_id: Option<&str>,
    order: &OrderRequest,
) -> Result<PlacedOrder> {
    if order.quantity <= 0 {
        return Err(MojarungError::validation("quantity must be greater than 0"));
    }
    if order.price.is_some_and(|p| p < 0.0) {
        return Err(MojarungError::validation("price must not be negative"));
    }
    let limit_price = order.price.filter(|p| *p > 0.0);

    let account_id = resolve_account(client, account_id).await?;

    let figi = client
        .find_instrument(&order.ticker)
        .await?
        .into_iter()
        .next()
        .map(|i| i.figi)
        .ok_or_else(|| {
            MojarungError::not_found(format!("instrument with ticker '{}'", order.ticker))
        })?;

    let instrument = client.instrument_by_figi(&figi).await?;
    if !instrument.is_tradable() {
        return Err(MojarungError::validation(format!(
            "Instrument '{}' is found, but not available for trading now.",
            order.ticker
        )));
    }

    if order.direction == Direction::Buy {
        let positions = client.positions(&account_id).await?;
        let rub_balance = positions
            .money
            .iter()
            .find(|m| m.currency.eq_ignore_ascii_case("rub"))
            .map(money_to_f64)
            .unwrap_or(0.0);

        let unit_price = match limit_price {
            Some(price) => price,
            None => {
                let last = client
                    .last_prices(&[figi.as_str()])
                    .await?
                    .into_iter()
                    .next()
                    .and_then(|p| p.price)
                    .ok_or_else(|| {
                        MojarungError::validation(format!(
                            "Could not get market price for {}.",
                            order.ticker
                        ))
                    })?;
                quotation_to_f64(&last) * MARKET_PRICE_MARGIN
            }
        };
        let cost = order_cost(unit_price, order.quantity, instrument.lot);
        if rub_balance < cost {
            return Err(MojarungError::validation(format!(
                "Insufficient funds. Required: ~{cost:.2} RUB, available: {rub_balance:.2} RUB."
            )));
        }
    }

    let response = client
        .post_order(&OrderParams {
            figi,
            account_id,
            quantity: order.quantity,
            direction: order.direction,
            price: limit_price.map(f64_to_quotation),
        })
        .await?;
    info!(order_id = %response.order_id, status = %response.execution_report_status, "order placed");

    Ok(PlacedOrder {
        order_id: response.order_id,
        status: response.execution_report_status,
        initial_price: response
            .initial_order_price
            .as_ref()
            .map(money_to_f64)
            .unwrap_or(0.0),
        executed_lots: response.lots_executed,
        total_order_amount: response
            .total_order_amount
            .as_ref()
            .map(money_to_f64)
            .unwrap_or(0.0),
    })
}

fn order_cost(unit_price: f64, quantity: i64, lot: i32) -> f64 {
    unit_price * quantity as f64 * f64::from(lot)
}

/// Rouble shares open for both sides of normal trading, at most 20.
pub async fn tradable_shares(client: &SandboxClient) -> Result<Vec<TradableShare>> {
    Ok(client
        .shares()
        .await?
        .into_iter()
        .filter(|s| s.is_tradable() && s.currency.eq_ignore_ascii_case("rub"))
        .take(MAX_TRADABLE_SHARES)
        .map(|s| TradableShare {
            ticker: s.ticker,
            figi: s.figi,
            name: s.name,
            lot: s.lot,
        })
        .collect())
}

/// Operations of the first account over the last `days` days.
pub async fn recent_operations(client: &SandboxClient, days: i64) -> Result<Vec<Operation>> {
    let account_id = resolve_account(client, None).await?;
    let to = Utc::now();
    client
        .operations(&account_id, to - ChronoDuration::days(days), to)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const CONTRACT: &str = "tinkoff.public.invest.api.contract.v1";

    async fn mock(server: &MockServer, service: &str, name: &str, body: serde_json::Value) {
        Mock::given(method("POST"))
            .and(path(format!("/{CONTRACT}.{service}/{name}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }

    fn client(server: &MockServer) -> SandboxClient {
        SandboxClient::new(&server.uri(), "t", Duration::from_secs(5)).expect("client")
    }

    async fn tradable_sber(server: &MockServer, rub_units: &str) {
        mock(
            server,
            "SandboxService",
            "GetSandboxAccounts",
            json!({ "accounts": [{ "id": "acc-1" }, { "id": "acc-2" }] }),
        )
        .await;
        mock(
            server,
            "InstrumentsService",
            "FindInstrument",
            json!({ "instruments": [{ "figi": "BBG004730N88", "ticker": "SBER" }] }),
        )
        .await;
        mock(
            server,
            "InstrumentsService",
            "GetInstrumentBy",
            json!({ "instrument": {
                "figi": "BBG004730N88", "ticker": "SBER", "lot": 10, "currency": "rub",
                "tradingStatus": "SECURITY_TRADING_STATUS_NORMAL_TRADING",
                "buyAvailableFlag": true, "sellAvailableFlag": true
            }}),
        )
        .await;
        mock(
            server,
            "SandboxService",
            "GetSandboxPositions",
            json!({ "money": [
                { "currency": "usd", "units": "99999", "nano": 0 },
                { "currency": "rub", "units": rub_units, "nano": 0 }
            ]}),
        )
        .await;
        mock(
            server,
            "MarketDataService",
            "GetLastPrices",
            json!({ "lastPrices": [{ "figi": "BBG004730N88", "price": { "units": "300", "nano": 0 } }] }),
        )
        .await;
    }

    #[test]
    fn cost_formula() {
        assert!((order_cost(250.0, 3, 10) - 7500.0).abs() < 1e-9);
        assert!((order_cost(300.0 * MARKET_PRICE_MARGIN, 2, 10) - 6300.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn resolves_first_account_or_not_found() {
        let server = MockServer::start().await;
        mock(&server, "SandboxService", "GetSandboxAccounts", json!({})).await;
        let c = client(&server);
        assert_eq!(resolve_account(&c, Some("given")).await.expect("id"), "given");
        assert!(matches!(
            resolve_account(&c, None).await.unwrap_err(),
            MojarungError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn market_buy_needs_margin_over_last_price() {
        let server = MockServer::start().await;
        // 2 lots * 10 shares * 300 * 1.05 = 6300 > 6000
        tradable_sber(&server, "6000").await;
        let order = OrderRequest {
            ticker: "SBER".into(),
            quantity: 2,
            price: None,
            direction: Direction::Buy,
        };
        let err = place_order(&client(&server), None, &order).await.unwrap_err();
        assert!(err.to_string().contains("Insufficient funds. Required: ~6300.00 RUB, available: 6000.00 RUB."));
    }

    #[tokio::test]
    async fn limit_buy_is_placed_on_first_account() {
        let server = MockServer::start().await;
        tradable_sber(&server, "10000").await;
        Mock::given(method("POST"))
            .and(path(format!("/{CONTRACT}.SandboxService/PostSandboxOrder")))
            .and(body_partial_json(json!({ "accountId": "acc-1", "orderType": "ORDER_TYPE_LIMIT" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "orderId": "o-1",
                "executionReportStatus": "EXECUTION_REPORT_STATUS_NEW",
                "lotsExecuted": "0",
                "initialOrderPrice": { "currency": "rub", "units": "5000", "nano": 0 }
            })))
            .mount(&server)
            .await;

        let order = OrderRequest {
            ticker: "SBER".into(),
            quantity: 2,
            price: Some(250.0),
            direction: Direction::Buy,
        };
        let placed = place_order(&client(&server), None, &order).await.expect("order");
        assert_eq!(placed.order_id, "o-1");
        assert_eq!(placed.initial_price, 5000.0);
        assert_eq!(placed.total_order_amount, 0.0);
    }

    #[tokio::test]
    async fn untradable_instrument_is_rejected() {
        let server = MockServer::start().await;
        mock(&server, "SandboxService", "GetSandboxAccounts", json!({ "accounts": [{ "id": "a" }] })).await;
        mock(
            &server,
            "InstrumentsService",
            "FindInstrument",
            json!({ "instruments": [{ "figi": "F" }] }),
        )
        .await;
        mock(
            &server,
            "InstrumentsService",
            "GetInstrumentBy",
            json!({ "instrument": { "figi": "F", "tradingStatus": "SECURITY_TRADING_STATUS_BREAK_IN_TRADING",
                                    "buyAvailableFlag": true, "sellAvailableFlag": true } }),
        )
        .await;
        let order = OrderRequest {
            ticker: "VTBR".into(),
            quantity: 1,
            price: None,
            direction: Direction::Sell,
        };
        let err = place_order(&client(&server), None, &order).await.unwrap_err();
        assert!(matches!(err, MojarungError::Validation { .. }));
    }

    #[tokio::test]
    async fn zero_quantity_and_amount_are_rejected() {
        let server = MockServer::start().await;
        let c = client(&server);
        let order = OrderRequest {
            ticker: "SBER".into(),
            quantity: 0,
            price: None,
            direction: Direction::Buy,
        };
        assert!(place_order(&c, None, &order).await.is_err());
        assert!(top_up(&c, Some("a"), 0.0).await.is_err());
        assert!(top_up(&c, Some("a"), f64::NAN).await.is_err());
    }

    #[tokio::test]
    async fn filters_tradable_rouble_shares() {
        let server = MockServer::start().await;
        let mut shares = vec![
            json!({ "ticker": "USD1", "currency": "usd", "tradingStatus": "SECURITY_TRADING_STATUS_NORMAL_TRADING",
                    "buyAvailableFlag": true, "sellAvailableFlag": true }),
            json!({ "ticker": "HALT", "currency": "rub", "tradingStatus": "SECURITY_TRADING_STATUS_NORMAL_TRADING",
                    "buyAvailableFlag": true, "sellAvailableFlag": false }),
        ];
        for i in 0..25 {
            shares.push(json!({ "ticker": format!("T{i}"), "figi": format!("F{i}"), "name": "n", "lot": 1,
                "currency": "rub", "tradingStatus": "SECURITY_TRADING_STATUS_NORMAL_TRADING",
                "buyAvailableFlag": true, "sellAvailableFlag": true }));
        }
        mock(&server, "InstrumentsService", "Shares", json!({ "instruments": shares })).await;

        let list = tradable_shares(&client(&server)).await.expect("shares");
        assert_eq!(list.len(), 20);
        assert_eq!(list[0].ticker, "T0");
    }

    #[tokio::test]
    async fn top_up_returns_new_balance() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/{CONTRACT}.SandboxService/SandboxPayIn")))
            .and(body_partial_json(json!({
                "accountId": "acc-9",
                "amount": { "currency": "rub", "units": "1500", "nano": 250000000 }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "balance": { "currency": "rub", "units": "2500", "nano": 250000000 }
            })))
            .mount(&server)
            .await;

        let result = top_up(&client(&server), Some("acc-9"), 1500.25).await.expect("top up");
        assert_eq!(result.account_id, "acc-9");
        assert!((result.new_balance - 2500.25).abs() < 1e-9);
        assert_eq!(result.currency, "rub");
    }
}
