//! Brokerage sandbox over the JSON REST gateway.
//!
//! Every RPC is `POST {base}/tinkoff.public.invest.api.contract.v1.{Service}/{Method}`
//! with a camelCase JSON body and the user's token as bearer auth.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use mojarung_shared::{InvestConfig, MojarungError, Result};

use crate::money::{MoneyValue, Quotation, int64};

const CONTRACT: &str = "tinkoff.public.invest.api.contract.v1";

pub const NORMAL_TRADING: &str = "SECURITY_TRADING_STATUS_NORMAL_TRADING";

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all(deserialize = "camelCase"))]
pub struct Account {
    #[serde(default)]
    pub id: String,
    #[serde(default, rename = "type")]
    pub account_type: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub opened_date: Option<String>,
}

/// Short search hit from `FindInstrument`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstrumentShort {
    #[serde(default)]
    pub figi: String,
    #[serde(default)]
    pub ticker: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub class_code: String,
    #[serde(default)]
    pub instrument_type: String,
}

/// Full instrument description (also used for shares).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instrument {
    #[serde(default)]
    pub figi: String,
    #[serde(default)]
    pub ticker: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub lot: i32,
    #[serde(default)]
    pub trading_status: String,
    #[serde(default)]
    pub buy_available_flag: bool,
    #[serde(default)]
    pub sell_available_flag: bool,
}

impl Instrument {
    /// Normal trading with both buying and selling open.
    pub fn is_tradable(&self) -> bool {
        self.trading_status == NORMAL_TRADING && self.buy_available_flag && self.sell_available_flag
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastPrice {
    #[serde(default)]
    pub figi: String,
    #[serde(default)]
    pub price: Option<Quotation>,
    #[serde(default)]
    pub time: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Portfolio {
    #[serde(default)]
    pub total_amount_currencies: Option<MoneyValue>,
    #[serde(default)]
    pub total_amount_shares: Option<MoneyValue>,
    #[serde(default)]
    pub total_amount_portfolio: Option<MoneyValue>,
    #[serde(default)]
    pub positions: Vec<PortfolioPosition>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioPosition {
    #[serde(default)]
    pub figi: String,
    #[serde(default)]
    pub instrument_type: String,
    #[serde(default)]
    pub quantity: Option<Quotation>,
    #[serde(default)]
    pub current_price: Option<MoneyValue>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Positions {
    #[serde(default)]
    pub money: Vec<MoneyValue>,
    #[serde(default)]
    pub blocked: Vec<MoneyValue>,
    #[serde(default)]
    pub securities: Vec<SecurityPosition>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityPosition {
    #[serde(default)]
    pub figi: String,
    #[serde(default, with = "int64")]
    pub balance: i64,
    #[serde(default, with = "int64")]
    pub blocked: i64,
}

/// A past account operation, serialised snake_case for prompts and responses.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all(deserialize = "camelCase"))]
pub struct Operation {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub payment: Option<MoneyValue>,
    #[serde(default)]
    pub price: Option<MoneyValue>,
    #[serde(default)]
    pub state: String,
    #[serde(default, with = "int64")]
    pub quantity: i64,
    #[serde(default)]
    pub figi: String,
    #[serde(default)]
    pub instrument_type: String,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default, rename = "type")]
    pub description: String,
    #[serde(default)]
    pub operation_type: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Buy,
    Sell,
}

impl Direction {
    fn wire(self) -> &'static str {
        match self {
            Self::Buy => "ORDER_DIRECTION_BUY",
            Self::Sell => "ORDER_DIRECTION_SELL",
        }
    }
}

/// Order placement parameters in API terms.
#[derive(Debug, Clone)]
pub struct OrderParams {
    pub figi: String,
    pub account_id: String,
    pub quantity: i64,
    pub direction: Direction,
    /// Limit price; `None` places a market order.
    pub price: Option<Quotation>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostOrderResponse {
    #[serde(default)]
    pub order_id: String,
    #[serde(default)]
    pub execution_report_status: String,
    #[serde(default, with = "int64")]
    pub lots_requested: i64,
    #[serde(default, with = "int64")]
    pub lots_executed: i64,
    #[serde(default)]
    pub initial_order_price: Option<MoneyValue>,
    #[serde(default)]
    pub total_order_amount: Option<MoneyValue>,
    #[serde(default)]
    pub figi: String,
}

// Response envelopes.

#[derive(Deserialize)]
struct AccountsEnvelope {
    #[serde(default)]
    accounts: Vec<Account>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpenAccountEnvelope {
    #[serde(default)]
    account_id: String,
}

#[derive(Deserialize)]
struct PayInEnvelope {
    #[serde(default)]
    balance: MoneyValue,
}

#[derive(Deserialize)]
struct InstrumentsEnvelope<T> {
    #[serde(default = "Vec::new")]
    instruments: Vec<T>,
}

#[derive(Deserialize)]
struct InstrumentEnvelope {
    instrument: Instrument,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LastPricesEnvelope {
    #[serde(default)]
    last_prices: Vec<LastPrice>,
}

#[derive(Deserialize)]
struct OperationsEnvelope {
    #[serde(default)]
    operations: Vec<Operation>,
}

#[derive(Deserialize)]
struct Ignored {}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Sandbox client bound to one user's API token.
pub struct SandboxClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl SandboxClient {
    pub fn new(base_url: &str, token: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MojarungError::Brokerage(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    pub fn from_config(config: &InvestConfig, token: impl Into<String>) -> Result<Self> {
        Self::new(
            &config.sandbox_base_url,
            token,
            Duration::from_secs(config.timeout_secs),
        )
    }

    async fn call<T: DeserializeOwned>(
        &self,
        service: &str,
        method: &str,
        body: serde_json::Value,
    ) -> Result<T> {
        let url = format!("{}/{CONTRACT}.{service}/{method}", self.base_url);
        debug!(service, method, "brokerage call");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .map_err(|e| MojarungError::Brokerage(format!("{service}/{method}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<serde_json::Value>(&text)
                .ok()
                .and_then(|v| v["message"].as_str().map(String::from))
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| text.chars().take(300).collect());
            return Err(MojarungError::Brokerage(format!(
                "{service}/{method} failed with {status}: {message}"
            )));
        }

        response
            .json()
            .await
            .map_err(|e| MojarungError::Brokerage(format!("{service}/{method}: invalid response: {e}")))
    }

    pub async fn open_account(&self) -> Result<String> {
        let r: OpenAccountEnvelope = self
            .call("SandboxService", "OpenSandboxAccount", json!({}))
            .await?;
        Ok(r.account_id)
    }

    pub async fn accounts(&self) -> Result<Vec<Account>> {
        let r: AccountsEnvelope = self
            .call("SandboxService", "GetSandboxAccounts", json!({}))
            .await?;
        Ok(r.accounts)
    }

    pub async fn close_account(&self, account_id: &str) -> Result<()> {
        let _: Ignored = self
            .call(
                "SandboxService",
                "CloseSandboxAccount",
                json!({ "accountId": account_id }),
            )
            .await?;
        Ok(())
    }

    /// Credit the account and return the new balance.
    pub async fn pay_in(&self, account_id: &str, amount: &MoneyValue) -> Result<MoneyValue> {
        let r: PayInEnvelope = self
            .call(
                "SandboxService",
                "SandboxPayIn",
                json!({ "accountId": account_id, "amount": amount }),
            )
            .await?;
        Ok(r.balance)
    }

    pub async fn portfolio(&self, account_id: &str) -> Result<Portfolio> {
        self.call(
            "SandboxService",
            "GetSandboxPortfolio",
            json!({ "accountId": account_id, "currency": "RUB" }),
        )
        .await
    }

    pub async fn positions(&self, account_id: &str) -> Result<Positions> {
        self.call(
            "SandboxService",
            "GetSandboxPositions",
            json!({ "accountId": account_id }),
        )
        .await
    }

    pub async fn operations(
        &self,
        account_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Operation>> {
        let r: OperationsEnvelope = self
            .call(
                "SandboxService",
                "GetSandboxOperations",
                json!({
                    "accountId": account_id,
                    "from": from.to_rfc3339(),
                    "to": to.to_rfc3339(),
                }),
            )
            .await?;
        Ok(r.operations)
    }

    pub async fn find_instrument(&self, query: &str) -> Result<Vec<InstrumentShort>> {
        let r: InstrumentsEnvelope<InstrumentShort> = self
            .call(
                "InstrumentsService",
                "FindInstrument",
                json!({ "query": query }),
            )
            .await?;
        Ok(r.instruments)
    }

    pub async fn instrument_by_figi(&self, figi: &str) -> Result<Instrument> {
        let r: InstrumentEnvelope = self
            .call(
                "InstrumentsService",
                "GetInstrumentBy",
                json!({ "idType": "INSTRUMENT_ID_TYPE_FIGI", "id": figi }),
            )
            .await?;
        Ok(r.instrument)
    }

    pub async fn last_prices(&self, figis: &[&str]) -> Result<Vec<LastPrice>> {
        let r: LastPricesEnvelope = self
            .call("MarketDataService", "GetLastPrices", json!({ "figi": figis }))
            .await?;
        Ok(r.last_prices)
    }

    /// Base shares list.
    pub async fn shares(&self) -> Result<Vec<Instrument>> {
        let r: InstrumentsEnvelope<Instrument> = self
            .call(
                "InstrumentsService",
                "Shares",
                json!({ "instrumentStatus": "INSTRUMENT_STATUS_BASE" }),
            )
            .await?;
        Ok(r.instruments)
    }

    pub async fn post_order(&self, order: &OrderParams) -> Result<PostOrderResponse> {
        let mut body = json!({
            "figi": order.figi,
            "quantity": order.quantity.to_string(),
            "direction": order.direction.wire(),
            "accountId": order.account_id,
            "orderType": if order.price.is_some() { "ORDER_TYPE_LIMIT" } else { "ORDER_TYPE_MARKET" },
            "orderId": uuid::Uuid::new_v4().to_string(),
        });
        if let Some(price) = &order.price {
            body["price"] = json!(price);
        }
        self.call("SandboxService", "PostSandboxOrder", body).await
    }
}
