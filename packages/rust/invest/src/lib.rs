//! Brokerage sandbox and social feed clients.
//!
//! [`SandboxClient`] speaks the brokerage's JSON REST gateway with a
//! per-user token; the functions in [`trading`] add account resolution and
//! order checks on top. [`PulseClient`] reads the public social feed.

pub mod money;
pub mod pulse;
pub mod sandbox;
pub mod trading;

pub use money::{MoneyValue, Quotation, f64_to_money, f64_to_quotation, money_to_f64, quotation_to_f64};
pub use pulse::PulseClient;
pub use sandbox::{
    Account, Direction, Instrument, InstrumentShort, LastPrice, Operation, OrderParams, Portfolio,
    Positions, PostOrderResponse, SandboxClient,
};
pub use trading::{
    Balance, OrderRequest, PlacedOrder, TopUp, TradableShare, balance, place_order,
    recent_operations, resolve_account, top_up, tradable_shares,
};
