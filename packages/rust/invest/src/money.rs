//! Fixed-point money as the brokerage API encodes it.
//!
//! Amounts are `units` plus `nano` billionths. The JSON gateway renders
//! 64-bit integers as strings, so every int64 field accepts either form.

use serde::{Deserialize, Serialize};

const NANO: f64 = 1_000_000_000.0;

/// An amount in a currency.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoneyValue {
    #[serde(default)]
    pub currency: String,
    #[serde(default, with = "int64")]
    pub units: i64,
    #[serde(default)]
    pub nano: i32,
}

/// A currency-less price or quantity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quotation {
    #[serde(default, with = "int64")]
    pub units: i64,
    #[serde(default)]
    pub nano: i32,
}

pub fn money_to_f64(money: &MoneyValue) -> f64 {
    money.units as f64 + f64::from(money.nano) / NANO
}

pub fn quotation_to_f64(q: &Quotation) -> f64 {
    q.units as f64 + f64::from(q.nano) / NANO
}

/// Split a decimal into units and nano, truncating toward zero.
pub fn f64_to_quotation(value: f64) -> Quotation {
    let units = value.trunc();
    Quotation {
        units: units as i64,
        nano: ((value - units) * NANO) as i32,
    }
}

pub fn f64_to_money(value: f64, currency: &str) -> MoneyValue {
    let Quotation { units, nano } = f64_to_quotation(value);
    MoneyValue {
        currency: currency.to_string(),
        units,
        nano,
    }
}

/// int64 as a JSON string on the way out, string or number on the way in.
pub(crate) mod int64 {
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Wire {
        Number(i64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(value: &i64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
        match Wire::deserialize(deserializer)? {
            Wire::Number(n) => Ok(n),
            Wire::Text(s) if s.is_empty() => Ok(0),
            Wire::Text(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}
