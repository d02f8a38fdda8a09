// src/models.rs
use crate::error::{PortfolioError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq)]
pub struct Balance {
    pub currency: String,
    pub qty: Decimal,
}

/// One executed trade. `seq` is the insertion number and defines replay order.
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub seq: i64,
    pub date: DateTime<Utc>,
    pub from: String,
    pub to: String,
    /// Price of `to` in units of `from`.
    pub rate: Decimal,
    pub out: Decimal,
    pub amount_in: Decimal,
    /// Base currency balance right after the trade.
    pub cash: Decimal,
    pub usd_sum: Decimal,
}

/// A trade about to be settled against the ledger.
#[derive(Debug, Clone)]
pub struct TradeOrder {
    pub from: String,
    pub to: String,
    pub qty: Decimal,
    pub rate: Decimal,
    pub usd_rate: Decimal,
}

impl TradeOrder {
    /// Amount of `from` spent; fails when the product leaves the decimal range.
    pub fn cost(&self) -> Result<Decimal> {
        self.priced_at(self.rate)
    }

    pub fn usd_sum(&self) -> Result<Decimal> {
        self.priced_at(self.usd_rate)
    }

    fn priced_at(&self, rate: Decimal) -> Result<Decimal> {
        self.qty
            .checked_mul(rate)
            .ok_or_else(|| PortfolioError::InvalidQuantity(self.qty.to_string()))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CurrencyStats {
    pub qty: Decimal,
    pub bought: Decimal,
    pub sum_bought: Decimal,
    pub sold: Decimal,
    pub sum_sold: Decimal,
    pub last_price: Decimal,
    pub wap: Decimal,
    pub rpl: Decimal,
    pub upl: Decimal,
    pub total_pl: Decimal,
    pub allocation_by_shares: Decimal,
    pub allocation_by_dollars: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradePair {
    pub cur1: String,
    pub cur2: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Candle {
    pub time: i64,
    #[serde(default)]
    pub high: f64,
    #[serde(default)]
    pub low: f64,
    pub close: f64,
}

impl Candle {
    pub fn timestamp(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(self.time, 0).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DayStats {
    pub low: f64,
    pub high: f64,
    pub average: f64,
    pub std_dev: f64,
}

#[derive(Deserialize)]
pub struct PairQuery {
    pub cur1: String,
    pub cur2: String,
}

#[derive(Deserialize)]
pub struct DealQuery {
    pub cur1: String,
    pub cur2: String,
    pub qty: String,
}
