// src/market.rs
use crate::error::MarketDataError;
use crate::models::{Candle, DayStats};
use async_trait::async_trait;
use log::{debug, error};
use reqwest::Client;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

pub type Result<T> = std::result::Result<T, MarketDataError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Day,
    Hour,
}

impl Period {
    fn method(self) -> &'static str {
        match self {
            Period::Day => "histoday",
            Period::Hour => "histohour",
        }
    }
}

/// Read-only quotes for a currency pair: `from` priced in `to`.
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn price(&self, from: &str, to: &str) -> Result<Decimal>;

    async fn day_average(&self, from: &str, to: &str) -> Result<f64>;

    /// Candles oldest first. The API returns `limit + 1` points.
    async fn history(&self, from: &str, to: &str, period: Period, limit: u32) -> Result<Vec<Candle>>;

    /// Low and high of the current day.
    async fn day_range(&self, from: &str, to: &str) -> Result<(f64, f64)> {
        let candles = self.history(from, to, Period::Day, 1).await?;
        candles
            .last()
            .map(|c| (c.low, c.high))
            .ok_or_else(|| MarketDataError::Parse("empty daily history".to_string()))
    }

    /// Population standard deviation of the last 24 hourly closes.
    async fn std_dev_24h(&self, from: &str, to: &str) -> Result<f64> {
        let candles = self.history(from, to, Period::Hour, 23).await?;
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        std_dev(&closes).ok_or_else(|| MarketDataError::Parse("empty hourly history".to_string()))
    }

    async fn day_stats(&self, from: &str, to: &str) -> Result<DayStats> {
        let (low, high) = self.day_range(from, to).await?;
        Ok(DayStats {
            low,
            high,
            average: self.day_average(from, to).await?,
            std_dev: self.std_dev_24h(from, to).await?,
        })
    }
}

/// CryptoCompare `min-api` client.
pub struct MarketDataClient {
    client: Client,
    base_url: String,
}

#[derive(Deserialize)]
struct HistoResponse {
    #[serde(rename = "Response")]
    response: Option<String>,
    #[serde(rename = "Message", default)]
    message: String,
    #[serde(rename = "Data", default)]
    data: Vec<Candle>,
}

impl MarketDataClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<MarketDataClient> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(MarketDataClient {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn query(&self, method: &str, params: &[(&str, &str)]) -> Result<Value> {
        let url = format!("{}/{}", self.base_url, method);
        debug!("Querying {} with {:?}", url, params);

        let response = self
            .client
            .get(&url)
            .query(params)
            .send()
            .await
            .map_err(|e| classify(&url, e))?;
        if !response.status().is_success() {
            error!("Price API {} answered HTTP {}", url, response.status());
            return Err(MarketDataError::Status(response.status().as_u16()));
        }
        let body = response.json::<Value>().await.map_err(|e| classify(&url, e))?;
        if let Some(message) = api_error(&body) {
            return Err(MarketDataError::Provider(message));
        }
        Ok(body)
    }
}

#[async_trait]
impl PriceSource for MarketDataClient {
    async fn price(&self, from: &str, to: &str) -> Result<Decimal> {
        let body = self.query("price", &[("fsym", from), ("tsyms", to)]).await?;
        let price = field_f64(&body, to)?;
        Decimal::from_f64(price)
            .ok_or_else(|| MarketDataError::Parse(format!("price {} is not representable", price)))
    }

    async fn day_average(&self, from: &str, to: &str) -> Result<f64> {
        let body = self.query("dayAvg", &[("fsym", from), ("tsym", to)]).await?;
        field_f64(&body, to)
    }

    async fn history(&self, from: &str, to: &str, period: Period, limit: u32) -> Result<Vec<Candle>> {
        let limit = limit.to_string();
        let body = self
            .query(period.method(), &[("fsym", from), ("tsym", to), ("limit", limit.as_str())])
            .await?;
        parse_history(body)
    }
}

fn classify(url: &str, e: reqwest::Error) -> MarketDataError {
    if e.is_timeout() {
        error!("Request to {} timed out", url);
        MarketDataError::Timeout(url.to_string())
    } else {
        error!("HTTP request to {} failed: {}", url, e);
        MarketDataError::Network(e)
    }
}

fn api_error(body: &Value) -> Option<String> {
    match body.get("Response").and_then(Value::as_str) {
        Some("Error") => Some(
            body.get("Message")
                .and_then(Value::as_str)
                .unwrap_or("unspecified error")
                .to_string(),
        ),
        _ => None,
    }
}

fn field_f64(body: &Value, key: &str) -> Result<f64> {
    body.get(key)
        .and_then(Value::as_f64)
        .ok_or_else(|| MarketDataError::Parse(format!("missing numeric field `{}`", key)))
}

fn parse_history(body: Value) -> Result<Vec<Candle>> {
    let parsed: HistoResponse =
        serde_json::from_value(body).map_err(|e| MarketDataError::Parse(e.to_string()))?;
    if parsed.response.as_deref() == Some("Error") {
        return Err(MarketDataError::Provider(parsed.message));
    }
    let mut candles = parsed.data;
    candles.sort_by_key(|c| c.time);
    Ok(candles)
}

/// Population standard deviation; `None` for an empty series.
pub fn std_dev(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    Some(variance.sqrt())
}

/// Trailing mean over `window` points; `None` until the window is full.
pub fn rolling_mean(values: &[f64], window: usize) -> Vec<Option<f64>> {
    if window == 0 {
        return vec![None; values.len()];
    }
    let mut sum = 0.0;
    values
        .iter()
        .enumerate()
        .map(|(i, v)| {
            sum += v;
            if i >= window {
                sum -= values[i - window];
            }
            (i + 1 >= window).then(|| sum / window as f64)
        })
        .collect()
}
