// src/trade.rs
use crate::error::{PortfolioError, Result};
use crate::ledger::Ledger;
use crate::market::PriceSource;
use crate::models::{TradeOrder, Transaction};
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;

pub struct TradeExecutor {
    ledger: Arc<Ledger>,
    prices: Arc<dyn PriceSource>,
}

impl TradeExecutor {
    pub fn new(ledger: Arc<Ledger>, prices: Arc<dyn PriceSource>) -> TradeExecutor {
        TradeExecutor { ledger, prices }
    }

    /// Buys `qty` of `cur2` paid for with `cur1` at the current market price.
    pub async fn execute(&self, cur1: &str, cur2: &str, qty: Decimal) -> Result<Transaction> {
        if qty <= Decimal::ZERO {
            return Err(PortfolioError::InvalidQuantity(qty.to_string()));
        }
        if cur1 == cur2 {
            return Err(PortfolioError::SameCurrency(cur1.to_string()));
        }
        let balances = self.ledger.balances().await?;
        for currency in [cur1, cur2] {
            if !balances.contains_key(currency) {
                return Err(PortfolioError::UnknownCurrency(currency.to_string()));
            }
        }

        let rate = self.prices.price(cur2, cur1).await?;
        let base = self.ledger.base_currency();
        let usd_rate = if cur2 == base {
            Decimal::ONE
        } else if cur1 == base {
            rate
        } else {
            self.prices.price(cur2, base).await?
        };

        let order = TradeOrder {
            from: cur1.to_string(),
            to: cur2.to_string(),
            qty,
            rate,
            usd_rate,
        };
        self.ledger.settle(&order).await
    }
}

pub fn parse_quantity(raw: &str) -> Result<Decimal> {
    Decimal::from_str(raw.trim())
        .ok()
        .filter(|q| *q > Decimal::ZERO)
        .ok_or_else(|| PortfolioError::InvalidQuantity(raw.to_string()))
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::error::MarketDataError;
    use crate::ledger::MemoryStore;
    use crate::market::{self, Period};
    use crate::models::{Balance, Candle};
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Fixed quotes keyed by `FROM/TO`; counts every lookup.
    #[derive(Default)]
    pub struct StaticPrices {
        pub quotes: HashMap<String, Decimal>,
        pub calls: Mutex<usize>,
    }

    impl StaticPrices {
        pub fn with(quotes: &[(&str, &str, Decimal)]) -> StaticPrices {
            StaticPrices {
                quotes: quotes
                    .iter()
                    .map(|(from, to, p)| (format!("{}/{}", from, to), *p))
                    .collect(),
                calls: Mutex::new(0),
            }
        }

        pub fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl PriceSource for StaticPrices {
        async fn price(&self, from: &str, to: &str) -> market::Result<Decimal> {
            *self.calls.lock().unwrap() += 1;
            self.quotes
                .get(&format!("{}/{}", from, to))
                .copied()
                .ok_or_else(|| MarketDataError::Provider(format!("no quote for {}/{}", from, to)))
        }

        async fn day_average(&self, from: &str, to: &str) -> market::Result<f64> {
            use rust_decimal::prelude::ToPrimitive;
            Ok(self.price(from, to).await?.to_f64().unwrap_or_default())
        }

        async fn history(&self, from: &str, to: &str, period: Period, limit: u32) -> market::Result<Vec<Candle>> {
            use rust_decimal::prelude::ToPrimitive;
            let close = self.price(from, to).await?.to_f64().unwrap_or_default();
            let step = match period {
                Period::Day => 86_400,
                Period::Hour => 3_600,
            };
            Ok((0..=limit as i64)
                .map(|i| Candle {
                    time: i * step,
                    high: close + i as f64,
                    low: close - i as f64,
                    close: close + i as f64,
                })
                .collect())
        }
    }

    async fn executor(seed: &[(&str, Decimal)], prices: StaticPrices) -> (TradeExecutor, Arc<Ledger>, Arc<StaticPrices>) {
        let ledger = Arc::new(Ledger::new(Arc::new(MemoryStore::new()), "USD"));
        let seed: Vec<Balance> = seed
            .iter()
            .map(|(c, q)| Balance { currency: c.to_string(), qty: *q })
            .collect();
        ledger.seed(&seed).await.unwrap();
        let prices = Arc::new(prices);
        (TradeExecutor::new(ledger.clone(), prices.clone()), ledger, prices)
    }

    #[tokio::test]
    async fn buys_btc_with_usd() {
        let (exec, ledger, _) = executor(
            &[("USD", dec!(1000)), ("BTC", dec!(0))],
            StaticPrices::with(&[("BTC", "USD", dec!(20000))]),
        )
        .await;

        let tx = exec.execute("USD", "BTC", dec!(0.01)).await.unwrap();
        assert_eq!(tx.out, dec!(200));
        assert_eq!(tx.amount_in, dec!(0.01));
        assert_eq!(tx.rate, dec!(20000));
        assert_eq!(tx.usd_sum, dec!(200));

        let snapshot = ledger.snapshot().await.unwrap();
        assert_eq!(snapshot.balances["USD"], dec!(800));
        assert_eq!(snapshot.balances["BTC"], dec!(0.01));
        assert_eq!(snapshot.transactions.len(), 1);
    }

    #[tokio::test]
    async fn rejects_trade_beyond_balance() {
        let (exec, ledger, _) = executor(
            &[("USD", dec!(100)), ("BTC", dec!(0))],
            StaticPrices::with(&[("BTC", "USD", dec!(20000))]),
        )
        .await;

        let err = exec.execute("USD", "BTC", dec!(1)).await.unwrap_err();
        assert!(matches!(err, PortfolioError::InsufficientFunds { .. }));
        let snapshot = ledger.snapshot().await.unwrap();
        assert_eq!(snapshot.balances["USD"], dec!(100));
        assert_eq!(snapshot.balances["BTC"], dec!(0));
        assert!(snapshot.transactions.is_empty());
    }

    #[tokio::test]
    async fn oversized_quantity_is_invalid() {
        let (exec, ledger, _) = executor(
            &[("USD", dec!(100)), ("BTC", dec!(0))],
            StaticPrices::with(&[("BTC", "USD", dec!(20000))]),
        )
        .await;

        let qty = parse_quantity("79228162514264337593543950335").unwrap();
        let err = exec.execute("USD", "BTC", qty).await.unwrap_err();
        assert!(matches!(err, PortfolioError::InvalidQuantity(_)));
        assert_eq!(ledger.balances().await.unwrap()["USD"], dec!(100));
    }

    #[tokio::test]
    async fn crypto_pair_is_valued_in_base_currency() {
        let (exec, ledger, prices) = executor(
            &[("USD", dec!(0)), ("BTC", dec!(1)), ("ETH", dec!(0))],
            StaticPrices::with(&[("ETH", "BTC", dec!(0.05)), ("ETH", "USD", dec!(1000))]),
        )
        .await;

        let tx = exec.execute("BTC", "ETH", dec!(2)).await.unwrap();
        assert_eq!(tx.out, dec!(0.1));
        assert_eq!(tx.usd_sum, dec!(2000));
        assert_eq!(tx.cash, dec!(0));
        assert_eq!(prices.calls(), 2);
        assert_eq!(ledger.balances().await.unwrap()["BTC"], dec!(0.9));
    }

    #[tokio::test]
    async fn selling_into_base_currency_needs_one_quote() {
        let (exec, _, prices) = executor(
            &[("USD", dec!(0)), ("BTC", dec!(1))],
            StaticPrices::with(&[("USD", "BTC", dec!(0.00005))]),
        )
        .await;

        let tx = exec.execute("BTC", "USD", dec!(1000)).await.unwrap();
        assert_eq!(tx.out, dec!(0.05));
        assert_eq!(tx.usd_sum, dec!(1000));
        assert_eq!(tx.cash, dec!(1000));
        assert_eq!(prices.calls(), 1);
    }

    #[tokio::test]
    async fn invalid_requests_never_reach_the_price_api() {
        let (exec, _, prices) = executor(&[("USD", dec!(100))], StaticPrices::default()).await;

        assert!(matches!(
            exec.execute("USD", "BTC", dec!(0)).await.unwrap_err(),
            PortfolioError::InvalidQuantity(_)
        ));
        assert!(matches!(
            exec.execute("USD", "USD", dec!(1)).await.unwrap_err(),
            PortfolioError::SameCurrency(_)
        ));
        assert!(matches!(
            exec.execute("USD", "BTC", dec!(1)).await.unwrap_err(),
            PortfolioError::UnknownCurrency(ref c) if c == "BTC"
        ));
        assert_eq!(prices.calls(), 0);
    }

    #[tokio::test]
    async fn price_failure_is_reported_as_market_data_error() {
        let (exec, _, _) = executor(&[("USD", dec!(100)), ("BTC", dec!(0))], StaticPrices::default()).await;
        assert!(matches!(
            exec.execute("USD", "BTC", dec!(1)).await.unwrap_err(),
            PortfolioError::MarketData(_)
        ));
    }

    #[test]
    fn quantity_parsing() {
        assert_eq!(parse_quantity(" 0.01 ").unwrap(), dec!(0.01));
        assert!(parse_quantity("0").is_err());
        assert!(parse_quantity("-1").is_err());
        assert!(parse_quantity("abc").is_err());
    }
}
