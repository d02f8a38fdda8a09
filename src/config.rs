// src/config.rs
//! Runtime configuration from environment variables.
//!
//! Every setting falls back to a default when its variable is unset.

use crate::error::ConfigError;
use crate::models::Balance;
use rust_decimal::Decimal;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_BIND: &str = "127.0.0.1:3030";
pub const DEFAULT_SCYLLA_NODE: &str = "127.0.0.1:9042";
pub const DEFAULT_API_URL: &str = "https://min-api.cryptocompare.com/data";
pub const DEFAULT_SEED: &str = "USD=100000,BTC=0,ETH=0,LTC=0";
/// Largest quantity a single seed balance may hold.
pub const MAX_SEED_QTY: i64 = 1_000_000_000_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Scylla,
    Memory,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind: SocketAddr,
    pub store: StoreKind,
    pub scylla_node: String,
    pub api_url: String,
    pub api_timeout: Duration,
    pub img_dir: PathBuf,
    pub base_currency: String,
    pub seed: Vec<Balance>,
}

impl Config {
    pub fn from_env() -> Result<Config, ConfigError> {
        Config::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Config, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let bind = var("COIN_LEDGER_BIND", DEFAULT_BIND);
        let bind = SocketAddr::from_str(&bind).map_err(|e| ConfigError::Invalid {
            var: "COIN_LEDGER_BIND",
            reason: e.to_string(),
        })?;

        let store = match var("COIN_LEDGER_STORE", "scylla").to_lowercase().as_str() {
            "scylla" => StoreKind::Scylla,
            "memory" => StoreKind::Memory,
            other => {
                return Err(ConfigError::Invalid {
                    var: "COIN_LEDGER_STORE",
                    reason: format!("expected `scylla` or `memory`, got `{}`", other),
                })
            }
        };

        let timeout = var("COIN_LEDGER_API_TIMEOUT_SECS", "10");
        let api_timeout = timeout
            .parse::<u64>()
            .ok()
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .ok_or_else(|| ConfigError::Invalid {
                var: "COIN_LEDGER_API_TIMEOUT_SECS",
                reason: format!("expected a positive number of seconds, got `{}`", timeout),
            })?;

        let base_currency = var("COIN_LEDGER_BASE_CURRENCY", "USD").to_uppercase();
        let seed = parse_seed(&var("COIN_LEDGER_SEED", DEFAULT_SEED))?;
        if !seed.iter().any(|b| b.currency == base_currency) {
            return Err(ConfigError::Invalid {
                var: "COIN_LEDGER_SEED",
                reason: format!("seed must contain the base currency {}", base_currency),
            });
        }

        Ok(Config {
            bind,
            store,
            scylla_node: var("COIN_LEDGER_SCYLLA_NODE", DEFAULT_SCYLLA_NODE),
            api_url: var("COIN_LEDGER_API_URL", DEFAULT_API_URL)
                .trim_end_matches('/')
                .to_string(),
            api_timeout,
            img_dir: PathBuf::from(var("COIN_LEDGER_IMG_DIR", "img")),
            base_currency,
            seed,
        })
    }
}

/// Parses `USD=1000,BTC=0` into seed balances.
pub fn parse_seed(raw: &str) -> Result<Vec<Balance>, ConfigError> {
    let invalid = |reason: String| ConfigError::Invalid {
        var: "COIN_LEDGER_SEED",
        reason,
    };

    let mut balances: Vec<Balance> = Vec::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (currency, qty) = entry
            .split_once('=')
            .ok_or_else(|| invalid(format!("`{}` is not CUR=QTY", entry)))?;
        let currency = currency.trim().to_uppercase();
        if !is_currency_code(&currency) {
            return Err(invalid(format!("`{}` is not a currency code", currency)));
        }
        let qty = Decimal::from_str(qty.trim())
            .map_err(|e| invalid(format!("{}: {}", currency, e)))?;
        if qty.is_sign_negative() {
            return Err(invalid(format!("{} balance must not be negative", currency)));
        }
        if qty > Decimal::from(MAX_SEED_QTY) {
            return Err(invalid(format!("{} balance exceeds {}", currency, MAX_SEED_QTY)));
        }
        if balances.iter().any(|b| b.currency == currency) {
            return Err(invalid(format!("{} listed twice", currency)));
        }
        balances.push(Balance { currency, qty });
    }

    if balances.is_empty() {
        return Err(invalid("no balances given".to_string()));
    }
    Ok(balances)
}

pub fn is_currency_code(code: &str) -> bool {
    !code.is_empty() && code.len() <= 10 && code.chars().all(|c| c.is_ascii_alphanumeric())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.bind, DEFAULT_BIND.parse::<SocketAddr>().unwrap());
        assert_eq!(config.store, StoreKind::Scylla);
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.api_timeout, Duration::from_secs(10));
        assert_eq!(config.base_currency, "USD");
        assert_eq!(config.seed.len(), 4);
        assert_eq!(config.seed[0].qty, dec!(100000));
    }

    #[test]
    fn overrides_are_read() {
        let config = Config::from_lookup(lookup(&[
            ("COIN_LEDGER_STORE", "Memory"),
            ("COIN_LEDGER_API_URL", "http://localhost:9000/data/"),
            ("COIN_LEDGER_SEED", "eur=50, btc=1.5"),
            ("COIN_LEDGER_BASE_CURRENCY", "eur"),
        ]))
        .unwrap();
        assert_eq!(config.store, StoreKind::Memory);
        assert_eq!(config.api_url, "http://localhost:9000/data");
        assert_eq!(config.base_currency, "EUR");
        assert_eq!(
            config.seed,
            vec![
                Balance { currency: "EUR".into(), qty: dec!(50) },
                Balance { currency: "BTC".into(), qty: dec!(1.5) },
            ]
        );
    }

    #[test]
    fn rejects_bad_values() {
        assert!(Config::from_lookup(lookup(&[("COIN_LEDGER_STORE", "mongo")])).is_err());
        assert!(Config::from_lookup(lookup(&[("COIN_LEDGER_API_TIMEOUT_SECS", "0")])).is_err());
        assert!(Config::from_lookup(lookup(&[("COIN_LEDGER_SEED", "BTC=1")])).is_err());
        assert!(parse_seed("USD=-1").is_err());
        assert!(parse_seed("USD=1,USD=2").is_err());
        assert!(parse_seed("../x=1").is_err());
        assert!(parse_seed("").is_err());
        assert!(parse_seed("USD=0,BTC=50000000000000000000000000000").is_err());
        assert!(parse_seed("USD=1000000000000000").is_ok());
    }
}
