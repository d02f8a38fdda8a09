// src/ledger.rs
//! Balances and the trade log behind one serialized interface.

use crate::error::{PortfolioError, Result, StorageError};
use crate::models::{Balance, TradeOrder, Transaction};
use async_trait::async_trait;
use chrono::Utc;
use log::{info, warn};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Persistence for balances and the append-only transaction log.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn balances(&self) -> std::result::Result<Vec<Balance>, StorageError>;

    /// Transactions in insertion order.
    async fn transactions(&self) -> std::result::Result<Vec<Transaction>, StorageError>;

    /// Inserts `balances` only if the store holds none yet.
    async fn seed(&self, balances: &[Balance]) -> std::result::Result<bool, StorageError>;

    /// Writes both balances and appends the transaction; all or nothing.
    async fn commit_trade(
        &self,
        debit: &Balance,
        credit: &Balance,
        transaction: &Transaction,
    ) -> std::result::Result<(), StorageError>;

    async fn last_seq(&self) -> std::result::Result<i64, StorageError>;
}

#[derive(Debug, Clone)]
pub struct Snapshot {
    pub balances: BTreeMap<String, Decimal>,
    pub transactions: Vec<Transaction>,
}

pub struct Ledger {
    store: Arc<dyn LedgerStore>,
    base_currency: String,
    lock: Mutex<()>,
}

impl Ledger {
    pub fn new(store: Arc<dyn LedgerStore>, base_currency: &str) -> Ledger {
        Ledger {
            store,
            base_currency: base_currency.to_string(),
            lock: Mutex::new(()),
        }
    }

    pub fn base_currency(&self) -> &str {
        &self.base_currency
    }

    pub async fn seed(&self, balances: &[Balance]) -> Result<()> {
        let _guard = self.lock.lock().await;
        if self.store.seed(balances).await? {
            info!("Seeded {} balances.", balances.len());
        }
        Ok(())
    }

    pub async fn balances(&self) -> Result<BTreeMap<String, Decimal>> {
        let _guard = self.lock.lock().await;
        self.read_balances().await
    }

    /// Balances and transaction log read under the same lock.
    pub async fn snapshot(&self) -> Result<Snapshot> {
        let _guard = self.lock.lock().await;
        let balances = self.read_balances().await?;
        let transactions = self.store.transactions().await?;
        Ok(Snapshot {
            balances,
            transactions,
        })
    }

    /// Settles `order` against current balances.
    ///
    /// The sufficiency check and both writes happen while holding the ledger
    /// lock, so two concurrent trades can never both spend the same balance.
    pub async fn settle(&self, order: &TradeOrder) -> Result<Transaction> {
        let _guard = self.lock.lock().await;
        let mut balances = self.read_balances().await?;

        for currency in [&order.from, &order.to, &self.base_currency] {
            if !balances.contains_key(currency) {
                return Err(PortfolioError::UnknownCurrency(currency.clone()));
            }
        }

        let cost = order.cost()?;
        let usd_sum = order.usd_sum()?;
        let available = balances[&order.from];
        if cost > available {
            warn!(
                "Rejected {} {} for {} {}: only {} available",
                order.qty, order.to, cost, order.from, available
            );
            return Err(PortfolioError::InsufficientFunds {
                currency: order.from.clone(),
                required: cost,
                available,
            });
        }

        let credited = balances[&order.to]
            .checked_add(order.qty)
            .ok_or_else(|| PortfolioError::InvalidQuantity(order.qty.to_string()))?;
        if let Some(qty) = balances.get_mut(&order.from) {
            *qty -= cost;
        }
        balances.insert(order.to.clone(), credited);

        let transaction = Transaction {
            seq: self.store.last_seq().await? + 1,
            date: Utc::now(),
            from: order.from.clone(),
            to: order.to.clone(),
            rate: order.rate,
            out: cost,
            amount_in: order.qty,
            cash: balances[&self.base_currency],
            usd_sum,
        };
        let debit = Balance {
            currency: order.from.clone(),
            qty: balances[&order.from],
        };
        let credit = Balance {
            currency: order.to.clone(),
            qty: balances[&order.to],
        };
        self.store.commit_trade(&debit, &credit, &transaction).await?;

        info!(
            "Trade #{}: {} {} -> {} {}",
            transaction.seq, transaction.out, transaction.from, transaction.amount_in, transaction.to
        );
        Ok(transaction)
    }

    async fn read_balances(&self) -> Result<BTreeMap<String, Decimal>> {
        Ok(self
            .store
            .balances()
            .await?
            .into_iter()
            .map(|b| (b.currency, b.qty))
            .collect())
    }
}

/// Process-local store for running without a database.
#[derive(Default)]
pub struct MemoryStore {
    state: std::sync::Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    balances: BTreeMap<String, Decimal>,
    transactions: Vec<Transaction>,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }

    fn state(&self) -> std::result::Result<std::sync::MutexGuard<'_, MemoryState>, StorageError> {
        self.state
            .lock()
            .map_err(|_| StorageError::Query("memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn balances(&self) -> std::result::Result<Vec<Balance>, StorageError> {
        Ok(self
            .state()?
            .balances
            .iter()
            .map(|(currency, qty)| Balance {
                currency: currency.clone(),
                qty: *qty,
            })
            .collect())
    }

    async fn transactions(&self) -> std::result::Result<Vec<Transaction>, StorageError> {
        Ok(self.state()?.transactions.clone())
    }

    async fn seed(&self, balances: &[Balance]) -> std::result::Result<bool, StorageError> {
        let mut state = self.state()?;
        if !state.balances.is_empty() {
            return Ok(false);
        }
        for b in balances {
            state.balances.insert(b.currency.clone(), b.qty);
        }
        Ok(true)
    }

    async fn commit_trade(
        &self,
        debit: &Balance,
        credit: &Balance,
        transaction: &Transaction,
    ) -> std::result::Result<(), StorageError> {
        let mut state = self.state()?;
        state.balances.insert(debit.currency.clone(), debit.qty);
        state.balances.insert(credit.currency.clone(), credit.qty);
        state.transactions.push(transaction.clone());
        Ok(())
    }

    async fn last_seq(&self) -> std::result::Result<i64, StorageError> {
        Ok(self.state()?.transactions.last().map_or(0, |t| t.seq))
    }
}
