// src/db.rs
use crate::error::StorageError;
use crate::ledger::LedgerStore;
use crate::models::{Balance, Transaction};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{error, info};
use rust_decimal::Decimal;
use scylla::batch::{Batch, BatchType};
use scylla::frame::response::result::{CqlValue, Row};
use scylla::query::Query;
use scylla::{Session, SessionBuilder};
use std::str::FromStr;

/// Partition key of the single trade log.
const LEDGER: &str = "main";

pub async fn init(node: &str) -> Result<Session, StorageError> {
    let session = SessionBuilder::new()
        .known_node(node)
        .build()
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

    session.query("CREATE KEYSPACE IF NOT EXISTS coin_ledger WITH REPLICATION = {'class': 'SimpleStrategy', 'replication_factor': 1}", &[]).await.map_err(query_failed)?;
    session.query("CREATE TABLE IF NOT EXISTS coin_ledger.balances (currency TEXT PRIMARY KEY, qty TEXT)", &[]).await.map_err(query_failed)?;
    session.query("CREATE TABLE IF NOT EXISTS coin_ledger.transactions (ledger TEXT, seq BIGINT, date TIMESTAMP, from_currency TEXT, to_currency TEXT, rate TEXT, amount_out TEXT, amount_in TEXT, cash TEXT, usd_sum TEXT, PRIMARY KEY (ledger, seq)) WITH CLUSTERING ORDER BY (seq ASC)", &[]).await.map_err(query_failed)?;

    info!("Successfully connected to ScyllaDB at {}.", node);
    Ok(session)
}

pub struct ScyllaStore {
    session: Session,
}

impl ScyllaStore {
    pub fn new(session: Session) -> ScyllaStore {
        ScyllaStore { session }
    }
}

#[async_trait]
impl LedgerStore for ScyllaStore {
    async fn balances(&self) -> Result<Vec<Balance>, StorageError> {
        let query = Query::new("SELECT currency, qty FROM coin_ledger.balances");
        let rows = self
            .session
            .query(query, &[])
            .await
            .map_err(query_failed)?
            .rows
            .unwrap_or_default();
        rows.iter().map(balance_from_row).collect()
    }

    async fn transactions(&self) -> Result<Vec<Transaction>, StorageError> {
        let query = Query::new("SELECT seq, date, from_currency, to_currency, rate, amount_out, amount_in, cash, usd_sum FROM coin_ledger.transactions WHERE ledger = ?");
        let rows = self
            .session
            .query(query, (LEDGER,))
            .await
            .map_err(query_failed)?
            .rows
            .unwrap_or_default();
        let transactions = rows
            .iter()
            .map(transaction_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        info!("Fetched {} transactions.", transactions.len());
        Ok(transactions)
    }

    async fn seed(&self, balances: &[Balance]) -> Result<bool, StorageError> {
        let query = Query::new("SELECT currency FROM coin_ledger.balances LIMIT 1");
        let existing = self
            .session
            .query(query, &[])
            .await
            .map_err(query_failed)?
            .rows
            .map_or(0, |rows| rows.len());
        if existing > 0 {
            return Ok(false);
        }

        let insert = Query::new("INSERT INTO coin_ledger.balances (currency, qty) VALUES (?, ?)");
        for b in balances {
            self.session
                .query(insert.clone(), (b.currency.as_str(), b.qty.to_string()))
                .await
                .map_err(query_failed)?;
        }
        Ok(true)
    }

    async fn commit_trade(
        &self,
        debit: &Balance,
        credit: &Balance,
        transaction: &Transaction,
    ) -> Result<(), StorageError> {
        let mut batch = Batch::new(BatchType::Logged);
        batch.append_statement("UPDATE coin_ledger.balances SET qty = ? WHERE currency = ?");
        batch.append_statement("UPDATE coin_ledger.balances SET qty = ? WHERE currency = ?");
        batch.append_statement("INSERT INTO coin_ledger.transactions (ledger, seq, date, from_currency, to_currency, rate, amount_out, amount_in, cash, usd_sum) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)");

        let values = (
            (debit.qty.to_string(), debit.currency.as_str()),
            (credit.qty.to_string(), credit.currency.as_str()),
            (
                LEDGER,
                transaction.seq,
                transaction.date.timestamp_millis(),
                transaction.from.as_str(),
                transaction.to.as_str(),
                transaction.rate.to_string(),
                transaction.out.to_string(),
                transaction.amount_in.to_string(),
                transaction.cash.to_string(),
                transaction.usd_sum.to_string(),
            ),
        );
        self.session.batch(&batch, values).await.map_err(|e| {
            error!("Failed to commit trade #{}: {}", transaction.seq, e);
            query_failed(e)
        })?;
        Ok(())
    }

    async fn last_seq(&self) -> Result<i64, StorageError> {
        let query = Query::new(
            "SELECT seq FROM coin_ledger.transactions WHERE ledger = ? ORDER BY seq DESC LIMIT 1",
        );
        let rows = self
            .session
            .query(query, (LEDGER,))
            .await
            .map_err(query_failed)?
            .rows
            .unwrap_or_default();
        match rows.first() {
            Some(row) => bigint(row, 0, "transactions"),
            None => Ok(0),
        }
    }
}

fn query_failed(e: impl std::fmt::Display) -> StorageError {
    StorageError::Query(e.to_string())
}

fn column<'a>(row: &'a Row, idx: usize, table: &'static str) -> Result<&'a CqlValue, StorageError> {
    row.columns
        .get(idx)
        .and_then(|c| c.as_ref())
        .ok_or_else(|| StorageError::CorruptRow {
            table,
            reason: format!("column {} is missing", idx),
        })
}

fn text<'a>(row: &'a Row, idx: usize, table: &'static str) -> Result<&'a str, StorageError> {
    column(row, idx, table)?
        .as_text()
        .map(String::as_str)
        .ok_or_else(|| StorageError::CorruptRow {
            table,
            reason: format!("column {} is not text", idx),
        })
}

fn decimal(row: &Row, idx: usize, table: &'static str) -> Result<Decimal, StorageError> {
    let raw = text(row, idx, table)?;
    Decimal::from_str(raw).map_err(|e| StorageError::CorruptRow {
        table,
        reason: format!("`{}` is not a decimal: {}", raw, e),
    })
}

fn bigint(row: &Row, idx: usize, table: &'static str) -> Result<i64, StorageError> {
    column(row, idx, table)?
        .as_bigint()
        .ok_or_else(|| StorageError::CorruptRow {
            table,
            reason: format!("column {} is not a bigint", idx),
        })
}

fn timestamp(row: &Row, idx: usize, table: &'static str) -> Result<DateTime<Utc>, StorageError> {
    match column(row, idx, table)? {
        CqlValue::Timestamp(ts) => DateTime::<Utc>::from_timestamp_millis(ts.num_milliseconds())
            .ok_or_else(|| StorageError::CorruptRow {
                table,
                reason: format!("timestamp {:?} out of range", ts),
            }),
        other => Err(StorageError::CorruptRow {
            table,
            reason: format!("column {} is not a timestamp: {:?}", idx, other),
        }),
    }
}

fn balance_from_row(row: &Row) -> Result<Balance, StorageError> {
    Ok(Balance {
        currency: text(row, 0, "balances")?.to_string(),
        qty: decimal(row, 1, "balances")?,
    })
}

fn transaction_from_row(row: &Row) -> Result<Transaction, StorageError> {
    const T: &str = "transactions";
    Ok(Transaction {
        seq: bigint(row, 0, T)?,
        date: timestamp(row, 1, T)?,
        from: text(row, 2, T)?.to_string(),
        to: text(row, 3, T)?.to_string(),
        rate: decimal(row, 4, T)?,
        out: decimal(row, 5, T)?,
        amount_in: decimal(row, 6, T)?,
        cash: decimal(row, 7, T)?,
        usd_sum: decimal(row, 8, T)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn txt(s: &str) -> Option<CqlValue> {
        Some(CqlValue::Text(s.to_string()))
    }

    #[test]
    fn decodes_balance_rows() {
        let row = Row { columns: vec![txt("BTC"), txt("0.01")] };
        assert_eq!(
            balance_from_row(&row).unwrap(),
            Balance { currency: "BTC".into(), qty: dec!(0.01) }
        );

        let bad = Row { columns: vec![txt("BTC"), txt("lots")] };
        assert!(matches!(balance_from_row(&bad), Err(StorageError::CorruptRow { table: "balances", .. })));
        let missing = Row { columns: vec![txt("BTC"), None] };
        assert!(balance_from_row(&missing).is_err());
    }

    #[test]
    fn decodes_transaction_rows() {
        let row = Row {
            columns: vec![
                Some(CqlValue::BigInt(7)),
                Some(CqlValue::Timestamp(chrono::Duration::milliseconds(1_700_000_000_000))),
                txt("USD"),
                txt("BTC"),
                txt("20000"),
                txt("200.00"),
                txt("0.01"),
                txt("800.00"),
                txt("200.00"),
            ],
        };
        let tx = transaction_from_row(&row).unwrap();
        assert_eq!(tx.seq, 7);
        assert_eq!(tx.date.timestamp_millis(), 1_700_000_000_000);
        assert_eq!((tx.from.as_str(), tx.to.as_str()), ("USD", "BTC"));
        assert_eq!(tx.out, dec!(200));
        assert_eq!(tx.amount_in, dec!(0.01));
        assert_eq!(tx.cash, dec!(800));
    }

    #[test]
    fn rejects_wrong_column_types() {
        let row = Row { columns: vec![txt("7"), txt("yesterday")] };
        assert!(matches!(
            transaction_from_row(&row),
            Err(StorageError::CorruptRow { table: "transactions", .. })
        ));
    }
}
