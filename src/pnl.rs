// src/pnl.rs
//! Portfolio P&L derived by replaying the trade log against current balances.

use crate::error::{PortfolioError, Result};
use crate::models::{CurrencyStats, Transaction};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// Computes per-currency statistics.
///
/// `balances` maps every known currency to its current quantity. Transactions
/// are replayed in the given order; one that names a currency missing from
/// `balances` fails with `UnknownCurrency`, and totals beyond the decimal
/// range fail with `Overflow`. The `cash` currency keeps its
/// quantity and trade totals but no price-derived figures.
pub fn compute(
    transactions: &[Transaction],
    balances: &BTreeMap<String, Decimal>,
    cash: &str,
) -> Result<BTreeMap<String, CurrencyStats>> {
    let mut stats: BTreeMap<String, CurrencyStats> = balances
        .iter()
        .map(|(currency, qty)| {
            (
                currency.clone(),
                CurrencyStats {
                    qty: *qty,
                    ..CurrencyStats::default()
                },
            )
        })
        .collect();

    for ts in transactions {
        let to = stats
            .get_mut(&ts.to)
            .ok_or_else(|| PortfolioError::UnknownCurrency(ts.to.clone()))?;
        let overflow = || PortfolioError::Overflow(ts.to.clone());
        to.bought = to.bought.checked_add(ts.amount_in).ok_or_else(overflow)?;
        to.sum_bought = to.sum_bought.checked_add(ts.usd_sum).ok_or_else(overflow)?;
        if !ts.amount_in.is_zero() {
            to.last_price = ts.usd_sum.checked_div(ts.amount_in).ok_or_else(overflow)?;
        }

        let from = stats
            .get_mut(&ts.from)
            .ok_or_else(|| PortfolioError::UnknownCurrency(ts.from.clone()))?;
        let overflow = || PortfolioError::Overflow(ts.from.clone());
        from.sold = from.sold.checked_add(ts.out).ok_or_else(overflow)?;
        from.sum_sold = from.sum_sold.checked_add(ts.usd_sum).ok_or_else(overflow)?;
    }

    let mut qty_all = Decimal::ZERO;
    let mut sum_usd = Decimal::ZERO;
    for (currency, s) in stats.iter_mut().filter(|(c, _)| c.as_str() != cash) {
        let overflow = || PortfolioError::Overflow(currency.clone());
        s.wap = ratio(s.sum_bought, s.bought).ok_or_else(overflow)?;
        let sold_at_wap = s.wap.checked_mul(s.sold).ok_or_else(overflow)?;
        s.rpl = s.sum_sold.checked_sub(sold_at_wap).ok_or_else(overflow)?;
        let drift = s.last_price.checked_sub(s.wap).ok_or_else(overflow)?;
        s.upl = drift.checked_mul(s.qty).ok_or_else(overflow)?;
        s.total_pl = s.rpl.checked_add(s.upl).ok_or_else(overflow)?;

        let value = s.qty.checked_mul(s.wap).ok_or_else(overflow)?;
        qty_all = qty_all.checked_add(s.qty).ok_or_else(overflow)?;
        sum_usd = sum_usd.checked_add(value).ok_or_else(overflow)?;
    }

    for (currency, s) in stats.iter_mut().filter(|(c, _)| c.as_str() != cash) {
        let overflow = || PortfolioError::Overflow(currency.clone());
        // Both ratios are at most one here.
        s.allocation_by_shares = ratio(s.qty, qty_all).ok_or_else(overflow)? * HUNDRED;
        let value = s.qty.checked_mul(s.wap).ok_or_else(overflow)?;
        s.allocation_by_dollars = ratio(value, sum_usd).ok_or_else(overflow)? * HUNDRED;
    }

    Ok(stats)
}

/// `num / den`, zero when the denominator is not positive, `None` on overflow.
fn ratio(num: Decimal, den: Decimal) -> Option<Decimal> {
    if den > Decimal::ZERO {
        num.checked_div(den)
    } else {
        Some(Decimal::ZERO)
    }
}
