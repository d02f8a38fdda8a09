// src/api.rs
use crate::charts::{self, HISTORY_DAYS, MOVING_AVERAGE_DAYS};
use crate::error::{CustomError, PortfolioError};
use crate::ledger::Ledger;
use crate::market::{Period, PriceSource};
use crate::models::{DealQuery, PairQuery, TradePair};
use crate::pnl;
use crate::trade::{parse_quantity, TradeExecutor};
use crate::views;
use log::{error, info, warn};
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::Arc;
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<Ledger>,
    pub prices: Arc<dyn PriceSource>,
    pub executor: Arc<TradeExecutor>,
    pub img_dir: Arc<PathBuf>,
}

impl AppState {
    pub fn new(ledger: Arc<Ledger>, prices: Arc<dyn PriceSource>, img_dir: PathBuf) -> AppState {
        let executor = Arc::new(TradeExecutor::new(ledger.clone(), prices.clone()));
        AppState {
            ledger,
            prices,
            executor,
            img_dir: Arc::new(img_dir),
        }
    }
}

pub fn routes(state: AppState) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    let index = warp::path::end()
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(index_handler);

    let trade = warp::path!("trade")
        .and(warp::get())
        .and(warp::query::<PairQuery>())
        .and(with_state(state.clone()))
        .and_then(trade_handler);

    let deal = warp::path!("deal")
        .and(warp::get())
        .and(warp::query::<DealQuery>())
        .and(with_state(state.clone()))
        .and_then(deal_handler);

    let img = warp::path("img")
        .and(warp::get())
        .and(warp::fs::dir(state.img_dir.as_ref().clone()));

    index.or(trade).or(deal).or(img)
}

/// Routes with HTML error pages and request logging.
pub fn app(state: AppState) -> impl Filter<Extract = impl Reply, Error = Infallible> + Clone {
    routes(state)
        .recover(handle_rejection)
        .with(warp::log("coin_ledger::access"))
}

fn with_state(state: AppState) -> impl Filter<Extract = (AppState,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

fn reject(e: PortfolioError) -> Rejection {
    warp::reject::custom(CustomError::from(e))
}

async fn index_handler(state: AppState) -> Result<impl Reply, Rejection> {
    let snapshot = state.ledger.snapshot().await.map_err(|e| {
        error!("Failed to read ledger: {}", e);
        reject(e)
    })?;

    let pl = pnl::compute(
        &snapshot.transactions,
        &snapshot.balances,
        state.ledger.base_currency(),
    )
    .map_err(|e| {
        error!("Failed to compute P&L: {}", e);
        reject(e)
    })?;

    let trades = trade_pairs(&snapshot.balances);
    info!("Portfolio rendered with {} transactions.", snapshot.transactions.len());
    Ok(warp::reply::html(views::index(&trades, &snapshot.transactions, &pl)))
}

async fn trade_handler(query: PairQuery, state: AppState) -> Result<impl Reply, Rejection> {
    let (cur1, cur2) = (query.cur1, query.cur2);
    trade_page(&cur1, &cur2, &state).await.map_err(|e| {
        error!("Trade page for {}/{} failed: {}", cur1, cur2, e);
        reject(e)
    })
}

async fn trade_page(cur1: &str, cur2: &str, state: &AppState) -> crate::error::Result<impl Reply> {
    if cur1 == cur2 {
        return Err(PortfolioError::SameCurrency(cur1.to_string()));
    }
    let balances = state.ledger.balances().await?;
    for currency in [cur1, cur2] {
        if !balances.contains_key(currency) {
            return Err(PortfolioError::UnknownCurrency(currency.to_string()));
        }
    }

    let prices = &state.prices;
    let history = prices.history(cur2, cur1, Period::Day, HISTORY_DAYS - 1).await?;
    let recent = prices
        .history(cur2, cur1, Period::Day, (2 * MOVING_AVERAGE_DAYS - 2) as u32)
        .await?;
    let stat = prices.day_stats(cur2, cur1).await?;
    let price = prices.price(cur2, cur1).await?;

    charts::write_history(&state.img_dir, cur1, cur2, &history).await?;
    charts::write_moving_average(&state.img_dir, cur1, cur2, &recent).await?;

    info!("Trade page rendered for {}/{} at {}.", cur1, cur2, price);
    Ok(warp::reply::html(views::trade(
        cur1,
        cur2,
        price,
        &stat,
        &charts::history_file(cur1, cur2),
        &charts::moving_avg_file(cur1, cur2),
    )))
}

async fn deal_handler(query: DealQuery, state: AppState) -> Result<impl Reply, Rejection> {
    let qty = parse_quantity(&query.qty).map_err(reject)?;

    let text = match state.executor.execute(&query.cur1, &query.cur2, qty).await {
        Ok(tx) => {
            info!("Deal #{} went through.", tx.seq);
            format!(
                "Thank you! Your transaction went through. Remaining {} balance is {}",
                state.ledger.base_currency(),
                views::money(tx.cash)
            )
        }
        Err(e @ PortfolioError::InsufficientFunds { .. }) => {
            warn!("Deal rejected: {}", e);
            shortfall(&e)
        }
        Err(e) => {
            error!("Deal failed: {}", e);
            return Err(reject(e));
        }
    };
    Ok(warp::reply::html(views::deal(&text, &query.cur1, &query.cur2)))
}

fn shortfall(e: &PortfolioError) -> String {
    match e {
        PortfolioError::InsufficientFunds {
            currency,
            required,
            available,
        } => format!(
            "Not enough money. {} {} required, {} available.",
            views::money(*required),
            currency,
            views::money(*available)
        ),
        other => other.to_string(),
    }
}

/// Every pair whose funding currency has a positive balance.
pub fn trade_pairs(balances: &BTreeMap<String, rust_decimal::Decimal>) -> Vec<TradePair> {
    balances
        .iter()
        .filter(|(_, qty)| **qty > rust_decimal::Decimal::ZERO)
        .flat_map(|(cur1, _)| {
            balances
                .keys()
                .filter(move |cur2| *cur2 != cur1)
                .map(move |cur2| TradePair {
                    cur1: cur1.clone(),
                    cur2: cur2.clone(),
                })
        })
        .collect()
}

pub async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (status, message) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Page not found".to_string())
    } else if let Some(e) = err.find::<CustomError>() {
        (e.error.status(), e.error.to_string())
    } else if let Some(e) = err.find::<warp::reject::InvalidQuery>() {
        (StatusCode::BAD_REQUEST, e.to_string())
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed".to_string())
    } else {
        error!("Unhandled rejection: {:?}", err);
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
    };

    Ok(warp::reply::with_status(
        warp::reply::html(views::error(status.as_u16(), &message)),
        status,
    ))
}
