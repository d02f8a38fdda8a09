// src/main.rs
mod api;
mod charts;
mod config;
mod db;
mod error;
mod ledger;
mod market;
mod models;
mod pnl;
mod trade;
mod views;

use crate::config::{Config, StoreKind};
use crate::ledger::{Ledger, LedgerStore, MemoryStore};
use crate::market::MarketDataClient;
use env_logger::Builder;
use log::{error, info, LevelFilter};
use std::sync::Arc;

#[tokio::main]
async fn main() {
    Builder::new()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .format_timestamp_secs()
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            return;
        }
    };

    let store: Arc<dyn LedgerStore> = match config.store {
        StoreKind::Scylla => match db::init(&config.scylla_node).await {
            Ok(session) => Arc::new(db::ScyllaStore::new(session)),
            Err(e) => {
                error!("Failed to initialize database: {}", e);
                return;
            }
        },
        StoreKind::Memory => {
            info!("Using the in-memory ledger; trades are lost on restart.");
            Arc::new(MemoryStore::new())
        }
    };

    let ledger = Arc::new(Ledger::new(store, &config.base_currency));
    if let Err(e) = ledger.seed(&config.seed).await {
        error!("Failed to seed balances: {}", e);
        return;
    }

    let prices = match MarketDataClient::new(&config.api_url, config.api_timeout) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!("Failed to build the price API client: {}", e);
            return;
        }
    };

    if let Err(e) = tokio::fs::create_dir_all(&config.img_dir).await {
        error!("Failed to create {}: {}", config.img_dir.display(), e);
        return;
    }

    info!("Starting the portfolio dashboard...");
    let state = api::AppState::new(ledger, prices, config.img_dir.clone());

    info!("Server running on http://{}", config.bind);
    warp::serve(api::app(state)).run(config.bind).await;
}
