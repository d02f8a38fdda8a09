// src/error.rs
use rust_decimal::Decimal;
use thiserror::Error;
use warp::http::StatusCode;
use warp::reject::Reject;

#[derive(Error, Debug)]
pub enum MarketDataError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Request to {0} timed out")]
    Timeout(String),

    #[error("Price API answered with HTTP {0}")]
    Status(u16),

    #[error("Price API error: {0}")]
    Provider(String),

    #[error("Malformed price API response: {0}")]
    Parse(String),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to connect to database: {0}")]
    Connection(String),

    #[error("Database query failed: {0}")]
    Query(String),

    #[error("Corrupt row in {table}: {reason}")]
    CorruptRow { table: &'static str, reason: String },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

#[derive(Error, Debug)]
pub enum PortfolioError {
    #[error("Market data unavailable: {0}")]
    MarketData(#[from] MarketDataError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Unknown currency: {0}")]
    UnknownCurrency(String),

    #[error("Not enough {currency}: {required} required, {available} available")]
    InsufficientFunds {
        currency: String,
        required: Decimal,
        available: Decimal,
    },

    #[error("Quantity must be a positive number, got {0:?}")]
    InvalidQuantity(String),

    #[error("Cannot trade {0} for itself")]
    SameCurrency(String),

    #[error("Figures for {0} exceed the representable range")]
    Overflow(String),

    #[error("Chart output failed: {0}")]
    Chart(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PortfolioError>;

impl PortfolioError {
    pub fn status(&self) -> StatusCode {
        match self {
            PortfolioError::MarketData(MarketDataError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            PortfolioError::MarketData(_) => StatusCode::BAD_GATEWAY,
            PortfolioError::UnknownCurrency(_) => StatusCode::NOT_FOUND,
            PortfolioError::InvalidQuantity(_) | PortfolioError::SameCurrency(_) => {
                StatusCode::BAD_REQUEST
            }
            PortfolioError::InsufficientFunds { .. } => StatusCode::OK,
            PortfolioError::Storage(_) | PortfolioError::Overflow(_) | PortfolioError::Chart(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Carries a `PortfolioError` through warp's rejection machinery.
#[derive(Debug)]
pub struct CustomError {
    pub error: PortfolioError,
}

impl std::fmt::Display for CustomError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl std::error::Error for CustomError {}

impl Reject for CustomError {}

impl From<PortfolioError> for CustomError {
    fn from(error: PortfolioError) -> Self {
        CustomError { error }
    }
}
