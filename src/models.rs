//! Market, position and price-history records.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::lmsr_core::Outcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketType {
    Binary,
    Categorical,
    Numerical,
}

impl MarketType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarketType::Binary => "binary",
            MarketType::Categorical => "categorical",
            MarketType::Numerical => "numerical",
        }
    }
}

impl FromStr for MarketType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "binary" => Ok(MarketType::Binary),
            "categorical" => Ok(MarketType::Categorical),
            "numerical" => Ok(MarketType::Numerical),
            _ => Err(format!("Invalid market type: '{}'", s)),
        }
    }
}

/// Lifecycle: active -> closed -> resolved. Only `Active` markets accept trades.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketStatus {
    Active,
    Closed,
    Resolved,
}

impl MarketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarketStatus::Active => "active",
            MarketStatus::Closed => "closed",
            MarketStatus::Resolved => "resolved",
        }
    }

    pub fn accepts_trades(&self) -> bool {
        matches!(self, MarketStatus::Active)
    }
}

impl FromStr for MarketStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(MarketStatus::Active),
            "closed" => Ok(MarketStatus::Closed),
            "resolved" => Ok(MarketStatus::Resolved),
            _ => Err(format!("Invalid market status: '{}'", s)),
        }
    }
}

impl fmt::Display for MarketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Market {
    pub id: i64,
    pub question: String,
    pub market_type: MarketType,
    pub status: MarketStatus,
    pub created_at: DateTime<Utc>,
    pub resolution_date: Option<DateTime<Utc>>,
    /// Winning outcome index; only set once resolved.
    pub outcome: Option<i64>,
    pub liquidity_param: f64,
}

/// Request to open a market. `liquidity_param` falls back to the configured default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMarket {
    pub question: String,
    #[serde(default)]
    pub liquidity_param: Option<f64>,
}

impl NewMarket {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            liquidity_param: None,
        }
    }

    pub fn with_liquidity(mut self, b: f64) -> Self {
        self.liquidity_param = Some(b);
        self
    }
}

/// Ledger entry. Outcome is kept as the raw index so the lenient read path
/// can see (and drop) indices outside the market's outcome space.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: i64,
    pub user_id: String,
    pub market_id: i64,
    pub outcome: i64,
    pub shares: f64,
    pub cost: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPosition {
    pub user_id: String,
    pub market_id: i64,
    pub outcome: i64,
    pub shares: f64,
    pub cost: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceSnapshot {
    pub id: i64,
    pub market_id: i64,
    pub yes_price: f64,
    pub no_price: f64,
    pub timestamp: DateTime<Utc>,
}

/// Current state of a market as shown to traders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketQuote {
    pub market: Market,
    /// `[no, yes]`
    pub shares: Vec<f64>,
    /// `[no, yes]`
    pub prices: Vec<f64>,
}

impl MarketQuote {
    pub fn yes_price(&self) -> f64 {
        self.prices[Outcome::Yes.index()]
    }

    pub fn no_price(&self) -> f64 {
        self.prices[Outcome::No.index()]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeReceipt {
    pub position: Position,
    pub prices_before: Vec<f64>,
    pub prices_after: Vec<f64>,
    pub snapshot: PriceSnapshot,
}
