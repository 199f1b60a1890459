//! Error types for the pricing engine and its ledger.

use thiserror::Error;

use crate::models::MarketStatus;

/// Errors surfaced by the LMSR engine, the ledger and configuration loading.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("invalid outcome {outcome}: market has {outcome_count} outcomes")]
    InvalidOutcome { outcome: i64, outcome_count: usize },

    #[error("invalid quantity {quantity}: {reason}")]
    InvalidQuantity { quantity: f64, reason: String },

    #[error("share vector must not be empty")]
    EmptyShareVector,

    #[error("market question must not be empty")]
    InvalidQuestion,

    #[error("market {0} not found")]
    MarketNotFound(i64),

    #[error("market {market_id} is {status}, trading requires an active market")]
    MarketNotActive { market_id: i64, status: MarketStatus },

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl EngineError {
    /// True when the caller supplied bad arguments (as opposed to a storage fault).
    pub fn is_client_error(&self) -> bool {
        !matches!(self, EngineError::Storage(_))
    }
}

impl From<sqlx::Error> for EngineError {
    fn from(err: sqlx::Error) -> Self {
        EngineError::Storage(err.into())
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
