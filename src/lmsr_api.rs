//! LMSR engine: prices markets from the position ledger and commits trades.
//!
//! Reads go straight to the ledger on every call (no caching of share
//! totals). Trade commits for one market are serialised by a per-market
//! async lock held across read -> price -> append, so two concurrent trades
//! can never both be priced against the same pre-trade share vector.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::MarketConfig;
use crate::error::{EngineError, Result};
use crate::ledger::Ledger;
use crate::lmsr_core::{self, Outcome, BINARY_OUTCOME_COUNT};
use crate::models::{
    Market, MarketQuote, MarketStatus, MarketType, NewMarket, NewPosition, PriceSnapshot,
    TradeReceipt,
};

pub struct LmsrEngine<L> {
    ledger: L,
    config: MarketConfig,
    trade_locks: DashMap<i64, Arc<Mutex<()>>>,
}

impl<L: Ledger> LmsrEngine<L> {
    /// Fails with `InvalidConfiguration` when b (or the trade/liquidity bounds) is unusable.
    pub fn new(ledger: L, config: MarketConfig) -> Result<Self> {
        config.check()?;
        Ok(Self {
            ledger,
            config,
            trade_locks: DashMap::new(),
        })
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn config(&self) -> &MarketConfig {
        &self.config
    }

    // -----------------------
    // Core operations
    // -----------------------

    /// `[shares_no, shares_yes]` summed over every position in the market.
    pub async fn get_current_shares(&self, market_id: i64) -> Result<Vec<f64>> {
        self.ledger
            .read_aggregated_shares(market_id, BINARY_OUTCOME_COUNT)
            .await
    }

    /// Prices for `shares` at the default b.
    pub fn calculate_prices(&self, shares: &[f64]) -> Result<Vec<f64>> {
        lmsr_core::prices(shares, self.config.liquidity_param)
    }

    pub fn calculate_prices_with(&self, shares: &[f64], b: f64) -> Result<Vec<f64>> {
        lmsr_core::prices(shares, b)
    }

    pub fn calculate_cost(&self, shares: &[f64], b: f64) -> Result<f64> {
        lmsr_core::cost(shares, b)
    }

    /// Cost of buying `quantity` shares of `outcome` in `market_id` at the default b.
    ///
    /// Reads the ledger once and writes nothing. Only the outcome and
    /// positivity of `quantity` are validated here; the configured trade
    /// bounds apply in [`execute_trade`](Self::execute_trade).
    pub async fn calculate_trade_cost(
        &self,
        market_id: i64,
        outcome: i64,
        quantity: f64,
    ) -> Result<f64> {
        self.calculate_trade_cost_with(market_id, outcome, quantity, self.config.liquidity_param)
            .await
    }

    pub async fn calculate_trade_cost_with(
        &self,
        market_id: i64,
        outcome: i64,
        quantity: f64,
        b: f64,
    ) -> Result<f64> {
        lmsr_core::check_liquidity(b)?;
        let outcome = Outcome::from_index(outcome)?;
        self.require_market(market_id).await?;
        let shares = self.get_current_shares(market_id).await?;
        lmsr_core::trade_cost(&shares, outcome.index(), quantity, b)
    }

    /// Cost of a trade priced with the market's own b, as `execute_trade` would charge it.
    pub async fn calculate_market_trade_cost(
        &self,
        market_id: i64,
        outcome: i64,
        quantity: f64,
    ) -> Result<f64> {
        let outcome = Outcome::from_index(outcome)?;
        let market = self.require_market(market_id).await?;
        let shares = self.get_current_shares(market_id).await?;
        lmsr_core::trade_cost(&shares, outcome.index(), quantity, market.liquidity_param)
    }

    // -----------------------
    // Market lifecycle
    // -----------------------

    /// Open a binary market and seed its price history at 0.5 / 0.5.
    pub async fn create_market(&self, new_market: NewMarket) -> Result<Market> {
        let question = new_market.question.trim();
        if question.is_empty() {
            return Err(EngineError::InvalidQuestion);
        }
        let b = new_market
            .liquidity_param
            .unwrap_or(self.config.liquidity_param);
        self.config.check_market_liquidity(b)?;

        let market = self
            .ledger
            .insert_market(question, MarketType::Binary, MarketStatus::Active, b)
            .await?;
        self.ledger.append_price_snapshot(market.id, 0.5, 0.5).await?;

        info!(market_id = market.id, b, "📈 Created market: {}", market.question);
        Ok(market)
    }

    pub async fn get_market(&self, market_id: i64) -> Result<Market> {
        self.require_market(market_id).await
    }

    pub async fn list_markets(&self) -> Result<Vec<Market>> {
        self.ledger.list_markets().await
    }

    /// Shares and prices of a market, priced with the market's own b.
    pub async fn quote(&self, market_id: i64) -> Result<MarketQuote> {
        let market = self.require_market(market_id).await?;
        let shares = self.get_current_shares(market_id).await?;
        let prices = lmsr_core::prices(&shares, market.liquidity_param)?;
        Ok(MarketQuote {
            market,
            shares,
            prices,
        })
    }

    pub async fn price_history(&self, market_id: i64) -> Result<Vec<PriceSnapshot>> {
        self.require_market(market_id).await?;
        self.ledger.price_history(market_id).await
    }

    // -----------------------
    // Trading
    // -----------------------

    /// Buy `quantity` shares of `outcome` for `user_id` and record the trade.
    ///
    /// The market must be active and `quantity` must lie within the configured
    /// trade bounds. Cost is computed with the market's own b.
    pub async fn execute_trade(
        &self,
        market_id: i64,
        user_id: &str,
        outcome: i64,
        quantity: f64,
    ) -> Result<TradeReceipt> {
        let side = Outcome::from_index(outcome)?;
        self.config.check_trade_quantity(quantity)?;

        // markets are never deleted, so unknown ids are rejected before a lock exists for them
        let market = self.require_market(market_id).await?;
        if !market.status.accepts_trades() {
            warn!(market_id, status = %market.status, "rejected trade on inactive market");
            return Err(EngineError::MarketNotActive {
                market_id,
                status: market.status,
            });
        }

        let lock = self.trade_lock(market_id);
        let _guard = lock.lock().await;

        let b = market.liquidity_param;
        let shares = self.get_current_shares(market_id).await?;
        let prices_before = lmsr_core::prices(&shares, b)?;
        let cost = lmsr_core::trade_cost(&shares, side.index(), quantity, b)?;
        let after = lmsr_core::shares_after(&shares, side.index(), quantity);
        let prices_after = lmsr_core::prices(&after, b)?;

        let (position, snapshot) = self
            .ledger
            .commit_trade(
                NewPosition {
                    user_id: user_id.to_string(),
                    market_id,
                    outcome,
                    shares: quantity,
                    cost,
                },
                prices_after[Outcome::Yes.index()],
                prices_after[Outcome::No.index()],
            )
            .await?;

        info!(
            market_id,
            outcome = %side,
            quantity,
            cost,
            yes_price = prices_after[Outcome::Yes.index()],
            "💱 Trade committed"
        );
        debug!(?shares, ?after, "share vector moved");

        Ok(TradeReceipt {
            position,
            prices_before,
            prices_after,
            snapshot,
        })
    }

    fn trade_lock(&self, market_id: i64) -> Arc<Mutex<()>> {
        self.trade_locks
            .entry(market_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn require_market(&self, market_id: i64) -> Result<Market> {
        self.ledger
            .get_market(market_id)
            .await?
            .ok_or(EngineError::MarketNotFound(market_id))
    }
}
