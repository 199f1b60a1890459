//! Concurrent trading simulation for the LMSR engine
//!
//! This module checks:
//! 1. **Correctness**: every committed trade is reflected in the aggregated share vector
//! 2. **Path independence**: total cost collected equals `C(q_final) - C(0)`, which
//!    only holds when no two trades were priced against the same share vector
//! 3. **History**: one snapshot per committed trade plus the seed, timestamps ordered
//! 4. **Performance**: trades per second under contention

use anyhow::{anyhow, Result};
use rand::prelude::*;
use rand::rngs::StdRng;
use std::env;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

use crate::ledger::Ledger;
use crate::lmsr_api::LmsrEngine;
use crate::lmsr_core::{self, BINARY_OUTCOME_COUNT};
use crate::models::NewMarket;

// Simulation Parameters (defaults; override via STRESS_* env vars)
const NUM_TRADERS: usize = 50;
const NUM_MARKETS: usize = 5;
const TRADES_PER_TRADER: usize = 200;
const MAX_QUANTITY: f64 = 50.0;
const YES_BIAS: f64 = 0.6;
const SEED: u64 = 42;

const TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone)]
pub struct StressConfig {
    pub num_traders: usize,
    pub num_markets: usize,
    pub trades_per_trader: usize,
    pub max_quantity: f64,
    pub yes_bias: f64,
    pub seed: u64,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            num_traders: NUM_TRADERS,
            num_markets: NUM_MARKETS,
            trades_per_trader: TRADES_PER_TRADER,
            max_quantity: MAX_QUANTITY,
            yes_bias: YES_BIAS,
            seed: SEED,
        }
    }
}

impl StressConfig {
    pub fn from_env() -> Self {
        Self {
            num_traders: env_usize("STRESS_NUM_TRADERS", NUM_TRADERS),
            num_markets: env_usize("STRESS_NUM_MARKETS", NUM_MARKETS),
            trades_per_trader: env_usize("STRESS_TRADES_PER_TRADER", TRADES_PER_TRADER),
            max_quantity: env_f64("STRESS_MAX_QUANTITY", MAX_QUANTITY),
            yes_bias: env_f64_clamped("STRESS_YES_BIAS", YES_BIAS, 0.0, 1.0),
            seed: env::var("STRESS_SEED")
                .ok()
                .and_then(|value| value.parse().ok())
                .unwrap_or(SEED),
        }
    }
}

fn env_usize(name: &str, default: usize) -> usize {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}

fn env_f64(name: &str, default: f64) -> f64 {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<f64>().ok())
        .filter(|value| value.is_finite() && *value > 0.0)
        .unwrap_or(default)
}

fn env_f64_clamped(name: &str, default: f64, min: f64, max: f64) -> f64 {
    env_f64(name, default).clamp(min, max)
}

#[derive(Debug, Clone)]
pub struct StressReport {
    pub successful_trades: usize,
    pub rejected_trades: usize,
    pub elapsed_secs: f64,
    pub trades_per_second: f64,
    /// Largest `|Σ cost - (C(q_final) - C(0))|` over all markets
    pub max_cost_drift: f64,
}

/// Run the simulation against `engine`, then verify ledger invariants.
pub async fn run_stress_test<L>(engine: Arc<LmsrEngine<L>>, stress: &StressConfig) -> Result<StressReport>
where
    L: Ledger + 'static,
{
    let mut market_ids = Vec::with_capacity(stress.num_markets);
    for i in 0..stress.num_markets {
        let market = engine
            .create_market(NewMarket::new(format!("Stress market #{}?", i + 1)))
            .await?;
        market_ids.push(market.id);
    }
    let market_ids = Arc::new(market_ids);
    let min_quantity = engine.config().min_trade_quantity;
    let max_quantity = stress.max_quantity.max(min_quantity);

    info!(
        "🚀 Starting simulation: {} traders x {} trades over {} markets",
        stress.num_traders, stress.trades_per_trader, stress.num_markets
    );
    let start = Instant::now();

    let mut handles = Vec::with_capacity(stress.num_traders);
    for trader in 0..stress.num_traders {
        let engine = Arc::clone(&engine);
        let market_ids = Arc::clone(&market_ids);
        let trades = stress.trades_per_trader;
        let yes_bias = stress.yes_bias;
        let mut rng = StdRng::seed_from_u64(stress.seed.wrapping_add(trader as u64));

        handles.push(tokio::spawn(async move {
            let user_id = format!("trader-{trader}");
            let (mut ok, mut rejected) = (0usize, 0usize);
            for _ in 0..trades {
                let market_id = market_ids[rng.gen_range(0..market_ids.len())];
                let outcome = if rng.gen_bool(yes_bias) { 1 } else { 0 };
                let quantity = rng.gen_range(min_quantity..=max_quantity);
                match engine.execute_trade(market_id, &user_id, outcome, quantity).await {
                    Ok(_) => ok += 1,
                    Err(e) => {
                        error!(market_id, "trade failed: {}", e);
                        rejected += 1;
                    }
                }
                tokio::task::yield_now().await;
            }
            (ok, rejected)
        }));
    }

    let mut successful_trades = 0;
    let mut rejected_trades = 0;
    for handle in handles {
        let (ok, rejected) = handle.await?;
        successful_trades += ok;
        rejected_trades += rejected;
    }

    let elapsed_secs = start.elapsed().as_secs_f64();
    let trades_per_second = if elapsed_secs > 0.0 {
        successful_trades as f64 / elapsed_secs
    } else {
        successful_trades as f64
    };
    info!("🏁 Simulation finished in {:.2}s", elapsed_secs);
    info!("   Executed {} trades ({} rejected)", successful_trades, rejected_trades);
    info!("   Performance: {:.2} Trades/Second", trades_per_second);

    info!("🔍 Verifying ledger invariants...");
    let mut max_cost_drift: f64 = 0.0;
    let mut trades_seen = 0;
    for &market_id in market_ids.iter() {
        let drift = verify_market(&engine, market_id).await?;
        max_cost_drift = max_cost_drift.max(drift);
        trades_seen += engine.ledger().positions(market_id).await?.len();
    }
    if trades_seen != successful_trades {
        return Err(anyhow!(
            "ledger holds {} positions but {} trades succeeded",
            trades_seen,
            successful_trades
        ));
    }
    info!("✅ Invariants hold. Max cost drift: {:.3e}", max_cost_drift);

    Ok(StressReport {
        successful_trades,
        rejected_trades,
        elapsed_secs,
        trades_per_second,
        max_cost_drift,
    })
}

/// Check one market's ledger against its prices. Returns the cost drift.
pub async fn verify_market<L: Ledger>(engine: &LmsrEngine<L>, market_id: i64) -> Result<f64> {
    let quote = engine.quote(market_id).await?;
    let b = quote.market.liquidity_param;
    let positions = engine.ledger().positions(market_id).await?;

    let mut expected = vec![0.0; BINARY_OUTCOME_COUNT];
    let mut collected = 0.0;
    for p in &positions {
        let slot = usize::try_from(p.outcome)
            .ok()
            .and_then(|i| expected.get_mut(i))
            .ok_or_else(|| anyhow!("market {}: position {} has outcome {}", market_id, p.id, p.outcome))?;
        *slot += p.shares;
        collected += p.cost;
    }
    for (got, want) in quote.shares.iter().zip(&expected) {
        if (got - want).abs() > TOLERANCE * want.max(1.0) {
            return Err(anyhow!(
                "market {}: aggregated shares {:?} != position sum {:?}",
                market_id,
                quote.shares,
                expected
            ));
        }
    }

    let price_sum: f64 = quote.prices.iter().sum();
    if (price_sum - 1.0).abs() > 1e-9 {
        return Err(anyhow!("market {}: prices sum to {}", market_id, price_sum));
    }

    let path_cost = lmsr_core::cost(&quote.shares, b)? - lmsr_core::cost(&[0.0, 0.0], b)?;
    let drift = (collected - path_cost).abs();
    if drift > TOLERANCE * path_cost.abs().max(1.0) {
        return Err(anyhow!(
            "market {}: collected {} but cost function moved {}",
            market_id,
            collected,
            path_cost
        ));
    }

    let history = engine.price_history(market_id).await?;
    if history.len() != positions.len() + 1 {
        return Err(anyhow!(
            "market {}: {} snapshots for {} trades",
            market_id,
            history.len(),
            positions.len()
        ));
    }
    if history.windows(2).any(|w| w[0].timestamp > w[1].timestamp) {
        return Err(anyhow!("market {}: price history out of order", market_id));
    }
    if let Some(last) = history.last() {
        if (last.yes_price - quote.yes_price()).abs() > 1e-9 {
            return Err(anyhow!(
                "market {}: latest snapshot {} disagrees with current price {}",
                market_id,
                last.yes_price,
                quote.yes_price()
            ));
        }
    }

    Ok(drift)
}
