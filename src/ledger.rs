//! Append-only position and price-history storage.
//!
//! The engine talks to storage only through [`Ledger`]; `MemoryLedger` backs
//! tests and the stress simulation, `db_adapter::PgLedger` backs the service.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::Result;
use crate::models::{Market, MarketStatus, MarketType, NewPosition, Position, PriceSnapshot};

#[async_trait]
pub trait Ledger: Send + Sync {
    async fn insert_market(
        &self,
        question: &str,
        market_type: MarketType,
        status: MarketStatus,
        liquidity_param: f64,
    ) -> Result<Market>;

    async fn get_market(&self, market_id: i64) -> Result<Option<Market>>;

    /// Newest first.
    async fn list_markets(&self) -> Result<Vec<Market>>;

    /// Per-outcome share totals `[outcome 0, outcome 1, ...]` of length
    /// `outcome_count`. A market with no positions yields all zeros.
    async fn read_aggregated_shares(&self, market_id: i64, outcome_count: usize)
        -> Result<Vec<f64>>;

    async fn append_position(&self, position: NewPosition) -> Result<Position>;

    async fn append_price_snapshot(
        &self,
        market_id: i64,
        yes_price: f64,
        no_price: f64,
    ) -> Result<PriceSnapshot>;

    async fn positions(&self, market_id: i64) -> Result<Vec<Position>>;

    /// Ordered by timestamp, then insertion.
    async fn price_history(&self, market_id: i64) -> Result<Vec<PriceSnapshot>>;

    /// Record a trade and the prices it produced.
    async fn commit_trade(
        &self,
        position: NewPosition,
        yes_price: f64,
        no_price: f64,
    ) -> Result<(Position, PriceSnapshot)> {
        let market_id = position.market_id;
        let position = self.append_position(position).await?;
        let snapshot = self.append_price_snapshot(market_id, yes_price, no_price).await?;
        Ok((position, snapshot))
    }
}

/// Sum share quantities per outcome.
///
/// Order of `rows` does not matter. Outcome indices outside
/// `0..outcome_count` are ignored rather than rejected.
pub fn aggregate_shares<I>(rows: I, outcome_count: usize) -> Vec<f64>
where
    I: IntoIterator<Item = (i64, f64)>,
{
    let mut shares = vec![0.0; outcome_count];
    for (outcome, quantity) in rows {
        match usize::try_from(outcome).ok().and_then(|i| shares.get_mut(i)) {
            Some(total) => *total += quantity,
            None => debug!(outcome, quantity, "ignoring out-of-range outcome during aggregation"),
        }
    }
    shares
}

/// Snapshot times never go backwards within a market.
pub(crate) fn next_snapshot_time(latest: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let now = Utc::now();
    match latest {
        Some(latest) if latest > now => latest,
        _ => now,
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    markets: Vec<Market>,
    positions: Vec<Position>,
    history: Vec<PriceSnapshot>,
}

/// In-process ledger. Ids are assigned sequentially from 1.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    state: RwLock<MemoryState>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn insert_market(
        &self,
        question: &str,
        market_type: MarketType,
        status: MarketStatus,
        liquidity_param: f64,
    ) -> Result<Market> {
        let mut state = self.state.write().await;
        let market = Market {
            id: state.markets.len() as i64 + 1,
            question: question.to_string(),
            market_type,
            status,
            created_at: Utc::now(),
            resolution_date: None,
            outcome: None,
            liquidity_param,
        };
        state.markets.push(market.clone());
        Ok(market)
    }

    async fn get_market(&self, market_id: i64) -> Result<Option<Market>> {
        let state = self.state.read().await;
        Ok(state.markets.iter().find(|m| m.id == market_id).cloned())
    }

    async fn list_markets(&self) -> Result<Vec<Market>> {
        let state = self.state.read().await;
        let mut markets = state.markets.clone();
        markets.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(markets)
    }

    async fn read_aggregated_shares(
        &self,
        market_id: i64,
        outcome_count: usize,
    ) -> Result<Vec<f64>> {
        let state = self.state.read().await;
        let rows = state
            .positions
            .iter()
            .filter(|p| p.market_id == market_id)
            .map(|p| (p.outcome, p.shares));
        Ok(aggregate_shares(rows, outcome_count))
    }

    async fn append_position(&self, position: NewPosition) -> Result<Position> {
        let mut state = self.state.write().await;
        let position = Position {
            id: state.positions.len() as i64 + 1,
            user_id: position.user_id,
            market_id: position.market_id,
            outcome: position.outcome,
            shares: position.shares,
            cost: position.cost,
            timestamp: Utc::now(),
        };
        state.positions.push(position.clone());
        Ok(position)
    }

    async fn append_price_snapshot(
        &self,
        market_id: i64,
        yes_price: f64,
        no_price: f64,
    ) -> Result<PriceSnapshot> {
        let mut state = self.state.write().await;
        let latest = state
            .history
            .iter()
            .filter(|s| s.market_id == market_id)
            .map(|s| s.timestamp)
            .max();
        let snapshot = PriceSnapshot {
            id: state.history.len() as i64 + 1,
            market_id,
            yes_price,
            no_price,
            timestamp: next_snapshot_time(latest),
        };
        state.history.push(snapshot.clone());
        Ok(snapshot)
    }

    async fn positions(&self, market_id: i64) -> Result<Vec<Position>> {
        let state = self.state.read().await;
        Ok(state
            .positions
            .iter()
            .filter(|p| p.market_id == market_id)
            .cloned()
            .collect())
    }

    async fn price_history(&self, market_id: i64) -> Result<Vec<PriceSnapshot>> {
        let state = self.state.read().await;
        let mut history: Vec<PriceSnapshot> = state
            .history
            .iter()
            .filter(|s| s.market_id == market_id)
            .cloned()
            .collect();
        history.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));
        Ok(history)
    }

    async fn commit_trade(
        &self,
        position: NewPosition,
        yes_price: f64,
        no_price: f64,
    ) -> Result<(Position, PriceSnapshot)> {
        // one write guard so readers never see the position without its snapshot
        let mut state = self.state.write().await;
        let now = Utc::now();
        let position = Position {
            id: state.positions.len() as i64 + 1,
            user_id: position.user_id,
            market_id: position.market_id,
            outcome: position.outcome,
            shares: position.shares,
            cost: position.cost,
            timestamp: now,
        };
        let latest = state
            .history
            .iter()
            .filter(|s| s.market_id == position.market_id)
            .map(|s| s.timestamp)
            .max();
        let snapshot = PriceSnapshot {
            id: state.history.len() as i64 + 1,
            market_id: position.market_id,
            yes_price,
            no_price,
            timestamp: next_snapshot_time(latest),
        };
        state.positions.push(position.clone());
        state.history.push(snapshot.clone());
        Ok((position, snapshot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(market_id: i64, outcome: i64, shares: f64) -> NewPosition {
        NewPosition {
            user_id: "user123".to_string(),
            market_id,
            outcome,
            shares,
            cost: 1.0,
        }
    }

    #[test]
    fn aggregate_empty_is_zero_vector() {
        assert_eq!(aggregate_shares(Vec::new(), 2), vec![0.0, 0.0]);
    }

    #[test]
    fn aggregate_drops_out_of_range_outcomes() {
        let rows = vec![(0, 2.0), (1, 3.0), (2, 100.0), (-1, 7.0), (1, 4.0)];
        assert_eq!(aggregate_shares(rows, 2), vec![2.0, 7.0]);
    }

    #[test]
    fn aggregate_ignores_row_order() {
        let rows = vec![(1, 10.0), (0, 2.5), (1, 5.0)];
        let mut reversed = rows.clone();
        reversed.reverse();
        assert_eq!(aggregate_shares(rows, 2), aggregate_shares(reversed, 2));
    }

    #[tokio::test]
    async fn memory_ledger_aggregates_per_market() {
        let ledger = MemoryLedger::new();
        let a = ledger
            .insert_market("A?", MarketType::Binary, MarketStatus::Active, 100.0)
            .await
            .unwrap();
        let b = ledger
            .insert_market("B?", MarketType::Binary, MarketStatus::Active, 100.0)
            .await
            .unwrap();

        ledger.append_position(position(a.id, 1, 10.0)).await.unwrap();
        ledger.append_position(position(a.id, 0, 4.0)).await.unwrap();
        ledger.append_position(position(b.id, 1, 99.0)).await.unwrap();
        ledger.append_position(position(a.id, 5, 99.0)).await.unwrap();

        assert_eq!(ledger.read_aggregated_shares(a.id, 2).await.unwrap(), vec![4.0, 10.0]);
        assert_eq!(ledger.read_aggregated_shares(b.id, 2).await.unwrap(), vec![0.0, 99.0]);
        assert_eq!(ledger.read_aggregated_shares(42, 2).await.unwrap(), vec![0.0, 0.0]);
        assert_eq!(ledger.positions(a.id).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn memory_ledger_history_is_ordered() {
        let ledger = MemoryLedger::new();
        let m = ledger
            .insert_market("Q?", MarketType::Binary, MarketStatus::Active, 100.0)
            .await
            .unwrap();
        ledger.append_price_snapshot(m.id, 0.5, 0.5).await.unwrap();
        let (_, snap) = ledger.commit_trade(position(m.id, 1, 10.0), 0.525, 0.475).await.unwrap();
        ledger.append_price_snapshot(m.id, 0.55, 0.45).await.unwrap();

        let history = ledger.price_history(m.id).await.unwrap();
        assert_eq!(history.len(), 3);
        assert!(history.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        assert_eq!(history[1].id, snap.id);
        assert_eq!(history[0].yes_price, 0.5);
    }

    #[tokio::test]
    async fn memory_ledger_lists_newest_first() {
        let ledger = MemoryLedger::new();
        for q in ["first?", "second?", "third?"] {
            ledger
                .insert_market(q, MarketType::Binary, MarketStatus::Active, 100.0)
                .await
                .unwrap();
        }
        let markets = ledger.list_markets().await.unwrap();
        let questions: Vec<_> = markets.iter().map(|m| m.question.as_str()).collect();
        assert_eq!(questions, vec!["third?", "second?", "first?"]);
    }
}
