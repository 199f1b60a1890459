//! Property tests for the LMSR pricing math and share aggregation.

use crate::ledger::aggregate_shares;
use crate::lmsr_core::{cost, prices, shares_after, trade_cost};
use proptest::prelude::*;

const EPS: f64 = 1e-9;

fn share_vector() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(0.0f64..5_000.0, 2..=2)
}

proptest! {
    // Property test 1: prices form a distribution
    #[test]
    fn prices_sum_to_one_and_stay_in_unit_interval(
        q in share_vector(),
        b in 10.0f64..1_000.0,
    ) {
        let p = prices(&q, b).unwrap();
        prop_assert_eq!(p.len(), 2);
        prop_assert!((p.iter().sum::<f64>() - 1.0).abs() < EPS, "sum={}", p.iter().sum::<f64>());
        for x in &p {
            prop_assert!((0.0..=1.0).contains(x), "price {} outside [0,1]", x);
        }
    }

    // Property test 2: buying costs something, and more shares cost more
    #[test]
    fn trade_cost_positive_and_increasing(
        q in share_vector(),
        b in 10.0f64..1_000.0,
        outcome in 0usize..2,
        quantity in 0.01f64..20_000.0,
        extra in 0.01f64..1_000.0,
    ) {
        let small = trade_cost(&q, outcome, quantity, b).unwrap();
        let large = trade_cost(&q, outcome, quantity + extra, b).unwrap();
        prop_assert!(small > 0.0, "cost {} not positive", small);
        prop_assert!(large > small, "cost for {} ({}) <= cost for {} ({})", quantity + extra, large, quantity, small);
    }

    // Property test 3: a trade never costs more than the shares it buys
    #[test]
    fn trade_cost_bounded_by_quantity(
        q in share_vector(),
        b in 10.0f64..1_000.0,
        outcome in 0usize..2,
        quantity in 0.01f64..20_000.0,
    ) {
        let c = trade_cost(&q, outcome, quantity, b).unwrap();
        let p = prices(&q, b).unwrap()[outcome];
        // marginal price rises from p towards 1 during the purchase
        prop_assert!(c >= p * quantity - EPS * quantity.max(1.0));
        prop_assert!(c <= quantity + EPS);
    }

    // Property test 4: buying an outcome raises its price and lowers the other
    #[test]
    fn buying_moves_prices(
        q in share_vector(),
        b in 10.0f64..1_000.0,
        outcome in 0usize..2,
        quantity in 1.0f64..1_000.0,
    ) {
        let before = prices(&q, b).unwrap();
        let after = prices(&shares_after(&q, outcome, quantity), b).unwrap();
        prop_assert!(after[outcome] >= before[outcome]);
        prop_assert!(after[1 - outcome] <= before[1 - outcome]);
    }

    // Property test 5: path independence, two trades cost the same as one combined
    #[test]
    fn path_independence(
        q in share_vector(),
        b in 10.0f64..1_000.0,
        yes in 1.0f64..500.0,
        no in 1.0f64..500.0,
    ) {
        let first = trade_cost(&q, 1, yes, b).unwrap();
        let mid = shares_after(&q, 1, yes);
        let second = trade_cost(&mid, 0, no, b).unwrap();
        let end = shares_after(&mid, 0, no);
        let direct = cost(&end, b).unwrap() - cost(&q, b).unwrap();
        prop_assert!((first + second - direct).abs() < 1e-6 * direct.abs().max(1.0));
    }

    // Property test 6: market maker loss is bounded by b ln 2
    #[test]
    fn worst_case_loss_bounded(
        q in share_vector(),
        b in 10.0f64..1_000.0,
    ) {
        let collected = cost(&q, b).unwrap() - cost(&[0.0, 0.0], b).unwrap();
        let worst_payout = q.iter().cloned().fold(0.0, f64::max);
        prop_assert!(worst_payout - collected <= b * 2f64.ln() + 1e-6);
    }

    // Property test 7: extreme share vectors stay finite
    #[test]
    fn no_overflow_for_large_share_vectors(
        base in 1e5f64..1e9,
        gap in 0.0f64..1e4,
        b in 10.0f64..1_000.0,
    ) {
        let q = [base, base + gap];
        let c = cost(&q, b).unwrap();
        let p = prices(&q, b).unwrap();
        prop_assert!(c.is_finite());
        prop_assert!(p.iter().all(|x| x.is_finite()));
        prop_assert!((p[0] + p[1] - 1.0).abs() < EPS);
    }

    // Property test 8: large trades on shallow markets, where exp(quantity / b) overflows
    #[test]
    fn large_trades_match_cost_difference(
        q in prop::collection::vec(0.0f64..1_000.0, 2..=2),
        b in 1.0f64..20.0,
        outcome in 0usize..2,
        quantity in 1_000.0f64..20_000.0,
        extra in 1.0f64..1_000.0,
    ) {
        let c = trade_cost(&q, outcome, quantity, b).unwrap();
        let direct = cost(&shares_after(&q, outcome, quantity), b).unwrap() - cost(&q, b).unwrap();
        prop_assert!(c.is_finite() && c > 0.0, "cost {}", c);
        prop_assert!((c - direct).abs() < 1e-6 * direct.abs().max(1.0), "c={} direct={}", c, direct);
        prop_assert!(trade_cost(&q, outcome, quantity + extra, b).unwrap() > c);
    }

    // Property test 9: aggregation ignores insertion order
    #[test]
    fn aggregation_commutes(
        rows in prop::collection::vec((0i64..2, 1.0f64..100.0), 0..30),
        seed in any::<u64>(),
    ) {
        let mut shuffled = rows.clone();
        // deterministic rotation + reversal is enough to reorder
        if !shuffled.is_empty() {
            let k = (seed as usize) % shuffled.len();
            shuffled.rotate_left(k);
            shuffled.reverse();
        }
        let a = aggregate_shares(rows, 2);
        let b = aggregate_shares(shuffled, 2);
        for (x, y) in a.iter().zip(&b) {
            prop_assert!((x - y).abs() < 1e-9 * x.max(1.0));
        }
    }
}

#[test]
fn symmetric_prior() {
    assert_eq!(prices(&[0.0, 0.0], 100.0).unwrap(), vec![0.5, 0.5]);
}

#[test]
fn one_yes_position_of_ten() {
    let p = prices(&[0.0, 10.0], 100.0).unwrap();
    let e = 0.1f64.exp();
    assert!((p[0] - 1.0 / (1.0 + e)).abs() < EPS);
    assert!((p[1] - e / (1.0 + e)).abs() < EPS);
    assert!((p[0] - 0.4750).abs() < 1e-4);
    assert!((p[1] - 0.5250).abs() < 1e-4);
}
