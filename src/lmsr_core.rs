//! src/lmsr_core.rs
//! Fast, numerically stable LMSR math over f64 share vectors.
//!
//! Everything in here is pure: no ledger access, no clocks. The engine in
//! `lmsr_api` feeds it aggregated share vectors read from storage.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Number of outcomes in a binary market.
pub const BINARY_OUTCOME_COUNT: usize = 2;

/// Outcome of a binary market. The discriminant is the index into the share vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    No = 0,
    Yes = 1,
}

impl Outcome {
    /// Map a stored/wire outcome index onto a binary outcome.
    pub fn from_index(index: i64) -> Result<Self> {
        match index {
            0 => Ok(Outcome::No),
            1 => Ok(Outcome::Yes),
            _ => Err(EngineError::InvalidOutcome {
                outcome: index,
                outcome_count: BINARY_OUTCOME_COUNT,
            }),
        }
    }

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::No => "no",
            Outcome::Yes => "yes",
        }
    }
}

impl FromStr for Outcome {
    type Err = String;

    /// Parse from string (API boundary conversion)
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "no" | "0" => Ok(Outcome::No),
            "yes" | "1" => Ok(Outcome::Yes),
            _ => Err(format!("Invalid outcome: '{}', expected 'yes' or 'no'", s)),
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reject liquidity parameters the cost function is undefined for.
#[inline]
pub fn check_liquidity(b: f64) -> Result<()> {
    if b.is_finite() && b > 0.0 {
        Ok(())
    } else {
        Err(EngineError::InvalidConfiguration(format!(
            "liquidity parameter b must be positive and finite, got {b}"
        )))
    }
}

// -----------------------
// Numerically stable math
// -----------------------

/// ln(Σ exp(x_i)) evaluated around the maximum so large inputs do not overflow.
#[inline]
pub fn log_sum_exp(xs: &[f64]) -> f64 {
    let m = xs.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    // empty input or infinite max: the shift would produce NaN
    if !m.is_finite() {
        return m;
    }
    m + xs.iter().map(|x| (x - m).exp()).sum::<f64>().ln()
}

fn scaled(shares: &[f64], b: f64) -> Result<Vec<f64>> {
    check_liquidity(b)?;
    if shares.is_empty() {
        return Err(EngineError::EmptyShareVector);
    }
    Ok(shares.iter().map(|q| q / b).collect())
}

/// C(q) = b * ln(Σ exp(q_i / b))
pub fn cost(shares: &[f64], b: f64) -> Result<f64> {
    let xs = scaled(shares, b)?;
    Ok(b * log_sum_exp(&xs))
}

/// P_i(q) = exp(q_i / b) / Σ exp(q_j / b), sharing the max shift with `cost`.
pub fn prices(shares: &[f64], b: f64) -> Result<Vec<f64>> {
    let xs = scaled(shares, b)?;
    let m = xs.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = xs.iter().map(|x| (x - m).exp()).collect();
    let total: f64 = exps.iter().sum();
    Ok(exps.into_iter().map(|e| e / total).collect())
}

/// ln(exp(x) - 1) for x > 0, without overflowing for large x.
#[inline]
fn ln_exp_m1(x: f64) -> f64 {
    if x <= std::f64::consts::LN_2 {
        x.exp_m1().ln()
    } else {
        x + (-(-x).exp()).ln_1p()
    }
}

/// ln(1 + exp(t)) for any finite t.
#[inline]
fn softplus(t: f64) -> f64 {
    if t > 0.0 {
        t + (-t).exp().ln_1p()
    } else {
        t.exp().ln_1p()
    }
}

/// Cost of buying `quantity` shares of `outcome` from state `shares`.
///
/// Equal to `C(q') - C(q)` with `q'[outcome] = q[outcome] + quantity`, but
/// evaluated as `b * ln(1 + p_o * (exp(quantity / b) - 1))` entirely in log
/// space: `ln p_o` comes from the log-sum-exp and the whole product goes
/// through `softplus`. The result neither cancels to zero when `C(q)` is
/// large nor overflows when `quantity / b` is large, and stays finite when
/// `p_o` itself would underflow.
pub fn trade_cost(shares: &[f64], outcome: usize, quantity: f64, b: f64) -> Result<f64> {
    if !quantity.is_finite() || quantity <= 0.0 {
        return Err(EngineError::InvalidQuantity {
            quantity,
            reason: "quantity must be positive and finite".to_string(),
        });
    }
    if outcome >= shares.len() {
        return Err(EngineError::InvalidOutcome {
            outcome: outcome as i64,
            outcome_count: shares.len(),
        });
    }

    let xs = scaled(shares, b)?;
    let ln_p = xs[outcome] - log_sum_exp(&xs);
    Ok(b * softplus(ln_p + ln_exp_m1(quantity / b)))
}

/// Share vector after a hypothetical purchase.
pub fn shares_after(shares: &[f64], outcome: usize, quantity: f64) -> Vec<f64> {
    let mut next = shares.to_vec();
    if let Some(q) = next.get_mut(outcome) {
        *q += quantity;
    }
    next
}

// -----------------------
// Tests
// -----------------------
