//! Go-Live composite score.
//!
//! A single scalar in [0, 10] answering "should this strategy trade live?".
//! Five components, each clamped to a fixed range and scaled to [0, 1], then
//! weighted-summed and scaled by 10. Consistency is scored on the weaker of
//! the back and forward results so a strong in-sample run cannot hide a weak
//! forward one.

use serde::{Deserialize, Serialize};

use crate::metrics::TradeMetrics;

/// Component weights. Sum to 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub consistency: f64,
    pub total_profit: f64,
    pub trade_count: f64,
    pub profit_factor: f64,
    pub max_drawdown: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            consistency: 0.25,
            total_profit: 0.25,
            trade_count: 0.20,
            profit_factor: 0.15,
            max_drawdown: 0.15,
        }
    }
}

/// Normalization ranges: the `(min, max)` that maps to `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreRanges {
    pub consistency_min: (f64, f64),
    pub total_profit: (f64, f64),
    pub trade_count: (f64, f64),
    pub profit_factor: (f64, f64),
    pub max_drawdown: (f64, f64),
}

impl Default for ScoreRanges {
    fn default() -> Self {
        Self {
            consistency_min: (0.0, 2000.0),
            total_profit: (0.0, 5000.0),
            trade_count: (50.0, 200.0),
            profit_factor: (1.0, 3.0),
            max_drawdown: (0.0, 30.0),
        }
    }
}

/// Bonus added when both back and forward results are strictly positive.
pub const CONSISTENCY_BONUS: f64 = 0.5;

/// Clamp `value` into `[min, max]` and scale to `[0, 1]`; optionally invert.
pub fn normalize(value: f64, min: f64, max: f64, invert: bool) -> f64 {
    if max <= min {
        return 0.0;
    }
    let clamped = value.clamp(min, max);
    let scaled = (clamped - min) / (max - min);
    if invert {
        1.0 - scaled
    } else {
        scaled
    }
}

/// Compute the Go-Live score for one backtested pass.
///
/// `back_result` and `forward_result` are the optimization criterion values
/// of the in-sample and forward segments. The consistency component is the
/// weaker of the two, capped at zero when either segment is non-positive.
pub fn go_live_score(
    metrics: &TradeMetrics,
    back_result: f64,
    forward_result: f64,
    weights: &ScoreWeights,
    ranges: &ScoreRanges,
) -> f64 {
    let consistent = back_result > 0.0 && forward_result > 0.0;
    let consistency_value = if consistent {
        back_result.min(forward_result)
    } else {
        0.0
    };

    let consistency = normalize(
        consistency_value,
        ranges.consistency_min.0,
        ranges.consistency_min.1,
        false,
    );
    let profit = normalize(
        metrics.profit,
        ranges.total_profit.0,
        ranges.total_profit.1,
        false,
    );
    let trades = normalize(
        metrics.total_trades as f64,
        ranges.trade_count.0,
        ranges.trade_count.1,
        false,
    );
    let pf = normalize(
        metrics.profit_factor,
        ranges.profit_factor.0,
        ranges.profit_factor.1,
        false,
    );
    let dd = normalize(
        metrics.max_drawdown_pct,
        ranges.max_drawdown.0,
        ranges.max_drawdown.1,
        true,
    );

    let weighted = consistency * weights.consistency
        + profit * weights.total_profit
        + trades * weights.trade_count
        + pf * weights.profit_factor
        + dd * weights.max_drawdown;

    let mut score = weighted * 10.0;
    if consistent {
        score += CONSISTENCY_BONUS;
    }
    score.min(10.0)
}

/// Round to one decimal for display and leaderboards.
pub fn rounded(score: f64) -> f64 {
    (score * 10.0).round() / 10.0
}
