//! Sweep pass rows and per-pass backtest records.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::metrics::{GateResult, TradeMetrics};
use crate::params::ParamValue;

/// One row of a sweep result: the parameter assignment of a single trial
/// plus its segment results.
///
/// `back_result` and `forward_result` are the custom optimization criterion
/// evaluated over the in-sample and forward segments; `combined` is the
/// terminal's merged criterion for ranking. Trade counts are additive across
/// segments after the back/forward tables are merged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassRow {
    pub pass_index: u32,
    pub combined: f64,
    pub back_result: f64,
    pub forward_result: f64,
    pub profit: f64,
    pub profit_factor: f64,
    pub max_drawdown_pct: f64,
    pub total_trades: u32,
    pub win_rate: f64,
    pub sharpe: f64,
    /// Exact input assignment used for this trial.
    pub params: BTreeMap<String, ParamValue>,
}

impl PassRow {
    pub fn is_consistent(&self) -> bool {
        self.back_result > 0.0 && self.forward_result > 0.0
    }
}

/// Result of re-running one selected pass as a full backtest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassBacktest {
    pub pass_index: u32,
    pub input_params: BTreeMap<String, ParamValue>,
    pub metrics: TradeMetrics,
    pub gates: Vec<GateResult>,
    pub gates_passed: bool,
    pub composite_score: f64,
    pub is_consistent: bool,
    pub back_result: f64,
    pub forward_result: f64,
    pub report_handle: String,
}

/// Monte Carlo shuffle summary for the best pass.
///
/// Percentile maps are keyed `p05`, `p10`, ... `p95`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonteCarloSummary {
    pub iterations: u32,
    /// Percentage of shuffles ending with positive profit (0-100).
    pub confidence: f64,
    /// Percentage of shuffles whose drawdown reached the ruin threshold.
    pub ruin_probability: f64,
    pub expected_profit: f64,
    pub median_profit: f64,
    pub worst_case: f64,
    pub best_case: f64,
    pub profit_percentiles: BTreeMap<String, f64>,
    pub drawdown_percentiles: BTreeMap<String, f64>,
    pub trade_count: u32,
    /// True when the trade list was estimated from summary statistics
    /// instead of extracted from the report.
    pub estimated: bool,
}
