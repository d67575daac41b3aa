//! Trade metrics and gate checks.

use serde::{Deserialize, Serialize};

/// Summary of one terminal run.
///
/// Immutable once produced. The equity curve is optional because sweep rows
/// only carry summary statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeMetrics {
    pub profit: f64,
    pub profit_factor: f64,
    pub max_drawdown_pct: f64,
    pub total_trades: u32,
    /// Winning trades percentage (0-100).
    pub win_rate: f64,
    pub sharpe: f64,
    pub sortino: f64,
    pub calmar: f64,
    pub expected_payoff: f64,
    pub recovery_factor: f64,
    pub gross_profit: f64,
    /// Positive number: sum of losing trades' magnitudes.
    pub gross_loss: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub equity_curve: Vec<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl Default for TradeMetrics {
    fn default() -> Self {
        Self {
            profit: 0.0,
            profit_factor: 0.0,
            max_drawdown_pct: 0.0,
            total_trades: 0,
            win_rate: 0.0,
            sharpe: 0.0,
            sortino: 0.0,
            calmar: 0.0,
            expected_payoff: 0.0,
            recovery_factor: 0.0,
            gross_profit: 0.0,
            gross_loss: 0.0,
            equity_curve: Vec::new(),
            errors: Vec::new(),
        }
    }
}

/// Profit factor with the terminal's edge conventions: 99 when gross loss is
/// zero but gross profit positive, 0 when both are zero.
pub fn profit_factor(gross_profit: f64, gross_loss: f64) -> f64 {
    if gross_loss <= 0.0 {
        if gross_profit > 0.0 {
            99.0
        } else {
            0.0
        }
    } else {
        gross_profit / gross_loss
    }
}

/// Comparison operator of a gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GateOp {
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = "<=")]
    Lte,
    #[serde(rename = "==")]
    Eq,
}

impl GateOp {
    pub fn holds(self, value: f64, threshold: f64) -> bool {
        match self {
            GateOp::Gte => value >= threshold,
            GateOp::Lte => value <= threshold,
            GateOp::Eq => (value - threshold).abs() < f64::EPSILON,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            GateOp::Gte => ">=",
            GateOp::Lte => "<=",
            GateOp::Eq => "==",
        }
    }
}

/// A named pass/fail check against a threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateResult {
    pub name: String,
    pub passed: bool,
    pub value: f64,
    pub threshold: f64,
    pub op: GateOp,
    pub message: String,
}

impl GateResult {
    /// Evaluate a gate; `passed` is derived from the comparison, never set
    /// independently.
    pub fn check(name: impl Into<String>, value: f64, threshold: f64, op: GateOp) -> Self {
        let name = name.into();
        let passed = op.holds(value, threshold);
        let status = if passed { "PASS" } else { "FAIL" };
        let message = format!(
            "{status}: {name} = {value} ({} {threshold})",
            op.symbol()
        );
        Self { name, passed, value, threshold, op, message }
    }
}

/// Well-known gate names and constructors with the standard operators.
/// Thresholds come from configuration; only the comparison shape is fixed.
pub mod gates {
    use super::{GateOp, GateResult};

    pub const FILE_EXISTS: &str = "file_exists";
    pub const COMPILATION_ERRORS: &str = "compilation_errors";
    pub const PARAMS_FOUND: &str = "params_found";
    pub const MINIMUM_TRADES: &str = "minimum_trades";
    pub const PASSES_FOUND: &str = "passes_found";
    pub const VALID_PASSES: &str = "valid_passes";
    pub const SUCCESSFUL_PASSES: &str = "successful_passes";
    pub const PROFIT_FACTOR: &str = "profit_factor";
    pub const MAX_DRAWDOWN: &str = "max_drawdown";
    pub const MC_CONFIDENCE: &str = "mc_confidence";
    pub const MC_RUIN: &str = "mc_ruin";

    pub fn file_exists(found: bool) -> GateResult {
        GateResult::check(FILE_EXISTS, if found { 1.0 } else { 0.0 }, 1.0, GateOp::Eq)
    }

    pub fn compilation_errors(count: usize) -> GateResult {
        GateResult::check(COMPILATION_ERRORS, count as f64, 0.0, GateOp::Eq)
    }

    pub fn params_found(count: usize) -> GateResult {
        GateResult::check(PARAMS_FOUND, count as f64, 1.0, GateOp::Gte)
    }

    pub fn minimum_trades(trades: u32, min: u32) -> GateResult {
        GateResult::check(MINIMUM_TRADES, trades as f64, min as f64, GateOp::Gte)
    }

    pub fn passes_found(count: usize) -> GateResult {
        GateResult::check(PASSES_FOUND, count as f64, 1.0, GateOp::Gte)
    }

    pub fn valid_passes(count: usize) -> GateResult {
        GateResult::check(VALID_PASSES, count as f64, 1.0, GateOp::Gte)
    }

    pub fn successful_passes(count: usize) -> GateResult {
        GateResult::check(SUCCESSFUL_PASSES, count as f64, 1.0, GateOp::Gte)
    }

    pub fn profit_factor(pf: f64, min: f64) -> GateResult {
        GateResult::check(PROFIT_FACTOR, pf, min, GateOp::Gte)
    }

    pub fn max_drawdown(dd_pct: f64, max: f64) -> GateResult {
        GateResult::check(MAX_DRAWDOWN, dd_pct, max, GateOp::Lte)
    }

    pub fn mc_confidence(confidence: f64, min: f64) -> GateResult {
        GateResult::check(MC_CONFIDENCE, confidence, min, GateOp::Gte)
    }

    pub fn mc_ruin(ruin: f64, max: f64) -> GateResult {
        GateResult::check(MC_RUIN, ruin, max, GateOp::Lte)
    }
}
