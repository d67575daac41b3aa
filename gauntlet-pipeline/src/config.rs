//! Pipeline configuration.
//!
//! One explicit record carrying every tunable threshold, loaded from a TOML
//! file with per-field defaults. Nothing in the pipeline reads configuration
//! from anywhere else.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use gauntlet_runner::DataModel;

/// Metric used to pick the best pass in the selected-pass backtests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BestPassMetric {
    Score,
    Profit,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("TOML parse error: {0}")]
    Parse(String),
}

/// Full option surface of the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StressConfig {
    // ── Backtest period ──
    /// Total period length; the period always ends "today".
    pub backtest_years: u32,
    pub in_sample_years: u32,
    pub forward_years: u32,

    // ── Data ──
    pub data_model: DataModel,
    pub execution_latency_ms: u32,

    // ── Account ──
    pub deposit: f64,
    pub currency: String,
    pub leverage: u32,

    // ── Gates ──
    pub min_profit_factor: f64,
    pub max_drawdown_pct: f64,
    pub min_trades: u32,
    /// Floor used during genetic exploration and as the adaptive-filter
    /// fallback.
    pub exploration_min_trades: u32,
    pub mc_confidence_min: f64,
    pub mc_ruin_max: f64,

    // ── Monte Carlo ──
    pub mc_iterations: u32,
    /// Fraction of peak equity whose loss counts as ruin.
    pub mc_ruin_threshold: f64,

    // ── Optimization ──
    pub sweep_timeout_secs: u64,
    pub heartbeat_secs: u64,
    pub top_n_backtest: usize,
    pub top_n_display: usize,

    // ── Refinement ──
    pub refine_max_iterations: u32,
    pub toggle_dominance_threshold: f64,
    pub clustering_cv_threshold: f64,
    pub min_valid_passes: usize,

    // ── Fix loop ──
    pub max_fix_attempts: u32,

    // ── Injected safety parameters ──
    pub safety_default_spread_pips: f64,
    pub safety_default_slippage_pips: f64,
    /// Loose limits used only for the trade-validation run, so spread
    /// filtering cannot masquerade as "EA never trades".
    pub safety_validation_spread_pips: f64,
    pub safety_validation_slippage_pips: f64,

    // ── Stress scenarios ──
    pub stress_rolling_days: Vec<u32>,
    pub stress_calendar_months_ago: Vec<u32>,
    pub stress_models: Vec<DataModel>,
    pub stress_tick_latencies_ms: Vec<u32>,
    pub overlay_spread_pips: Vec<f64>,
    pub overlay_slippage_pips: Vec<f64>,
    pub overlay_slippage_sides: u32,
    /// Account-currency value of one pip for one lot, for cost overlays.
    pub pip_value_per_lot: f64,
    /// Root of the terminal's monthly tick archives, when available;
    /// enables the coverage check for fine-tick scenarios.
    pub tick_data_dir: Option<PathBuf>,

    // ── Behavior ──
    pub auto_selection: bool,
    pub auto_refine_decision: bool,
    pub auto_stress: bool,
    pub auto_forward_windows: bool,
    pub auto_multi_pair: bool,
    pub best_pass_selection: BestPassMetric,
    pub multi_pair_symbols: Vec<String>,

    // ── Layout ──
    pub runs_dir: PathBuf,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            backtest_years: 4,
            in_sample_years: 3,
            forward_years: 1,
            data_model: DataModel::Ohlc,
            execution_latency_ms: 10,
            deposit: 3000.0,
            currency: "GBP".to_string(),
            leverage: 100,
            min_profit_factor: 1.5,
            max_drawdown_pct: 30.0,
            min_trades: 50,
            exploration_min_trades: 10,
            mc_confidence_min: 70.0,
            mc_ruin_max: 5.0,
            mc_iterations: 10_000,
            mc_ruin_threshold: 0.5,
            sweep_timeout_secs: 36_000,
            heartbeat_secs: 60,
            top_n_backtest: 20,
            top_n_display: 20,
            refine_max_iterations: 2,
            toggle_dominance_threshold: 0.70,
            clustering_cv_threshold: 0.20,
            min_valid_passes: 50,
            max_fix_attempts: 3,
            safety_default_spread_pips: 3.0,
            safety_default_slippage_pips: 3.0,
            safety_validation_spread_pips: 500.0,
            safety_validation_slippage_pips: 500.0,
            stress_rolling_days: vec![7, 14, 30, 60, 90],
            stress_calendar_months_ago: vec![1, 2, 3],
            stress_models: vec![DataModel::Ohlc, DataModel::Tick],
            stress_tick_latencies_ms: vec![250, 5000],
            overlay_spread_pips: vec![0.0, 1.0, 2.0, 3.0, 5.0],
            overlay_slippage_pips: vec![0.0, 1.0, 3.0],
            overlay_slippage_sides: 2,
            pip_value_per_lot: 10.0,
            tick_data_dir: None,
            auto_selection: true,
            auto_refine_decision: true,
            auto_stress: true,
            auto_forward_windows: true,
            auto_multi_pair: false,
            best_pass_selection: BestPassMetric::Score,
            multi_pair_symbols: Vec::new(),
            runs_dir: PathBuf::from("runs"),
        }
    }
}

impl StressConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml_str).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Weights of the composite Go-Live score.
    pub fn score_weights(&self) -> gauntlet_core::ScoreWeights {
        gauntlet_core::ScoreWeights::default()
    }

    /// Normalization ranges of the composite Go-Live score, anchored to the
    /// configured gate thresholds.
    pub fn score_ranges(&self) -> gauntlet_core::ScoreRanges {
        gauntlet_core::ScoreRanges {
            trade_count: (self.min_trades as f64, 200.0),
            max_drawdown: (0.0, self.max_drawdown_pct),
            ..gauntlet_core::ScoreRanges::default()
        }
    }

    /// Adaptive minimum-trades filter for sweep rows:
    /// `min(min_trades, max(exploration_min, 0.8 × validation_trades))`.
    ///
    /// An EA that naturally trades less on the target instrument should not
    /// be rejected against the full-period threshold; with no validation
    /// baseline the exploration floor applies.
    pub fn adaptive_min_trades(&self, validation_trades: Option<u32>) -> u32 {
        match validation_trades {
            Some(v) if v > 0 => {
                let scaled = (0.8 * v as f64).floor() as u32;
                self.min_trades.min(scaled.max(self.exploration_min_trades))
            }
            _ => self.exploration_min_trades,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_thresholds() {
        let config = StressConfig::default();
        assert_eq!(config.backtest_years, 4);
        assert_eq!(config.min_profit_factor, 1.5);
        assert_eq!(config.max_drawdown_pct, 30.0);
        assert_eq!(config.min_trades, 50);
        assert_eq!(config.mc_iterations, 10_000);
        assert_eq!(config.sweep_timeout_secs, 36_000);
        assert_eq!(config.refine_max_iterations, 2);
        assert!(!config.auto_multi_pair);
    }

    #[test]
    fn partial_toml_overrides_only_named_fields() {
        let config = StressConfig::from_toml(
            r#"
min_trades = 80
deposit = 10000.0
auto_selection = false
stress_rolling_days = [30, 90]
"#,
        )
        .unwrap();
        assert_eq!(config.min_trades, 80);
        assert_eq!(config.deposit, 10_000.0);
        assert!(!config.auto_selection);
        assert_eq!(config.stress_rolling_days, vec![30, 90]);
        // Untouched fields keep defaults.
        assert_eq!(config.min_profit_factor, 1.5);
    }

    #[test]
    fn invalid_toml_is_a_parse_error() {
        let err = StressConfig::from_toml("min_trades = [not valid").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn adaptive_threshold_tracks_validation_trades() {
        let config = StressConfig::default();
        // 0.8 × 180 = 144, capped at the full threshold.
        assert_eq!(config.adaptive_min_trades(Some(180)), 50);
        // 0.8 × 30 = 24, between the floors.
        assert_eq!(config.adaptive_min_trades(Some(30)), 24);
        // 0.8 × 5 = 4, floored at the exploration minimum.
        assert_eq!(config.adaptive_min_trades(Some(5)), 10);
        // Missing or zero baseline falls back to the exploration floor.
        assert_eq!(config.adaptive_min_trades(None), 10);
        assert_eq!(config.adaptive_min_trades(Some(0)), 10);
    }
}
