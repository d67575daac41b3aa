//! Property tests for the pipeline's numeric components.

use proptest::prelude::*;

use gauntlet_core::TradeMetrics;
use gauntlet_pipeline::config::StressConfig;
use gauntlet_pipeline::mc::{estimate_trades, run_monte_carlo, MonteCarloParams};

proptest! {
    /// The adaptive filter never exceeds the full threshold and never
    /// drops below the exploration floor.
    #[test]
    fn adaptive_min_trades_stays_bounded(validation in proptest::option::of(0u32..2000)) {
        let config = StressConfig::default();
        let threshold = config.adaptive_min_trades(validation);
        prop_assert!(threshold <= config.min_trades);
        prop_assert!(threshold >= config.exploration_min_trades);
        if validation.unwrap_or(0) == 0 {
            prop_assert_eq!(threshold, config.exploration_min_trades);
        }
    }

    /// Shuffle statistics are a function of the trade multiset, not of the
    /// order the trades arrive in.
    #[test]
    fn monte_carlo_invariant_under_permutation(
        mut trades in proptest::collection::vec(-500.0..500.0f64, 1..40),
        swap_a in 0usize..40,
        swap_b in 0usize..40,
    ) {
        let params = MonteCarloParams {
            iterations: 200,
            initial_balance: 10_000.0,
            ruin_threshold: 0.5,
            seed: 7,
        };
        let original = run_monte_carlo(&trades, params);
        let len = trades.len();
        trades.swap(swap_a % len, swap_b % len);
        trades.reverse();
        let permuted = run_monte_carlo(&trades, params);
        prop_assert_eq!(original.ruin_probability, permuted.ruin_probability);
        prop_assert_eq!(original.confidence, permuted.confidence);
        prop_assert_eq!(original.profit_percentiles, permuted.profit_percentiles);
    }

    /// The estimation fallback reproduces the summary's net profit.
    #[test]
    fn estimated_trades_sum_to_profit(
        total in 2u32..500,
        win_rate in 5.0..95.0f64,
        gross_profit in 1.0..50_000.0f64,
        gross_loss in 1.0..50_000.0f64,
    ) {
        let metrics = TradeMetrics {
            profit: gross_profit - gross_loss,
            total_trades: total,
            win_rate,
            gross_profit,
            gross_loss,
            ..TradeMetrics::default()
        };
        let trades = estimate_trades(&metrics).unwrap();
        let net: f64 = trades.iter().sum();
        prop_assert!((net - metrics.profit).abs() < 1e-6 * (1.0 + metrics.profit.abs()));
    }
}
