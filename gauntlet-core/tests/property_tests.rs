//! Property tests for domain invariants.

use proptest::prelude::*;

use gauntlet_core::metrics::{profit_factor, GateOp, GateResult, TradeMetrics};
use gauntlet_core::params::OptimizationRange;
use gauntlet_core::score::{go_live_score, ScoreRanges, ScoreWeights};

fn metrics(profit: f64, pf: f64, dd: f64, trades: u32) -> TradeMetrics {
    TradeMetrics {
        profit,
        profit_factor: pf,
        max_drawdown_pct: dd,
        total_trades: trades,
        ..TradeMetrics::default()
    }
}

proptest! {
    #[test]
    fn score_always_in_unit_interval(
        profit in -100_000.0..100_000.0f64,
        pf in 0.0..50.0f64,
        dd in 0.0..100.0f64,
        trades in 0u32..5000,
        back in -10_000.0..10_000.0f64,
        fwd in -10_000.0..10_000.0f64,
    ) {
        let score = go_live_score(
            &metrics(profit, pf, dd, trades),
            back,
            fwd,
            &ScoreWeights::default(),
            &ScoreRanges::default(),
        );
        prop_assert!((0.0..=10.0).contains(&score));
    }

    #[test]
    fn score_monotone_in_profit(
        profit in 0.0..4000.0f64,
        bump in 1.0..1000.0f64,
        trades in 0u32..500,
    ) {
        let w = ScoreWeights::default();
        let r = ScoreRanges::default();
        let lo = go_live_score(&metrics(profit, 1.5, 20.0, trades), 100.0, 100.0, &w, &r);
        let hi = go_live_score(&metrics(profit + bump, 1.5, 20.0, trades), 100.0, 100.0, &w, &r);
        prop_assert!(hi >= lo);
    }

    #[test]
    fn score_monotone_in_drawdown(
        dd in 0.0..29.0f64,
        bump in 0.1..50.0f64,
    ) {
        let w = ScoreWeights::default();
        let r = ScoreRanges::default();
        let better = go_live_score(&metrics(1000.0, 1.5, dd, 100), 100.0, 100.0, &w, &r);
        let worse = go_live_score(&metrics(1000.0, 1.5, dd + bump, 100), 100.0, 100.0, &w, &r);
        prop_assert!(worse <= better);
    }

    #[test]
    fn gate_passed_iff_comparison_holds(
        value in -1000.0..1000.0f64,
        threshold in -1000.0..1000.0f64,
        op_idx in 0usize..3,
    ) {
        let op = [GateOp::Gte, GateOp::Lte, GateOp::Eq][op_idx];
        let gate = GateResult::check("any", value, threshold, op);
        prop_assert_eq!(gate.passed, op.holds(value, threshold));
    }

    #[test]
    fn valid_sweep_ranges_are_well_formed(
        start in -1000.0..1000.0f64,
        span in 0.0..1000.0f64,
        step in -10.0..100.0f64,
    ) {
        let range = OptimizationRange::sweep("p", start, step, start + span);
        if range.validate().is_empty() {
            // Exactly the invariant the configuration emitter relies on.
            prop_assert!(step > 0.0);
            prop_assert!(start <= start + span);
            prop_assert!(range.step_count() >= 2);
        }
    }

    #[test]
    fn profit_factor_never_infinite(
        gross_profit in 0.0..1_000_000.0f64,
        gross_loss in 0.0..1_000_000.0f64,
    ) {
        let pf = profit_factor(gross_profit, gross_loss);
        prop_assert!(pf.is_finite());
        prop_assert!(pf >= 0.0);
    }
}
