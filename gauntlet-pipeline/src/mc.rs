//! Monte Carlo trade-sequence simulation.
//!
//! Shuffles the best pass's trade order N times, replaying each shuffle
//! against a running balance to measure how sensitive the result is to
//! trade sequencing: ruin probability (drawdown ever reaching a fraction of
//! peak), confidence (share of shuffles ending profitable), and profit /
//! drawdown percentiles.
//!
//! The input list is canonicalized (sorted) before simulation, so results
//! are invariant under permutation of the input order, and the RNG is
//! seeded deterministically per workflow.

use std::collections::BTreeMap;

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use gauntlet_core::{MonteCarloSummary, TradeMetrics};

/// Percentile levels reported for both profit and drawdown.
const PERCENTILES: [(f64, &str); 7] = [
    (0.05, "p05"),
    (0.10, "p10"),
    (0.25, "p25"),
    (0.50, "p50"),
    (0.75, "p75"),
    (0.90, "p90"),
    (0.95, "p95"),
];

/// Deterministic RNG seed derived from the workflow id, so reruns of the
/// same workflow reproduce their simulation exactly.
pub fn seed_from_workflow(workflow_id: &str) -> u64 {
    let b = *blake3::hash(workflow_id.as_bytes()).as_bytes();
    u64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]])
}

#[derive(Debug, Clone, Copy)]
pub struct MonteCarloParams {
    pub iterations: u32,
    pub initial_balance: f64,
    /// Fraction of peak equity whose loss marks a shuffle as ruined.
    pub ruin_threshold: f64,
    pub seed: u64,
}

/// Run the simulation over per-trade net profits.
///
/// An empty trade list yields zero ruin and zero confidence.
pub fn run_monte_carlo(trade_profits: &[f64], params: MonteCarloParams) -> MonteCarloSummary {
    if trade_profits.is_empty() || params.iterations == 0 {
        return MonteCarloSummary {
            iterations: params.iterations,
            confidence: 0.0,
            ruin_probability: 0.0,
            expected_profit: 0.0,
            median_profit: 0.0,
            worst_case: 0.0,
            best_case: 0.0,
            profit_percentiles: BTreeMap::new(),
            drawdown_percentiles: BTreeMap::new(),
            trade_count: 0,
            estimated: false,
        };
    }

    // Canonical order makes the outcome a function of the trade multiset.
    let mut trades = trade_profits.to_vec();
    trades.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let mut rng = ChaCha8Rng::seed_from_u64(params.seed);
    let mut final_profits = Vec::with_capacity(params.iterations as usize);
    let mut max_drawdowns = Vec::with_capacity(params.iterations as usize);
    let mut ruin_count: u32 = 0;

    let mut shuffled = trades.clone();
    for _ in 0..params.iterations {
        shuffled.shuffle(&mut rng);

        let mut balance = params.initial_balance;
        let mut peak = params.initial_balance;
        let mut max_dd = 0.0f64;
        let mut ruined = false;

        for profit in &shuffled {
            balance += profit;
            if balance > peak {
                peak = balance;
            }
            let dd = if peak > 0.0 { (peak - balance) / peak } else { 0.0 };
            if dd > max_dd {
                max_dd = dd;
            }
            if dd >= params.ruin_threshold {
                ruined = true;
            }
        }

        final_profits.push(balance - params.initial_balance);
        max_drawdowns.push(max_dd * 100.0);
        if ruined {
            ruin_count += 1;
        }
    }

    final_profits.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    max_drawdowns.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let n = final_profits.len();
    let iterations = params.iterations as f64;
    let profitable = final_profits.iter().filter(|p| **p > 0.0).count();

    let percentile = |sorted: &[f64], level: f64| -> f64 {
        let idx = ((level * n as f64) as usize).min(n - 1);
        sorted[idx]
    };

    let profit_percentiles: BTreeMap<String, f64> = PERCENTILES
        .iter()
        .map(|(level, key)| (key.to_string(), percentile(&final_profits, *level)))
        .collect();
    let drawdown_percentiles: BTreeMap<String, f64> = PERCENTILES
        .iter()
        .map(|(level, key)| (key.to_string(), percentile(&max_drawdowns, *level)))
        .collect();

    MonteCarloSummary {
        iterations: params.iterations,
        confidence: profitable as f64 / iterations * 100.0,
        ruin_probability: ruin_count as f64 / iterations * 100.0,
        expected_profit: final_profits.iter().sum::<f64>() / n as f64,
        median_profit: percentile(&final_profits, 0.50),
        worst_case: profit_percentiles["p05"],
        best_case: profit_percentiles["p95"],
        profit_percentiles,
        drawdown_percentiles,
        trade_count: trades.len() as u32,
        estimated: false,
    }
}

/// Estimate a synthetic trade list from summary statistics, used when the
/// report's trade table could not be extracted: winning/losing counts from
/// total trades × win rate, each win at gross-profit / wins, each loss at
/// −gross-loss / losses.
pub fn estimate_trades(metrics: &TradeMetrics) -> Option<Vec<f64>> {
    let total = metrics.total_trades;
    if total == 0 {
        return None;
    }
    let win_rate = metrics.win_rate / 100.0;
    let mut wins = ((total as f64 * win_rate).round() as u32).min(total);
    let mut losses = total - wins;
    if wins == 0 {
        wins = 1;
    }
    if losses == 0 {
        losses = 1;
    }

    let (gross_profit, gross_loss) =
        if metrics.gross_profit > 0.0 || metrics.gross_loss > 0.0 {
            (metrics.gross_profit, metrics.gross_loss)
        } else if metrics.profit_factor > 1.0 && metrics.profit > 0.0 {
            // profit = gross_profit - gross_loss, pf = gross_profit / gross_loss
            let gross_loss = metrics.profit / (metrics.profit_factor - 1.0);
            (metrics.profit + gross_loss, gross_loss)
        } else {
            (metrics.profit.max(0.0), (-metrics.profit).max(0.0))
        };

    let avg_win = gross_profit / wins as f64;
    let avg_loss = gross_loss / losses as f64;

    let mut trades = Vec::with_capacity((wins + losses) as usize);
    trades.extend(std::iter::repeat(avg_win).take(wins as usize));
    trades.extend(std::iter::repeat(-avg_loss).take(losses as usize));
    Some(trades)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(iterations: u32) -> MonteCarloParams {
        MonteCarloParams {
            iterations,
            initial_balance: 10_000.0,
            ruin_threshold: 0.5,
            seed: 42,
        }
    }

    #[test]
    fn empty_trade_list_yields_zeroes() {
        let summary = run_monte_carlo(&[], params(1000));
        assert_eq!(summary.ruin_probability, 0.0);
        assert_eq!(summary.confidence, 0.0);
        assert_eq!(summary.trade_count, 0);
    }

    #[test]
    fn all_winning_trades_give_full_confidence() {
        let trades = vec![50.0; 80];
        let summary = run_monte_carlo(&trades, params(500));
        assert_eq!(summary.confidence, 100.0);
        assert_eq!(summary.ruin_probability, 0.0);
        assert!((summary.expected_profit - 4000.0).abs() < 1e-6);
    }

    #[test]
    fn guaranteed_ruin_detected() {
        // One catastrophic loss wipes more than half the account in every
        // ordering.
        let trades = vec![100.0, -9000.0, 50.0];
        let summary = run_monte_carlo(&trades, params(200));
        assert_eq!(summary.ruin_probability, 100.0);
    }

    #[test]
    fn results_invariant_under_input_permutation() {
        let a = vec![120.0, -60.0, 45.0, -30.0, 250.0, -90.0, 75.0];
        let mut b = a.clone();
        b.reverse();
        b.swap(1, 4);

        let sa = run_monte_carlo(&a, params(2000));
        let sb = run_monte_carlo(&b, params(2000));
        assert_eq!(sa.ruin_probability, sb.ruin_probability);
        assert_eq!(sa.confidence, sb.confidence);
        assert_eq!(sa.profit_percentiles, sb.profit_percentiles);
    }

    #[test]
    fn deterministic_for_fixed_seed() {
        let trades = vec![120.0, -60.0, 45.0, -30.0, 250.0];
        let one = run_monte_carlo(&trades, params(500));
        let two = run_monte_carlo(&trades, params(500));
        assert_eq!(one, two);
    }

    #[test]
    fn percentiles_are_monotone() {
        let trades: Vec<f64> = (0..60).map(|i| if i % 3 == 0 { -80.0 } else { 60.0 }).collect();
        let summary = run_monte_carlo(&trades, params(1000));
        let p = &summary.profit_percentiles;
        assert!(p["p05"] <= p["p25"]);
        assert!(p["p25"] <= p["p50"]);
        assert!(p["p50"] <= p["p75"]);
        assert!(p["p75"] <= p["p95"]);
    }

    #[test]
    fn estimation_fallback_matches_summary_stats() {
        let metrics = TradeMetrics {
            profit: 1000.0,
            profit_factor: 2.0,
            total_trades: 100,
            win_rate: 60.0,
            gross_profit: 2000.0,
            gross_loss: 1000.0,
            ..TradeMetrics::default()
        };
        let trades = estimate_trades(&metrics).unwrap();
        assert_eq!(trades.len(), 100);
        let wins = trades.iter().filter(|t| **t > 0.0).count();
        assert_eq!(wins, 60);
        let net: f64 = trades.iter().sum();
        assert!((net - 1000.0).abs() < 1e-6);
    }

    #[test]
    fn estimation_derives_gross_from_profit_factor() {
        let metrics = TradeMetrics {
            profit: 500.0,
            profit_factor: 2.0,
            total_trades: 50,
            win_rate: 50.0,
            ..TradeMetrics::default()
        };
        let trades = estimate_trades(&metrics).unwrap();
        let gross_profit: f64 = trades.iter().filter(|t| **t > 0.0).sum();
        let gross_loss: f64 = -trades.iter().filter(|t| **t < 0.0).sum::<f64>();
        assert!((gross_profit / gross_loss - 2.0).abs() < 1e-6);
    }

    #[test]
    fn estimation_requires_trades() {
        assert!(estimate_trades(&TradeMetrics::default()).is_none());
    }
}
