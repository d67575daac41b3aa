//! Cross-workflow boards: leaderboard and summary.

use std::collections::BTreeMap;

use gauntlet_core::{score, WorkflowState};

use super::dashboard::go_live_ready;

/// Rank all known workflows by composite score, best first. Workflows
/// without a scored best pass sink to the bottom in creation order.
pub fn render_leaderboard(states: &[WorkflowState]) -> String {
    let mut ranked: Vec<&WorkflowState> = states.iter().collect();
    ranked.sort_by(|a, b| {
        let score_a = a.best_pass.as_ref().map(|p| p.composite_score);
        let score_b = b.best_pass.as_ref().map(|p| p.composite_score);
        score_b
            .partial_cmp(&score_a)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut out = String::from(
        "# Leaderboard\n\n| # | EA | Symbol | Status | Score | Profit | PF | DD % | Trades | Go live |\n|---|---|---|---|---|---|---|---|---|---|\n",
    );
    for (rank, state) in ranked.iter().enumerate() {
        let (score_text, profit, pf, dd, trades) = match &state.best_pass {
            Some(best) => (
                format!("{:.1}", score::rounded(best.composite_score)),
                format!("{:.0}", best.metrics.profit),
                format!("{:.2}", best.metrics.profit_factor),
                format!("{:.1}", best.metrics.max_drawdown_pct),
                best.metrics.total_trades.to_string(),
            ),
            None => ("—".into(), "—".into(), "—".into(), "—".into(), "—".into()),
        };
        out.push_str(&format!(
            "| {} | {} | {} {} | {:?} | {} | {} | {} | {} | {} | {} |\n",
            rank + 1,
            state.ea_name,
            state.symbol,
            state.timeframe,
            state.status,
            score_text,
            profit,
            pf,
            dd,
            trades,
            if go_live_ready(state) { "YES" } else { "no" },
        ));
    }
    out
}

/// Aggregate view across every workflow in the runs directory.
pub fn render_summary(states: &[WorkflowState]) -> String {
    let mut by_status: BTreeMap<String, usize> = BTreeMap::new();
    let mut by_symbol: BTreeMap<String, usize> = BTreeMap::new();
    let mut scores = Vec::new();
    let mut ready = 0usize;

    for state in states {
        *by_status.entry(format!("{:?}", state.status)).or_default() += 1;
        *by_symbol.entry(state.symbol.clone()).or_default() += 1;
        if let Some(best) = &state.best_pass {
            scores.push(best.composite_score);
        }
        if go_live_ready(state) {
            ready += 1;
        }
    }

    let mut out = String::from("# Workflow Summary\n\n");
    out.push_str(&format!("- Total workflows: {}\n", states.len()));
    out.push_str(&format!("- Go-live ready: {ready}\n"));
    if !scores.is_empty() {
        let mean = scores.iter().sum::<f64>() / scores.len() as f64;
        out.push_str(&format!("- Mean composite score: {:.1}\n", score::rounded(mean)));
    }

    out.push_str("\n## By status\n\n");
    for (status, count) in &by_status {
        out.push_str(&format!("- {status}: {count}\n"));
    }
    out.push_str("\n## By symbol\n\n");
    for (symbol, count) in &by_symbol {
        out.push_str(&format!("- {symbol}: {count}\n"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use gauntlet_core::{PassBacktest, TradeMetrics, WorkflowStatus};
    use std::collections::BTreeMap;

    fn state_with_score(id: &str, score: f64) -> WorkflowState {
        let mut state = WorkflowState::new(id, "/tmp/ea.mq5", "EURUSD", "H1", "t");
        state.status = WorkflowStatus::Completed;
        state.best_pass = Some(PassBacktest {
            pass_index: 1,
            input_params: BTreeMap::new(),
            metrics: TradeMetrics {
                profit: 1000.0,
                profit_factor: 1.8,
                max_drawdown_pct: 15.0,
                total_trades: 120,
                ..TradeMetrics::default()
            },
            gates: Vec::new(),
            gates_passed: true,
            composite_score: score,
            is_consistent: true,
            back_result: 1.0,
            forward_result: 1.0,
            report_handle: "h".to_string(),
        });
        state
    }

    #[test]
    fn leaderboard_ranks_by_score() {
        let states = vec![
            state_with_score("wf_low", 3.2),
            state_with_score("wf_high", 8.4),
            WorkflowState::new("wf_unscored", "/tmp/x.mq5", "GBPUSD", "H1", "t"),
        ];
        let board = render_leaderboard(&states);
        let high = board.find("8.4").unwrap();
        let low = board.find("3.2").unwrap();
        assert!(high < low);
        assert!(board.contains("wf_unscored") || board.contains("x"));
    }

    #[test]
    fn summary_counts_statuses() {
        let states = vec![
            state_with_score("a", 5.0),
            state_with_score("b", 6.0),
            WorkflowState::new("c", "/tmp/x.mq5", "GBPUSD", "H1", "t"),
        ];
        let summary = render_summary(&states);
        assert!(summary.contains("Total workflows: 3"));
        assert!(summary.contains("Completed: 2"));
        assert!(summary.contains("GBPUSD: 1"));
    }
}
