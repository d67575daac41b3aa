//! Per-workflow markdown dashboard.

use gauntlet_core::{score, WorkflowState, WorkflowStatus};

use super::diagnose::diagnose_failures;

/// Is this workflow cleared for live deployment? All recorded gates must
/// hold and a best pass must exist.
pub fn go_live_ready(state: &WorkflowState) -> bool {
    state.best_pass.is_some() && !state.gates.is_empty() && state.gates.iter().all(|g| g.passed)
}

/// Render the dashboard for one workflow, whatever its outcome. Failed
/// workflows get the failed gates, the observed and threshold values and a
/// diagnosis per failure.
pub fn render_dashboard(state: &WorkflowState) -> String {
    let mut out = String::new();
    out.push_str(&format!("# Stress Report — {}\n\n", state.ea_name));
    out.push_str(&format!(
        "- Workflow: `{}`\n- Symbol: {} {}\n- Status: {:?}\n- Created: {}\n",
        state.workflow_id,
        state.symbol,
        state.timeframe,
        state.status,
        state.created_at.format("%Y-%m-%d %H:%M UTC"),
    ));
    if let Some(period) = state.period {
        out.push_str(&format!(
            "- Period: {} → {} (forward from {})\n",
            period.start, period.split, period.end
        ));
    }

    let verdict = go_live_ready(state);
    out.push_str(&format!(
        "\n## Verdict\n\n**Go live: {}**\n",
        if verdict { "YES" } else { "NO" }
    ));
    if let Some(best) = &state.best_pass {
        out.push_str(&format!(
            "\nBest pass #{} — score {:.1}, profit {:.2}, PF {:.2}, DD {:.1}%, {} trades\n",
            best.pass_index,
            score::rounded(best.composite_score),
            best.metrics.profit,
            best.metrics.profit_factor,
            best.metrics.max_drawdown_pct,
            best.metrics.total_trades,
        ));
    }

    if !state.gates.is_empty() {
        out.push_str("\n## Gates\n\n| Gate | Result | Observed | Threshold |\n|---|---|---|---|\n");
        for gate in &state.gates {
            out.push_str(&format!(
                "| {} | {} | {} | {} {} |\n",
                gate.name,
                if gate.passed { "PASS" } else { "FAIL" },
                gate.value,
                gate.op.symbol(),
                gate.threshold,
            ));
        }
    }

    if let Some(mc) = &state.monte_carlo {
        out.push_str(&format!(
            "\n## Monte Carlo\n\n- Iterations: {}\n- Confidence: {:.1}%\n- Ruin probability: {:.1}%\n- Median profit: {:.2}\n- Worst case (p05): {:.2}\n",
            mc.iterations, mc.confidence, mc.ruin_probability, mc.median_profit, mc.worst_case,
        ));
        if mc.estimated {
            out.push_str("- Trade list estimated from summary statistics\n");
        }
    }

    if !state.optimization_history.is_empty() {
        out.push_str("\n## Optimization rounds\n\n| Round | Passes | Duration |\n|---|---|---|\n");
        for round in &state.optimization_history {
            out.push_str(&format!(
                "| {} | {} | {:.0}s |\n",
                round.iteration, round.pass_count, round.duration_secs
            ));
        }
    }

    if !verdict {
        let diagnoses = diagnose_failures(&state.gates);
        if !diagnoses.is_empty() || state.status == WorkflowStatus::Failed {
            out.push_str("\n## Diagnosis\n\n");
            for diagnosis in &diagnoses {
                out.push_str(&format!("- {diagnosis}\n"));
            }
            if state.fix_attempts > 0 {
                out.push_str(&format!(
                    "- {} source patch(es) were applied during this run\n",
                    state.fix_attempts
                ));
            }
        }
    }

    if !state.errors.is_empty() {
        out.push_str("\n## Recorded errors\n\n");
        for error in &state.errors {
            out.push_str(&format!("- {error}\n"));
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use gauntlet_core::{gates, stage_names, StageResult};

    #[test]
    fn failed_workflow_dashboard_names_failed_gates() {
        let mut state = WorkflowState::new("wf", "/tmp/ea.mq5", "EURUSD", "H1", "t");
        state.status = WorkflowStatus::Failed;
        state.fix_attempts = 3;
        state.record_stage(
            StageResult::fail(stage_names::VALIDATE_TRADES, "too few trades")
                .with_gate(gates::minimum_trades(11, 50)),
        );
        let dashboard = render_dashboard(&state);
        assert!(dashboard.contains("Go live: NO"));
        assert!(dashboard.contains("minimum_trades"));
        assert!(dashboard.contains("| 11 |"));
        assert!(dashboard.contains("3 source patch(es)"));
    }

    #[test]
    fn verdict_requires_best_pass_and_clean_gates() {
        let mut state = WorkflowState::new("wf", "/tmp/ea.mq5", "EURUSD", "H1", "t");
        state.record_stage(
            StageResult::ok(stage_names::VALIDATE_TRADES).with_gate(gates::minimum_trades(120, 50)),
        );
        assert!(!go_live_ready(&state)); // no best pass yet
    }
}
