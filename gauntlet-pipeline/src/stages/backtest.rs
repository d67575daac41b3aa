//! Detailed backtests of the selected passes.
//!
//! Each selected pass re-runs as a full single backtest with the pinned
//! safety defaults, gets its per-pass gates and composite score, and the
//! best pass is chosen by the configured metric. At least one pass must
//! clear its gates or the workflow fails (reports still run).

use anyhow::Result;
use serde_json::json;

use gauntlet_core::{
    gates, go_live_score, stage_names, ParamValue, PassBacktest, StageResult, WorkflowState,
};
use gauntlet_runner::{report_handle, RunSpec};

use crate::config::BestPassMetric;
use crate::source::inject::{SAFETY_SLIPPAGE_PARAM, SAFETY_SPREAD_PARAM};
use crate::stage::{Stage, StageContext, StageOutput, StateUpdate};

pub struct BacktestSelected;

impl Stage for BacktestSelected {
    fn name(&self) -> &'static str {
        stage_names::BACKTEST_SELECTED
    }

    fn dependencies(&self) -> &'static [&'static str] {
        &[stage_names::SELECT_PASSES]
    }

    fn execute(&self, state: &WorkflowState, ctx: &StageContext) -> Result<StageOutput> {
        let (Some(compiled), Some(period)) = (state.compiled_ea_path.as_ref(), state.period) else {
            return Ok(StageOutput::done(StageResult::fail(
                self.name(),
                "missing compiled EA or backtest period",
            )));
        };
        if state.selected_passes.is_empty() {
            return Ok(StageOutput::done(StageResult::fail(
                self.name(),
                "no selected passes to backtest",
            )));
        }

        let mut backtests: Vec<PassBacktest> = Vec::new();
        let mut run_errors: Vec<String> = Vec::new();
        let mut best: Option<(f64, f64, usize)> = None; // (primary, secondary, idx)
        let mut best_trades = Vec::new();

        for &pass_index in &state.selected_passes {
            let Some(row) = ctx.session.passes.iter().find(|p| p.pass_index == pass_index)
            else {
                run_errors.push(format!("pass {pass_index} missing from the ranked table"));
                continue;
            };

            let mut params = row.params.clone();
            params.insert(
                SAFETY_SPREAD_PARAM.to_string(),
                ParamValue::Real(ctx.config.safety_default_spread_pips),
            );
            params.insert(
                SAFETY_SLIPPAGE_PARAM.to_string(),
                ParamValue::Real(ctx.config.safety_default_slippage_pips),
            );

            let handle = report_handle(
                &state.workflow_id,
                &state.ea_name,
                "bt",
                Some(&format!("pass{pass_index}")),
            );
            let spec = RunSpec {
                symbol: state.symbol.clone(),
                timeframe: state.timeframe.clone(),
                params: params.clone(),
                from_date: period.start,
                to_date: period.end,
                latency_ms: ctx.config.execution_latency_ms,
                model: ctx.config.data_model,
                report_handle: handle.clone(),
            };

            let outcome = match ctx.runner.run_single(compiled, &spec) {
                Ok(outcome) => outcome,
                Err(err) => {
                    run_errors.push(format!("pass {pass_index}: {err:#}"));
                    continue;
                }
            };

            let pass_gates = vec![
                gates::profit_factor(outcome.metrics.profit_factor, ctx.config.min_profit_factor),
                gates::max_drawdown(outcome.metrics.max_drawdown_pct, ctx.config.max_drawdown_pct),
                gates::minimum_trades(outcome.metrics.total_trades, ctx.config.min_trades),
            ];
            let gates_passed = pass_gates.iter().all(|g| g.passed);
            let score = go_live_score(
                &outcome.metrics,
                row.back_result,
                row.forward_result,
                &ctx.config.score_weights(),
                &ctx.config.score_ranges(),
            );

            let candidate = match ctx.config.best_pass_selection {
                BestPassMetric::Score => (score, outcome.metrics.profit),
                BestPassMetric::Profit => (outcome.metrics.profit, score),
            };
            let record = PassBacktest {
                pass_index,
                input_params: params,
                metrics: outcome.metrics,
                gates: pass_gates,
                gates_passed,
                composite_score: score,
                is_consistent: row.is_consistent(),
                back_result: row.back_result,
                forward_result: row.forward_result,
                report_handle: handle,
            };

            let better = match best {
                None => true,
                Some((p, s, _)) => candidate > (p, s),
            };
            if better {
                best = Some((candidate.0, candidate.1, backtests.len()));
                best_trades = outcome.trades;
            }
            backtests.push(record);
        }

        let successful = backtests.iter().filter(|b| b.gates_passed).count();
        let best_pass = best.map(|(_, _, idx)| backtests[idx].clone());

        let mut result = StageResult::ok(self.name())
            .with_gate(gates::successful_passes(successful))
            .with_data(json!({
                "backtested": backtests.len(),
                "successful": successful,
                "best_pass": best_pass.as_ref().map(|b| b.pass_index),
                "selection_metric": ctx.config.best_pass_selection,
            }));
        for error in &run_errors {
            result = result.with_error(error.clone());
        }
        if successful == 0 {
            result = result.with_error(format!(
                "no pass met the gates ({}/{} backtested)",
                successful,
                backtests.len()
            ));
        }

        let metrics = best_pass
            .as_ref()
            .map(|b| {
                vec![
                    ("profit".to_string(), b.metrics.profit),
                    ("profit_factor".to_string(), b.metrics.profit_factor),
                    ("max_drawdown_pct".to_string(), b.metrics.max_drawdown_pct),
                    ("total_trades".to_string(), b.metrics.total_trades as f64),
                    ("win_rate".to_string(), b.metrics.win_rate),
                    ("composite_score".to_string(), b.composite_score),
                ]
            })
            .unwrap_or_default();

        let update = StateUpdate {
            pass_backtests: Some(backtests),
            best_pass,
            best_pass_trades: Some(best_trades),
            metrics,
            ..Default::default()
        };
        Ok(StageOutput::with_update(result, update))
    }
}
