//! Monte Carlo robustness stage.
//!
//! Shuffles the best pass's realized trade sequence to measure sequencing
//! risk. When the trade list could not be extracted it falls back to a
//! synthetic list derived from the summary statistics, flagged explicitly.

use anyhow::Result;
use serde_json::json;

use gauntlet_core::{gates, stage_names, StageResult, WorkflowState};

use crate::mc::{estimate_trades, run_monte_carlo, seed_from_workflow, MonteCarloParams};
use crate::stage::{Stage, StageContext, StageOutput, StateUpdate};

pub struct MonteCarlo;

impl Stage for MonteCarlo {
    fn name(&self) -> &'static str {
        stage_names::MONTE_CARLO
    }

    fn dependencies(&self) -> &'static [&'static str] {
        &[stage_names::BACKTEST_SELECTED]
    }

    fn execute(&self, state: &WorkflowState, ctx: &StageContext) -> Result<StageOutput> {
        let Some(best) = state.best_pass.as_ref() else {
            return Ok(StageOutput::done(StageResult::fail(
                self.name(),
                "no best pass recorded",
            )));
        };

        let mut estimated = false;
        let profits: Vec<f64> = if ctx.session.best_pass_trades.is_empty() {
            match estimate_trades(&best.metrics) {
                Some(trades) => {
                    estimated = true;
                    trades
                }
                None => {
                    return Ok(StageOutput::done(StageResult::fail(
                        self.name(),
                        "no trades to simulate for the best pass",
                    )));
                }
            }
        } else {
            ctx.session
                .best_pass_trades
                .iter()
                .map(|t| t.net_profit)
                .collect()
        };

        let mut summary = run_monte_carlo(
            &profits,
            MonteCarloParams {
                iterations: ctx.config.mc_iterations,
                initial_balance: ctx.config.deposit,
                ruin_threshold: ctx.config.mc_ruin_threshold,
                seed: seed_from_workflow(&state.workflow_id),
            },
        );
        summary.estimated = estimated;

        let confidence_gate = gates::mc_confidence(summary.confidence, ctx.config.mc_confidence_min);
        let ruin_gate = gates::mc_ruin(summary.ruin_probability, ctx.config.mc_ruin_max);

        let mut result = StageResult::ok(self.name())
            .with_gate(confidence_gate)
            .with_data(json!({
                "iterations": summary.iterations,
                "confidence": summary.confidence,
                "ruin_probability": summary.ruin_probability,
                "estimated_trades": estimated,
                "pass_index": best.pass_index,
            }));
        if !ruin_gate.passed {
            result.success = false;
            result = result.with_error(format!(
                "ruin probability {:.2}% above the {:.2}% ceiling",
                summary.ruin_probability, ctx.config.mc_ruin_max
            ));
        }
        if estimated {
            result = result.with_error(
                "trade list unavailable; simulated on estimates from summary statistics",
            );
        }

        let update = StateUpdate {
            monte_carlo: Some(summary.clone()),
            metrics: vec![
                ("mc_confidence".to_string(), summary.confidence),
                ("mc_ruin_probability".to_string(), summary.ruin_probability),
            ],
            extra_gates: vec![ruin_gate],
            ..Default::default()
        };
        Ok(StageOutput::with_update(result, update))
    }
}
