//! Trade-count validation run.
//!
//! One backtest over the full period with the analyst's wide parameters and
//! permissive safety limits, proving the EA actually trades before hours of
//! sweep time are committed. Failure routes into the fix loop.

use anyhow::Result;
use serde_json::json;

use gauntlet_core::{gates, stage_names, StageResult, WorkflowState};
use gauntlet_runner::{report_handle, RunSpec};

use crate::stage::{Stage, StageContext, StageOutput, StateUpdate};

pub struct ValidateTrades;

impl Stage for ValidateTrades {
    fn name(&self) -> &'static str {
        stage_names::VALIDATE_TRADES
    }

    fn dependencies(&self) -> &'static [&'static str] {
        &[stage_names::COMPILE, stage_names::RECORD_RANGES]
    }

    fn execute(&self, state: &WorkflowState, ctx: &StageContext) -> Result<StageOutput> {
        let (Some(compiled), Some(period)) = (state.compiled_ea_path.as_ref(), state.period) else {
            return Ok(StageOutput::done(StageResult::fail(
                self.name(),
                "missing compiled EA or backtest period",
            )));
        };

        let stem = state.ea_name.as_str();
        let spec = RunSpec {
            symbol: state.symbol.clone(),
            timeframe: state.timeframe.clone(),
            params: state.wide_validation_params.clone(),
            from_date: period.start,
            to_date: period.end,
            latency_ms: ctx.config.execution_latency_ms,
            model: ctx.config.data_model,
            report_handle: report_handle(
                &state.workflow_id,
                stem,
                "validate",
                Some(&format!("a{}", state.fix_attempts)),
            ),
        };
        let outcome = ctx.runner.run_single(compiled, &spec)?;

        let trades = outcome.metrics.total_trades;
        let gate = gates::minimum_trades(trades, ctx.config.min_trades);
        let mut result = StageResult::ok(self.name())
            .with_gate(gate)
            .with_data(json!({
                "total_trades": trades,
                "profit": outcome.metrics.profit,
                "profit_factor": outcome.metrics.profit_factor,
                "max_drawdown_pct": outcome.metrics.max_drawdown_pct,
                "win_rate": outcome.metrics.win_rate,
                "report_handle": spec.report_handle,
                "report_path": outcome.report_path,
            }));
        if !result.success {
            result = result.with_error(format!(
                "only {trades} trades, minimum is {}",
                ctx.config.min_trades
            ));
        }

        let update = StateUpdate {
            validation_trades: Some(trades),
            metrics: vec![
                ("validation_trades".to_string(), trades as f64),
                ("validation_profit".to_string(), outcome.metrics.profit),
            ],
            ..Default::default()
        };
        Ok(StageOutput::with_update(result, update))
    }
}
