//! Optimization sweep: configuration emission, execution and result
//! normalization.

use std::fs;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde_json::json;

use gauntlet_core::{
    gates, go_live_score, stage_names, OptimizationRound, PassRow, StageResult, TradeMetrics,
    WorkflowState,
};
use gauntlet_runner::ini::{inputs_from_ranges, timeframe_minutes, TesterIni};
use gauntlet_runner::{report_handle, SweepSpec};

use crate::stage::{Stage, StageContext, StageOutput, StateUpdate};

/// Deterministic handle of the sweep for the given refinement iteration.
pub fn sweep_handle(state: &WorkflowState) -> String {
    report_handle(
        &state.workflow_id,
        &state.ea_name,
        "sweep",
        Some(&format!("i{}", state.refine_iterations)),
    )
}

/// Translate the recorded ranges into the terminal's configuration file.
pub struct CreateIni;

impl Stage for CreateIni {
    fn name(&self) -> &'static str {
        stage_names::CREATE_INI
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
        let expert = compiled
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| state.ea_name.clone());

        let handle = sweep_handle(state);
        let ini = TesterIni {
            expert,
            symbol: state.symbol.clone(),
            period_minutes: timeframe_minutes(&state.timeframe),
            from_date: period.start,
            to_date: period.end,
            forward_date: Some(period.split),
            model: ctx.config.data_model,
            latency_ms: ctx.config.execution_latency_ms,
            optimization: true,
            report_handle: handle.clone(),
            deposit: ctx.config.deposit,
            currency: ctx.config.currency.clone(),
            leverage: ctx.config.leverage,
            inputs: inputs_from_ranges(&state.optimization_ranges),
        };

        let dir = ctx.store.workflow_dir(&state.workflow_id);
        fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
        let ini_path = dir.join(format!("{handle}.ini"));
        fs::write(&ini_path, ini.render())
            .with_context(|| format!("write {}", ini_path.display()))?;

        let result = StageResult::ok(self.name()).with_data(json!({
            "ini_path": ini_path,
            "report_handle": handle,
            "param_count": ini.inputs.len(),
            "sweeping_count": ini.optimizing_count(),
        }));
        Ok(StageOutput::done(result))
    }
}

/// Execute the genetic sweep under the hard timeout.
pub struct RunSweep;

impl Stage for RunSweep {
    fn name(&self) -> &'static str {
        stage_names::RUN_SWEEP
    }

    fn dependencies(&self) -> &'static [&'static str] {
        &[stage_names::CREATE_INI]
    }

    fn execute(&self, state: &WorkflowState, ctx: &StageContext) -> Result<StageOutput> {
        let (Some(compiled), Some(period)) = (state.compiled_ea_path.as_ref(), state.period) else {
            return Ok(StageOutput::done(StageResult::fail(
                self.name(),
                "missing compiled EA or backtest period",
            )));
        };

        // A straggler from an earlier run would hold the tester's
        // working-directory lock for the entire timeout.
        ctx.runner.cleanup_stray_processes();

        let handle = sweep_handle(state);
        let spec = SweepSpec {
            symbol: state.symbol.clone(),
            timeframe: state.timeframe.clone(),
            ranges: state.optimization_ranges.clone(),
            from_date: period.start,
            forward_date: period.split,
            to_date: period.end,
            latency_ms: ctx.config.execution_latency_ms,
            model: ctx.config.data_model,
            report_handle: handle.clone(),
            timeout: Duration::from_secs(ctx.config.sweep_timeout_secs),
        };

        let started = Instant::now();
        let outcome = ctx.runner.run_sweep(compiled, &spec, ctx.progress)?;
        let duration_secs = started.elapsed().as_secs_f64();

        let mut result = StageResult::ok(self.name())
            .with_gate(gates::passes_found(outcome.pass_count as usize))
            .with_data(json!({
                "report_handle": handle,
                "pass_count": outcome.pass_count,
                "duration_secs": duration_secs,
                "artifact_path": outcome.artifact_path,
            }));
        if outcome.pass_count == 0 {
            result = result.with_error("sweep produced no passes");
        }

        let update = StateUpdate {
            optimization_round: Some(OptimizationRound {
                iteration: state.refine_iterations,
                report_handle: handle,
                ranges: state.optimization_ranges.clone(),
                pass_count: outcome.pass_count,
                artifact_path: outcome.artifact_path,
                duration_secs,
            }),
            pass_table: Some(outcome.passes),
            ..Default::default()
        };
        Ok(StageOutput::with_update(result, update))
    }
}

/// Composite score of a sweep row, reusing its segment results.
pub fn score_pass(row: &PassRow, ctx: &StageContext) -> f64 {
    let metrics = TradeMetrics {
        profit: row.profit,
        profit_factor: row.profit_factor,
        max_drawdown_pct: row.max_drawdown_pct,
        total_trades: row.total_trades,
        win_rate: row.win_rate,
        sharpe: row.sharpe,
        ..TradeMetrics::default()
    };
    go_live_score(
        &metrics,
        row.back_result,
        row.forward_result,
        &ctx.config.score_weights(),
        &ctx.config.score_ranges(),
    )
}

/// Normalize, filter and rank the sweep's pass table.
pub struct ParsePasses;

impl Stage for ParsePasses {
    fn name(&self) -> &'static str {
        stage_names::PARSE_PASSES
    }

    fn dependencies(&self) -> &'static [&'static str] {
        &[stage_names::RUN_SWEEP]
    }

    fn execute(&self, state: &WorkflowState, ctx: &StageContext) -> Result<StageOutput> {
        let raw = &ctx.session.passes;
        let min_trades = ctx.config.adaptive_min_trades(state.validation_trades);

        let mut valid: Vec<PassRow> = raw
            .iter()
            .filter(|p| p.total_trades >= min_trades)
            .cloned()
            .collect();
        let consistent = valid.iter().filter(|p| p.is_consistent()).count();

        let mut scored: Vec<(f64, PassRow)> = valid
            .drain(..)
            .map(|row| (score_pass(&row, ctx), row))
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        let ranked: Vec<PassRow> = scored.into_iter().map(|(_, row)| row).collect();

        let mut result = StageResult::ok(self.name())
            .with_gate(gates::valid_passes(ranked.len()))
            .with_data(json!({
                "total_passes": raw.len(),
                "valid_passes": ranked.len(),
                "consistent_passes": consistent,
                "min_trades_filter": min_trades,
            }));
        if ranked.is_empty() {
            result = result.with_error(format!("no passes with >= {min_trades} trades"));
        }

        let update = StateUpdate { pass_table: Some(ranked), ..Default::default() };
        Ok(StageOutput::with_update(result, update))
    }
}
