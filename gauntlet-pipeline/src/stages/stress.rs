//! Stress scenarios for the best pass.
//!
//! Short windows anchored to the workflow end date, run under both data
//! models, with extra latency variants for fine-tick runs, plus post-hoc
//! cost overlays computed from the base runs' trade lists. Informational:
//! failures here never fail the workflow.

use anyhow::Result;
use chrono::Datelike;
use serde::{Deserialize, Serialize};
use serde_json::json;

use gauntlet_core::{stage_names, StageResult, TradeRecord, WorkflowState};
use gauntlet_core::metrics::profit_factor;
use gauntlet_runner::{report_handle, DataModel, RunSpec};

use crate::stage::{Stage, StageContext, StageOutput, StateUpdate};
use crate::windows::{calendar_month_windows, rolling_windows, Window};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "variant", rename_all = "snake_case")]
pub enum ScenarioVariant {
    Base,
    Overlay {
        spread_pips: f64,
        slippage_pips: f64,
        cost_adjustment: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioOutcome {
    pub id: String,
    pub label: String,
    pub window: Window,
    pub model: DataModel,
    pub latency_ms: u32,
    #[serde(flatten)]
    pub variant: ScenarioVariant,
    pub success: bool,
    pub profit: f64,
    pub profit_factor: f64,
    pub max_drawdown_pct: f64,
    pub total_trades: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

struct ScenarioPlan {
    id: String,
    label: String,
    window: Window,
    model: DataModel,
    latency_ms: u32,
}

fn build_plans(state: &WorkflowState, ctx: &StageContext) -> Vec<ScenarioPlan> {
    let Some(period) = state.period else { return Vec::new() };
    let mut windows = rolling_windows(period.end, &ctx.config.stress_rolling_days);
    windows.extend(calendar_month_windows(
        period.end,
        &ctx.config.stress_calendar_months_ago,
    ));

    let mut plans = Vec::new();
    for window in &windows {
        for model in &ctx.config.stress_models {
            let model_tag = match model {
                DataModel::Ohlc => "ohlc",
                DataModel::Tick => "tick",
            };
            plans.push(ScenarioPlan {
                id: format!("{model_tag}_{}", window.id),
                label: format!("{} — {}", model_tag.to_uppercase(), window.label),
                window: window.clone(),
                model: *model,
                latency_ms: ctx.config.execution_latency_ms,
            });
            if *model == DataModel::Tick {
                for latency in &ctx.config.stress_tick_latencies_ms {
                    plans.push(ScenarioPlan {
                        id: format!("{model_tag}_{}_lat{latency}ms", window.id),
                        label: format!(
                            "{} — {} (latency {latency}ms)",
                            model_tag.to_uppercase(),
                            window.label
                        ),
                        window: window.clone(),
                        model: *model,
                        latency_ms: *latency,
                    });
                }
            }
        }
    }
    plans
}

/// Warn about missing monthly tick archives for a fine-tick window.
fn tick_coverage_warnings(symbol: &str, window: &Window, ctx: &StageContext) -> Vec<String> {
    let Some(root) = ctx.config.tick_data_dir.as_ref() else {
        return Vec::new();
    };
    let mut warnings = Vec::new();
    let mut cursor = window.from.with_day(1).unwrap_or(window.from);
    while cursor <= window.to {
        let archive = root
            .join(symbol)
            .join(format!("{}{:02}.tkc", cursor.year(), cursor.month()));
        if !archive.exists() {
            warnings.push(format!(
                "missing tick archive for {symbol} {}-{:02}",
                cursor.year(),
                cursor.month()
            ));
        }
        cursor = crate::windows::next_month(cursor);
    }
    warnings
}

/// Apply a cost overlay to a base run's trade list:
/// per trade, cost = (spread + slippage × sides) × pip value × volume.
fn overlay_outcome(
    base: &ScenarioOutcome,
    trades: &[TradeRecord],
    spread_pips: f64,
    slippage_pips: f64,
    ctx: &StageContext,
) -> ScenarioOutcome {
    let sides = ctx.config.overlay_slippage_sides as f64;
    let pip_value = ctx.config.pip_value_per_lot;

    let mut profit = 0.0;
    let mut gross_profit = 0.0;
    let mut gross_loss = 0.0;
    let mut total_cost = 0.0;
    for trade in trades {
        let cost = (spread_pips + slippage_pips * sides) * pip_value * trade.volume;
        let adjusted = trade.net_profit - cost;
        total_cost += cost;
        profit += adjusted;
        if adjusted > 0.0 {
            gross_profit += adjusted;
        } else {
            gross_loss += -adjusted;
        }
    }

    ScenarioOutcome {
        id: format!("{}_sp{spread_pips}_sl{slippage_pips}", base.id),
        label: format!("{} +{spread_pips}sp +{slippage_pips}sl", base.label),
        window: base.window.clone(),
        model: base.model,
        latency_ms: base.latency_ms,
        variant: ScenarioVariant::Overlay {
            spread_pips,
            slippage_pips,
            cost_adjustment: total_cost,
        },
        success: true,
        profit,
        profit_factor: profit_factor(gross_profit, gross_loss),
        max_drawdown_pct: base.max_drawdown_pct,
        total_trades: base.total_trades,
        warnings: Vec::new(),
        errors: Vec::new(),
    }
}

pub struct StressScenarios;

impl Stage for StressScenarios {
    fn name(&self) -> &'static str {
        stage_names::STRESS_SCENARIOS
    }

    fn dependencies(&self) -> &'static [&'static str] {
        &[stage_names::BACKTEST_SELECTED]
    }

    fn execute(&self, state: &WorkflowState, ctx: &StageContext) -> Result<StageOutput> {
        let (Some(best), Some(compiled)) =
            (state.best_pass.as_ref(), state.compiled_ea_path.as_ref())
        else {
            return Ok(StageOutput::done(
                StageResult::ok(self.name())
                    .with_data(json!({ "skipped": true, "reason": "no best pass" })),
            ));
        };

        let plans = build_plans(state, ctx);
        let mut outcomes: Vec<ScenarioOutcome> = Vec::new();
        let mut base_trades: Vec<(usize, Vec<TradeRecord>)> = Vec::new();

        for plan in &plans {
            let handle = report_handle(&state.workflow_id, &state.ea_name, "stress", Some(&plan.id));
            let spec = RunSpec {
                symbol: state.symbol.clone(),
                timeframe: state.timeframe.clone(),
                params: best.input_params.clone(),
                from_date: plan.window.from,
                to_date: plan.window.to,
                latency_ms: plan.latency_ms,
                model: plan.model,
                report_handle: handle,
            };

            let mut warnings = Vec::new();
            if plan.model == DataModel::Tick {
                warnings = tick_coverage_warnings(&state.symbol, &plan.window, ctx);
            }

            match ctx.runner.run_single(compiled, &spec) {
                Ok(outcome) => {
                    let m = &outcome.metrics;
                    outcomes.push(ScenarioOutcome {
                        id: plan.id.clone(),
                        label: plan.label.clone(),
                        window: plan.window.clone(),
                        model: plan.model,
                        latency_ms: plan.latency_ms,
                        variant: ScenarioVariant::Base,
                        success: true,
                        profit: m.profit,
                        profit_factor: m.profit_factor,
                        max_drawdown_pct: m.max_drawdown_pct,
                        total_trades: m.total_trades,
                        warnings,
                        errors: Vec::new(),
                    });
                    base_trades.push((outcomes.len() - 1, outcome.trades));
                }
                Err(err) => outcomes.push(ScenarioOutcome {
                    id: plan.id.clone(),
                    label: plan.label.clone(),
                    window: plan.window.clone(),
                    model: plan.model,
                    latency_ms: plan.latency_ms,
                    variant: ScenarioVariant::Base,
                    success: false,
                    profit: 0.0,
                    profit_factor: 0.0,
                    max_drawdown_pct: 0.0,
                    total_trades: 0,
                    warnings,
                    errors: vec![format!("{err:#}")],
                }),
            }
        }

        // Cost overlays: no extra runs, computed from the base trade lists.
        let mut overlays = Vec::new();
        for (idx, trades) in &base_trades {
            let base = &outcomes[*idx];
            if base.total_trades == 0 {
                continue;
            }
            for &spread in &ctx.config.overlay_spread_pips {
                for &slippage in &ctx.config.overlay_slippage_pips {
                    if spread == 0.0 && slippage == 0.0 {
                        continue;
                    }
                    overlays.push(overlay_outcome(base, trades, spread, slippage, ctx));
                }
            }
        }
        outcomes.extend(overlays);

        let failed = outcomes.iter().filter(|o| !o.success).count();
        let result = StageResult::ok(self.name()).with_data(json!({
            "pass_index": best.pass_index,
            "scenario_count": outcomes.len(),
            "failed_scenarios": failed,
        }));
        let update = StateUpdate {
            stress_results: Some(serde_json::to_value(&outcomes)?),
            ..Default::default()
        };
        Ok(StageOutput::with_update(result, update))
    }
}
