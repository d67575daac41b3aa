//! Offline forward-window analytics.
//!
//! No terminal runs: the best pass's trade list is sliced by close time
//! into segment, rolling, calendar-month and per-year windows, each with a
//! correct starting balance so in-window drawdown is realistic.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::json;

use gauntlet_core::{stage_names, StageResult, TradeRecord, WorkflowState};

use crate::stage::{Stage, StageContext, StageOutput, StateUpdate};
use crate::windows::{
    calendar_month_windows, rolling_windows, segment_windows, window_metrics, year_windows,
    Window, WindowMetrics,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowReport {
    pub window: Window,
    pub metrics: WindowMetrics,
}

pub struct ForwardWindows;

impl Stage for ForwardWindows {
    fn name(&self) -> &'static str {
        stage_names::FORWARD_WINDOWS
    }

    fn dependencies(&self) -> &'static [&'static str] {
        &[stage_names::BACKTEST_SELECTED]
    }

    fn execute(&self, state: &WorkflowState, ctx: &StageContext) -> Result<StageOutput> {
        let Some(period) = state.period else {
            return Ok(StageOutput::done(
                StageResult::ok(self.name())
                    .with_data(json!({ "skipped": true, "reason": "no backtest period" })),
            ));
        };
        if ctx.session.best_pass_trades.is_empty() {
            return Ok(StageOutput::done(
                StageResult::ok(self.name())
                    .with_data(json!({ "skipped": true, "reason": "no best-pass trade list" })),
            ));
        }

        let mut trades: Vec<TradeRecord> = ctx.session.best_pass_trades.clone();
        trades.sort_by_key(|t| t.close_time);

        let mut windows = segment_windows(&period);
        windows.extend(rolling_windows(period.end, &ctx.config.stress_rolling_days));
        windows.extend(calendar_month_windows(
            period.end,
            &ctx.config.stress_calendar_months_ago,
        ));
        windows.extend(year_windows(&period));

        let reports: Vec<WindowReport> = windows
            .into_iter()
            .map(|window| {
                let metrics = window_metrics(&trades, &window, ctx.config.deposit);
                WindowReport { window, metrics }
            })
            .collect();

        let result = StageResult::ok(self.name()).with_data(json!({
            "window_count": reports.len(),
            "trade_count": trades.len(),
        }));
        let update = StateUpdate {
            forward_windows: Some(serde_json::to_value(&reports)?),
            ..Default::default()
        };
        Ok(StageOutput::with_update(result, update))
    }
}
