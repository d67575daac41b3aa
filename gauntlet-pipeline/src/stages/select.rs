//! Pass selection for the detailed backtests.
//!
//! Autonomous mode keeps the score ranking from the parse stage,
//! deduplicates identical parameter assignments and takes the top N.
//! With auto-selection disabled the workflow parks for an explicit list of
//! pass indices.

use std::collections::BTreeSet;

use anyhow::Result;
use serde_json::json;

use gauntlet_core::{stage_names, PassRow, StageResult, WorkflowState};

use crate::stage::{PauseKind, Stage, StageContext, StageOutput, StateUpdate};

pub struct SelectPasses;

/// Deduplicate by exact parameter assignment, keeping rank order.
fn dedup_by_params(passes: &[PassRow]) -> Vec<&PassRow> {
    let mut seen = BTreeSet::new();
    passes
        .iter()
        .filter(|p| {
            let key = serde_json::to_string(&p.params).unwrap_or_default();
            seen.insert(key)
        })
        .collect()
}

impl Stage for SelectPasses {
    fn name(&self) -> &'static str {
        stage_names::SELECT_PASSES
    }

    fn dependencies(&self) -> &'static [&'static str] {
        &[stage_names::PARSE_PASSES]
    }

    fn execute(&self, state: &WorkflowState, ctx: &StageContext) -> Result<StageOutput> {
        let passes = &ctx.session.passes;
        if passes.is_empty() {
            return Ok(StageOutput::done(StageResult::fail(
                self.name(),
                "no ranked passes available for selection",
            )));
        }

        if let Some(selection) = ctx.session.selection.as_ref() {
            let available: BTreeSet<u32> = passes.iter().map(|p| p.pass_index).collect();
            let unknown: Vec<u32> = selection
                .iter()
                .copied()
                .filter(|idx| !available.contains(idx))
                .collect();
            if !unknown.is_empty() {
                return Ok(StageOutput::done(StageResult::fail(
                    self.name(),
                    format!("selection names unknown pass indices: {unknown:?}"),
                )));
            }
            let result = StageResult::ok(self.name()).with_data(json!({
                "selection_method": "external",
                "selected_count": selection.len(),
                "selected_passes": selection,
            }));
            let update = StateUpdate {
                selected_passes: Some(selection.clone()),
                ..Default::default()
            };
            return Ok(StageOutput::with_update(result, update));
        }

        if !ctx.config.auto_selection {
            let result = StageResult::ok(self.name()).with_data(json!({
                "awaiting": "pass selection",
                "available_passes": passes.len(),
            }));
            return Ok(StageOutput::pause(result, StateUpdate::default(), PauseKind::Selection));
        }

        let selected: Vec<u32> = dedup_by_params(passes)
            .into_iter()
            .take(ctx.config.top_n_backtest)
            .map(|p| p.pass_index)
            .collect();

        let result = StageResult::ok(self.name()).with_data(json!({
            "selection_method": "auto",
            "selected_count": selected.len(),
            "selected_passes": selected,
            "deduplicated_from": passes.len(),
        }));
        let update = StateUpdate {
            selected_passes: Some(selected),
            ..Default::default()
        };
        Ok(StageOutput::with_update(result, update))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use gauntlet_core::ParamValue;

    fn pass(index: u32, rsi: i64) -> PassRow {
        let mut params = BTreeMap::new();
        params.insert("RSI_Period".to_string(), ParamValue::Int(rsi));
        PassRow {
            pass_index: index,
            combined: 1.0,
            back_result: 100.0,
            forward_result: 50.0,
            profit: 500.0,
            profit_factor: 1.6,
            max_drawdown_pct: 12.0,
            total_trades: 90,
            win_rate: 52.0,
            sharpe: 1.1,
            params,
        }
    }

    #[test]
    fn identical_assignments_deduplicated_in_rank_order() {
        let passes = vec![pass(1, 14), pass(2, 14), pass(3, 16), pass(4, 14), pass(5, 18)];
        let deduped = dedup_by_params(&passes);
        let indices: Vec<u32> = deduped.iter().map(|p| p.pass_index).collect();
        assert_eq!(indices, vec![1, 3, 5]);
    }
}
