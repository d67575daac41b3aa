//! Multi-symbol fan-out metadata.
//!
//! The stage itself only decides which additional symbols to test; the
//! orchestrator spawns one child workflow per symbol (sequentially, the
//! terminal is a shared resource) and records the child ids. Best-effort:
//! a failed child never fails the parent.

use anyhow::Result;
use serde_json::json;

use gauntlet_core::{stage_names, StageResult, WorkflowState};

use crate::stage::{Stage, StageContext, StageOutput};

pub struct MultiPair;

impl MultiPair {
    /// Configured symbols minus the one this workflow already covers.
    pub fn additional_symbols(state: &WorkflowState, ctx: &StageContext) -> Vec<String> {
        ctx.config
            .multi_pair_symbols
            .iter()
            .filter(|s| !s.eq_ignore_ascii_case(&state.symbol))
            .cloned()
            .collect()
    }
}

impl Stage for MultiPair {
    fn name(&self) -> &'static str {
        stage_names::MULTI_PAIR
    }

    fn dependencies(&self) -> &'static [&'static str] {
        &[stage_names::RECORD_RANGES]
    }

    fn execute(&self, state: &WorkflowState, ctx: &StageContext) -> Result<StageOutput> {
        let symbols = Self::additional_symbols(state, ctx);
        if symbols.is_empty() {
            return Ok(StageOutput::done(StageResult::ok(self.name()).with_data(json!({
                "skipped": true,
                "reason": "no additional symbols configured",
                "symbols": [],
            }))));
        }
        if state.wide_validation_params.is_empty() || state.optimization_ranges.is_empty() {
            return Ok(StageOutput::done(StageResult::ok(self.name()).with_data(json!({
                "skipped": true,
                "reason": "no recorded parameter payload to reuse",
                "symbols": symbols,
            }))));
        }

        Ok(StageOutput::done(StageResult::ok(self.name()).with_data(json!({
            "skipped": false,
            "symbols": symbols,
            "symbol_count": symbols.len(),
        }))))
    }
}
