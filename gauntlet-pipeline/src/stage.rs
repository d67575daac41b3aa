//! The stage contract.
//!
//! A stage is a named unit that reads a snapshot of the workflow state,
//! performs its work through the terminal runner, and returns a result plus
//! typed state updates. Stages never mutate the state they are given; the
//! orchestrator applies updates and persists after every stage. Pause
//! stages signal that the workflow must park for external input.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Result;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use gauntlet_core::{
    BacktestPeriod, MonteCarloSummary, OptimizationRange, OptimizationRound, ParamValue,
    Parameter, PassBacktest, PassRow, StageResult, TradeRecord, WorkflowState,
};
use gauntlet_runner::{ProgressSink, TerminalRunner};

use crate::config::StressConfig;
use crate::store::RunStore;

/// Which pause point a stage is yielding to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseKind {
    /// Waiting for wide validation params and optimization ranges.
    Params,
    /// Waiting for a patched source file.
    Fix,
    /// Waiting for a proceed-or-refine decision.
    RefineDecision,
    /// Waiting for an explicit pass selection.
    Selection,
}

/// Payload supplied by the analyst agent at the parameter pause point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalystParams {
    pub wide_validation_params: BTreeMap<String, ParamValue>,
    pub optimization_ranges: Vec<OptimizationRange>,
}

/// Decision supplied at the refine pause point.
#[derive(Debug, Clone, PartialEq)]
pub enum RefineDecision {
    Proceed,
    Refine(Vec<OptimizationRange>),
}

/// External inputs and large in-memory artifacts for the current process.
/// Cleared or reloaded on resume; everything durable lives in the state
/// record and its artifact files.
#[derive(Default)]
pub struct SessionData {
    /// Merged pass table of the latest sweep, scored and sorted.
    pub passes: Vec<PassRow>,
    /// Trade list of the best pass, for the offline stages.
    pub best_pass_trades: Vec<TradeRecord>,
    pub analyst_params: Option<AnalystParams>,
    pub refine_decision: Option<RefineDecision>,
    pub selection: Option<Vec<u32>>,
    pub patched_source: Option<String>,
}

/// Everything a stage may touch besides the state snapshot.
pub struct StageContext<'a> {
    pub config: &'a StressConfig,
    pub store: &'a RunStore,
    pub runner: &'a dyn TerminalRunner,
    pub progress: &'a dyn ProgressSink,
    /// Injected clock so period derivation is testable.
    pub today: NaiveDate,
    pub session: &'a SessionData,
}

/// Typed state changes a stage requests. The orchestrator is the only
/// writer; anything large carries through `SessionData` and is spilled to
/// artifact files.
#[derive(Default)]
pub struct StateUpdate {
    pub original_backup_path: Option<PathBuf>,
    pub modified_ea_path: Option<PathBuf>,
    pub compiled_ea_path: Option<PathBuf>,
    pub extracted_params: Option<Vec<Parameter>>,
    pub wide_validation_params: Option<BTreeMap<String, ParamValue>>,
    pub optimization_ranges: Option<Vec<OptimizationRange>>,
    pub optimization_round: Option<OptimizationRound>,
    pub validation_trades: Option<u32>,
    pub period: Option<BacktestPeriod>,
    pub pass_table: Option<Vec<PassRow>>,
    pub selected_passes: Option<Vec<u32>>,
    pub pass_backtests: Option<Vec<PassBacktest>>,
    pub best_pass: Option<PassBacktest>,
    pub best_pass_trades: Option<Vec<TradeRecord>>,
    pub monte_carlo: Option<MonteCarloSummary>,
    pub stress_results: Option<serde_json::Value>,
    pub forward_windows: Option<serde_json::Value>,
    pub child_workflow_ids: Option<Vec<String>>,
    /// Metric aggregates merged into the state for report consumers.
    pub metrics: Vec<(String, f64)>,
    /// Gates beyond the stage's primary one (a stage result carries a
    /// single gate; some stages check several thresholds).
    pub extra_gates: Vec<gauntlet_core::GateResult>,
}

/// What a stage produced.
pub struct StageOutput {
    pub result: StageResult,
    pub update: StateUpdate,
    pub pause: Option<PauseKind>,
}

impl StageOutput {
    pub fn done(result: StageResult) -> Self {
        Self { result, update: StateUpdate::default(), pause: None }
    }

    pub fn with_update(result: StageResult, update: StateUpdate) -> Self {
        Self { result, update, pause: None }
    }

    pub fn pause(result: StageResult, update: StateUpdate, kind: PauseKind) -> Self {
        Self { result, update, pause: Some(kind) }
    }
}

/// A named pipeline unit.
pub trait Stage {
    fn name(&self) -> &'static str;

    /// Stages that must have completed successfully before this one runs.
    fn dependencies(&self) -> &'static [&'static str] {
        &[]
    }

    /// Unmet preconditions, as human-readable reasons. The default checks
    /// the dependency list against recorded stage results.
    fn preconditions(&self, state: &WorkflowState) -> Vec<String> {
        self.dependencies()
            .iter()
            .filter(|dep| !state.stage_passed(dep))
            .map(|dep| format!("stage {dep} has not completed successfully"))
            .collect()
    }

    fn execute(&self, state: &WorkflowState, ctx: &StageContext) -> Result<StageOutput>;
}

/// Convenience: a precondition failure expressed as a failed stage result
/// instead of a panic or error.
pub fn precondition_failure(stage: &'static str, reasons: Vec<String>) -> StageOutput {
    let mut result = StageResult::fail(stage, "preconditions not met");
    for reason in reasons {
        result = result.with_error(reason);
    }
    StageOutput::done(result)
}
