//! Workflow state: the single persisted record that carries a run across
//! process boundaries.
//!
//! The orchestrator owns this record exclusively. Stages read a snapshot and
//! return a `StageResult`; applying a result appends it (never replaces) so
//! the stage-result list is the execution history in order.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::metrics::GateResult;
use crate::params::{OptimizationRange, ParamValue, Parameter};
use crate::pass_row::{MonteCarloSummary, PassBacktest};

/// Lifecycle status of a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Pending,
    Running,
    AwaitingParams,
    AwaitingFix,
    AwaitingSelection,
    AwaitingRefineDecision,
    Completed,
    Failed,
}

impl WorkflowStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, WorkflowStatus::Completed | WorkflowStatus::Failed)
    }

    pub fn is_paused(self) -> bool {
        matches!(
            self,
            WorkflowStatus::AwaitingParams
                | WorkflowStatus::AwaitingFix
                | WorkflowStatus::AwaitingSelection
                | WorkflowStatus::AwaitingRefineDecision
        )
    }
}

/// Stage name vocabulary, in pipeline order.
pub mod stage_names {
    pub const LOAD_EA: &str = "load_ea";
    pub const INJECT_CRITERION: &str = "inject_criterion";
    pub const INJECT_SAFETY: &str = "inject_safety";
    pub const COMPILE: &str = "compile";
    pub const EXTRACT_PARAMS: &str = "extract_params";
    pub const RECORD_RANGES: &str = "record_ranges";
    pub const VALIDATE_TRADES: &str = "validate_trades";
    pub const REPAIR_SOURCE: &str = "repair_source";
    pub const CREATE_INI: &str = "create_ini";
    pub const RUN_SWEEP: &str = "run_sweep";
    pub const PARSE_PASSES: &str = "parse_passes";
    pub const ANALYZE_REFINE: &str = "analyze_refine";
    pub const SELECT_PASSES: &str = "select_passes";
    pub const BACKTEST_SELECTED: &str = "backtest_selected";
    pub const MONTE_CARLO: &str = "monte_carlo";
    pub const GENERATE_REPORTS: &str = "generate_reports";
    pub const STRESS_SCENARIOS: &str = "stress_scenarios";
    pub const FORWARD_WINDOWS: &str = "forward_windows";
    pub const MULTI_PAIR: &str = "multi_pair";

    /// Main-line execution order. `repair_source` is not listed: it is only
    /// entered through the fix pause and restarts the pipeline.
    pub const ORDER: [&str; 18] = [
        LOAD_EA,
        INJECT_CRITERION,
        INJECT_SAFETY,
        COMPILE,
        EXTRACT_PARAMS,
        RECORD_RANGES,
        VALIDATE_TRADES,
        CREATE_INI,
        RUN_SWEEP,
        PARSE_PASSES,
        ANALYZE_REFINE,
        SELECT_PASSES,
        BACKTEST_SELECTED,
        MONTE_CARLO,
        GENERATE_REPORTS,
        STRESS_SCENARIOS,
        FORWARD_WINDOWS,
        MULTI_PAIR,
    ];
}

/// Result of executing one stage. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
    pub stage: String,
    pub success: bool,
    /// Stage-specific output. Kept as a JSON object so the record stays
    /// serializable without every stage inventing a state field.
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default)]
    pub gate: Option<GateResult>,
    #[serde(default)]
    pub errors: Vec<String>,
    pub completed_at: DateTime<Utc>,
}

impl StageResult {
    pub fn ok(stage: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            success: true,
            data: serde_json::Value::Object(Default::default()),
            gate: None,
            errors: Vec::new(),
            completed_at: Utc::now(),
        }
    }

    pub fn fail(stage: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            success: false,
            data: serde_json::Value::Object(Default::default()),
            gate: None,
            errors: vec![error.into()],
            completed_at: Utc::now(),
        }
    }

    pub fn with_gate(mut self, gate: GateResult) -> Self {
        self.success = self.success && gate.passed;
        self.gate = Some(gate);
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.errors.push(error.into());
        self
    }
}

/// Backtest period derived at INI-creation time: four years ending today,
/// forward split one year before the end (both configurable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BacktestPeriod {
    pub start: NaiveDate,
    pub split: NaiveDate,
    pub end: NaiveDate,
}

impl BacktestPeriod {
    pub fn ending_at(end: NaiveDate, total_years: u32, forward_years: u32) -> Self {
        let start = end - chrono::Duration::days(total_years as i64 * 365);
        let split = end - chrono::Duration::days(forward_years as i64 * 365);
        Self { start, split, end }
    }
}

/// One optimization iteration (the initial sweep plus up to two refinements).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationRound {
    pub iteration: u32,
    pub report_handle: String,
    pub ranges: Vec<OptimizationRange>,
    pub pass_count: u32,
    #[serde(default)]
    pub artifact_path: Option<PathBuf>,
    pub duration_secs: f64,
}

/// Root record of a workflow. Owned by the orchestrator, persisted on every
/// stage completion, and the only thing a resume needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    // ── Identity ──
    pub workflow_id: String,
    pub ea_name: String,
    pub ea_source_path: PathBuf,
    pub symbol: String,
    pub timeframe: String,
    /// Operator-supplied handle of the terminal installation to use.
    pub runner_handle: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    // ── Progress ──
    pub status: WorkflowStatus,
    /// Execution history, in order. A stage appears at most once per restart.
    pub stage_results: Vec<StageResult>,

    // ── Stored artifacts ──
    #[serde(default)]
    pub modified_ea_path: Option<PathBuf>,
    #[serde(default)]
    pub compiled_ea_path: Option<PathBuf>,
    /// Pristine copy of the operator's source, taken once before the first
    /// external patch.
    #[serde(default)]
    pub original_backup_path: Option<PathBuf>,
    #[serde(default)]
    pub extracted_params: Vec<Parameter>,
    #[serde(default)]
    pub wide_validation_params: BTreeMap<String, ParamValue>,
    #[serde(default)]
    pub optimization_ranges: Vec<OptimizationRange>,
    #[serde(default)]
    pub optimization_history: Vec<OptimizationRound>,
    #[serde(default)]
    pub validation_trades: Option<u32>,
    #[serde(default)]
    pub period: Option<BacktestPeriod>,
    #[serde(default)]
    pub selected_passes: Vec<u32>,
    #[serde(default)]
    pub best_pass: Option<PassBacktest>,
    #[serde(default)]
    pub best_pass_trades_path: Option<PathBuf>,
    #[serde(default)]
    pub monte_carlo: Option<MonteCarloSummary>,
    #[serde(default)]
    pub stress_results_path: Option<PathBuf>,
    #[serde(default)]
    pub forward_windows_path: Option<PathBuf>,
    #[serde(default)]
    pub child_workflow_ids: Vec<String>,

    // ── Budgets ──
    /// External source patches consumed, across both compile and validation
    /// triggers. Capped at 3.
    #[serde(default)]
    pub fix_attempts: u32,
    /// Optimization refinements consumed. Capped at 2.
    #[serde(default)]
    pub refine_iterations: u32,

    // ── Aggregates for report consumers ──
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
    #[serde(default)]
    pub gates: Vec<GateResult>,
    #[serde(default)]
    pub errors: Vec<String>,
}

impl WorkflowState {
    pub fn new(
        workflow_id: impl Into<String>,
        ea_source_path: impl Into<PathBuf>,
        symbol: impl Into<String>,
        timeframe: impl Into<String>,
        runner_handle: impl Into<String>,
    ) -> Self {
        let ea_source_path = ea_source_path.into();
        let ea_name = ea_source_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "unknown".to_string());
        let now = Utc::now();
        Self {
            workflow_id: workflow_id.into(),
            ea_name,
            ea_source_path,
            symbol: symbol.into(),
            timeframe: timeframe.into(),
            runner_handle: runner_handle.into(),
            created_at: now,
            updated_at: now,
            status: WorkflowStatus::Pending,
            stage_results: Vec::new(),
            modified_ea_path: None,
            compiled_ea_path: None,
            original_backup_path: None,
            extracted_params: Vec::new(),
            wide_validation_params: BTreeMap::new(),
            optimization_ranges: Vec::new(),
            optimization_history: Vec::new(),
            validation_trades: None,
            period: None,
            selected_passes: Vec::new(),
            best_pass: None,
            best_pass_trades_path: None,
            monte_carlo: None,
            stress_results_path: None,
            forward_windows_path: None,
            child_workflow_ids: Vec::new(),
            fix_attempts: 0,
            refine_iterations: 0,
            metrics: BTreeMap::new(),
            gates: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Latest result recorded for a stage, if any.
    pub fn stage_result(&self, stage: &str) -> Option<&StageResult> {
        self.stage_results.iter().rev().find(|r| r.stage == stage)
    }

    /// Whether a stage has completed successfully.
    pub fn stage_passed(&self, stage: &str) -> bool {
        self.stage_result(stage).map(|r| r.success).unwrap_or(false)
    }

    /// Append a stage result, folding its gate and errors into the
    /// aggregates report consumers read.
    pub fn record_stage(&mut self, result: StageResult) {
        if let Some(gate) = &result.gate {
            self.gates.retain(|g| g.name != gate.name);
            self.gates.push(gate.clone());
        }
        for error in &result.errors {
            self.errors.push(format!("{}: {error}", result.stage));
        }
        self.updated_at = result.completed_at;
        self.stage_results.push(result);
    }

    /// Drop all stage history while keeping identity, counters and the
    /// original backup. Used when a patched source restarts the pipeline.
    pub fn reset_for_restart(&mut self) {
        self.stage_results.clear();
        self.modified_ea_path = None;
        self.compiled_ea_path = None;
        self.extracted_params.clear();
        self.optimization_history.clear();
        self.validation_trades = None;
        self.selected_passes.clear();
        self.best_pass = None;
        self.best_pass_trades_path = None;
        self.monte_carlo = None;
        self.stress_results_path = None;
        self.forward_windows_path = None;
        self.gates.clear();
        self.metrics.clear();
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::gates;

    #[test]
    fn record_stage_appends_in_order() {
        let mut state = WorkflowState::new("wf1", "/tmp/ea.mq5", "EURUSD", "H1", "t1");
        state.record_stage(StageResult::ok(stage_names::LOAD_EA));
        state.record_stage(StageResult::ok(stage_names::COMPILE));
        let names: Vec<_> = state.stage_results.iter().map(|r| r.stage.as_str()).collect();
        assert_eq!(names, vec![stage_names::LOAD_EA, stage_names::COMPILE]);
        assert!(state.stage_passed(stage_names::COMPILE));
    }

    #[test]
    fn record_stage_replaces_gate_by_name() {
        let mut state = WorkflowState::new("wf1", "/tmp/ea.mq5", "EURUSD", "H1", "t1");
        state.record_stage(
            StageResult::fail(stage_names::VALIDATE_TRADES, "too few trades")
                .with_gate(gates::minimum_trades(11, 50)),
        );
        state.record_stage(
            StageResult::ok(stage_names::VALIDATE_TRADES).with_gate(gates::minimum_trades(120, 50)),
        );
        assert_eq!(state.gates.len(), 1);
        assert!(state.gates[0].passed);
        // History still shows both attempts.
        assert_eq!(state.stage_results.len(), 2);
    }

    #[test]
    fn gate_failure_flips_result() {
        let r = StageResult::ok(stage_names::COMPILE).with_gate(gates::compilation_errors(2));
        assert!(!r.success);
    }

    #[test]
    fn restart_preserves_identity_and_budgets() {
        let mut state = WorkflowState::new("wf1", "/tmp/ea.mq5", "EURUSD", "H1", "t1");
        state.fix_attempts = 2;
        state.original_backup_path = Some("/tmp/backup.mq5".into());
        state.record_stage(StageResult::ok(stage_names::LOAD_EA));
        state.reset_for_restart();
        assert!(state.stage_results.is_empty());
        assert_eq!(state.fix_attempts, 2);
        assert_eq!(state.workflow_id, "wf1");
        assert!(state.original_backup_path.is_some());
    }

    #[test]
    fn period_derivation() {
        let end = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        let p = BacktestPeriod::ending_at(end, 4, 1);
        assert_eq!(p.end, end);
        assert_eq!(p.split, end - chrono::Duration::days(365));
        assert_eq!(p.start, end - chrono::Duration::days(4 * 365));
    }

    #[test]
    fn state_serde_round_trip() {
        let mut state = WorkflowState::new("wf42", "/tmp/ea.mq5", "GBPUSD", "M15", "main");
        state.status = WorkflowStatus::AwaitingParams;
        state.record_stage(StageResult::ok(stage_names::EXTRACT_PARAMS).with_gate(gates::params_found(8)));
        state.wide_validation_params.insert(
            "RSI_Period".to_string(),
            crate::params::ParamValue::Int(14),
        );
        state
            .optimization_ranges
            .push(crate::params::OptimizationRange::sweep("RSI_Period", 10.0, 2.0, 22.0));
        let json = serde_json::to_string_pretty(&state).unwrap();
        let back: WorkflowState = serde_json::from_str(&json).unwrap();
        assert_eq!(state, back);
    }

    #[test]
    fn status_classification() {
        assert!(WorkflowStatus::Completed.is_terminal());
        assert!(WorkflowStatus::Failed.is_terminal());
        assert!(WorkflowStatus::AwaitingFix.is_paused());
        assert!(!WorkflowStatus::Running.is_paused());
    }
}
