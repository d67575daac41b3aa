//! Pipeline orchestration.
//!
//! Owns the workflow state exclusively: sequences stages on a single
//! thread, applies their typed updates, checkpoints after every stage and
//! parks at the pause points. Resuming is a fresh entry-point call against
//! the persisted record; no completed stage ever re-runs, except the full
//! restart triggered by a source patch.

use std::sync::Arc;

use anyhow::{anyhow, bail, Context as _, Result};
use chrono::{NaiveDate, Utc};

use gauntlet_core::{stage_names, StageResult, WorkflowState, WorkflowStatus};
use gauntlet_runner::{ProgressSink, TerminalRunner, TracingSink};

use crate::config::StressConfig;
use crate::stage::{
    precondition_failure, AnalystParams, PauseKind, RefineDecision, SessionData, Stage,
    StageContext, StageOutput, StateUpdate,
};
use crate::stages::{
    AnalyzeRefine, BacktestSelected, Compile, CreateIni, ExtractParams, ForwardWindows,
    GenerateReports, InjectCriterion, InjectSafety, LoadEa, MonteCarlo, MultiPair, ParsePasses,
    RecordRanges, RefineOutcome, RepairSource, RunSweep, SelectPasses, StressScenarios,
    ValidateTrades,
};
use crate::store::RunStore;

/// Where a phase left the workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    /// Parked at a pause point; state persisted.
    Paused,
    /// Reached a terminal status; state persisted.
    Halted,
}

/// Outcome of executing one stage under fatal-error policy.
enum Step {
    Output(StageOutput),
    /// The stage errored; the workflow was failed (reports included).
    Halted,
}

pub struct Pipeline {
    config: StressConfig,
    store: RunStore,
    runner: Arc<dyn TerminalRunner>,
    progress: Arc<dyn ProgressSink>,
    /// Overridable clock for tests; `None` means "today".
    today: Option<NaiveDate>,
}

impl Pipeline {
    pub fn new(config: StressConfig, runner: Arc<dyn TerminalRunner>) -> Self {
        let store = RunStore::new(config.runs_dir.clone());
        Self {
            config,
            store,
            runner,
            progress: Arc::new(TracingSink),
            today: None,
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    pub fn store(&self) -> &RunStore {
        &self.store
    }

    fn today(&self) -> NaiveDate {
        self.today.unwrap_or_else(|| Utc::now().date_naive())
    }

    fn context<'a>(&'a self, session: &'a SessionData) -> StageContext<'a> {
        StageContext {
            config: &self.config,
            store: &self.store,
            runner: &*self.runner,
            progress: &*self.progress,
            today: self.today(),
            session,
        }
    }

    // ── Entry points ────────────────────────────────────────────────

    /// Create a new workflow and run until the first pause or a terminal
    /// status.
    pub fn start(
        &self,
        ea_source_path: impl Into<std::path::PathBuf>,
        symbol: &str,
        timeframe: &str,
        runner_handle: &str,
    ) -> Result<WorkflowState> {
        let ea_source_path = ea_source_path.into();
        let stem = ea_source_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "ea".to_string());
        let workflow_id = new_workflow_id(&stem, symbol, timeframe);

        let mut state =
            WorkflowState::new(workflow_id, ea_source_path, symbol, timeframe, runner_handle);
        let mut session = SessionData::default();
        state.status = WorkflowStatus::Running;
        self.store.save_state(&state)?;

        tracing::info!(workflow = %state.workflow_id, %symbol, %timeframe, "workflow started");
        self.drive_from_start(&mut state, &mut session)?;
        Ok(state)
    }

    /// Resume an `awaiting_params` workflow with the analyst payload.
    ///
    /// A rejected payload surfaces as an error without touching the
    /// persisted record; the workflow stays parked.
    pub fn resume_with_params(
        &self,
        workflow_id: &str,
        params: AnalystParams,
    ) -> Result<WorkflowState> {
        let mut state = self.load(workflow_id)?;
        if state.status.is_terminal() {
            return Ok(state);
        }
        if state.status != WorkflowStatus::AwaitingParams {
            bail!(
                "workflow {workflow_id} is {:?}, not awaiting parameters",
                state.status
            );
        }

        let mut session = self.reload_session(&state)?;
        session.analyst_params = Some(params);
        state.status = WorkflowStatus::Running;

        let ctx = self.context(&session);
        let output = RecordRanges.execute(&state, &ctx)?;
        if !output.result.success {
            bail!(
                "analyst payload rejected: {}",
                output.result.errors.join("; ")
            );
        }
        self.commit(&mut state, &mut session, output)?;

        self.drive_after_ranges(&mut state, &mut session)?;
        Ok(state)
    }

    /// Resume an `awaiting_fix` workflow with patched source content. The
    /// pipeline restarts from the first stage with counters preserved.
    pub fn resume_with_patched_source(
        &self,
        workflow_id: &str,
        patched_source: String,
    ) -> Result<WorkflowState> {
        let mut state = self.load(workflow_id)?;
        if state.status.is_terminal() {
            return Ok(state);
        }
        if state.status != WorkflowStatus::AwaitingFix {
            bail!(
                "workflow {workflow_id} is {:?}, not awaiting a fix",
                state.status
            );
        }

        let mut session = self.reload_session(&state)?;
        session.patched_source = Some(patched_source);
        state.status = WorkflowStatus::Running;

        let ctx = self.context(&session);
        let output = RepairSource.execute(&state, &ctx)?;
        if !output.result.success {
            bail!("source patch rejected: {}", output.result.errors.join("; "));
        }
        let repair_result = output.result.clone();
        apply_update(&mut state, &mut session, &self.store, output.update)?;

        // Restart from the top; budgets and the original backup survive.
        state.reset_for_restart();
        state.record_stage(repair_result);
        self.store.save_state(&state)?;

        self.drive_from_start(&mut state, &mut session)?;
        Ok(state)
    }

    /// Resume an `awaiting_refine_decision` workflow.
    pub fn resume_with_refine_decision(
        &self,
        workflow_id: &str,
        decision: RefineDecision,
    ) -> Result<WorkflowState> {
        let mut state = self.load(workflow_id)?;
        if state.status.is_terminal() {
            return Ok(state);
        }
        if state.status != WorkflowStatus::AwaitingRefineDecision {
            bail!(
                "workflow {workflow_id} is {:?}, not awaiting a refine decision",
                state.status
            );
        }

        let mut session = self.reload_session(&state)?;
        session.refine_decision = Some(decision);
        state.status = WorkflowStatus::Running;

        if self.run_sweep_phase(&mut state, &mut session)? == Flow::Continue {
            self.drive_after_sweep(&mut state, &mut session)?;
        }
        Ok(state)
    }

    /// Resume an `awaiting_selection` workflow with explicit pass indices.
    pub fn resume_with_selection(
        &self,
        workflow_id: &str,
        selection: Vec<u32>,
    ) -> Result<WorkflowState> {
        let mut state = self.load(workflow_id)?;
        if state.status.is_terminal() {
            return Ok(state);
        }
        if state.status != WorkflowStatus::AwaitingSelection {
            bail!(
                "workflow {workflow_id} is {:?}, not awaiting a selection",
                state.status
            );
        }

        let mut session = self.reload_session(&state)?;
        session.selection = Some(selection);
        state.status = WorkflowStatus::Running;

        if self.run_selection_phase(&mut state, &mut session)? == Flow::Continue {
            self.run_final_phase(&mut state, &mut session)?;
        }
        Ok(state)
    }

    // ── Phase drivers ───────────────────────────────────────────────

    /// From a fresh or freshly-reset state: preparation, compile,
    /// extraction; then either park for the analyst or, when the payload
    /// is already recorded (patch restart), keep going.
    fn drive_from_start(&self, state: &mut WorkflowState, session: &mut SessionData) -> Result<()> {
        match self.run_prepare_phase(state, session)? {
            Flow::Continue => {}
            Flow::Paused | Flow::Halted => return Ok(()),
        }

        if state.wide_validation_params.is_empty() {
            state.status = WorkflowStatus::AwaitingParams;
            self.store.save_state(state)?;
            tracing::info!(workflow = %state.workflow_id, "awaiting parameter analysis");
            return Ok(());
        }

        // Patch restart: replay the recorded payload through validation so
        // it is re-checked against the freshly extracted parameters.
        session.analyst_params = Some(AnalystParams {
            wide_validation_params: state.wide_validation_params.clone(),
            optimization_ranges: state.optimization_ranges.clone(),
        });
        let output = match self.try_execute(&RecordRanges, state, session)? {
            Step::Output(output) => output,
            Step::Halted => return Ok(()),
        };
        let success = output.result.success;
        self.commit(state, session, output)?;
        if !success {
            return self.finish_failed(state, session);
        }
        self.drive_after_ranges(state, session)
    }

    fn drive_after_ranges(
        &self,
        state: &mut WorkflowState,
        session: &mut SessionData,
    ) -> Result<()> {
        match self.run_validation_phase(state, session)? {
            Flow::Continue => {}
            Flow::Paused | Flow::Halted => return Ok(()),
        }
        match self.run_sweep_phase(state, session)? {
            Flow::Continue => {}
            Flow::Paused | Flow::Halted => return Ok(()),
        }
        self.drive_after_sweep(state, session)
    }

    fn drive_after_sweep(
        &self,
        state: &mut WorkflowState,
        session: &mut SessionData,
    ) -> Result<()> {
        match self.run_selection_phase(state, session)? {
            Flow::Continue => self.run_final_phase(state, session),
            Flow::Paused | Flow::Halted => Ok(()),
        }
    }

    /// Load, inject, compile (with the fix loop) and extract parameters.
    fn run_prepare_phase(
        &self,
        state: &mut WorkflowState,
        session: &mut SessionData,
    ) -> Result<Flow> {
        for stage in [&LoadEa as &dyn Stage, &InjectCriterion, &InjectSafety] {
            if state.stage_passed(stage.name()) {
                continue;
            }
            let output = match self.try_execute(stage, state, session)? {
                Step::Output(output) => output,
                Step::Halted => return Ok(Flow::Halted),
            };
            let success = output.result.success;
            self.commit(state, session, output)?;
            if !success {
                self.finish_failed(state, session)?;
                return Ok(Flow::Halted);
            }
        }

        if !state.stage_passed(stage_names::COMPILE) {
            let output = match self.try_execute(&Compile, state, session)? {
                Step::Output(output) => output,
                Step::Halted => return Ok(Flow::Halted),
            };
            let success = output.result.success;
            self.commit(state, session, output)?;
            if !success {
                return self.enter_fix_pause_or_fail(state, session);
            }
        }

        if !state.stage_passed(stage_names::EXTRACT_PARAMS) {
            let output = match self.try_execute(&ExtractParams, state, session)? {
                Step::Output(output) => output,
                Step::Halted => return Ok(Flow::Halted),
            };
            let success = output.result.success;
            self.commit(state, session, output)?;
            if !success {
                self.finish_failed(state, session)?;
                return Ok(Flow::Halted);
            }
        }
        Ok(Flow::Continue)
    }

    /// Trade validation with the fix loop.
    fn run_validation_phase(
        &self,
        state: &mut WorkflowState,
        session: &mut SessionData,
    ) -> Result<Flow> {
        if state.stage_passed(stage_names::VALIDATE_TRADES) {
            return Ok(Flow::Continue);
        }
        let output = match self.try_execute(&ValidateTrades, state, session)? {
            Step::Output(output) => output,
            Step::Halted => return Ok(Flow::Halted),
        };
        let success = output.result.success;
        self.commit(state, session, output)?;
        if success {
            Ok(Flow::Continue)
        } else {
            self.enter_fix_pause_or_fail(state, session)
        }
    }

    /// The two-stage optimization loop: configuration, sweep, parse,
    /// refinement analysis; repeats with refined ranges at most
    /// `refine_max_iterations` times.
    fn run_sweep_phase(
        &self,
        state: &mut WorkflowState,
        session: &mut SessionData,
    ) -> Result<Flow> {
        loop {
            // A pending decision means this iteration's sweep already ran.
            if let Some(decision) = session.refine_decision.take() {
                match decision {
                    RefineDecision::Proceed => return Ok(Flow::Continue),
                    RefineDecision::Refine(ranges) => {
                        if state.refine_iterations >= self.config.refine_max_iterations {
                            bail!(
                                "refinement budget exhausted ({} iterations)",
                                state.refine_iterations
                            );
                        }
                        let invalid: Vec<String> =
                            ranges.iter().flat_map(|r| r.validate()).collect();
                        if !invalid.is_empty() {
                            bail!("refined ranges rejected: {}", invalid.join("; "));
                        }
                        state.refine_iterations += 1;
                        state.optimization_ranges = ranges;
                        self.store.save_state(state)?;
                    }
                }
            } else if state.stage_passed(stage_names::ANALYZE_REFINE)
                && state.stage_passed(stage_names::RUN_SWEEP)
            {
                // Resumed past a completed analysis that chose to proceed.
                return Ok(Flow::Continue);
            }

            for stage in [&CreateIni as &dyn Stage, &RunSweep, &ParsePasses] {
                let output = match self.try_execute(stage, state, session)? {
                    Step::Output(output) => output,
                    Step::Halted => return Ok(Flow::Halted),
                };
                let success = output.result.success;
                self.commit(state, session, output)?;
                if !success {
                    self.runner.cleanup_stray_processes();
                    self.finish_failed(state, session)?;
                    return Ok(Flow::Halted);
                }
            }

            let (analysis, outcome) = {
                let ctx = self.context(session);
                AnalyzeRefine::assess(state, &ctx)
            };
            let output = match self.try_execute(&AnalyzeRefine, state, session)? {
                Step::Output(output) => output,
                Step::Halted => return Ok(Flow::Halted),
            };
            let paused = output.pause == Some(PauseKind::RefineDecision);
            self.commit(state, session, output)?;

            match outcome {
                RefineOutcome::Proceed => return Ok(Flow::Continue),
                RefineOutcome::RecommendRefine => {
                    if paused {
                        state.status = WorkflowStatus::AwaitingRefineDecision;
                        self.store.save_state(state)?;
                        tracing::info!(workflow = %state.workflow_id, "awaiting refine decision");
                        return Ok(Flow::Paused);
                    }
                    // Autonomous decision: adopt the suggested ranges.
                    session.refine_decision =
                        Some(RefineDecision::Refine(analysis.refined_ranges));
                }
            }
        }
    }

    fn run_selection_phase(
        &self,
        state: &mut WorkflowState,
        session: &mut SessionData,
    ) -> Result<Flow> {
        if state.stage_passed(stage_names::SELECT_PASSES) {
            return Ok(Flow::Continue);
        }
        let output = match self.try_execute(&SelectPasses, state, session)? {
            Step::Output(output) => output,
            Step::Halted => return Ok(Flow::Halted),
        };
        if output.pause == Some(PauseKind::Selection) {
            state.status = WorkflowStatus::AwaitingSelection;
            self.store.save_state(state)?;
            tracing::info!(workflow = %state.workflow_id, "awaiting pass selection");
            return Ok(Flow::Paused);
        }
        let success = output.result.success;
        self.commit(state, session, output)?;
        if !success {
            self.finish_failed(state, session)?;
            return Ok(Flow::Halted);
        }
        Ok(Flow::Continue)
    }

    /// Backtests, Monte Carlo, reports and the optional post-report
    /// stages; ends in a terminal status.
    fn run_final_phase(&self, state: &mut WorkflowState, session: &mut SessionData) -> Result<()> {
        if !state.stage_passed(stage_names::BACKTEST_SELECTED) {
            let output = match self.try_execute(&BacktestSelected, state, session)? {
                Step::Output(output) => output,
                Step::Halted => return Ok(()),
            };
            let success = output.result.success;
            self.commit(state, session, output)?;
            if !success {
                // Gate-fatal: reports still run, then the workflow fails.
                return self.finish_failed(state, session);
            }
        }

        if !state.stage_passed(stage_names::MONTE_CARLO) {
            // Informational: a failed simulation or gate is recorded and
            // the pipeline continues.
            self.run_informational(&MonteCarlo, state, session)?;
        }

        let output = self.execute(&GenerateReports, state, session)?;
        self.commit(state, session, output)?;

        if self.config.auto_stress {
            self.run_informational(&StressScenarios, state, session)?;
        }
        if self.config.auto_forward_windows {
            self.run_informational(&ForwardWindows, state, session)?;
        }
        if self.config.auto_multi_pair {
            self.run_informational(&MultiPair, state, session)?;
            self.spawn_children(state)?;
        }

        state.status = WorkflowStatus::Completed;
        self.store.save_state(state)?;
        tracing::info!(workflow = %state.workflow_id, "workflow completed");
        Ok(())
    }

    // ── Helpers ─────────────────────────────────────────────────────

    fn load(&self, workflow_id: &str) -> Result<WorkflowState> {
        self.store
            .load_state(workflow_id)
            .with_context(|| format!("load workflow {workflow_id}"))
    }

    /// Rebuild the in-memory session from spilled artifacts.
    fn reload_session(&self, state: &WorkflowState) -> Result<SessionData> {
        let mut session = SessionData::default();
        let pass_table = self
            .store
            .workflow_dir(&state.workflow_id)
            .join("pass_table.json");
        if pass_table.exists() {
            session.passes = self.store.load_artifact(&pass_table)?;
        }
        if let Some(path) = state.best_pass_trades_path.as_ref() {
            if path.exists() {
                session.best_pass_trades = self.store.load_artifact(path)?;
            }
        }
        Ok(session)
    }

    fn execute(
        &self,
        stage: &dyn Stage,
        state: &WorkflowState,
        session: &SessionData,
    ) -> Result<StageOutput> {
        let unmet = stage.preconditions(state);
        if !unmet.is_empty() {
            return Ok(precondition_failure(stage.name(), unmet));
        }
        tracing::debug!(workflow = %state.workflow_id, stage = stage.name(), "executing stage");
        let ctx = self.context(session);
        stage.execute(state, &ctx)
    }

    /// Execute under fatal-error policy: a runner or I/O error fails the
    /// workflow (after generating reports) instead of propagating.
    fn try_execute(
        &self,
        stage: &dyn Stage,
        state: &mut WorkflowState,
        session: &mut SessionData,
    ) -> Result<Step> {
        match self.execute(stage, state, session) {
            Ok(output) => Ok(Step::Output(output)),
            Err(err) => {
                tracing::error!(stage = stage.name(), %err, "stage errored");
                state.record_stage(StageResult::fail(stage.name(), format!("{err:#}")));
                self.runner.cleanup_stray_processes();
                self.finish_failed(state, session)?;
                Ok(Step::Halted)
            }
        }
    }

    /// Record the result, apply updates, persist the checkpoint.
    fn commit(
        &self,
        state: &mut WorkflowState,
        session: &mut SessionData,
        output: StageOutput,
    ) -> Result<()> {
        // A parked Params/Selection probe records nothing: the stage will
        // genuinely run once its input arrives.
        let record = !matches!(output.pause, Some(PauseKind::Params | PauseKind::Selection));
        apply_update(state, session, &self.store, output.update)?;
        if record {
            state.record_stage(output.result);
        }
        match output.pause {
            Some(PauseKind::Params) => state.status = WorkflowStatus::AwaitingParams,
            Some(PauseKind::Selection) => state.status = WorkflowStatus::AwaitingSelection,
            Some(PauseKind::Fix) => state.status = WorkflowStatus::AwaitingFix,
            Some(PauseKind::RefineDecision) | None => {}
        }
        self.store.save_state(state)?;
        Ok(())
    }

    /// Route a gated failure (compile or validation) into the fix loop, or
    /// fail the workflow once the patch budget is spent.
    fn enter_fix_pause_or_fail(
        &self,
        state: &mut WorkflowState,
        session: &mut SessionData,
    ) -> Result<Flow> {
        if state.fix_attempts < self.config.max_fix_attempts {
            state.fix_attempts += 1;
            state.status = WorkflowStatus::AwaitingFix;
            self.store.save_state(state)?;
            tracing::info!(
                workflow = %state.workflow_id,
                attempt = state.fix_attempts,
                "awaiting source fix"
            );
            Ok(Flow::Paused)
        } else {
            state.errors.push(format!(
                "fix budget exhausted after {} patches",
                state.fix_attempts
            ));
            self.finish_failed(state, session)?;
            Ok(Flow::Halted)
        }
    }

    /// Terminal failure path: reports always run first.
    fn finish_failed(&self, state: &mut WorkflowState, session: &mut SessionData) -> Result<()> {
        let output = self.execute(&GenerateReports, state, session)?;
        self.commit(state, session, output)?;
        state.status = WorkflowStatus::Failed;
        self.store.save_state(state)?;
        tracing::warn!(workflow = %state.workflow_id, "workflow failed");
        Ok(())
    }

    /// Run an informational stage: failures are recorded, never fatal.
    fn run_informational(
        &self,
        stage: &dyn Stage,
        state: &mut WorkflowState,
        session: &mut SessionData,
    ) -> Result<()> {
        match self.execute(stage, state, session) {
            Ok(output) => self.commit(state, session, output),
            Err(err) => {
                tracing::warn!(stage = stage.name(), %err, "informational stage errored");
                state.record_stage(StageResult::fail(stage.name(), format!("{err:#}")));
                self.store.save_state(state)?;
                Ok(())
            }
        }
    }

    /// Run one child workflow per additional symbol, sequentially (the
    /// terminal is a shared resource), reusing the parent's recorded
    /// payload. Per-symbol failures are isolated.
    fn spawn_children(&self, state: &mut WorkflowState) -> Result<()> {
        let symbols: Vec<String> = {
            let session = SessionData::default();
            let ctx = self.context(&session);
            MultiPair::additional_symbols(state, &ctx)
        };
        if symbols.is_empty() || state.wide_validation_params.is_empty() {
            return Ok(());
        }

        let mut child_config = self.config.clone();
        child_config.auto_multi_pair = false;
        let child_pipeline = Pipeline {
            config: child_config,
            store: self.store.clone(),
            runner: Arc::clone(&self.runner),
            progress: Arc::clone(&self.progress),
            today: self.today,
        };
        let payload = AnalystParams {
            wide_validation_params: state.wide_validation_params.clone(),
            optimization_ranges: state.optimization_ranges.clone(),
        };

        for symbol in symbols {
            match child_pipeline.start(
                state.ea_source_path.clone(),
                &symbol,
                &state.timeframe,
                &state.runner_handle,
            ) {
                Ok(child) => {
                    let child_id = child.workflow_id.clone();
                    if child.status == WorkflowStatus::AwaitingParams {
                        if let Err(err) =
                            child_pipeline.resume_with_params(&child_id, payload.clone())
                        {
                            tracing::warn!(%symbol, %err, "child workflow failed");
                            state.errors.push(format!("child {symbol}: {err:#}"));
                        }
                    }
                    state.child_workflow_ids.push(child_id);
                }
                Err(err) => {
                    tracing::warn!(%symbol, %err, "child workflow failed to start");
                    state.errors.push(format!("child {symbol}: {err:#}"));
                }
            }
        }
        self.store.save_state(state)?;
        Ok(())
    }
}

/// Unique, readable workflow id: stem, symbol, timeframe and a short hash
/// over the creation instant.
fn new_workflow_id(stem: &str, symbol: &str, timeframe: &str) -> String {
    let nonce = format!(
        "{stem}|{symbol}|{timeframe}|{}",
        Utc::now().timestamp_nanos_opt().unwrap_or_default()
    );
    let digest = blake3::hash(nonce.as_bytes()).to_hex();
    format!("{stem}_{symbol}_{timeframe}_{}", &digest.as_str()[..8])
}

/// Apply a stage's typed updates to the state, spilling large artifacts.
fn apply_update(
    state: &mut WorkflowState,
    session: &mut SessionData,
    store: &RunStore,
    update: StateUpdate,
) -> Result<()> {
    if let Some(path) = update.original_backup_path {
        state.original_backup_path = Some(path);
    }
    if let Some(path) = update.modified_ea_path {
        state.modified_ea_path = Some(path);
    }
    if let Some(path) = update.compiled_ea_path {
        state.compiled_ea_path = Some(path);
    }
    if let Some(params) = update.extracted_params {
        state.extracted_params = params;
    }
    if let Some(wide) = update.wide_validation_params {
        state.wide_validation_params = wide;
    }
    if let Some(ranges) = update.optimization_ranges {
        state.optimization_ranges = ranges;
    }
    if let Some(round) = update.optimization_round {
        state.optimization_history.push(round);
    }
    if let Some(trades) = update.validation_trades {
        state.validation_trades = Some(trades);
    }
    if let Some(period) = update.period {
        state.period = Some(period);
    }
    if let Some(passes) = update.pass_table {
        store
            .save_artifact(&state.workflow_id, "pass_table", &passes)
            .map_err(|e| anyhow!("spill pass table: {e}"))?;
        session.passes = passes;
    }
    if let Some(selected) = update.selected_passes {
        state.selected_passes = selected;
    }
    if let Some(backtests) = update.pass_backtests {
        store
            .save_artifact(&state.workflow_id, "pass_backtests", &backtests)
            .map_err(|e| anyhow!("spill backtests: {e}"))?;
    }
    if let Some(best) = update.best_pass {
        state.best_pass = Some(best);
    }
    if let Some(trades) = update.best_pass_trades {
        let path = store
            .save_artifact(&state.workflow_id, "best_pass_trades", &trades)
            .map_err(|e| anyhow!("spill best-pass trades: {e}"))?;
        state.best_pass_trades_path = Some(path);
        session.best_pass_trades = trades;
    }
    if let Some(mc) = update.monte_carlo {
        state.monte_carlo = Some(mc);
    }
    if let Some(stress) = update.stress_results {
        let path = store
            .save_artifact(&state.workflow_id, "stress_scenarios", &stress)
            .map_err(|e| anyhow!("spill stress scenarios: {e}"))?;
        state.stress_results_path = Some(path);
    }
    if let Some(windows) = update.forward_windows {
        let path = store
            .save_artifact(&state.workflow_id, "forward_windows", &windows)
            .map_err(|e| anyhow!("spill forward windows: {e}"))?;
        state.forward_windows_path = Some(path);
    }
    if let Some(children) = update.child_workflow_ids {
        state.child_workflow_ids = children;
    }
    for (name, value) in update.metrics {
        state.metrics.insert(name, value);
    }
    for gate in update.extra_gates {
        state.gates.retain(|g| g.name != gate.name);
        state.gates.push(gate);
    }
    Ok(())
}
