//! Refinement analysis pause point.
//!
//! Examines the ranked pass table for dominant toggles and tight numeric
//! clusters. A refine recommendation hands refined ranges back to the sweep
//! (at most twice); past the budget the analysis is still recorded but the
//! pipeline is forced onward.

use anyhow::Result;
use serde_json::json;

use gauntlet_core::{stage_names, StageResult, WorkflowState};

use crate::analysis::{analyze, AnalysisThresholds, RefineAnalysis};
use crate::stage::{PauseKind, Stage, StageContext, StageOutput, StateUpdate};

/// What the stage concluded, for the orchestrator's control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefineOutcome {
    Proceed,
    RecommendRefine,
}

pub struct AnalyzeRefine;

impl AnalyzeRefine {
    /// Run the analysis and decide whether refinement is recommended,
    /// honoring the iteration budget and the minimum-sample requirement.
    pub fn assess(state: &WorkflowState, ctx: &StageContext) -> (RefineAnalysis, RefineOutcome) {
        let analysis = analyze(
            &ctx.session.passes,
            &state.optimization_ranges,
            ctx.config.top_n_display,
            AnalysisThresholds {
                toggle_dominance: ctx.config.toggle_dominance_threshold,
                clustering_cv: ctx.config.clustering_cv_threshold,
            },
        );
        let budget_left = state.refine_iterations < ctx.config.refine_max_iterations;
        let enough_samples = ctx.session.passes.len() >= ctx.config.min_valid_passes;
        let outcome = if analysis.should_refine && budget_left && enough_samples {
            RefineOutcome::RecommendRefine
        } else {
            RefineOutcome::Proceed
        };
        (analysis, outcome)
    }
}

impl Stage for AnalyzeRefine {
    fn name(&self) -> &'static str {
        stage_names::ANALYZE_REFINE
    }

    fn dependencies(&self) -> &'static [&'static str] {
        &[stage_names::PARSE_PASSES]
    }

    fn execute(&self, state: &WorkflowState, ctx: &StageContext) -> Result<StageOutput> {
        let (analysis, outcome) = Self::assess(state, ctx);
        let capped =
            analysis.should_refine && state.refine_iterations >= ctx.config.refine_max_iterations;

        let result = StageResult::ok(self.name()).with_data(json!({
            "recommendation": match outcome {
                RefineOutcome::RecommendRefine => "refine",
                RefineOutcome::Proceed => "proceed",
            },
            "capped": capped,
            "refine_iterations": state.refine_iterations,
            "analysis": analysis,
        }));

        // Pausing is only meaningful when a refinement is actually on the
        // table and the operator wants the decision.
        if outcome == RefineOutcome::RecommendRefine && !ctx.config.auto_refine_decision {
            return Ok(StageOutput::pause(
                result,
                StateUpdate::default(),
                PauseKind::RefineDecision,
            ));
        }
        Ok(StageOutput::done(result))
    }
}
