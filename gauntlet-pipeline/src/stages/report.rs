//! Report generation. Always runs, whatever happened upstream: a failed
//! workflow still gets a dashboard explaining which gates failed and why.

use std::fs;

use anyhow::{Context, Result};
use serde_json::json;

use gauntlet_core::{score, stage_names, StageResult, WorkflowState};

use crate::reporting::{
    diagnose_failures, go_live_ready, render_dashboard, render_leaderboard, render_summary,
};
use crate::stage::{Stage, StageContext, StageOutput, StateUpdate};

pub struct GenerateReports;

impl Stage for GenerateReports {
    fn name(&self) -> &'static str {
        stage_names::GENERATE_REPORTS
    }

    // No dependencies: this stage must produce an artifact even when the
    // whole pipeline collapsed at the first gate.

    fn execute(&self, state: &WorkflowState, ctx: &StageContext) -> Result<StageOutput> {
        let workflow_dir = ctx.store.workflow_dir(&state.workflow_id);
        fs::create_dir_all(&workflow_dir)
            .with_context(|| format!("create {}", workflow_dir.display()))?;
        let dashboard_path = workflow_dir.join("dashboard.md");
        fs::write(&dashboard_path, render_dashboard(state))
            .with_context(|| format!("write {}", dashboard_path.display()))?;

        // Cross-workflow boards are best-effort: a broken sibling record
        // must not fail this workflow.
        let reports_dir = ctx.store.reports_dir();
        let mut board_errors = Vec::new();
        let mut leaderboard_path = None;
        let mut summary_path = None;
        match ctx.store.list_states() {
            Ok(mut states) => {
                // The current state snapshot supersedes its last checkpoint.
                states.retain(|s| s.workflow_id != state.workflow_id);
                states.push(state.clone());
                if let Err(err) = fs::create_dir_all(&reports_dir) {
                    board_errors.push(format!("create reports dir: {err}"));
                } else {
                    let lb = reports_dir.join("leaderboard.md");
                    match fs::write(&lb, render_leaderboard(&states)) {
                        Ok(()) => leaderboard_path = Some(lb),
                        Err(err) => board_errors.push(format!("write leaderboard: {err}")),
                    }
                    let sm = reports_dir.join("summary.md");
                    match fs::write(&sm, render_summary(&states)) {
                        Ok(()) => summary_path = Some(sm),
                        Err(err) => board_errors.push(format!("write summary: {err}")),
                    }
                }
            }
            Err(err) => board_errors.push(format!("list workflows: {err}")),
        }

        let go_live = go_live_ready(state);
        let composite = state
            .best_pass
            .as_ref()
            .map(|b| score::rounded(b.composite_score));
        let diagnoses = if go_live {
            Vec::new()
        } else {
            diagnose_failures(&state.gates)
        };

        let mut result = StageResult::ok(self.name()).with_data(json!({
            "dashboard_path": dashboard_path,
            "leaderboard_path": leaderboard_path,
            "summary_path": summary_path,
            "go_live": go_live,
            "composite_score": composite,
            "diagnoses": diagnoses,
        }));
        // Board failures are warnings; the dashboard is the stage's
        // mandatory artifact.
        for error in board_errors {
            result = result.with_error(error);
        }

        let update = StateUpdate {
            metrics: composite
                .map(|c| vec![("composite_score".to_string(), c)])
                .unwrap_or_default(),
            ..Default::default()
        };
        Ok(StageOutput::with_update(result, update))
    }
}
