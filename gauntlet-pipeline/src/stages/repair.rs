//! Source repair housekeeping at the fix pause point.
//!
//! The diagnosing agent does the actual fixing; this stage only backs up
//! the pristine source (once per workflow), installs the supplied patch and
//! hands control back so the pipeline restarts from the top with its fix
//! budget preserved.

use std::fs;

use anyhow::{Context, Result};
use serde_json::json;

use gauntlet_core::{stage_names, StageResult, WorkflowState};

use crate::stage::{Stage, StageContext, StageOutput, StateUpdate};

pub struct RepairSource;

impl Stage for RepairSource {
    fn name(&self) -> &'static str {
        stage_names::REPAIR_SOURCE
    }

    fn execute(&self, state: &WorkflowState, ctx: &StageContext) -> Result<StageOutput> {
        let Some(patched) = ctx.session.patched_source.as_ref() else {
            return Ok(StageOutput::done(StageResult::fail(
                self.name(),
                "no patched source supplied",
            )));
        };

        let mut update = StateUpdate::default();
        if state.original_backup_path.is_none() {
            let ext = state
                .ea_source_path
                .extension()
                .map(|e| e.to_string_lossy().into_owned())
                .unwrap_or_else(|| "mq5".to_string());
            let dir = ctx.store.workflow_dir(&state.workflow_id);
            fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
            let backup = dir.join(format!("original_backup.{ext}"));
            fs::copy(&state.ea_source_path, &backup).with_context(|| {
                format!(
                    "back up {} to {}",
                    state.ea_source_path.display(),
                    backup.display()
                )
            })?;
            update.original_backup_path = Some(backup);
        }

        fs::write(&state.ea_source_path, patched)
            .with_context(|| format!("install patch at {}", state.ea_source_path.display()))?;

        let result = StageResult::ok(self.name()).with_data(json!({
            "patched_bytes": patched.len(),
            "fix_attempts": state.fix_attempts,
        }));
        Ok(StageOutput::with_update(result, update))
    }
}
