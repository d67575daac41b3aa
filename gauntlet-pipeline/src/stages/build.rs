//! Compilation and parameter extraction.

use std::fs;

use anyhow::{Context, Result};
use serde_json::json;

use gauntlet_core::{gates, stage_names, StageResult, WorkflowState};

use crate::source::extract::extract_params;
use crate::stage::{Stage, StageContext, StageOutput, StateUpdate};

/// Compile the instrumented source through the terminal toolchain.
pub struct Compile;

impl Stage for Compile {
    fn name(&self) -> &'static str {
        stage_names::COMPILE
    }

    fn dependencies(&self) -> &'static [&'static str] {
        &[stage_names::INJECT_SAFETY]
    }

    fn execute(&self, state: &WorkflowState, ctx: &StageContext) -> Result<StageOutput> {
        let source = state
            .modified_ea_path
            .as_deref()
            .unwrap_or(&state.ea_source_path);
        let outcome = ctx.runner.compile(source)?;

        let mut result = StageResult::ok(self.name())
            .with_gate(gates::compilation_errors(outcome.errors.len()))
            .with_data(json!({
                "source_path": source,
                "compiled_path": outcome.compiled_path,
                "errors": outcome.errors,
                "warnings": outcome.warnings,
            }));
        if !outcome.success && outcome.errors.is_empty() {
            result = result.with_error("compiler failed without a parseable error list");
            result.success = false;
        }
        for error in &outcome.errors {
            result = result.with_error(error.clone());
        }

        let update = StateUpdate {
            compiled_ea_path: outcome.compiled_path,
            ..Default::default()
        };
        Ok(StageOutput::with_update(result, update))
    }
}

/// Extract input parameters from the instrumented source.
pub struct ExtractParams;

impl Stage for ExtractParams {
    fn name(&self) -> &'static str {
        stage_names::EXTRACT_PARAMS
    }

    fn dependencies(&self) -> &'static [&'static str] {
        &[stage_names::COMPILE]
    }

    fn execute(&self, state: &WorkflowState, _ctx: &StageContext) -> Result<StageOutput> {
        let source_path = state
            .modified_ea_path
            .as_deref()
            .unwrap_or(&state.ea_source_path);
        let source = fs::read_to_string(source_path)
            .with_context(|| format!("read {}", source_path.display()))?;
        let params = extract_params(&source);
        let optimizable = params.iter().filter(|p| p.optimizable).count();

        let mut result = StageResult::ok(self.name())
            .with_gate(gates::params_found(params.len()))
            .with_data(json!({
                "count": params.len(),
                "optimizable": optimizable,
                "source_path": source_path,
            }));
        if params.is_empty() {
            result = result.with_error("no input parameters found in EA source");
        }

        let update = StateUpdate {
            extracted_params: Some(params),
            ..Default::default()
        };
        Ok(StageOutput::with_update(result, update))
    }
}
