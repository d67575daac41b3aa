//! Recording and validation of the analyst-supplied parameter payload.
//!
//! This is the first pause point: without a payload the workflow parks in
//! `awaiting_params`. With one, the stage validates it against the
//! extracted parameters, pins the injected safety parameters, and applies
//! the toggle carry-over rule before anything reaches the terminal.

use std::collections::BTreeMap;

use anyhow::Result;
use serde_json::json;

use gauntlet_core::{
    stage_names, BacktestPeriod, GateOp, GateResult, OptimizationRange, ParamKind, ParamValue,
    StageResult, WorkflowState,
};

use crate::source::inject::{SAFETY_SLIPPAGE_PARAM, SAFETY_SPREAD_PARAM};
use crate::stage::{
    AnalystParams, PauseKind, Stage, StageContext, StageOutput, StateUpdate,
};

pub struct RecordRanges;

impl Stage for RecordRanges {
    fn name(&self) -> &'static str {
        stage_names::RECORD_RANGES
    }

    fn dependencies(&self) -> &'static [&'static str] {
        &[stage_names::EXTRACT_PARAMS]
    }

    fn execute(&self, state: &WorkflowState, ctx: &StageContext) -> Result<StageOutput> {
        let Some(payload) = ctx.session.analyst_params.as_ref() else {
            // Nothing supplied yet: park for the analyst.
            let result = StageResult::ok(self.name())
                .with_data(json!({ "awaiting": "parameter analysis" }));
            return Ok(StageOutput::pause(result, StateUpdate::default(), PauseKind::Params));
        };

        let errors = validate_payload(state, payload);
        if !errors.is_empty() {
            let mut result = StageResult::fail(self.name(), "analyst payload rejected")
                .with_gate(ranges_gate(errors.len()));
            for error in &errors {
                result = result.with_error(error.clone());
            }
            return Ok(StageOutput::done(result));
        }

        let (wide, ranges) = apply_safety_and_carry_over(state, payload, ctx);
        let sweeping = ranges.iter().filter(|r| r.optimize()).count();
        let period = BacktestPeriod::ending_at(
            ctx.today,
            ctx.config.backtest_years,
            ctx.config.forward_years,
        );

        let result = StageResult::ok(self.name())
            .with_gate(ranges_gate(0))
            .with_data(json!({
                "wide_param_count": wide.len(),
                "range_count": ranges.len(),
                "sweeping_count": sweeping,
            }));
        let update = StateUpdate {
            wide_validation_params: Some(wide),
            optimization_ranges: Some(ranges),
            period: Some(period),
            ..Default::default()
        };
        Ok(StageOutput::with_update(result, update))
    }
}

fn ranges_gate(error_count: usize) -> GateResult {
    GateResult::check("ranges_valid", error_count as f64, 0.0, GateOp::Eq)
}

fn validate_payload(state: &WorkflowState, payload: &AnalystParams) -> Vec<String> {
    let mut errors = Vec::new();
    if payload.wide_validation_params.is_empty() {
        errors.push("wide_validation_params is empty".to_string());
    }
    if payload.optimization_ranges.is_empty() {
        errors.push("optimization_ranges is empty".to_string());
    }

    let known: BTreeMap<&str, ParamKind> = state
        .extracted_params
        .iter()
        .map(|p| (p.name.as_str(), p.kind))
        .collect();

    for name in payload.wide_validation_params.keys() {
        if !known.contains_key(name.as_str()) {
            errors.push(format!("unknown parameter in wide_validation_params: {name}"));
        }
    }
    for range in &payload.optimization_ranges {
        if !known.contains_key(range.name.as_str()) {
            errors.push(format!("unknown parameter in optimization_ranges: {}", range.name));
        }
        errors.extend(range.validate());
    }
    errors
}

/// Pin the injected safety parameters and carry over boolean toggles the
/// analyst set for validation but omitted from the ranges. A toggle that
/// disabled a blocking filter during validation must stay disabled in the
/// sweep, or every pass silently trades zero times.
fn apply_safety_and_carry_over(
    state: &WorkflowState,
    payload: &AnalystParams,
    ctx: &StageContext,
) -> (BTreeMap<String, ParamValue>, Vec<OptimizationRange>) {
    let mut wide = payload.wide_validation_params.clone();
    wide.insert(
        SAFETY_SPREAD_PARAM.to_string(),
        ParamValue::Real(ctx.config.safety_validation_spread_pips),
    );
    wide.insert(
        SAFETY_SLIPPAGE_PARAM.to_string(),
        ParamValue::Real(ctx.config.safety_validation_slippage_pips),
    );

    let safety_defaults = [
        (SAFETY_SPREAD_PARAM, ctx.config.safety_default_spread_pips),
        (SAFETY_SLIPPAGE_PARAM, ctx.config.safety_default_slippage_pips),
    ];

    let mut ranges: Vec<OptimizationRange> = payload
        .optimization_ranges
        .iter()
        .map(|range| {
            match safety_defaults.iter().find(|(name, _)| *name == range.name) {
                // Safety parameters are never swept, whatever the analyst said.
                Some((name, value)) => OptimizationRange::fixed(*name, ParamValue::Real(*value)),
                None => range.clone(),
            }
        })
        .collect();
    for (name, value) in safety_defaults {
        if !ranges.iter().any(|r| r.name == name) {
            ranges.push(OptimizationRange::fixed(name, ParamValue::Real(value)));
        }
    }

    let boolean_params: Vec<&str> = state
        .extracted_params
        .iter()
        .filter(|p| p.kind == ParamKind::Boolean)
        .map(|p| p.name.as_str())
        .collect();
    for (name, value) in &payload.wide_validation_params {
        let covered = ranges.iter().any(|r| &r.name == name);
        let is_toggle = boolean_params.contains(&name.as_str())
            || matches!(value, ParamValue::Bool(_));
        if !covered && is_toggle {
            ranges.push(OptimizationRange::fixed(
                name.clone(),
                ParamValue::Bool(value.is_truthy()),
            ));
        }
    }

    (wide, ranges)
}
