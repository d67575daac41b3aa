//! Terminal configuration file emitter.
//!
//! Line-oriented format with a session section and an inputs section. Input
//! lines read `name=value||start||step||stop||Y` for swept parameters and
//! `name=value||value||0||value||N` for fixed ones. Booleans encode as 0/1
//! in both positions.

use chrono::NaiveDate;

use gauntlet_core::params::{format_number, OptimizationRange, ParamValue, RangeSpec};

use crate::interface::DataModel;

/// Forward-mode code for date-based forward testing.
const FORWARD_MODE_BY_DATE: u8 = 2;
/// Optimization-mode code for the genetic algorithm.
const OPTIMIZATION_GENETIC: u8 = 2;
/// Criterion code selecting the injected custom scoring function.
const CRITERION_CUSTOM: u8 = 6;

/// Chart timeframe to terminal period value (minutes).
pub fn timeframe_minutes(timeframe: &str) -> u32 {
    match timeframe.to_ascii_uppercase().as_str() {
        "M1" => 1,
        "M5" => 5,
        "M15" => 15,
        "M30" => 30,
        "H1" => 60,
        "H4" => 240,
        "D1" => 1440,
        "W1" => 10080,
        "MN1" => 43200,
        _ => 60,
    }
}

/// One line of the inputs section.
#[derive(Debug, Clone, PartialEq)]
pub struct IniInput {
    pub name: String,
    pub value: String,
    pub start: String,
    pub step: String,
    pub stop: String,
    pub optimize: bool,
}

impl IniInput {
    fn render(&self) -> String {
        let flag = if self.optimize { "Y" } else { "N" };
        format!(
            "{}={}||{}||{}||{}||{flag}",
            self.name, self.value, self.start, self.step, self.stop
        )
    }
}

/// Build input lines from sweep directives.
pub fn inputs_from_ranges(ranges: &[OptimizationRange]) -> Vec<IniInput> {
    ranges
        .iter()
        .map(|range| match &range.spec {
            RangeSpec::Fixed { value } => {
                let v = value.ini_value();
                IniInput {
                    name: range.name.clone(),
                    value: v.clone(),
                    start: v.clone(),
                    step: "0".to_string(),
                    stop: v,
                    optimize: false,
                }
            }
            RangeSpec::Sweep { start, step, stop } => IniInput {
                name: range.name.clone(),
                value: format_number(*start),
                start: format_number(*start),
                step: format_number(*step),
                stop: format_number(*stop),
                optimize: true,
            },
        })
        .collect()
}

/// Build fixed input lines from a plain parameter assignment (single runs).
pub fn inputs_from_params<'a, I>(params: I) -> Vec<IniInput>
where
    I: IntoIterator<Item = (&'a String, &'a ParamValue)>,
{
    params
        .into_iter()
        .map(|(name, value)| {
            let v = value.ini_value();
            IniInput {
                name: name.clone(),
                value: v.clone(),
                start: v.clone(),
                step: "0".to_string(),
                stop: v,
                optimize: false,
            }
        })
        .collect()
}

/// A complete tester configuration.
#[derive(Debug, Clone)]
pub struct TesterIni {
    pub expert: String,
    pub symbol: String,
    pub period_minutes: u32,
    pub from_date: NaiveDate,
    pub to_date: NaiveDate,
    /// Present only for sweeps (date-based forward testing).
    pub forward_date: Option<NaiveDate>,
    pub model: DataModel,
    pub latency_ms: u32,
    pub optimization: bool,
    pub report_handle: String,
    pub deposit: f64,
    pub currency: String,
    pub leverage: u32,
    pub inputs: Vec<IniInput>,
}

impl TesterIni {
    pub fn render(&self) -> String {
        let mut lines = vec![
            "[Tester]".to_string(),
            format!("Expert={}", self.expert),
            format!("Symbol={}", self.symbol),
            format!("Period={}", self.period_minutes),
            format!("FromDate={}", fmt_date(self.from_date)),
            format!("ToDate={}", fmt_date(self.to_date)),
        ];
        if let Some(forward) = self.forward_date {
            lines.push(format!("ForwardMode={FORWARD_MODE_BY_DATE}"));
            lines.push(format!("ForwardDate={}", fmt_date(forward)));
        }
        lines.push(format!("Model={}", self.model.ini_code()));
        lines.push(format!("ExecutionMode={}", self.latency_ms));
        if self.optimization {
            lines.push(format!("Optimization={OPTIMIZATION_GENETIC}"));
            lines.push(format!("OptimizationCriterion={CRITERION_CUSTOM}"));
        } else {
            lines.push("Optimization=0".to_string());
        }
        lines.push(format!("Report={}", self.report_handle));
        lines.push("ReplaceReport=1".to_string());
        lines.push("UseLocal=1".to_string());
        lines.push("Visual=0".to_string());
        lines.push("ShutdownTerminal=1".to_string());
        lines.push(format!("Deposit={}", format_number(self.deposit)));
        lines.push(format!("Currency={}", self.currency));
        lines.push(format!("Leverage={}", self.leverage));
        lines.push(String::new());
        lines.push("[TesterInputs]".to_string());
        for input in &self.inputs {
            lines.push(input.render());
        }
        lines.push(String::new());
        lines.join("\n")
    }

    /// Number of inputs that participate in the sweep.
    pub fn optimizing_count(&self) -> usize {
        self.inputs.iter().filter(|i| i.optimize).count()
    }
}

fn fmt_date(date: NaiveDate) -> String {
    date.format("%Y.%m.%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use gauntlet_core::params::OptimizationRange;
    use std::collections::BTreeMap;

    fn base_ini(inputs: Vec<IniInput>, optimization: bool) -> TesterIni {
        TesterIni {
            expert: "trend_ea_instrumented.ex5".to_string(),
            symbol: "EURUSD".to_string(),
            period_minutes: 60,
            from_date: NaiveDate::from_ymd_opt(2021, 6, 1).unwrap(),
            to_date: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            forward_date: Some(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()),
            model: DataModel::Ohlc,
            latency_ms: 10,
            optimization,
            report_handle: "trend_ea_sweep_ab12cd34".to_string(),
            deposit: 3000.0,
            currency: "GBP".to_string(),
            leverage: 100,
            inputs,
        }
    }

    #[test]
    fn session_section_layout() {
        let ini = base_ini(Vec::new(), true);
        let text = ini.render();
        assert!(text.starts_with("[Tester]\n"));
        assert!(text.contains("Expert=trend_ea_instrumented.ex5"));
        assert!(text.contains("Period=60"));
        assert!(text.contains("FromDate=2021.06.01"));
        assert!(text.contains("ForwardMode=2"));
        assert!(text.contains("ForwardDate=2024.06.01"));
        assert!(text.contains("Model=1"));
        assert!(text.contains("Optimization=2"));
        assert!(text.contains("OptimizationCriterion=6"));
        assert!(text.contains("Report=trend_ea_sweep_ab12cd34"));
        assert!(text.contains("ShutdownTerminal=1"));
        assert!(text.contains("[TesterInputs]"));
    }

    #[test]
    fn swept_numeric_line() {
        let inputs = inputs_from_ranges(&[OptimizationRange::sweep("RSI_Period", 10.0, 2.0, 22.0)]);
        assert_eq!(inputs[0].render(), "RSI_Period=10||10||2||22||Y");
    }

    #[test]
    fn swept_boolean_encodes_zero_one() {
        let inputs = inputs_from_ranges(&[OptimizationRange::toggle("Use_Trailing")]);
        assert_eq!(inputs[0].render(), "Use_Trailing=0||0||1||1||Y");
    }

    #[test]
    fn fixed_value_uses_no_optimize_marker() {
        let inputs = inputs_from_ranges(&[OptimizationRange::fixed(
            "Lots",
            ParamValue::Real(0.1),
        )]);
        assert_eq!(inputs[0].render(), "Lots=0.1||0.1||0||0.1||N");
    }

    #[test]
    fn fixed_boolean_encodes_zero_one() {
        let inputs = inputs_from_ranges(&[OptimizationRange::fixed(
            "Use_News_Filter",
            ParamValue::Bool(true),
        )]);
        assert_eq!(inputs[0].render(), "Use_News_Filter=1||1||0||1||N");
    }

    #[test]
    fn single_run_inputs_are_all_fixed() {
        let mut params = BTreeMap::new();
        params.insert("RSI_Period".to_string(), ParamValue::Int(14));
        params.insert("Use_Trailing".to_string(), ParamValue::Bool(false));
        let inputs = inputs_from_params(&params);
        assert!(inputs.iter().all(|i| !i.optimize));
        assert_eq!(inputs.len(), 2);
    }

    #[test]
    fn optimizing_count_ignores_fixed() {
        let ini = base_ini(
            inputs_from_ranges(&[
                OptimizationRange::sweep("A", 1.0, 1.0, 5.0),
                OptimizationRange::fixed("B", ParamValue::Int(3)),
                OptimizationRange::toggle("C"),
            ]),
            true,
        );
        assert_eq!(ini.optimizing_count(), 2);
    }

    #[test]
    fn single_run_disables_optimization() {
        let ini = base_ini(Vec::new(), false);
        assert!(ini.render().contains("Optimization=0"));
    }
}
