//! Strategy input parameters and optimization ranges.
//!
//! Parameters are extracted from EA source once and never mutated afterwards.
//! Ranges are supplied externally (by the analyst agent) and validated here
//! before anything is handed to the terminal.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Base kind of an EA input parameter, normalized from the declared type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    Integer,
    Real,
    Boolean,
    Enumeration,
    Text,
    Timestamp,
    Color,
}

impl ParamKind {
    /// Kinds that can participate in a sweep. Booleans sweep over both values.
    pub fn is_sweepable(self) -> bool {
        matches!(self, ParamKind::Integer | ParamKind::Real | ParamKind::Boolean)
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, ParamKind::Integer | ParamKind::Real)
    }
}

/// A single scalar parameter value.
///
/// The tag is fixed at extraction time by the declared type; the INI emitter
/// dispatches on it. Enumerations are carried as their integer ordinal,
/// timestamps and colors as text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Real(f64),
    Text(String),
}

impl ParamValue {
    /// Numeric view, used by range validation and pass analysis.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Int(v) => Some(*v as f64),
            ParamValue::Real(v) => Some(*v),
            ParamValue::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
            ParamValue::Text(_) => None,
        }
    }

    /// Truthiness for toggle analysis: accepts bools, 0/1 numerics and
    /// "true"/"false" strings.
    pub fn is_truthy(&self) -> bool {
        match self {
            ParamValue::Bool(v) => *v,
            ParamValue::Int(v) => *v != 0,
            ParamValue::Real(v) => *v != 0.0,
            ParamValue::Text(s) => matches!(s.to_ascii_lowercase().as_str(), "true" | "yes" | "1"),
        }
    }

    /// Rendering for the terminal configuration file. Booleans encode as 0/1.
    pub fn ini_value(&self) -> String {
        match self {
            ParamValue::Bool(v) => if *v { "1" } else { "0" }.to_string(),
            ParamValue::Int(v) => v.to_string(),
            ParamValue::Real(v) => format_number(*v),
            ParamValue::Text(s) => s.clone(),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(v) => write!(f, "{v}"),
            ParamValue::Int(v) => write!(f, "{v}"),
            ParamValue::Real(v) => write!(f, "{}", format_number(*v)),
            ParamValue::Text(s) => write!(f, "{s}"),
        }
    }
}

/// Format a float without trailing zero noise (`20` not `20.000000`).
pub fn format_number(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        let s = format!("{v:.6}");
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

/// An input parameter extracted from EA source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    /// Type as written in the source (e.g. `double`, `ENUM_TIMEFRAMES`).
    pub declared_type: String,
    pub kind: ParamKind,
    #[serde(default)]
    pub default: Option<ParamValue>,
    #[serde(default)]
    pub comment: Option<String>,
    /// 1-indexed source line of the declaration.
    #[serde(default)]
    pub line: u32,
    /// False for identifiers, debug toggles, injected safety parameters and
    /// non-sweepable kinds.
    #[serde(default)]
    pub optimizable: bool,
}

/// How a parameter participates in the sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RangeSpec {
    /// Held at a single value with the no-optimize marker.
    Fixed { value: ParamValue },
    /// Swept over `start..=stop` in increments of `step`.
    Sweep { start: f64, step: f64, stop: f64 },
}

/// Per-parameter sweep directive, as supplied at the parameter pause point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationRange {
    pub name: String,
    #[serde(flatten)]
    pub spec: RangeSpec,
}

impl OptimizationRange {
    pub fn fixed(name: impl Into<String>, value: ParamValue) -> Self {
        Self { name: name.into(), spec: RangeSpec::Fixed { value } }
    }

    pub fn sweep(name: impl Into<String>, start: f64, step: f64, stop: f64) -> Self {
        Self { name: name.into(), spec: RangeSpec::Sweep { start, step, stop } }
    }

    /// Boolean sweep over both values.
    pub fn toggle(name: impl Into<String>) -> Self {
        Self::sweep(name, 0.0, 1.0, 1.0)
    }

    pub fn optimize(&self) -> bool {
        matches!(self.spec, RangeSpec::Sweep { .. })
    }

    /// Number of values a sweep visits (1 for fixed ranges).
    pub fn step_count(&self) -> u64 {
        match self.spec {
            RangeSpec::Fixed { .. } => 1,
            RangeSpec::Sweep { start, step, stop } => {
                if step <= 0.0 || stop < start {
                    0
                } else {
                    ((stop - start) / step).floor() as u64 + 1
                }
            }
        }
    }

    /// Validate the range, returning human-readable problems.
    ///
    /// A swept range must satisfy `start <= stop`, `step > 0` and visit at
    /// least two values.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.name.trim().is_empty() {
            errors.push("range name must be non-empty".to_string());
        }
        if let RangeSpec::Sweep { start, step, stop } = self.spec {
            if !start.is_finite() || !step.is_finite() || !stop.is_finite() {
                errors.push(format!("{}: range values must be finite", self.name));
                return errors;
            }
            if start > stop {
                errors.push(format!(
                    "{}: start ({}) must be <= stop ({})",
                    self.name,
                    format_number(start),
                    format_number(stop)
                ));
            }
            if step <= 0.0 {
                errors.push(format!(
                    "{}: step ({}) must be > 0 when optimizing",
                    self.name,
                    format_number(step)
                ));
            }
            if start <= stop && step > 0.0 && self.step_count() < 2 {
                errors.push(format!(
                    "{}: sweep must cover at least two values",
                    self.name
                ));
            }
        }
        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sweep_step_count() {
        let r = OptimizationRange::sweep("RSI_Period", 10.0, 2.0, 22.0);
        assert_eq!(r.step_count(), 7);
        assert!(r.validate().is_empty());
    }

    #[test]
    fn toggle_covers_both_values() {
        let r = OptimizationRange::toggle("Use_Filter");
        assert_eq!(r.step_count(), 2);
        assert!(r.validate().is_empty());
    }

    #[test]
    fn fixed_range_is_not_optimized() {
        let r = OptimizationRange::fixed("Lots", ParamValue::Real(0.1));
        assert!(!r.optimize());
        assert_eq!(r.step_count(), 1);
        assert!(r.validate().is_empty());
    }

    #[test]
    fn inverted_bounds_rejected() {
        let r = OptimizationRange::sweep("StopLoss", 200.0, 10.0, 50.0);
        let errors = r.validate();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("start"));
    }

    #[test]
    fn zero_step_rejected() {
        let r = OptimizationRange::sweep("StopLoss", 50.0, 0.0, 200.0);
        assert!(!r.validate().is_empty());
    }

    #[test]
    fn degenerate_sweep_rejected() {
        // start == stop with a step visits one value only
        let r = OptimizationRange::sweep("TakeProfit", 100.0, 10.0, 100.0);
        let errors = r.validate();
        assert!(errors.iter().any(|e| e.contains("two values")));
    }

    #[test]
    fn param_value_ini_encoding() {
        assert_eq!(ParamValue::Bool(true).ini_value(), "1");
        assert_eq!(ParamValue::Bool(false).ini_value(), "0");
        assert_eq!(ParamValue::Int(14).ini_value(), "14");
        assert_eq!(ParamValue::Real(0.1).ini_value(), "0.1");
        assert_eq!(ParamValue::Real(20.0).ini_value(), "20");
    }

    #[test]
    fn param_value_truthiness() {
        assert!(ParamValue::Bool(true).is_truthy());
        assert!(ParamValue::Int(1).is_truthy());
        assert!(!ParamValue::Int(0).is_truthy());
        assert!(ParamValue::Text("TRUE".into()).is_truthy());
        assert!(!ParamValue::Text("false".into()).is_truthy());
    }

    #[test]
    fn range_serde_round_trip() {
        let ranges = vec![
            OptimizationRange::sweep("RSI_Period", 10.0, 2.0, 22.0),
            OptimizationRange::fixed("Lots", ParamValue::Real(0.1)),
            OptimizationRange::toggle("Use_Trailing"),
        ];
        let json = serde_json::to_string(&ranges).unwrap();
        let back: Vec<OptimizationRange> = serde_json::from_str(&json).unwrap();
        assert_eq!(ranges, back);
    }
}
