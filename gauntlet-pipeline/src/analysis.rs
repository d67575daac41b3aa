//! Refinement analysis of sweep results.
//!
//! After a sweep, every swept parameter is examined over the top-N passes:
//! boolean toggles for value dominance, numeric parameters for clustering.
//! A dominant toggle gets pinned; a tight cluster narrows its range for a
//! second, finer sweep. Bounded by the orchestrator's refinement budget.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use gauntlet_core::{OptimizationRange, ParamValue, PassRow, RangeSpec};

/// Recommendation for one parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    FixTrue,
    FixFalse,
    Narrow,
    Widen,
    Keep,
}

impl Recommendation {
    pub fn is_keep(self) -> bool {
        matches!(self, Recommendation::Keep)
    }
}

/// Value-dominance analysis of a boolean toggle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToggleAnalysis {
    pub name: String,
    pub top_true_count: usize,
    pub top_false_count: usize,
    /// Share of `true` among the top-N passes, 0-1.
    pub top_true_share: f64,
    pub all_true_count: usize,
    pub all_false_count: usize,
    pub recommendation: Recommendation,
}

/// Clustering analysis of a numeric parameter over the top-N passes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterAnalysis {
    pub name: String,
    pub top_mean: f64,
    pub top_min: f64,
    pub top_max: f64,
    pub std_dev: f64,
    /// stddev / |mean|; 0 when the mean is zero.
    pub coefficient_of_variation: f64,
    /// Distinct values the sweep actually exercised, across all passes.
    pub distinct_values: usize,
    pub recommendation: Recommendation,
    /// Replacement range when the recommendation is not `Keep`.
    pub suggested: Option<OptimizationRange>,
}

/// Aggregate outcome of the analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefineAnalysis {
    pub total_passes: usize,
    pub top_n: usize,
    pub toggles: BTreeMap<String, ToggleAnalysis>,
    pub numerics: BTreeMap<String, ClusterAnalysis>,
    /// True iff any parameter has a non-Keep recommendation.
    pub should_refine: bool,
    /// Current ranges with every recommendation applied.
    pub refined_ranges: Vec<OptimizationRange>,
}

/// Thresholds controlling the recommendations.
#[derive(Debug, Clone, Copy)]
pub struct AnalysisThresholds {
    /// Minimum share of one toggle value among top passes to pin it.
    pub toggle_dominance: f64,
    /// Maximum coefficient of variation considered "clustered".
    pub clustering_cv: f64,
}

fn is_toggle_range(range: &OptimizationRange) -> bool {
    matches!(
        range.spec,
        RangeSpec::Sweep { start, step, stop } if start == 0.0 && stop == 1.0 && step == 1.0
    )
}

fn param_value(pass: &PassRow, name: &str) -> Option<f64> {
    pass.params.get(name).and_then(ParamValue::as_f64)
}

/// Analyze sorted passes (best first) against the current ranges.
pub fn analyze(
    passes: &[PassRow],
    ranges: &[OptimizationRange],
    top_n: usize,
    thresholds: AnalysisThresholds,
) -> RefineAnalysis {
    let top = &passes[..top_n.min(passes.len())];

    let mut toggles = BTreeMap::new();
    let mut numerics = BTreeMap::new();
    let mut refined_ranges = Vec::with_capacity(ranges.len());

    for range in ranges {
        if !range.optimize() {
            refined_ranges.push(range.clone());
            continue;
        }
        if is_toggle_range(range) {
            let result = analyze_toggle(&range.name, passes, top, thresholds.toggle_dominance);
            refined_ranges.push(match result.recommendation {
                Recommendation::FixTrue => {
                    OptimizationRange::fixed(&range.name, ParamValue::Bool(true))
                }
                Recommendation::FixFalse => {
                    OptimizationRange::fixed(&range.name, ParamValue::Bool(false))
                }
                _ => range.clone(),
            });
            toggles.insert(range.name.clone(), result);
        } else {
            let result = analyze_numeric(range, passes, top, thresholds.clustering_cv);
            refined_ranges.push(result.suggested.clone().unwrap_or_else(|| range.clone()));
            numerics.insert(range.name.clone(), result);
        }
    }

    let should_refine = toggles.values().any(|t| !t.recommendation.is_keep())
        || numerics.values().any(|n| !n.recommendation.is_keep());

    RefineAnalysis {
        total_passes: passes.len(),
        top_n: top.len(),
        toggles,
        numerics,
        should_refine,
        refined_ranges,
    }
}

fn analyze_toggle(
    name: &str,
    all: &[PassRow],
    top: &[PassRow],
    dominance: f64,
) -> ToggleAnalysis {
    let count = |rows: &[PassRow], truthy: bool| {
        rows.iter()
            .filter_map(|p| p.params.get(name))
            .filter(|v| v.is_truthy() == truthy)
            .count()
    };
    let top_true = count(top, true);
    let top_false = count(top, false);
    let total_top = top_true + top_false;
    let top_true_share = if total_top > 0 {
        top_true as f64 / total_top as f64
    } else {
        0.0
    };

    let recommendation = if total_top == 0 {
        Recommendation::Keep
    } else if top_true_share >= dominance {
        Recommendation::FixTrue
    } else if 1.0 - top_true_share >= dominance {
        Recommendation::FixFalse
    } else {
        Recommendation::Keep
    };

    ToggleAnalysis {
        name: name.to_string(),
        top_true_count: top_true,
        top_false_count: top_false,
        top_true_share,
        all_true_count: count(all, true),
        all_false_count: count(all, false),
        recommendation,
    }
}

fn analyze_numeric(
    range: &OptimizationRange,
    all: &[PassRow],
    top: &[PassRow],
    cv_threshold: f64,
) -> ClusterAnalysis {
    let name = &range.name;
    let top_values: Vec<f64> = top.iter().filter_map(|p| param_value(p, name)).collect();
    let distinct: BTreeSet<String> = all
        .iter()
        .filter_map(|p| param_value(p, name))
        .map(|v| format!("{v:.9}"))
        .collect();

    let RangeSpec::Sweep { start, step, stop } = range.spec else {
        // Fixed ranges are filtered out before we get here.
        return ClusterAnalysis {
            name: name.clone(),
            top_mean: 0.0,
            top_min: 0.0,
            top_max: 0.0,
            std_dev: 0.0,
            coefficient_of_variation: 0.0,
            distinct_values: distinct.len(),
            recommendation: Recommendation::Keep,
            suggested: None,
        };
    };

    if top_values.is_empty() {
        return ClusterAnalysis {
            name: name.clone(),
            top_mean: 0.0,
            top_min: 0.0,
            top_max: 0.0,
            std_dev: 0.0,
            coefficient_of_variation: 0.0,
            distinct_values: distinct.len(),
            recommendation: Recommendation::Keep,
            suggested: None,
        };
    }

    let n = top_values.len() as f64;
    let mean = top_values.iter().sum::<f64>() / n;
    let variance = top_values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let std_dev = variance.sqrt();
    let cv = if mean.abs() > f64::EPSILON {
        std_dev / mean.abs()
    } else {
        0.0
    };
    let top_min = top_values.iter().cloned().fold(f64::INFINITY, f64::min);
    let top_max = top_values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

    let (recommendation, suggested) = if distinct.len() <= 2 {
        // The sweep barely explored this parameter; halve the step so the
        // next round actually exercises the span.
        let finer = (step / 2.0).max((stop - start) / 100.0).max(f64::MIN_POSITIVE);
        (
            Recommendation::Widen,
            Some(OptimizationRange::sweep(name, start, finer, stop)),
        )
    } else if cv < cv_threshold {
        let finer = (step / 2.0).max((top_max - top_min) / 20.0);
        let (lo, hi) = if top_min < top_max {
            (top_min, top_max)
        } else {
            ((top_min - step).max(start), (top_max + step).min(stop))
        };
        let suggestion = OptimizationRange::sweep(name, lo, finer.max(f64::MIN_POSITIVE), hi);
        if suggestion.validate().is_empty() {
            (Recommendation::Narrow, Some(suggestion))
        } else {
            (Recommendation::Keep, None)
        }
    } else {
        (Recommendation::Keep, None)
    };

    ClusterAnalysis {
        name: name.clone(),
        top_mean: mean,
        top_min,
        top_max,
        std_dev,
        coefficient_of_variation: cv,
        distinct_values: distinct.len(),
        recommendation,
        suggested,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const THRESHOLDS: AnalysisThresholds = AnalysisThresholds {
        toggle_dominance: 0.70,
        clustering_cv: 0.20,
    };

    fn pass(index: u32, params: &[(&str, f64)]) -> PassRow {
        PassRow {
            pass_index: index,
            combined: 100.0 - index as f64,
            back_result: 100.0,
            forward_result: 50.0,
            profit: 500.0,
            profit_factor: 1.6,
            max_drawdown_pct: 15.0,
            total_trades: 100,
            win_rate: 55.0,
            sharpe: 1.2,
            params: params
                .iter()
                .map(|(k, v)| {
                    let value = if v.fract() == 0.0 {
                        ParamValue::Int(*v as i64)
                    } else {
                        ParamValue::Real(*v)
                    };
                    (k.to_string(), value)
                })
                .collect(),
        }
    }

    #[test]
    fn dominant_false_toggle_gets_pinned() {
        // 4 of 5 top passes run with the filter off.
        let passes: Vec<PassRow> = [0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 0.0, 1.0, 1.0]
            .iter()
            .enumerate()
            .map(|(i, v)| pass(i as u32, &[("Enable_Filter", *v)]))
            .collect();
        let ranges = vec![OptimizationRange::toggle("Enable_Filter")];
        let analysis = analyze(&passes, &ranges, 5, THRESHOLDS);

        let toggle = &analysis.toggles["Enable_Filter"];
        assert_eq!(toggle.top_false_count, 4);
        assert_eq!(toggle.recommendation, Recommendation::FixFalse);
        assert!(analysis.should_refine);
        assert_eq!(
            analysis.refined_ranges[0],
            OptimizationRange::fixed("Enable_Filter", ParamValue::Bool(false))
        );
    }

    #[test]
    fn dominant_true_toggle_gets_pinned() {
        let passes: Vec<PassRow> = [1.0, 1.0, 1.0, 1.0, 0.0]
            .iter()
            .enumerate()
            .map(|(i, v)| pass(i as u32, &[("Use_Feature", *v)]))
            .collect();
        let ranges = vec![OptimizationRange::toggle("Use_Feature")];
        let analysis = analyze(&passes, &ranges, 5, THRESHOLDS);
        assert_eq!(
            analysis.toggles["Use_Feature"].recommendation,
            Recommendation::FixTrue
        );
    }

    #[test]
    fn balanced_toggle_keeps_optimizing() {
        // 60/40 split is below the 70% dominance bar.
        let passes: Vec<PassRow> = [1.0, 0.0, 1.0, 0.0, 1.0]
            .iter()
            .enumerate()
            .map(|(i, v)| pass(i as u32, &[("Enable_X", *v)]))
            .collect();
        let ranges = vec![OptimizationRange::toggle("Enable_X")];
        let analysis = analyze(&passes, &ranges, 5, THRESHOLDS);
        assert_eq!(
            analysis.toggles["Enable_X"].recommendation,
            Recommendation::Keep
        );
        assert!(!analysis.should_refine);
    }

    #[test]
    fn clustered_numeric_narrows() {
        let top_vals = [14.0, 14.0, 16.0, 14.0, 12.0];
        let tail_vals = [10.0, 20.0, 22.0];
        let passes: Vec<PassRow> = top_vals
            .iter()
            .chain(tail_vals.iter())
            .enumerate()
            .map(|(i, v)| pass(i as u32, &[("RSI_Period", *v)]))
            .collect();
        let ranges = vec![OptimizationRange::sweep("RSI_Period", 10.0, 2.0, 22.0)];
        let analysis = analyze(&passes, &ranges, 5, THRESHOLDS);

        let cluster = &analysis.numerics["RSI_Period"];
        assert!(cluster.coefficient_of_variation < 0.2);
        assert_eq!(cluster.recommendation, Recommendation::Narrow);

        let suggested = cluster.suggested.as_ref().unwrap();
        if let RangeSpec::Sweep { start, step, stop } = suggested.spec {
            assert_eq!(start, 12.0);
            assert_eq!(stop, 16.0);
            assert!(step <= 2.0);
        } else {
            panic!("expected a sweep suggestion");
        }
        assert!(suggested.validate().is_empty());
    }

    #[test]
    fn spread_numeric_keeps_range() {
        let vals = [50.0, 100.0, 150.0, 200.0, 250.0];
        let passes: Vec<PassRow> = vals
            .iter()
            .enumerate()
            .map(|(i, v)| pass(i as u32, &[("StopLoss", *v)]))
            .collect();
        let ranges = vec![OptimizationRange::sweep("StopLoss", 50.0, 50.0, 250.0)];
        let analysis = analyze(&passes, &ranges, 5, THRESHOLDS);
        let cluster = &analysis.numerics["StopLoss"];
        assert!(cluster.coefficient_of_variation > 0.3);
        assert_eq!(cluster.recommendation, Recommendation::Keep);
        assert!(cluster.suggested.is_none());
    }

    #[test]
    fn barely_exercised_numeric_widens() {
        // Every pass used one of two values even though the range allows ten.
        let passes: Vec<PassRow> = [100.0, 100.0, 200.0, 100.0, 200.0, 100.0]
            .iter()
            .enumerate()
            .map(|(i, v)| pass(i as u32, &[("TakeProfit", *v)]))
            .collect();
        let ranges = vec![OptimizationRange::sweep("TakeProfit", 100.0, 100.0, 1000.0)];
        let analysis = analyze(&passes, &ranges, 5, THRESHOLDS);
        let cluster = &analysis.numerics["TakeProfit"];
        assert_eq!(cluster.distinct_values, 2);
        assert_eq!(cluster.recommendation, Recommendation::Widen);
        let suggested = cluster.suggested.as_ref().unwrap();
        if let RangeSpec::Sweep { step, .. } = suggested.spec {
            assert!(step < 100.0);
        }
    }

    #[test]
    fn fixed_ranges_pass_through_untouched() {
        let passes: Vec<PassRow> = (0..5).map(|i| pass(i, &[("Lots", 0.1)])).collect();
        let ranges = vec![OptimizationRange::fixed("Lots", ParamValue::Real(0.1))];
        let analysis = analyze(&passes, &ranges, 5, THRESHOLDS);
        assert!(analysis.toggles.is_empty());
        assert!(analysis.numerics.is_empty());
        assert_eq!(analysis.refined_ranges, ranges);
        assert!(!analysis.should_refine);
    }

    #[test]
    fn mixed_parameters_analyzed_together() {
        let passes: Vec<PassRow> = (0..8)
            .map(|i| {
                let toggle = if i < 5 { 0.0 } else { 1.0 };
                let rsi = if i < 5 { 14.0 } else { 10.0 + i as f64 * 2.0 };
                pass(i, &[("Enable_MA_Filter", toggle), ("RSI_Period", rsi), ("StopLoss", 50.0 + i as f64 * 25.0)])
            })
            .collect();
        let ranges = vec![
            OptimizationRange::toggle("Enable_MA_Filter"),
            OptimizationRange::sweep("RSI_Period", 10.0, 2.0, 22.0),
            OptimizationRange::sweep("StopLoss", 50.0, 10.0, 250.0),
        ];
        let analysis = analyze(&passes, &ranges, 5, THRESHOLDS);
        assert_eq!(
            analysis.toggles["Enable_MA_Filter"].recommendation,
            Recommendation::FixFalse
        );
        assert_eq!(
            analysis.numerics["RSI_Period"].recommendation,
            Recommendation::Narrow
        );
        assert!(analysis.should_refine);
    }
}
