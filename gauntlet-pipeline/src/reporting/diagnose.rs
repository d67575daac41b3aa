//! Failure diagnosis strings.
//!
//! Every failed gate maps to one advisory sentence combining the observed
//! value, the threshold and a hint derived from the failure context. These
//! end up verbatim in the dashboard of a failed workflow.

use gauntlet_core::{gates, GateResult};

/// One diagnosis line per failed gate, in recorded order.
pub fn diagnose_failures(gate_results: &[GateResult]) -> Vec<String> {
    gate_results
        .iter()
        .filter(|g| !g.passed)
        .map(diagnose_gate)
        .collect()
}

fn diagnose_gate(gate: &GateResult) -> String {
    let observed = gate.value;
    let required = gate.threshold;
    let hint = match gate.name.as_str() {
        gates::FILE_EXISTS => "the EA source path is wrong or the file was moved".to_string(),
        gates::COMPILATION_ERRORS => {
            format!("{observed:.0} compiler errors; the source needs fixing before anything can run")
        }
        gates::PARAMS_FOUND => {
            "no input declarations were found; the strategy may hardcode all its settings"
                .to_string()
        }
        gates::MINIMUM_TRADES => format!(
            "only {observed:.0} trades against {required:.0} required; entry conditions are \
             likely too restrictive or a filter blocks all entries"
        ),
        gates::PASSES_FOUND => {
            "the sweep produced no passes; the search space may be empty or every trial errored"
                .to_string()
        }
        gates::VALID_PASSES => {
            "every pass fell below the trade-count filter; the strategy barely trades in-sample"
                .to_string()
        }
        gates::SUCCESSFUL_PASSES => {
            "no backtested pass met the gates; the optimum does not survive out of the sweep"
                .to_string()
        }
        gates::PROFIT_FACTOR => format!(
            "profit factor observed {observed:.2} vs required {required:.2} — winners and \
             losers similarly sized, consider exit improvements"
        ),
        gates::MAX_DRAWDOWN => format!(
            "max drawdown {observed:.1}% exceeds {required:.1}%; risk per trade is too high \
             for the account size"
        ),
        gates::MC_CONFIDENCE => format!(
            "only {observed:.1}% of shuffled sequences end profitable (need {required:.1}%); \
             results depend heavily on trade ordering"
        ),
        gates::MC_RUIN => format!(
            "{observed:.1}% of shuffled sequences hit the ruin drawdown (ceiling \
             {required:.1}%); reduce position sizing"
        ),
        _ => format!("observed {observed} vs threshold {required}"),
    };
    format!("{}: {hint}", gate.name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_failed_gates_diagnosed() {
        let gate_results = vec![
            gates::profit_factor(1.2, 1.5),
            gates::max_drawdown(18.0, 30.0),
            gates::minimum_trades(11, 50),
        ];
        let diagnoses = diagnose_failures(&gate_results);
        assert_eq!(diagnoses.len(), 2);
        assert!(diagnoses[0].contains("1.20"));
        assert!(diagnoses[0].contains("exit improvements"));
        assert!(diagnoses[1].contains("11 trades"));
    }

    #[test]
    fn all_passing_gates_yield_no_diagnosis() {
        let gate_results = vec![gates::profit_factor(2.0, 1.5)];
        assert!(diagnose_failures(&gate_results).is_empty());
    }
}
