//! Source instrumentation.
//!
//! Two injections, both idempotent via marker comments:
//!
//! 1. A custom scoring function appended to the source, giving the sweep a
//!    criterion that rewards smooth, sufficiently-active, profitable
//!    behavior instead of raw profit.
//! 2. Safety guards: spread/slippage limit inputs, an order-dispatch
//!    intercept enforcing them, and macro redefinitions that disable file,
//!    web and DLL side effects during testing.

/// Injected input controlling the maximum tolerated spread.
pub const SAFETY_SPREAD_PARAM: &str = "SafetyMaxSpreadPips";
/// Injected input controlling the maximum tolerated slippage.
pub const SAFETY_SLIPPAGE_PARAM: &str = "SafetyMaxSlippagePips";

const CRITERION_MARKER: &str = "=== stress-test scoring function ===";
const SAFETY_MARKER: &str = "=== stress-test safety guards ===";

/// Does the source already carry a tester scoring function?
pub fn has_criterion(source: &str) -> bool {
    source.contains(CRITERION_MARKER)
        || source
            .lines()
            .any(|l| l.trim_start().starts_with("double OnTester"))
}

pub fn has_safety_guards(source: &str) -> bool {
    source.contains(SAFETY_MARKER)
}

/// Append the scoring function. Returns `(source, injected)`;
/// re-application is a no-op.
///
/// The criterion is
/// `profit × R² × √(trades/100) × drawdown-factor × pf-bonus`, with a
/// sentinel negative value below the exploration minimum or at
/// non-positive profit, so the genetic search never favors degenerate
/// no-trade corners.
pub fn inject_criterion(source: &str, exploration_min_trades: u32) -> (String, bool) {
    if has_criterion(source) {
        return (source.to_string(), false);
    }
    let block = format!(
        r#"
//+------------------------------------------------------------------+
//| {CRITERION_MARKER}
//+------------------------------------------------------------------+
double OnTester()
{{
    double profit   = TesterStatistics(STAT_PROFIT);
    double trades   = TesterStatistics(STAT_TRADES);
    double pf       = TesterStatistics(STAT_PROFIT_FACTOR);
    double dd_pct   = TesterStatistics(STAT_EQUITY_DDREL_PERCENT);
    double lr_corr  = TesterStatistics(STAT_LR_CORRELATION);

    if(trades < {exploration_min_trades} || profit <= 0.0)
        return -1000.0;

    double r2        = lr_corr * lr_corr;
    double activity  = MathSqrt(trades / 100.0);
    double dd_factor = MathMax(0.0, 1.0 - dd_pct / 100.0);
    double pf_bonus  = (pf >= 1.5) ? 1.2 : 1.0;

    return profit * r2 * activity * dd_factor * pf_bonus;
}}
"#
    );
    let mut out = source.to_string();
    if !out.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(&block);
    (out, true)
}

/// Inject the safety guards near the top of the source, after the initial
/// header comment block if one exists. Returns `(source, injected)`;
/// re-application is a no-op.
pub fn inject_safety(source: &str, default_spread_pips: f64, default_slippage_pips: f64) -> (String, bool) {
    if has_safety_guards(source) {
        return (source.to_string(), false);
    }

    let declares_spread = source.contains(SAFETY_SPREAD_PARAM);
    let declares_slippage = source.contains(SAFETY_SLIPPAGE_PARAM);

    let mut block = String::new();
    block.push_str(&format!(
        "\n//+------------------------------------------------------------------+\n//| {SAFETY_MARKER}\n//+------------------------------------------------------------------+\n"
    ));
    if !declares_spread {
        block.push_str(&format!(
            "input double {SAFETY_SPREAD_PARAM} = {default_spread_pips}; // reject entries above this spread\n"
        ));
    }
    if !declares_slippage {
        block.push_str(&format!(
            "input double {SAFETY_SLIPPAGE_PARAM} = {default_slippage_pips}; // cap tolerated slippage\n"
        ));
    }
    block.push_str(&format!(
        r#"
bool StressGuardOrderSend(MqlTradeRequest &request, MqlTradeResult &result)
{{
    double point = SymbolInfoDouble(request.symbol, SYMBOL_POINT);
    double spread_pips = 0.0;
    if(point > 0.0)
    {{
        long spread_points = SymbolInfoInteger(request.symbol, SYMBOL_SPREAD);
        spread_pips = spread_points / 10.0;
    }}
    if(spread_pips > {SAFETY_SPREAD_PARAM})
        return false;
    request.deviation = (ulong)MathRound({SAFETY_SLIPPAGE_PARAM} * 10.0);
    return OrderSend(request, result);
}}
#define OrderSend(request, result) StressGuardOrderSend(request, result)

// Disable foreign side effects while under test.
#define FileOpen(name, flags) (INVALID_HANDLE)
#define FileWrite(handle, value) (0)
#define FileDelete(name) (false)
#define WebRequest(method, url, headers, timeout, data, result, result_headers) (false)
"#
    ));

    let insert_at = header_end(source);
    let mut out = String::with_capacity(source.len() + block.len());
    out.push_str(&source[..insert_at]);
    out.push_str(&block);
    out.push_str(&source[insert_at..]);
    (out, true)
}

/// Byte offset just past the initial `//+---+` header comment block, or 0.
fn header_end(source: &str) -> usize {
    if !source.trim_start().starts_with("//+") {
        return 0;
    }
    let mut offset = 0;
    let mut seen_border = 0;
    for line in source.split_inclusive('\n') {
        let trimmed = line.trim();
        offset += line.len();
        if trimmed.starts_with("//+") && trimmed.ends_with('+') {
            seen_border += 1;
            if seen_border >= 2 {
                return offset;
            }
        } else if !trimmed.starts_with("//") && !trimmed.is_empty() {
            // Not a header after all.
            return 0;
        }
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAIN: &str = "#property strict\ninput int Period = 14;\nvoid OnTick() {}\n";

    const WITH_HEADER: &str = "//+------------------+\n//| My EA            |\n//+------------------+\n#property strict\nvoid OnTick() {}\n";

    #[test]
    fn criterion_appended_once() {
        let (first, injected) = inject_criterion(PLAIN, 10);
        assert!(injected);
        assert!(first.contains("double OnTester()"));
        assert!(first.contains("return -1000.0;"));
        assert!(first.contains("trades < 10"));

        let (second, injected_again) = inject_criterion(&first, 10);
        assert!(!injected_again);
        assert_eq!(first, second);
    }

    #[test]
    fn existing_scoring_function_respected() {
        let source = "double OnTester()\n{\n    return 1.0;\n}\n";
        let (out, injected) = inject_criterion(source, 10);
        assert!(!injected);
        assert_eq!(out, source);
    }

    #[test]
    fn safety_guards_idempotent() {
        let (first, injected) = inject_safety(PLAIN, 3.0, 3.0);
        assert!(injected);
        assert!(first.contains(SAFETY_SPREAD_PARAM));
        assert!(first.contains("StressGuardOrderSend"));
        assert!(first.contains("#define WebRequest"));

        let (second, injected_again) = inject_safety(&first, 3.0, 3.0);
        assert!(!injected_again);
        assert_eq!(first, second);
    }

    #[test]
    fn safety_inputs_not_duplicated_when_declared() {
        let source = format!("input double {SAFETY_SPREAD_PARAM} = 5.0;\nvoid OnTick() {{}}\n");
        let (out, injected) = inject_safety(&source, 3.0, 3.0);
        assert!(injected);
        assert_eq!(out.matches(SAFETY_SPREAD_PARAM).count() >= 2, true);
        // Declared once as an input by the EA, referenced by the guard; no
        // second input declaration.
        assert_eq!(out.matches(&format!("input double {SAFETY_SPREAD_PARAM}")).count(), 1);
        // The slippage input was missing and is added.
        assert!(out.contains(&format!("input double {SAFETY_SLIPPAGE_PARAM}")));
    }

    #[test]
    fn guards_inserted_after_header_block() {
        let (out, _) = inject_safety(WITH_HEADER, 3.0, 3.0);
        let header_pos = out.find("My EA").unwrap();
        let guard_pos = out.find(SAFETY_MARKER).unwrap();
        let body_pos = out.find("#property strict").unwrap();
        assert!(header_pos < guard_pos);
        assert!(guard_pos < body_pos);
    }

    #[test]
    fn combined_injection_keeps_both_blocks() {
        let (with_criterion, _) = inject_criterion(PLAIN, 10);
        let (with_both, injected) = inject_safety(&with_criterion, 3.0, 3.0);
        assert!(injected);
        assert!(has_criterion(&with_both));
        assert!(has_safety_guards(&with_both));
    }
}
