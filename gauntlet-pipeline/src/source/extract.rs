//! Input-parameter extraction from EA source.
//!
//! A line-oriented parser for `input` / `sinput` declarations:
//! `input <type> <name> = <default>; // comment`. It does not attempt to
//! understand the rest of the language.

use gauntlet_core::{ParamKind, ParamValue, Parameter};

use crate::source::inject::{SAFETY_SLIPPAGE_PARAM, SAFETY_SPREAD_PARAM};

/// Name fragments that mark a parameter as an identifier or debug toggle,
/// never worth optimizing.
const NON_OPTIMIZABLE_NAMES: [&str; 4] = ["magic", "debug", "comment", "identifier"];

fn kind_of(declared: &str) -> ParamKind {
    match declared {
        "int" | "uint" | "long" | "ulong" | "short" | "ushort" | "char" | "uchar" => {
            ParamKind::Integer
        }
        "double" | "float" => ParamKind::Real,
        "bool" => ParamKind::Boolean,
        "string" => ParamKind::Text,
        "datetime" => ParamKind::Timestamp,
        "color" => ParamKind::Color,
        _ => ParamKind::Enumeration,
    }
}

fn parse_default(kind: ParamKind, raw: &str) -> Option<ParamValue> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    match kind {
        ParamKind::Integer => raw.parse::<i64>().ok().map(ParamValue::Int),
        ParamKind::Real => raw.parse::<f64>().ok().map(ParamValue::Real),
        ParamKind::Boolean => match raw.to_ascii_lowercase().as_str() {
            "true" | "1" => Some(ParamValue::Bool(true)),
            "false" | "0" => Some(ParamValue::Bool(false)),
            _ => None,
        },
        _ => Some(ParamValue::Text(raw.trim_matches('"').to_string())),
    }
}

fn is_optimizable(name: &str, kind: ParamKind) -> bool {
    if !kind.is_sweepable() {
        return false;
    }
    if name == SAFETY_SPREAD_PARAM || name == SAFETY_SLIPPAGE_PARAM {
        return false;
    }
    let lowered = name.to_ascii_lowercase();
    !NON_OPTIMIZABLE_NAMES.iter().any(|frag| lowered.contains(frag))
}

/// Extract every input declaration from `source`, in declaration order.
pub fn extract_params(source: &str) -> Vec<Parameter> {
    let mut params = Vec::new();
    for (idx, line) in source.lines().enumerate() {
        let trimmed = line.trim_start();
        let rest = match trimmed
            .strip_prefix("input ")
            .or_else(|| trimmed.strip_prefix("sinput "))
        {
            Some(rest) => rest.trim_start(),
            None => continue,
        };

        // "<type> <name> [= default] ; [// comment]"
        let (decl, comment) = match rest.split_once("//") {
            Some((decl, comment)) => (decl, Some(comment.trim().to_string())),
            None => (rest, None),
        };
        let decl = match decl.split_once(';') {
            Some((decl, _)) => decl,
            None => continue,
        };

        let (lhs, default_raw) = match decl.split_once('=') {
            Some((lhs, rhs)) => (lhs.trim(), Some(rhs.trim())),
            None => (decl.trim(), None),
        };

        let mut tokens = lhs.split_whitespace();
        let (Some(declared_type), Some(name)) = (tokens.next(), tokens.next()) else {
            continue;
        };
        if tokens.next().is_some() || !is_identifier(name) {
            continue;
        }

        let kind = kind_of(declared_type);
        let default = default_raw.and_then(|raw| parse_default(kind, raw));
        params.push(Parameter {
            name: name.to_string(),
            declared_type: declared_type.to_string(),
            kind,
            default,
            comment: comment.filter(|c| !c.is_empty()),
            line: (idx + 1) as u32,
            optimizable: is_optimizable(name, kind),
        });
    }
    params
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = r#"
//+------------------------------------------------------------------+
//| Sample EA                                                        |
//+------------------------------------------------------------------+
#property strict

input double   LotSize = 0.1;          // base lot size
input int      RSI_Period = 14;        // RSI lookback
input bool     Use_Trailing = true;
sinput string  TradeComment = "gx";    // order comment
input ENUM_TIMEFRAMES SignalTF = PERIOD_H1;
input datetime SessionStart = D'2020.01.01';
input color    LineColor = clrRed;
input int      MagicNumber = 987654;   // order identifier
input bool     DebugPrint = false;

int counter = 0; // not an input
void OnTick() {}
"#;

    #[test]
    fn extracts_all_declarations_in_order() {
        let params = extract_params(SOURCE);
        let names: Vec<&str> = params.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "LotSize",
                "RSI_Period",
                "Use_Trailing",
                "TradeComment",
                "SignalTF",
                "SessionStart",
                "LineColor",
                "MagicNumber",
                "DebugPrint",
            ]
        );
    }

    #[test]
    fn kinds_and_defaults() {
        let params = extract_params(SOURCE);
        let by_name = |n: &str| params.iter().find(|p| p.name == n).unwrap();

        assert_eq!(by_name("LotSize").kind, ParamKind::Real);
        assert_eq!(by_name("LotSize").default, Some(ParamValue::Real(0.1)));
        assert_eq!(by_name("RSI_Period").kind, ParamKind::Integer);
        assert_eq!(by_name("Use_Trailing").default, Some(ParamValue::Bool(true)));
        assert_eq!(by_name("SignalTF").kind, ParamKind::Enumeration);
        assert_eq!(by_name("SessionStart").kind, ParamKind::Timestamp);
        assert_eq!(by_name("LineColor").kind, ParamKind::Color);
        assert_eq!(by_name("TradeComment").kind, ParamKind::Text);
    }

    #[test]
    fn optimizable_excludes_identifiers_and_non_numerics() {
        let params = extract_params(SOURCE);
        let optimizable: Vec<&str> = params
            .iter()
            .filter(|p| p.optimizable)
            .map(|p| p.name.as_str())
            .collect();
        // Magic number and debug toggle excluded by name, the rest by kind.
        assert_eq!(optimizable, vec!["LotSize", "RSI_Period", "Use_Trailing"]);
    }

    #[test]
    fn comments_and_lines_recorded() {
        let params = extract_params(SOURCE);
        let lot = params.iter().find(|p| p.name == "LotSize").unwrap();
        assert_eq!(lot.comment.as_deref(), Some("base lot size"));
        assert!(lot.line > 0);
    }

    #[test]
    fn injected_safety_parameters_never_optimizable() {
        let source = format!(
            "input double {SAFETY_SPREAD_PARAM} = 3.0;\ninput double {SAFETY_SLIPPAGE_PARAM} = 3.0;\n"
        );
        let params = extract_params(&source);
        assert_eq!(params.len(), 2);
        assert!(params.iter().all(|p| !p.optimizable));
    }

    #[test]
    fn non_input_lines_ignored() {
        let params = extract_params("double x = 1.0;\n// input double Fake = 2.0\n");
        assert!(params.is_empty());
    }
}
