//! Sweep artifact parser.
//!
//! The terminal emits sweep results as a spreadsheet-markup document: a
//! header row followed by one row per pass, with back and forward segments
//! in separate documents that must be merged by pass index.

use std::collections::BTreeMap;

use thiserror::Error;

use gauntlet_core::{ParamValue, PassRow};

use crate::markup;

#[derive(Debug, Error)]
pub enum SweepParseError {
    #[error("artifact contains no rows")]
    Empty,
    #[error("artifact has a header row but no data rows")]
    NoData,
    #[error("header is missing the pass-index column")]
    NoPassColumn,
}

/// Metric column aliases seen across terminal versions. Anything not listed
/// here is treated as an input parameter column.
fn metric_key(header: &str) -> Option<&'static str> {
    match header.trim().to_ascii_lowercase().as_str() {
        "pass" => Some("pass"),
        "result" | "custom" => Some("combined"),
        "back result" => Some("back_result"),
        "forward result" => Some("forward_result"),
        "profit" => Some("profit"),
        "profit factor" | "profitfactor" => Some("profit_factor"),
        "equity dd %" | "drawdown %" | "equity drawdown %" => Some("max_drawdown_pct"),
        "trades" | "total trades" => Some("total_trades"),
        "sharpe ratio" | "sharperatio" => Some("sharpe"),
        "win %" | "profit trades %" => Some("win_rate"),
        "expected payoff" | "expectedpayoff" => Some("expected_payoff"),
        "recovery factor" | "recoveryfactor" => Some("recovery_factor"),
        _ => None,
    }
}

fn to_param_value(cell: &str) -> ParamValue {
    if let Ok(i) = cell.parse::<i64>() {
        ParamValue::Int(i)
    } else if let Ok(f) = cell.parse::<f64>() {
        ParamValue::Real(f)
    } else {
        ParamValue::Text(cell.to_string())
    }
}

#[derive(Debug, Default)]
struct RawPass {
    metrics: BTreeMap<&'static str, f64>,
    params: BTreeMap<String, ParamValue>,
}

fn parse_table(xml: &str) -> Result<Vec<RawPass>, SweepParseError> {
    let rows = markup::rows(xml);
    if rows.is_empty() {
        return Err(SweepParseError::Empty);
    }
    let headers = &rows[0];
    if !headers.iter().any(|h| metric_key(h) == Some("pass")) {
        return Err(SweepParseError::NoPassColumn);
    }
    if rows.len() < 2 {
        return Err(SweepParseError::NoData);
    }

    let mut passes = Vec::new();
    for row in &rows[1..] {
        if row.is_empty() {
            continue;
        }
        let mut raw = RawPass::default();
        for (header, cell) in headers.iter().zip(row.iter()) {
            match metric_key(header) {
                Some(key) => {
                    if let Ok(v) = cell.parse::<f64>() {
                        raw.metrics.insert(key, v);
                    }
                }
                None => {
                    raw.params.insert(header.clone(), to_param_value(cell));
                }
            }
        }
        passes.push(raw);
    }
    Ok(passes)
}

/// Parse the back-segment artifact and merge the optional forward-segment
/// artifact by pass index.
///
/// Segment trade counts are additive. A missing or unreadable forward
/// artifact is tolerated: rows keep a zero forward result.
pub fn parse_sweep_artifact(
    back_xml: &str,
    forward_xml: Option<&str>,
) -> Result<Vec<PassRow>, SweepParseError> {
    let back = parse_table(back_xml)?;

    let mut forward_by_pass: BTreeMap<u32, RawPass> = BTreeMap::new();
    if let Some(xml) = forward_xml {
        if let Ok(rows) = parse_table(xml) {
            for raw in rows {
                if let Some(pass) = raw.metrics.get("pass") {
                    forward_by_pass.insert(*pass as u32, raw);
                }
            }
        }
    }

    let mut passes: Vec<PassRow> = back
        .into_iter()
        .filter_map(|raw| {
            let pass_index = *raw.metrics.get("pass")? as u32;
            let combined = raw
                .metrics
                .get("combined")
                .copied()
                .or_else(|| raw.metrics.get("profit").copied())
                .unwrap_or(0.0);
            let mut row = PassRow {
                pass_index,
                combined,
                back_result: raw.metrics.get("back_result").copied().unwrap_or(combined),
                forward_result: raw.metrics.get("forward_result").copied().unwrap_or(0.0),
                profit: raw.metrics.get("profit").copied().unwrap_or(0.0),
                profit_factor: raw.metrics.get("profit_factor").copied().unwrap_or(0.0),
                max_drawdown_pct: raw.metrics.get("max_drawdown_pct").copied().unwrap_or(0.0),
                total_trades: raw.metrics.get("total_trades").copied().unwrap_or(0.0) as u32,
                win_rate: raw.metrics.get("win_rate").copied().unwrap_or(0.0),
                sharpe: raw.metrics.get("sharpe").copied().unwrap_or(0.0),
                params: raw.params,
            };
            if let Some(fwd) = forward_by_pass.get(&pass_index) {
                if let Some(v) = fwd.metrics.get("forward_result") {
                    row.forward_result = *v;
                } else if let Some(v) = fwd.metrics.get("combined") {
                    row.forward_result = *v;
                }
                if let Some(v) = fwd.metrics.get("back_result") {
                    row.back_result = *v;
                }
                if let Some(v) = fwd.metrics.get("total_trades") {
                    row.total_trades += *v as u32;
                }
            }
            Some(row)
        })
        .collect();

    passes.sort_by(|a, b| {
        b.combined
            .partial_cmp(&a.combined)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    Ok(passes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sheet(rows: &[&[&str]]) -> String {
        let mut xml = String::from("<Workbook><Table>\n");
        for row in rows {
            xml.push_str("<Row>");
            for cell in *row {
                xml.push_str(&format!("<Cell><Data Type=\"String\">{cell}</Data></Cell>"));
            }
            xml.push_str("</Row>\n");
        }
        xml.push_str("</Table></Workbook>");
        xml
    }

    const HEADERS: &[&str] = &[
        "Pass",
        "Result",
        "Profit",
        "Profit Factor",
        "Equity DD %",
        "Trades",
        "Win %",
        "RSI_Period",
        "Use_Trailing",
    ];

    #[test]
    fn parses_passes_with_params() {
        let xml = sheet(&[
            HEADERS,
            &["1", "2.5", "1800", "1.9", "14.0", "120", "55", "14", "1"],
            &["2", "1.1", "600", "1.3", "22.0", "80", "48", "20", "0"],
        ]);
        let passes = parse_sweep_artifact(&xml, None).unwrap();
        assert_eq!(passes.len(), 2);
        // Sorted by combined criterion, best first.
        assert_eq!(passes[0].pass_index, 1);
        assert_eq!(passes[0].total_trades, 120);
        assert_eq!(passes[0].params.get("RSI_Period"), Some(&ParamValue::Int(14)));
        assert_eq!(passes[0].params.get("Use_Trailing"), Some(&ParamValue::Int(1)));
    }

    #[test]
    fn merges_forward_table_by_pass_index() {
        let back = sheet(&[
            HEADERS,
            &["1", "2.5", "1800", "1.9", "14.0", "120", "55", "14", "1"],
        ]);
        let forward = sheet(&[
            &["Pass", "Result", "Back Result", "Forward Result", "Trades"],
            &["1", "0.8", "2.5", "420", "30"],
        ]);
        let passes = parse_sweep_artifact(&back, Some(&forward)).unwrap();
        assert_eq!(passes[0].forward_result, 420.0);
        assert_eq!(passes[0].back_result, 2.5);
        // Segment trade counts are additive.
        assert_eq!(passes[0].total_trades, 150);
    }

    #[test]
    fn missing_forward_rows_keep_zero_forward() {
        let back = sheet(&[
            HEADERS,
            &["3", "1.0", "500", "1.4", "10.0", "90", "51", "12", "0"],
        ]);
        let forward = sheet(&[&["Pass", "Forward Result"], &["99", "777"]]);
        let passes = parse_sweep_artifact(&back, Some(&forward)).unwrap();
        assert_eq!(passes[0].forward_result, 0.0);
    }

    #[test]
    fn rows_sorted_by_combined_descending() {
        let xml = sheet(&[
            &["Pass", "Result", "Profit", "Trades"],
            &["1", "0.4", "100", "60"],
            &["2", "3.1", "900", "80"],
            &["3", "1.7", "400", "70"],
        ]);
        let passes = parse_sweep_artifact(&xml, None).unwrap();
        let order: Vec<u32> = passes.iter().map(|p| p.pass_index).collect();
        assert_eq!(order, vec![2, 3, 1]);
    }

    #[test]
    fn empty_artifact_is_an_error() {
        assert!(matches!(
            parse_sweep_artifact("<Workbook></Workbook>", None),
            Err(SweepParseError::Empty)
        ));
    }

    #[test]
    fn header_only_artifact_is_an_error() {
        let xml = sheet(&[HEADERS]);
        assert!(matches!(
            parse_sweep_artifact(&xml, None),
            Err(SweepParseError::NoData)
        ));
    }

    #[test]
    fn missing_pass_column_is_an_error() {
        let xml = sheet(&[&["Profit", "Trades"], &["100", "50"]]);
        assert!(matches!(
            parse_sweep_artifact(&xml, None),
            Err(SweepParseError::NoPassColumn)
        ));
    }
}
