//! Single-run artifact parser.
//!
//! A run report is the same spreadsheet-markup shape as the sweep artifact:
//! a summary table of `key | value` rows followed by a trade table whose
//! header row starts with "Open Time". Only the fields the pipeline consumes
//! are extracted.

use chrono::NaiveDateTime;
use thiserror::Error;

use gauntlet_core::metrics::profit_factor;
use gauntlet_core::{TradeDirection, TradeMetrics, TradeRecord};

use crate::markup;

#[derive(Debug, Error)]
pub enum RunReportError {
    #[error("report contains no rows")]
    Empty,
}

const TIME_FORMAT: &str = "%Y.%m.%d %H:%M:%S";

/// Parse a run report into summary metrics and the closed-trade list.
///
/// Unknown summary keys are ignored; malformed trade rows are skipped and
/// surfaced in the metrics error list rather than failing the whole report.
pub fn parse_run_report(xml: &str) -> Result<(TradeMetrics, Vec<TradeRecord>), RunReportError> {
    let rows = markup::rows(xml);
    if rows.is_empty() {
        return Err(RunReportError::Empty);
    }

    let mut metrics = TradeMetrics::default();
    let mut trades = Vec::new();
    let mut in_trades = false;
    let mut gross_seen = false;

    for row in &rows {
        if row.is_empty() {
            continue;
        }
        if !in_trades {
            if row[0].eq_ignore_ascii_case("open time") {
                in_trades = true;
                continue;
            }
            if row.len() >= 2 {
                apply_summary(&mut metrics, &row[0], &row[1], &mut gross_seen);
            }
            continue;
        }
        match parse_trade_row(row) {
            Some(trade) => trades.push(trade),
            None => metrics
                .errors
                .push(format!("skipped malformed trade row: {:?}", row.first())),
        }
    }

    if metrics.total_trades == 0 {
        metrics.total_trades = trades.len() as u32;
    }
    if !gross_seen && !trades.is_empty() {
        metrics.gross_profit = trades.iter().map(|t| t.net_profit.max(0.0)).sum();
        metrics.gross_loss = trades.iter().map(|t| (-t.net_profit).max(0.0)).sum();
    }
    if metrics.profit_factor == 0.0 {
        metrics.profit_factor = profit_factor(metrics.gross_profit, metrics.gross_loss);
    }
    Ok((metrics, trades))
}

fn apply_summary(metrics: &mut TradeMetrics, key: &str, value: &str, gross_seen: &mut bool) {
    let parsed: Option<f64> = value.replace([' ', ','], "").parse().ok();
    let Some(v) = parsed else { return };
    match key.trim().to_ascii_lowercase().as_str() {
        "profit" | "total net profit" => metrics.profit = v,
        "profit factor" => metrics.profit_factor = v,
        "equity dd %" | "maximal drawdown %" | "drawdown %" => metrics.max_drawdown_pct = v,
        "trades" | "total trades" => metrics.total_trades = v as u32,
        "win %" | "profit trades %" => metrics.win_rate = v,
        "sharpe ratio" => metrics.sharpe = v,
        "sortino ratio" => metrics.sortino = v,
        "calmar ratio" => metrics.calmar = v,
        "expected payoff" => metrics.expected_payoff = v,
        "recovery factor" => metrics.recovery_factor = v,
        "gross profit" => {
            metrics.gross_profit = v;
            *gross_seen = true;
        }
        "gross loss" => {
            metrics.gross_loss = v.abs();
            *gross_seen = true;
        }
        _ => {}
    }
}

fn parse_trade_row(row: &[String]) -> Option<TradeRecord> {
    if row.len() < 10 {
        return None;
    }
    let open_time = NaiveDateTime::parse_from_str(&row[0], TIME_FORMAT).ok()?;
    let close_time = NaiveDateTime::parse_from_str(&row[1], TIME_FORMAT).ok()?;
    let direction = match row[2].to_ascii_lowercase().as_str() {
        "buy" => TradeDirection::Buy,
        "sell" => TradeDirection::Sell,
        _ => return None,
    };
    Some(TradeRecord {
        open_time,
        close_time,
        direction,
        volume: row[3].parse().ok()?,
        open_price: row[4].parse().ok()?,
        close_price: row[5].parse().ok()?,
        commission: row[6].parse().ok()?,
        swap: row[7].parse().ok()?,
        gross_profit: row[8].parse().ok()?,
        net_profit: row[9].parse().ok()?,
    })
}
