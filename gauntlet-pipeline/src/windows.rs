//! Time-window analytics over the best pass's trade list.
//!
//! Windows are anchored to the workflow's end date: rolling N-day spans,
//! whole calendar months, the in-sample/forward segments and per-year
//! slices. Metrics inside a window start from the balance accumulated by
//! all earlier closed trades, so drawdown within the window is realistic.

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use gauntlet_core::metrics::profit_factor;
use gauntlet_core::{BacktestPeriod, TradeRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowKind {
    Full,
    Segment,
    Rolling,
    Calendar,
    Year,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Window {
    pub id: String,
    pub label: String,
    pub kind: WindowKind,
    pub from: NaiveDate,
    pub to: NaiveDate,
}

/// Metrics of the trades closing inside one window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowMetrics {
    pub starting_balance: f64,
    pub profit: f64,
    pub profit_factor: f64,
    pub max_drawdown_pct: f64,
    pub total_trades: u32,
    pub win_rate: f64,
}

/// Rolling spans ending at `end`: "last N days" for each configured N.
pub fn rolling_windows(end: NaiveDate, days: &[u32]) -> Vec<Window> {
    days.iter()
        .map(|d| Window {
            id: format!("last_{d}d"),
            label: format!("Last {d} days"),
            kind: WindowKind::Rolling,
            from: end - Duration::days(*d as i64),
            to: end,
        })
        .collect()
}

/// Whole calendar months, `months_ago` counted back from `end`'s month.
pub fn calendar_month_windows(end: NaiveDate, months_ago: &[u32]) -> Vec<Window> {
    months_ago
        .iter()
        .filter_map(|ago| {
            let month_start = shift_month_start(end, *ago)?;
            let month_end = shift_month_start(end, ago.checked_sub(1)?)
                .map(|next| next - Duration::days(1))?;
            Some(Window {
                id: format!("month_{}_{:02}", month_start.year(), month_start.month()),
                label: month_start.format("%b %Y").to_string(),
                kind: WindowKind::Calendar,
                from: month_start,
                to: month_end,
            })
        })
        .collect()
}

/// First day of the month after `date`'s month.
pub fn next_month(date: NaiveDate) -> NaiveDate {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    // The first of a month always exists.
    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(date)
}

fn shift_month_start(anchor: NaiveDate, months_back: u32) -> Option<NaiveDate> {
    let total = anchor.year() * 12 + anchor.month0() as i32 - months_back as i32;
    NaiveDate::from_ymd_opt(total.div_euclid(12), total.rem_euclid(12) as u32 + 1, 1)
}

/// Full period plus the in-sample and forward segments.
pub fn segment_windows(period: &BacktestPeriod) -> Vec<Window> {
    vec![
        Window {
            id: "full".to_string(),
            label: "Full period".to_string(),
            kind: WindowKind::Full,
            from: period.start,
            to: period.end,
        },
        Window {
            id: "in_sample".to_string(),
            label: "In-sample".to_string(),
            kind: WindowKind::Segment,
            from: period.start,
            to: period.split,
        },
        Window {
            id: "forward".to_string(),
            label: "Forward".to_string(),
            kind: WindowKind::Segment,
            from: period.split,
            to: period.end,
        },
    ]
}

/// One window per calendar year overlapping the period, clamped to it.
pub fn year_windows(period: &BacktestPeriod) -> Vec<Window> {
    (period.start.year()..=period.end.year())
        .filter_map(|year| {
            let from = NaiveDate::from_ymd_opt(year, 1, 1)?.max(period.start);
            let to = NaiveDate::from_ymd_opt(year, 12, 31)?.min(period.end);
            Some(Window {
                id: format!("year_{year}"),
                label: format!("Year {year}"),
                kind: WindowKind::Year,
                from,
                to,
            })
        })
        .collect()
}

/// Compute metrics for trades closing within `[window.from, window.to]`.
///
/// `trades` must be sorted by close time. The starting balance is the
/// initial deposit plus the net profit of every trade closed before the
/// window opens.
pub fn window_metrics(trades: &[TradeRecord], window: &Window, initial_deposit: f64) -> WindowMetrics {
    let mut balance = initial_deposit;
    for trade in trades {
        if trade.close_time.date() < window.from {
            balance += trade.net_profit;
        } else {
            break;
        }
    }

    let starting_balance = balance;
    let mut peak = starting_balance;
    let mut max_dd = 0.0f64;
    let mut profit = 0.0;
    let mut gross_profit = 0.0;
    let mut gross_loss = 0.0;
    let mut wins = 0u32;
    let mut total = 0u32;

    for trade in trades {
        let close = trade.close_time.date();
        if close < window.from {
            continue;
        }
        if close > window.to {
            break;
        }
        let p = trade.net_profit;
        total += 1;
        profit += p;
        if p > 0.0 {
            wins += 1;
            gross_profit += p;
        } else if p < 0.0 {
            gross_loss += -p;
        }

        balance += p;
        if balance > peak {
            peak = balance;
        }
        if peak > 0.0 {
            let dd = (peak - balance) / peak;
            if dd > max_dd {
                max_dd = dd;
            }
        }
    }

    WindowMetrics {
        starting_balance,
        profit,
        profit_factor: profit_factor(gross_profit, gross_loss),
        max_drawdown_pct: max_dd * 100.0,
        total_trades: total,
        win_rate: if total > 0 { wins as f64 / total as f64 * 100.0 } else { 0.0 },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gauntlet_core::TradeDirection;

    fn trade(close: NaiveDate, net: f64) -> TradeRecord {
        TradeRecord {
            open_time: close.and_hms_opt(9, 0, 0).unwrap(),
            close_time: close.and_hms_opt(17, 0, 0).unwrap(),
            direction: TradeDirection::Buy,
            volume: 0.1,
            open_price: 1.1,
            close_price: 1.1,
            commission: 0.0,
            swap: 0.0,
            gross_profit: net,
            net_profit: net,
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn rolling_window_bounds() {
        let windows = rolling_windows(date(2025, 6, 1), &[7, 30]);
        assert_eq!(windows[0].from, date(2025, 5, 25));
        assert_eq!(windows[1].from, date(2025, 5, 2));
        assert!(windows.iter().all(|w| w.to == date(2025, 6, 1)));
    }

    #[test]
    fn calendar_months_count_back_from_anchor() {
        let windows = calendar_month_windows(date(2025, 6, 15), &[1, 2, 3]);
        assert_eq!(windows[0].from, date(2025, 5, 1));
        assert_eq!(windows[0].to, date(2025, 5, 31));
        assert_eq!(windows[1].from, date(2025, 4, 1));
        assert_eq!(windows[2].from, date(2025, 3, 1));
        assert_eq!(windows[0].label, "May 2025");
    }

    #[test]
    fn calendar_month_across_year_boundary() {
        let windows = calendar_month_windows(date(2025, 1, 10), &[2]);
        assert_eq!(windows[0].from, date(2024, 11, 1));
        assert_eq!(windows[0].to, date(2024, 11, 30));
    }

    #[test]
    fn segment_windows_follow_period() {
        let period = BacktestPeriod {
            start: date(2021, 6, 1),
            split: date(2024, 6, 1),
            end: date(2025, 6, 1),
        };
        let windows = segment_windows(&period);
        assert_eq!(windows.len(), 3);
        assert_eq!(windows[1].to, period.split);
        assert_eq!(windows[2].from, period.split);
    }

    #[test]
    fn year_windows_clamped_to_period() {
        let period = BacktestPeriod {
            start: date(2023, 6, 1),
            split: date(2024, 6, 1),
            end: date(2025, 3, 1),
        };
        let windows = year_windows(&period);
        assert_eq!(windows.len(), 3);
        assert_eq!(windows[0].from, date(2023, 6, 1));
        assert_eq!(windows[2].to, date(2025, 3, 1));
    }

    #[test]
    fn starting_balance_includes_prior_trades() {
        let trades = vec![
            trade(date(2024, 1, 10), 500.0),
            trade(date(2024, 3, 10), -200.0),
            trade(date(2024, 6, 10), 300.0),
        ];
        let window = Window {
            id: "w".into(),
            label: "w".into(),
            kind: WindowKind::Rolling,
            from: date(2024, 5, 1),
            to: date(2024, 12, 31),
        };
        let metrics = window_metrics(&trades, &window, 3000.0);
        assert_eq!(metrics.starting_balance, 3300.0);
        assert_eq!(metrics.total_trades, 1);
        assert_eq!(metrics.profit, 300.0);
    }

    #[test]
    fn drawdown_measured_within_window_only() {
        let trades = vec![
            trade(date(2024, 5, 2), 1000.0),
            trade(date(2024, 5, 10), -660.0),
            trade(date(2024, 5, 20), 100.0),
        ];
        let window = Window {
            id: "w".into(),
            label: "w".into(),
            kind: WindowKind::Rolling,
            from: date(2024, 5, 1),
            to: date(2024, 5, 31),
        };
        let metrics = window_metrics(&trades, &window, 2000.0);
        // Peak 3000 after the first trade, trough 2340: 22% drawdown.
        assert!((metrics.max_drawdown_pct - 22.0).abs() < 0.01);
        assert_eq!(metrics.total_trades, 3);
        assert!((metrics.win_rate - 66.6667).abs() < 0.01);
    }

    #[test]
    fn empty_window_reports_zero_trades() {
        let trades = vec![trade(date(2024, 1, 10), 500.0)];
        let window = Window {
            id: "w".into(),
            label: "w".into(),
            kind: WindowKind::Rolling,
            from: date(2025, 1, 1),
            to: date(2025, 2, 1),
        };
        let metrics = window_metrics(&trades, &window, 3000.0);
        assert_eq!(metrics.total_trades, 0);
        assert_eq!(metrics.profit_factor, 0.0);
        assert_eq!(metrics.starting_balance, 3500.0);
    }

    #[test]
    fn window_profit_factor_caps_at_99_without_losses() {
        let trades = vec![trade(date(2024, 5, 2), 100.0), trade(date(2024, 5, 3), 50.0)];
        let window = Window {
            id: "w".into(),
            label: "w".into(),
            kind: WindowKind::Rolling,
            from: date(2024, 5, 1),
            to: date(2024, 5, 31),
        };
        let metrics = window_metrics(&trades, &window, 1000.0);
        assert_eq!(metrics.profit_factor, 99.0);
    }
}
