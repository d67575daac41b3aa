//! Per-trade records from single-run reports.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeDirection {
    Buy,
    Sell,
}

/// One closed trade as reported by the terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub open_time: NaiveDateTime,
    pub close_time: NaiveDateTime,
    pub direction: TradeDirection,
    pub volume: f64,
    pub open_price: f64,
    pub close_price: f64,
    pub commission: f64,
    pub swap: f64,
    pub gross_profit: f64,
    /// Gross profit plus commission and swap.
    pub net_profit: f64,
}

impl TradeRecord {
    /// Number of order sides this trade crossed the spread on.
    /// Every round-trip trade has an entry and an exit.
    pub const SIDES: u32 = 2;
}
