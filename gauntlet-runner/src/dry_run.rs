//! Scriptable mock terminal.
//!
//! Used by every orchestrator test: canned outcomes are queued per
//! operation and drained in call order, falling back to a configurable
//! default when the queue is empty. All calls are logged for assertions.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Result;
use chrono::{Duration, NaiveDate};

use gauntlet_core::metrics::profit_factor;
use gauntlet_core::{TradeDirection, TradeMetrics, TradeRecord};

use crate::interface::{
    CompileOutcome, ProgressSink, RunOutcome, RunSpec, SweepOutcome, SweepSpec, TerminalRunner,
};

/// One logged call, with enough arguments for collision and ordering
/// assertions.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Compile { source: PathBuf },
    RunSingle { report_handle: String, from: NaiveDate, to: NaiveDate, latency_ms: u32 },
    RunSweep { report_handle: String, range_count: usize },
}

#[derive(Default)]
struct Script {
    compiles: VecDeque<CompileOutcome>,
    runs: VecDeque<RunOutcome>,
    sweeps: VecDeque<SweepOutcome>,
}

/// Mock implementation of [`TerminalRunner`].
pub struct DryRunTerminal {
    script: Mutex<Script>,
    default_run: RunOutcome,
    calls: Mutex<Vec<Call>>,
}

impl DryRunTerminal {
    /// A terminal that compiles cleanly and produces a healthy default run.
    pub fn healthy() -> Self {
        Self {
            script: Mutex::new(Script::default()),
            default_run: synthetic_run(180, 2400.0, 60.0, 16.0),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Replace the fallback single-run outcome.
    pub fn with_default_run(mut self, outcome: RunOutcome) -> Self {
        self.default_run = outcome;
        self
    }

    /// Queue a compile outcome for the next `compile` call.
    pub fn push_compile(&self, outcome: CompileOutcome) {
        self.script.lock().unwrap().compiles.push_back(outcome);
    }

    /// Queue a single-run outcome.
    pub fn push_run(&self, outcome: RunOutcome) {
        self.script.lock().unwrap().runs.push_back(outcome);
    }

    /// Queue a sweep outcome.
    pub fn push_sweep(&self, outcome: SweepOutcome) {
        self.script.lock().unwrap().sweeps.push_back(outcome);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Report handles seen across all run and sweep calls.
    pub fn handles(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::RunSingle { report_handle, .. } | Call::RunSweep { report_handle, .. } => {
                    Some(report_handle)
                }
                Call::Compile { .. } => None,
            })
            .collect()
    }
}

impl TerminalRunner for DryRunTerminal {
    fn compile(&self, ea_source: &Path) -> Result<CompileOutcome> {
        self.calls.lock().unwrap().push(Call::Compile { source: ea_source.to_path_buf() });
        let scripted = self.script.lock().unwrap().compiles.pop_front();
        Ok(scripted.unwrap_or_else(|| CompileOutcome {
            success: true,
            compiled_path: Some(ea_source.with_extension("ex5")),
            errors: Vec::new(),
            warnings: Vec::new(),
        }))
    }

    fn run_single(&self, _ea_path: &Path, spec: &RunSpec) -> Result<RunOutcome> {
        self.calls.lock().unwrap().push(Call::RunSingle {
            report_handle: spec.report_handle.clone(),
            from: spec.from_date,
            to: spec.to_date,
            latency_ms: spec.latency_ms,
        });
        let scripted = self.script.lock().unwrap().runs.pop_front();
        Ok(scripted.unwrap_or_else(|| self.default_run.clone()))
    }

    fn run_sweep(
        &self,
        _ea_path: &Path,
        spec: &SweepSpec,
        progress: &dyn ProgressSink,
    ) -> Result<SweepOutcome> {
        self.calls.lock().unwrap().push(Call::RunSweep {
            report_handle: spec.report_handle.clone(),
            range_count: spec.ranges.len(),
        });
        progress.progress("sweep running (dry run)");
        let scripted = self.script.lock().unwrap().sweeps.pop_front();
        Ok(scripted.unwrap_or(SweepOutcome {
            pass_count: 0,
            passes: Vec::new(),
            artifact_path: None,
        }))
    }
}

/// Build a plausible run outcome with a synthetic trade list: `trades`
/// alternating wins and losses sized to hit the requested profit and win
/// rate, spread over 2023-2024 close times.
pub fn synthetic_run(trades: u32, profit: f64, win_rate: f64, max_drawdown_pct: f64) -> RunOutcome {
    let wins = ((trades as f64) * win_rate / 100.0).round() as u32;
    let losses = trades.saturating_sub(wins);
    // Gross totals consistent with the requested net profit.
    let (gross_profit, gross_loss) = if wins == 0 {
        (0.0, -profit)
    } else if losses == 0 {
        (profit, 0.0)
    } else if profit > 0.0 {
        (profit * 1.8, profit * 0.8)
    } else {
        (100.0, 100.0 - profit)
    };
    let avg_win = if wins > 0 { gross_profit / wins as f64 } else { 0.0 };
    let avg_loss = if losses > 0 { gross_loss / losses as f64 } else { 0.0 };

    let start = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
    let mut records = Vec::with_capacity(trades as usize);
    for i in 0..trades {
        // Interleave wins and losses evenly so the equity path is realistic.
        let win = ((i + 1) as u64 * wins as u64) / trades as u64
            > (i as u64 * wins as u64) / trades as u64;
        let open = start + Duration::days((i as i64 * 730) / trades.max(1) as i64);
        let net = if win { avg_win } else { -avg_loss };
        records.push(TradeRecord {
            open_time: open.and_hms_opt(9, 0, 0).unwrap(),
            close_time: open.and_hms_opt(17, 0, 0).unwrap(),
            direction: if win { TradeDirection::Buy } else { TradeDirection::Sell },
            volume: 0.1,
            open_price: 1.1,
            close_price: 1.1 + net / 10_000.0,
            commission: 0.0,
            swap: 0.0,
            gross_profit: net,
            net_profit: net,
        });
    }

    let metrics = TradeMetrics {
        profit,
        profit_factor: profit_factor(gross_profit, gross_loss),
        max_drawdown_pct,
        total_trades: trades,
        win_rate,
        sharpe: 1.2,
        sortino: 1.5,
        calmar: 0.9,
        expected_payoff: if trades > 0 { profit / trades as f64 } else { 0.0 },
        recovery_factor: 2.1,
        gross_profit,
        gross_loss,
        equity_curve: Vec::new(),
        errors: Vec::new(),
    };
    RunOutcome { metrics, trades: records, report_path: None }
}
