//! The terminal runner contract.
//!
//! Every interaction with the external evaluation engine goes through these
//! three operations. Implementations: `LiveTerminal` (drives the real
//! executable) and `DryRunTerminal` (scriptable mock for tests — no
//! orchestrator test may touch the live driver).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use gauntlet_core::{OptimizationRange, ParamValue, PassRow, TradeMetrics, TradeRecord};

/// Price data model the terminal simulates with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataModel {
    /// Fine tick simulation.
    Tick,
    /// Coarse one-minute OHLC simulation.
    Ohlc,
}

impl DataModel {
    /// Integer encoding in the terminal's configuration file.
    pub fn ini_code(self) -> u8 {
        match self {
            DataModel::Tick => 0,
            DataModel::Ohlc => 1,
        }
    }
}

/// Outcome of compiling an EA source file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompileOutcome {
    pub success: bool,
    pub compiled_path: Option<PathBuf>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// A single backtest request.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSpec {
    pub symbol: String,
    pub timeframe: String,
    pub params: BTreeMap<String, ParamValue>,
    pub from_date: NaiveDate,
    pub to_date: NaiveDate,
    pub latency_ms: u32,
    pub model: DataModel,
    /// Collision-free name the terminal writes its artifact under.
    pub report_handle: String,
}

/// Outcome of a single run: summary metrics, the closed-trade list and the
/// artifact the terminal wrote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub metrics: TradeMetrics,
    pub trades: Vec<TradeRecord>,
    pub report_path: Option<PathBuf>,
}

/// A parameter-sweep request.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepSpec {
    pub symbol: String,
    pub timeframe: String,
    pub ranges: Vec<OptimizationRange>,
    pub from_date: NaiveDate,
    pub forward_date: NaiveDate,
    pub to_date: NaiveDate,
    pub latency_ms: u32,
    pub model: DataModel,
    pub report_handle: String,
    pub timeout: Duration,
}

/// Outcome of a sweep: the merged pass table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepOutcome {
    pub pass_count: u32,
    pub passes: Vec<PassRow>,
    pub artifact_path: Option<PathBuf>,
}

/// Receives liveness messages while a sweep is running.
///
/// Long sweeps are silent for hours; the sink lets the orchestrator prove
/// the terminal is still making progress.
pub trait ProgressSink: Send + Sync {
    fn progress(&self, message: &str);
}

/// Sink that forwards to the tracing subscriber.
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn progress(&self, message: &str) {
        tracing::info!(target: "gauntlet::sweep", "{message}");
    }
}

/// Abstract contract for the external evaluation engine.
///
/// Single runs must be deterministic given identical inputs. Artifacts are
/// retrieved by exact report handle, never by directory scanning.
pub trait TerminalRunner {
    /// Kill stray evaluator processes left over from earlier runs. Called
    /// before long sweeps; the default is a no-op for implementations that
    /// cannot leak processes.
    fn cleanup_stray_processes(&self) {}

    /// Compile an EA source file, returning the compiled artifact path or a
    /// parseable error list.
    fn compile(&self, ea_source: &Path) -> Result<CompileOutcome>;

    /// Run one backtest.
    fn run_single(&self, ea_path: &Path, spec: &RunSpec) -> Result<RunOutcome>;

    /// Run a genetic parameter sweep under a hard timeout, reporting
    /// liveness through `progress`.
    fn run_sweep(
        &self,
        ea_path: &Path,
        spec: &SweepSpec,
        progress: &dyn ProgressSink,
    ) -> Result<SweepOutcome>;
}
