//! # Gauntlet Core
//!
//! Pure domain model for the EA stress-test pipeline:
//!
//! - `Parameter` / `OptimizationRange`: extracted inputs and sweep directives
//! - `TradeMetrics` / `GateResult`: run summaries and threshold checks
//! - `go_live_score`: the composite deployment-readiness score
//! - `PassRow` / `PassBacktest` / `MonteCarloSummary`: sweep and robustness records
//! - `WorkflowState`: the persisted root record the orchestrator owns
//!
//! Everything here is data plus invariant checks; no I/O and no terminal
//! knowledge.

pub mod metrics;
pub mod params;
pub mod pass_row;
pub mod score;
pub mod state;
pub mod trade;

pub use metrics::{gates, GateOp, GateResult, TradeMetrics};
pub use params::{OptimizationRange, ParamKind, ParamValue, Parameter, RangeSpec};
pub use pass_row::{MonteCarloSummary, PassBacktest, PassRow};
pub use score::{go_live_score, ScoreRanges, ScoreWeights};
pub use state::{
    stage_names, BacktestPeriod, OptimizationRound, StageResult, WorkflowState, WorkflowStatus,
};
pub use trade::{TradeDirection, TradeRecord};
