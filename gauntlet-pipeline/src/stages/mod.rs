//! Concrete pipeline stages, one module per concern.

pub mod backtest;
pub mod build;
pub mod forward;
pub mod monte;
pub mod multi;
pub mod prepare;
pub mod ranges;
pub mod refine;
pub mod repair;
pub mod report;
pub mod select;
pub mod stress;
pub mod sweep;
pub mod validate;

pub use backtest::BacktestSelected;
pub use build::{Compile, ExtractParams};
pub use forward::ForwardWindows;
pub use monte::MonteCarlo;
pub use multi::MultiPair;
pub use prepare::{InjectCriterion, InjectSafety, LoadEa};
pub use ranges::RecordRanges;
pub use refine::{AnalyzeRefine, RefineOutcome};
pub use repair::RepairSource;
pub use report::GenerateReports;
pub use select::SelectPasses;
pub use stress::StressScenarios;
pub use sweep::{CreateIni, ParsePasses, RunSweep};
pub use validate::ValidateTrades;
