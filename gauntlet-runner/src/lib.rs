//! # Gauntlet Runner
//!
//! Everything that touches the external trading terminal:
//!
//! - `TerminalRunner`: the three-operation contract (compile, single run,
//!   sweep) the pipeline is written against
//! - `LiveTerminal`: drives the real executables through config files and
//!   report artifacts
//! - `DryRunTerminal`: scriptable mock with a call log; the only
//!   implementation orchestrator tests may use
//! - configuration-file emitter, artifact parsers, deterministic report
//!   handles and the stray-process janitor

pub mod dry_run;
pub mod handle;
pub mod ini;
pub mod interface;
pub mod janitor;
pub mod live;
mod markup;
pub mod run_report;
pub mod sweep_table;

pub use dry_run::{synthetic_run, Call, DryRunTerminal};
pub use handle::report_handle;
pub use interface::{
    CompileOutcome, DataModel, ProgressSink, RunOutcome, RunSpec, SweepOutcome, SweepSpec,
    TerminalRunner, TracingSink,
};
pub use janitor::ProcessJanitor;
pub use live::{AccountSettings, LiveTerminal, LiveTerminalConfig};
pub use run_report::parse_run_report;
pub use sweep_table::parse_sweep_artifact;
