//! # Gauntlet Pipeline
//!
//! The resumable, gated, multi-stage evaluation workflow:
//!
//! - `Pipeline`: the orchestrator with its five entry points (`start` plus
//!   one resume per pause kind)
//! - `Stage` and the concrete stage implementations
//! - `StressConfig`: the full tunable option surface
//! - `RunStore`: atomic state checkpoints and artifact spill
//! - refinement analysis, Monte Carlo simulation, window analytics and
//!   report generation

pub mod analysis;
pub mod config;
pub mod mc;
pub mod orchestrator;
pub mod reporting;
pub mod source;
pub mod stage;
pub mod stages;
pub mod store;
pub mod windows;

pub use config::{BestPassMetric, ConfigError, StressConfig};
pub use orchestrator::Pipeline;
pub use stage::{AnalystParams, PauseKind, RefineDecision, SessionData, Stage, StageContext};
pub use store::{RunStore, StoreError};
