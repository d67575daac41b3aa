//! Gauntlet CLI — start and resume EA stress-test workflows.
//!
//! Commands:
//! - `start` — begin a workflow; runs until the first pause point
//! - `resume-params` — supply wide params + ranges (JSON payload file)
//! - `resume-fix` — supply a patched source file
//! - `resume-refine` — proceed, or supply refined ranges (JSON file)
//! - `resume-selection` — supply explicit pass indices
//! - `status` — print a workflow's current state
//! - `leaderboard` — print the cross-workflow leaderboard

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use gauntlet_core::{score, OptimizationRange, WorkflowState};
use gauntlet_pipeline::{
    reporting, AnalystParams, Pipeline, RefineDecision, RunStore, StressConfig,
};
use gauntlet_runner::{
    AccountSettings, DryRunTerminal, LiveTerminal, LiveTerminalConfig, TerminalRunner,
};

#[derive(Parser)]
#[command(name = "gauntlet", about = "Stress-test Expert Advisors through a gated evaluation pipeline")]
struct Cli {
    /// Path to a TOML configuration file; defaults apply otherwise.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct TerminalArgs {
    /// Use the scriptable dry-run terminal instead of a live installation.
    #[arg(long)]
    dry_run: bool,

    /// Editor binary used for compilation.
    #[arg(long, requires = "terminal_bin")]
    editor_bin: Option<PathBuf>,

    /// Tester binary used for runs and sweeps.
    #[arg(long, requires = "editor_bin")]
    terminal_bin: Option<PathBuf>,

    /// Directory the tester writes report artifacts into.
    #[arg(long)]
    terminal_reports: Option<PathBuf>,

    /// Directory generated configuration files are written to.
    #[arg(long)]
    terminal_work: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Start a new workflow for one EA source file.
    Start {
        /// EA source file (.mq5).
        #[arg(long)]
        ea: PathBuf,
        #[arg(long, default_value = "EURUSD")]
        symbol: String,
        #[arg(long, default_value = "H1")]
        timeframe: String,
        /// Operator name of the terminal installation.
        #[arg(long, default_value = "default")]
        terminal: String,
        #[command(flatten)]
        runner: TerminalArgs,
    },
    /// Resume an awaiting-params workflow with the analyst payload.
    ResumeParams {
        workflow_id: String,
        /// JSON file: { "wide_validation_params": {...}, "optimization_ranges": [...] }
        #[arg(long)]
        file: PathBuf,
        #[command(flatten)]
        runner: TerminalArgs,
    },
    /// Resume an awaiting-fix workflow with a patched source file.
    ResumeFix {
        workflow_id: String,
        #[arg(long)]
        source: PathBuf,
        #[command(flatten)]
        runner: TerminalArgs,
    },
    /// Resume an awaiting-refine-decision workflow.
    ResumeRefine {
        workflow_id: String,
        /// Accept the current results and continue to selection.
        #[arg(long, conflicts_with = "ranges")]
        proceed: bool,
        /// JSON file with refined optimization ranges.
        #[arg(long)]
        ranges: Option<PathBuf>,
        #[command(flatten)]
        runner: TerminalArgs,
    },
    /// Resume an awaiting-selection workflow with pass indices.
    ResumeSelection {
        workflow_id: String,
        /// Comma-separated pass indices, e.g. 3,17,42.
        #[arg(long, value_delimiter = ',')]
        passes: Vec<u32>,
        #[command(flatten)]
        runner: TerminalArgs,
    },
    /// Show the current state of a workflow.
    Status { workflow_id: String },
    /// Print the cross-workflow leaderboard.
    Leaderboard,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Start { ea, symbol, timeframe, terminal, runner } => {
            let pipeline = pipeline(&config, &runner)?;
            let state = pipeline.start(ea, &symbol, &timeframe, &terminal)?;
            print_state(&state);
        }
        Command::ResumeParams { workflow_id, file, runner } => {
            let payload: AnalystParams = read_json(&file)?;
            let pipeline = pipeline(&config, &runner)?;
            let state = pipeline.resume_with_params(&workflow_id, payload)?;
            print_state(&state);
        }
        Command::ResumeFix { workflow_id, source, runner } => {
            let patched = fs::read_to_string(&source)
                .with_context(|| format!("read patched source {}", source.display()))?;
            let pipeline = pipeline(&config, &runner)?;
            let state = pipeline.resume_with_patched_source(&workflow_id, patched)?;
            print_state(&state);
        }
        Command::ResumeRefine { workflow_id, proceed, ranges, runner } => {
            let decision = match (proceed, ranges) {
                (true, None) => RefineDecision::Proceed,
                (false, Some(path)) => {
                    let ranges: Vec<OptimizationRange> = read_json(&path)?;
                    RefineDecision::Refine(ranges)
                }
                _ => bail!("pass exactly one of --proceed or --ranges <file>"),
            };
            let pipeline = pipeline(&config, &runner)?;
            let state = pipeline.resume_with_refine_decision(&workflow_id, decision)?;
            print_state(&state);
        }
        Command::ResumeSelection { workflow_id, passes, runner } => {
            if passes.is_empty() {
                bail!("--passes must name at least one pass index");
            }
            let pipeline = pipeline(&config, &runner)?;
            let state = pipeline.resume_with_selection(&workflow_id, passes)?;
            print_state(&state);
        }
        Command::Status { workflow_id } => {
            let store = RunStore::new(config.runs_dir.clone());
            let state = store.load_state(&workflow_id)?;
            print_state(&state);
        }
        Command::Leaderboard => {
            let store = RunStore::new(config.runs_dir.clone());
            let states = store.list_states()?;
            print!("{}", reporting::render_leaderboard(&states));
        }
    }
    Ok(())
}

fn load_config(path: Option<&std::path::Path>) -> Result<StressConfig> {
    match path {
        Some(path) => StressConfig::from_file(path)
            .with_context(|| format!("load configuration {}", path.display())),
        None => Ok(StressConfig::default()),
    }
}

fn pipeline(config: &StressConfig, args: &TerminalArgs) -> Result<Pipeline> {
    let runner: Arc<dyn TerminalRunner> = if args.dry_run {
        Arc::new(DryRunTerminal::healthy())
    } else {
        let (Some(editor), Some(terminal)) = (&args.editor_bin, &args.terminal_bin) else {
            bail!("pass --editor-bin and --terminal-bin, or --dry-run");
        };
        let reports_dir = args
            .terminal_reports
            .clone()
            .unwrap_or_else(|| config.runs_dir.join("terminal_reports"));
        let work_dir = args
            .terminal_work
            .clone()
            .unwrap_or_else(|| config.runs_dir.join("terminal_work"));
        Arc::new(LiveTerminal::new(LiveTerminalConfig {
            editor_path: editor.clone(),
            terminal_path: terminal.clone(),
            reports_dir,
            work_dir,
            account: AccountSettings {
                deposit: config.deposit,
                currency: config.currency.clone(),
                leverage: config.leverage,
            },
            single_run_timeout: Duration::from_secs(600),
            heartbeat: Duration::from_secs(config.heartbeat_secs),
        })?)
    };
    Ok(Pipeline::new(config.clone(), runner))
}

fn read_json<T: serde::de::DeserializeOwned>(path: &std::path::Path) -> Result<T> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parse {}", path.display()))
}

fn print_state(state: &WorkflowState) {
    println!("workflow:  {}", state.workflow_id);
    println!("ea:        {}", state.ea_name);
    println!("market:    {} {}", state.symbol, state.timeframe);
    println!("status:    {:?}", state.status);
    println!(
        "stages:    {}",
        state
            .stage_results
            .iter()
            .map(|r| format!("{}{}", r.stage, if r.success { "" } else { "!" }))
            .collect::<Vec<_>>()
            .join(" → ")
    );
    if state.fix_attempts > 0 {
        println!("fixes:     {}", state.fix_attempts);
    }
    if state.refine_iterations > 0 {
        println!("refines:   {}", state.refine_iterations);
    }
    if let Some(best) = &state.best_pass {
        println!(
            "best pass: #{} score {:.1} profit {:.2} PF {:.2} DD {:.1}% ({} trades)",
            best.pass_index,
            score::rounded(best.composite_score),
            best.metrics.profit,
            best.metrics.profit_factor,
            best.metrics.max_drawdown_pct,
            best.metrics.total_trades,
        );
    }
    if let Some(mc) = &state.monte_carlo {
        println!(
            "monte carlo: confidence {:.1}%, ruin {:.1}%",
            mc.confidence, mc.ruin_probability
        );
    }
    if !state.errors.is_empty() {
        println!("errors:");
        for error in &state.errors {
            println!("  - {error}");
        }
    }
}
