//! Live terminal driver.
//!
//! Drives the real editor and tester executables through their command-line
//! interfaces: write a configuration file, spawn the process under a
//! timeout, then read the artifact back by its exact report handle. The
//! tester serializes its own invocations via a working-directory lock, so
//! calls here are strictly sequential.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::sync::mpsc::RecvTimeoutError;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};
use wait_timeout::ChildExt;

use crate::ini::{inputs_from_params, inputs_from_ranges, timeframe_minutes, TesterIni};
use crate::interface::{
    CompileOutcome, ProgressSink, RunOutcome, RunSpec, SweepOutcome, SweepSpec, TerminalRunner,
};
use crate::janitor::ProcessJanitor;
use crate::run_report::parse_run_report;
use crate::sweep_table::parse_sweep_artifact;

/// Account settings baked into every generated configuration.
#[derive(Debug, Clone)]
pub struct AccountSettings {
    pub deposit: f64,
    pub currency: String,
    pub leverage: u32,
}

/// Configuration of a live terminal installation.
#[derive(Debug, Clone)]
pub struct LiveTerminalConfig {
    /// Editor executable used for compilation.
    pub editor_path: PathBuf,
    /// Tester executable used for runs and sweeps.
    pub terminal_path: PathBuf,
    /// Directory the tester writes report artifacts into (shared, append-only
    /// from our point of view).
    pub reports_dir: PathBuf,
    /// Directory generated configuration files are written to.
    pub work_dir: PathBuf,
    pub account: AccountSettings,
    pub single_run_timeout: Duration,
    pub heartbeat: Duration,
}

pub struct LiveTerminal {
    config: LiveTerminalConfig,
    janitor: ProcessJanitor,
}

impl LiveTerminal {
    pub fn new(config: LiveTerminalConfig) -> Result<Self> {
        if !config.editor_path.exists() {
            bail!("editor binary not found: {}", config.editor_path.display());
        }
        if !config.terminal_path.exists() {
            bail!("terminal binary not found: {}", config.terminal_path.display());
        }
        let janitor = ProcessJanitor::for_executable(&config.terminal_path);
        Ok(Self { config, janitor })
    }

    pub fn janitor(&self) -> &ProcessJanitor {
        &self.janitor
    }

    fn write_ini(&self, ini: &TesterIni) -> Result<PathBuf> {
        fs::create_dir_all(&self.config.work_dir).context("create work dir")?;
        let path = self.config.work_dir.join(format!("{}.ini", ini.report_handle));
        fs::write(&path, ini.render())
            .with_context(|| format!("write configuration {}", path.display()))?;
        Ok(path)
    }

    fn report_path(&self, report_handle: &str) -> PathBuf {
        self.config.reports_dir.join(format!("{report_handle}.xml"))
    }

    fn forward_report_path(&self, report_handle: &str) -> PathBuf {
        self.config
            .reports_dir
            .join(format!("{report_handle}.forward.xml"))
    }

    /// Spawn the tester with a config file and wait, killing on timeout.
    fn run_tester(&self, ini_path: &Path, timeout: Duration) -> Result<()> {
        let mut child = Command::new(&self.config.terminal_path)
            .arg(format!("/config:{}", ini_path.display()))
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .context("spawn terminal")?;

        match child.wait_timeout(timeout).context("wait for terminal")? {
            Some(status) if status.success() => Ok(()),
            Some(status) => bail!("terminal exited with status {status}"),
            None => {
                child.kill().ok();
                child.wait().ok();
                self.janitor.kill_all_matching();
                bail!("terminal timed out after {}s", timeout.as_secs())
            }
        }
    }
}

impl TerminalRunner for LiveTerminal {
    fn cleanup_stray_processes(&self) {
        self.janitor.kill_all_matching();
    }

    fn compile(&self, ea_source: &Path) -> Result<CompileOutcome> {
        let log_path = ea_source.with_extension("log");
        let mut child = Command::new(&self.config.editor_path)
            .arg(format!("/compile:{}", ea_source.display()))
            .arg(format!("/log:{}", log_path.display()))
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .context("spawn editor")?;
        // The editor exits non-zero on compile errors; the log is authoritative.
        let _ = child
            .wait_timeout(self.config.single_run_timeout)
            .context("wait for editor")?
            .ok_or_else(|| {
                child.kill().ok();
                anyhow!("editor timed out")
            })?;

        let log = match fs::read_to_string(&log_path) {
            Ok(log) => log,
            Err(err) => {
                return Ok(CompileOutcome {
                    success: false,
                    compiled_path: None,
                    errors: vec![format!(
                        "compile log unreadable at {}: {err}",
                        log_path.display()
                    )],
                    warnings: Vec::new(),
                })
            }
        };

        let errors: Vec<String> = log
            .lines()
            .filter(|l| l.contains(" error ") || l.contains(": error"))
            .map(str::to_string)
            .collect();
        let warnings: Vec<String> = log
            .lines()
            .filter(|l| l.contains(" warning ") || l.contains(": warning"))
            .map(str::to_string)
            .collect();

        let compiled = ea_source.with_extension("ex5");
        let success = errors.is_empty() && compiled.exists();
        Ok(CompileOutcome {
            success,
            compiled_path: success.then_some(compiled),
            errors,
            warnings,
        })
    }

    fn run_single(&self, ea_path: &Path, spec: &RunSpec) -> Result<RunOutcome> {
        let expert = ea_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| anyhow!("EA path has no file name"))?;
        let ini = TesterIni {
            expert,
            symbol: spec.symbol.clone(),
            period_minutes: timeframe_minutes(&spec.timeframe),
            from_date: spec.from_date,
            to_date: spec.to_date,
            forward_date: None,
            model: spec.model,
            latency_ms: spec.latency_ms,
            optimization: false,
            report_handle: spec.report_handle.clone(),
            deposit: self.config.account.deposit,
            currency: self.config.account.currency.clone(),
            leverage: self.config.account.leverage,
            inputs: inputs_from_params(&spec.params),
        };
        let ini_path = self.write_ini(&ini)?;
        self.run_tester(&ini_path, self.config.single_run_timeout)?;

        let report_path = self.report_path(&spec.report_handle);
        let xml = fs::read_to_string(&report_path)
            .with_context(|| format!("read run report {}", report_path.display()))?;
        let (metrics, trades) = parse_run_report(&xml)
            .with_context(|| format!("parse run report {}", report_path.display()))?;
        Ok(RunOutcome {
            metrics,
            trades,
            report_path: Some(report_path),
        })
    }

    fn run_sweep(
        &self,
        ea_path: &Path,
        spec: &SweepSpec,
        progress: &dyn ProgressSink,
    ) -> Result<SweepOutcome> {
        let expert = ea_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| anyhow!("EA path has no file name"))?;
        let ini = TesterIni {
            expert,
            symbol: spec.symbol.clone(),
            period_minutes: timeframe_minutes(&spec.timeframe),
            from_date: spec.from_date,
            to_date: spec.to_date,
            forward_date: Some(spec.forward_date),
            model: spec.model,
            latency_ms: spec.latency_ms,
            optimization: true,
            report_handle: spec.report_handle.clone(),
            deposit: self.config.account.deposit,
            currency: self.config.account.currency.clone(),
            leverage: self.config.account.leverage,
            inputs: inputs_from_ranges(&spec.ranges),
        };
        let ini_path = self.write_ini(&ini)?;

        let started = Instant::now();
        let heartbeat = self.config.heartbeat;
        let (done_tx, done_rx) = mpsc::channel::<()>();

        let result = thread::scope(|scope| {
            scope.spawn(move || loop {
                match done_rx.recv_timeout(heartbeat) {
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    Err(RecvTimeoutError::Timeout) => {
                        progress.progress(&format!(
                            "sweep still running ({}s elapsed)",
                            started.elapsed().as_secs()
                        ));
                    }
                }
            });
            let run = self.run_tester(&ini_path, spec.timeout);
            let _ = done_tx.send(());
            run
        });
        result?;

        let artifact_path = self.report_path(&spec.report_handle);
        let back_xml = fs::read_to_string(&artifact_path)
            .with_context(|| format!("read sweep artifact {}", artifact_path.display()))?;
        let forward_xml = fs::read_to_string(self.forward_report_path(&spec.report_handle)).ok();
        let passes = parse_sweep_artifact(&back_xml, forward_xml.as_deref())
            .with_context(|| format!("parse sweep artifact {}", artifact_path.display()))?;
        Ok(SweepOutcome {
            pass_count: passes.len() as u32,
            passes,
            artifact_path: Some(artifact_path),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_binaries_fail_preflight() {
        let config = LiveTerminalConfig {
            editor_path: PathBuf::from("/nonexistent/editor"),
            terminal_path: PathBuf::from("/nonexistent/terminal"),
            reports_dir: PathBuf::from("/tmp"),
            work_dir: PathBuf::from("/tmp"),
            account: AccountSettings {
                deposit: 3000.0,
                currency: "GBP".into(),
                leverage: 100,
            },
            single_run_timeout: Duration::from_secs(60),
            heartbeat: Duration::from_secs(60),
        };
        assert!(LiveTerminal::new(config).is_err());
    }
}
