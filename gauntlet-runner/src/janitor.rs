//! Terminal process cleanup.
//!
//! The external terminal can leave orphaned processes behind after a timeout
//! or crash, and a straggler holds the working-directory lock that the next
//! run needs. The janitor force-terminates every process matching the
//! terminal executable. Platform differences stay confined here; cleanup
//! failures are warnings, never errors.

use std::path::Path;
use std::process::Command;

/// Kills stray terminal processes by executable name.
#[derive(Debug, Clone)]
pub struct ProcessJanitor {
    image_name: String,
}

impl ProcessJanitor {
    /// Janitor for the given terminal executable path.
    pub fn for_executable(executable: &Path) -> Self {
        let image_name = executable
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "terminal64.exe".to_string());
        Self { image_name }
    }

    /// Force-terminate all matching processes and wait for them to exit.
    /// Returns the number of kill commands that ran; failures are logged
    /// and swallowed.
    pub fn kill_all_matching(&self) -> usize {
        match self.spawn_kill() {
            Ok(status) => {
                if status {
                    tracing::info!(image = %self.image_name, "terminated stray terminal processes");
                    1
                } else {
                    0
                }
            }
            Err(err) => {
                tracing::warn!(image = %self.image_name, %err, "process cleanup failed");
                0
            }
        }
    }

    #[cfg(windows)]
    fn spawn_kill(&self) -> std::io::Result<bool> {
        let output = Command::new("taskkill")
            .args(["/F", "/T", "/IM", &self.image_name])
            .output()?;
        Ok(output.status.success())
    }

    #[cfg(not(windows))]
    fn spawn_kill(&self) -> std::io::Result<bool> {
        let output = Command::new("pkill")
            .args(["-9", "-f", &self.image_name])
            .output()?;
        // pkill exits 1 when nothing matched; that is a clean no-op.
        Ok(output.status.success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn image_name_from_executable_path() {
        let janitor = ProcessJanitor::for_executable(&PathBuf::from("/opt/terminal/terminal64.exe"));
        assert_eq!(janitor.image_name, "terminal64.exe");
    }

    #[test]
    fn cleanup_never_panics_when_nothing_matches() {
        let janitor =
            ProcessJanitor::for_executable(&PathBuf::from("/nonexistent/gauntlet_test_no_such_proc"));
        // Either zero kills or a swallowed failure; both are fine.
        let _ = janitor.kill_all_matching();
    }
}
