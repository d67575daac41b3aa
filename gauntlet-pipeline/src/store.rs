//! Workflow persistence.
//!
//! Layout under the runs directory:
//!
//! ```text
//! runs/<workflow-id>.json   state record (atomic write)
//! runs/<workflow-id>/       per-workflow artifacts (pass tables, trades…)
//! runs/reports/             cross-workflow boards
//! ```
//!
//! State writes go through a temp file and rename so a crash mid-write
//! leaves the previous checkpoint authoritative.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use gauntlet_core::WorkflowState;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("corrupt record at {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("no workflow record for id {0}")]
    NotFound(String),
}

#[derive(Debug, Clone)]
pub struct RunStore {
    runs_dir: PathBuf,
}

impl RunStore {
    pub fn new(runs_dir: impl Into<PathBuf>) -> Self {
        Self { runs_dir: runs_dir.into() }
    }

    pub fn runs_dir(&self) -> &Path {
        &self.runs_dir
    }

    pub fn state_path(&self, workflow_id: &str) -> PathBuf {
        self.runs_dir.join(format!("{workflow_id}.json"))
    }

    pub fn workflow_dir(&self, workflow_id: &str) -> PathBuf {
        self.runs_dir.join(workflow_id)
    }

    pub fn reports_dir(&self) -> PathBuf {
        self.runs_dir.join("reports")
    }

    /// Persist the state record atomically (write temp, rename over).
    pub fn save_state(&self, state: &WorkflowState) -> Result<(), StoreError> {
        let path = self.state_path(&state.workflow_id);
        self.ensure_dir(&self.runs_dir)?;
        let json = serde_json::to_string_pretty(state)
            .map_err(|source| StoreError::Corrupt { path: path.clone(), source })?;
        if let Some(idx) = json.find("coefficient_of_variation") {
            eprintln!("DEBUG save_state json snippet = {}", &json[idx..idx+80].replace('\n', " "));
        }

        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|source| StoreError::Io { path: tmp.clone(), source })?;
        fs::rename(&tmp, &path).map_err(|source| StoreError::Io { path: path.clone(), source })?;
        Ok(())
    }

    pub fn load_state(&self, workflow_id: &str) -> Result<WorkflowState, StoreError> {
        let path = self.state_path(workflow_id);
        if !path.exists() {
            return Err(StoreError::NotFound(workflow_id.to_string()));
        }
        let contents =
            fs::read_to_string(&path).map_err(|source| StoreError::Io { path: path.clone(), source })?;
        if let Some(idx) = contents.find("coefficient_of_variation") {
            eprintln!("DEBUG load_state json snippet = {}", &contents[idx..idx+80].replace('\n', " "));
        }
        serde_json::from_str(&contents).map_err(|source| StoreError::Corrupt { path, source })
    }

    /// Load every readable state record. Unreadable files are skipped: the
    /// boards must not die because one old record predates a schema change.
    pub fn list_states(&self) -> Result<Vec<WorkflowState>, StoreError> {
        let mut states = Vec::new();
        let entries = match fs::read_dir(&self.runs_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(states),
            Err(source) => return Err(StoreError::Io { path: self.runs_dir.clone(), source }),
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().map(|e| e == "json").unwrap_or(false) {
                if let Ok(contents) = fs::read_to_string(&path) {
                    if let Ok(state) = serde_json::from_str::<WorkflowState>(&contents) {
                        states.push(state);
                    }
                }
            }
        }
        states.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(states)
    }

    /// Spill a large auxiliary value to the workflow's artifact directory,
    /// returning the path to reference from the state record.
    pub fn save_artifact<T: Serialize>(
        &self,
        workflow_id: &str,
        name: &str,
        value: &T,
    ) -> Result<PathBuf, StoreError> {
        let dir = self.workflow_dir(workflow_id);
        self.ensure_dir(&dir)?;
        let path = dir.join(format!("{name}.json"));
        let json = serde_json::to_string_pretty(value)
            .map_err(|source| StoreError::Corrupt { path: path.clone(), source })?;
        fs::write(&path, json).map_err(|source| StoreError::Io { path: path.clone(), source })?;
        Ok(path)
    }

    pub fn load_artifact<T: DeserializeOwned>(&self, path: &Path) -> Result<T, StoreError> {
        let contents = fs::read_to_string(path)
            .map_err(|source| StoreError::Io { path: path.to_path_buf(), source })?;
        serde_json::from_str(&contents)
            .map_err(|source| StoreError::Corrupt { path: path.to_path_buf(), source })
    }

    fn ensure_dir(&self, dir: &Path) -> Result<(), StoreError> {
        fs::create_dir_all(dir).map_err(|source| StoreError::Io { path: dir.to_path_buf(), source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gauntlet_core::{stage_names, StageResult, WorkflowStatus};
    use tempfile::TempDir;

    fn store() -> (TempDir, RunStore) {
        let tmp = TempDir::new().unwrap();
        let store = RunStore::new(tmp.path().join("runs"));
        (tmp, store)
    }

    #[test]
    fn save_load_round_trip() {
        let (_tmp, store) = store();
        let mut state = WorkflowState::new("wf1", "/tmp/ea.mq5", "EURUSD", "H1", "t1");
        state.status = WorkflowStatus::Running;
        state.record_stage(StageResult::ok(stage_names::LOAD_EA));
        store.save_state(&state).unwrap();

        let loaded = store.load_state("wf1").unwrap();
        assert_eq!(state, loaded);
    }

    #[test]
    fn save_overwrites_previous_checkpoint() {
        let (_tmp, store) = store();
        let mut state = WorkflowState::new("wf1", "/tmp/ea.mq5", "EURUSD", "H1", "t1");
        store.save_state(&state).unwrap();
        state.record_stage(StageResult::ok(stage_names::COMPILE));
        store.save_state(&state).unwrap();

        let loaded = store.load_state("wf1").unwrap();
        assert_eq!(loaded.stage_results.len(), 1);
        // No temp file left behind.
        assert!(!store.state_path("wf1").with_extension("json.tmp").exists());
    }

    #[test]
    fn missing_state_is_not_found() {
        let (_tmp, store) = store();
        assert!(matches!(
            store.load_state("nope"),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn corrupt_state_reported_as_corrupt() {
        let (_tmp, store) = store();
        std::fs::create_dir_all(store.runs_dir()).unwrap();
        std::fs::write(store.state_path("bad"), "{{{not json").unwrap();
        assert!(matches!(
            store.load_state("bad"),
            Err(StoreError::Corrupt { .. })
        ));
    }

    #[test]
    fn list_states_skips_unreadable_records() {
        let (_tmp, store) = store();
        let a = WorkflowState::new("wf_a", "/tmp/a.mq5", "EURUSD", "H1", "t1");
        let b = WorkflowState::new("wf_b", "/tmp/b.mq5", "GBPUSD", "H1", "t1");
        store.save_state(&a).unwrap();
        store.save_state(&b).unwrap();
        std::fs::write(store.state_path("junk"), "not json").unwrap();

        let states = store.list_states().unwrap();
        assert_eq!(states.len(), 2);
    }

    #[test]
    fn artifacts_live_under_workflow_dir() {
        let (_tmp, store) = store();
        let path = store
            .save_artifact("wf1", "pass_table", &vec![1u32, 2, 3])
            .unwrap();
        assert!(path.starts_with(store.workflow_dir("wf1")));
        let back: Vec<u32> = store.load_artifact(&path).unwrap();
        assert_eq!(back, vec![1, 2, 3]);
    }

    #[test]
    fn list_on_missing_dir_is_empty() {
        let (_tmp, store) = store();
        assert!(store.list_states().unwrap().is_empty());
    }
}
