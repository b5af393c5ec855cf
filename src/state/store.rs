//! Durable JSON persistence for [`RunState`].
//!
//! One record per run id at `<runs_dir>/<run_id>/state.json`, overwritten
//! wholesale on each save. Writes go through a temp file and rename so a
//! crash mid-write never leaves a torn record behind; phases started by a
//! later process invocation resume from the last durable save.

use std::fs;
use std::path::PathBuf;

use crate::errors::StateError;
use crate::state::RunState;

pub struct StateStore {
    runs_dir: PathBuf,
}

impl StateStore {
    pub fn new(runs_dir: PathBuf) -> Self {
        Self { runs_dir }
    }

    fn state_path(&self, run_id: &str) -> PathBuf {
        self.runs_dir.join(run_id).join("state.json")
    }

    /// Load the state for a run. A brand-new run has no record yet; that is
    /// the expected condition, reported as `Ok(None)` rather than an error.
    pub fn load(&self, run_id: &str) -> Result<Option<RunState>, StateError> {
        let path = self.state_path(run_id);
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&path).map_err(|source| StateError::ReadFailed {
            path: path.clone(),
            source,
        })?;

        let state: RunState =
            serde_json::from_str(&content).map_err(|source| StateError::Corrupt {
                path: path.clone(),
                source,
            })?;

        Ok(Some(state))
    }

    /// Persist the full state and record `phase_label` as the most recently
    /// completed step. Saving the same label twice in a row appends nothing,
    /// so re-running a satisfied phase leaves the history unchanged.
    pub fn save(&self, state: &mut RunState, phase_label: &str) -> Result<(), StateError> {
        if state.last_completed() != Some(phase_label) {
            state.phase_history.push(phase_label.to_string());
        }
        state.updated_at = chrono::Utc::now();
        self.persist(state)
    }

    /// Persist the full state without touching the phase history. Used when
    /// marking a run failed: progress already recorded is never rolled back,
    /// and the failed phase never enters the history.
    pub fn persist(&self, state: &RunState) -> Result<(), StateError> {
        let path = self.state_path(&state.run_id);
        let dir = path.parent().expect("state path has a parent");
        fs::create_dir_all(dir).map_err(|source| StateError::WriteFailed {
            path: path.clone(),
            source,
        })?;

        let content =
            serde_json::to_string_pretty(state).map_err(|source| StateError::WriteFailed {
                path: path.clone(),
                source: std::io::Error::other(source),
            })?;

        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, content).map_err(|source| StateError::WriteFailed {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &path).map_err(|source| StateError::WriteFailed {
            path: path.clone(),
            source,
        })?;

        Ok(())
    }

    /// Run ids of every run with a durable record, in no particular order.
    /// The port allocator scans these to find reserved pairs.
    pub fn list_run_ids(&self) -> Result<Vec<String>, StateError> {
        if !self.runs_dir.exists() {
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&self.runs_dir).map_err(|source| StateError::ReadFailed {
            path: self.runs_dir.clone(),
            source,
        })?;

        let mut ids = Vec::new();
        for entry in entries.flatten() {
            let name = entry.file_name();
            let run_id = name.to_string_lossy().to_string();
            if self.state_path(&run_id).exists() {
                ids.push(run_id);
            }
        }
        Ok(ids)
    }
}
